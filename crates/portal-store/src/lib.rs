//! Fixture-backed mock data store and the simulated case backend.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use portal_core::{
    Attachment, Case, CaseComment, CaseSource, CaseStatus, CaseSubmission, KnowledgeArticle,
    Persona, PortalUser, RequestCategory, SearchResult, TaskGroup,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{info, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "portal-store";

pub const CASES_FILE: &str = "cases.json";
pub const ARTICLES_FILE: &str = "articles.json";
pub const SEARCH_RESULTS_FILE: &str = "search_results.json";
pub const TASK_GROUPS_FILE: &str = "task_groups.yaml";
pub const PROFILE_FILE: &str = "portal.yaml";

const CASE_NUMBER_PREFIX: &str = "TM";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturedTopic {
    pub title: String,
    pub count: u32,
}

/// Signed-in user plus the curated content that is not tied to a single record.
#[derive(Debug, Clone, Deserialize)]
pub struct PortalProfile {
    pub recorded_at: DateTime<Utc>,
    pub current_user: PortalUser,
    #[serde(default)]
    pub recommendations: HashMap<RequestCategory, Vec<String>>,
    #[serde(default)]
    pub featured_topics: Vec<FeaturedTopic>,
    #[serde(default)]
    pub search_suggestions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TaskGroupsYaml {
    groups: Vec<TaskGroup>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("case `{0}` not found")]
    CaseNotFound(String),
    #[error("case {case_number} is {status} and no longer accepts comments")]
    CaseInactive {
        case_number: String,
        status: CaseStatus,
    },
    #[error("comment is empty")]
    EmptyComment,
    #[error("cannot move case {case_number} from {from} to {to}")]
    InvalidTransition {
        case_number: String,
        from: CaseStatus,
        to: CaseStatus,
    },
}

/// In-memory portal data. Every mutation bumps [`MockStore::revision`].
#[derive(Debug, Clone)]
pub struct MockStore {
    cases: Vec<Case>,
    articles: Vec<KnowledgeArticle>,
    search_results: Vec<SearchResult>,
    task_groups: Vec<TaskGroup>,
    profile: PortalProfile,
    revision: u64,
}

impl MockStore {
    pub fn load(dir: &Path) -> anyhow::Result<Self> {
        let cases: Vec<Case> = read_json(&dir.join(CASES_FILE))?;
        let articles: Vec<KnowledgeArticle> = read_json(&dir.join(ARTICLES_FILE))?;
        let search_results: Vec<SearchResult> = read_json(&dir.join(SEARCH_RESULTS_FILE))?;
        let task_groups: TaskGroupsYaml = read_yaml(&dir.join(TASK_GROUPS_FILE))?;
        let profile: PortalProfile = read_yaml(&dir.join(PROFILE_FILE))?;

        let store = Self::from_parts(cases, articles, search_results, task_groups.groups, profile);
        store.warn_dangling_article_ids();
        info!(
            dir = %dir.display(),
            cases = store.cases.len(),
            articles = store.articles.len(),
            task_groups = store.task_groups.len(),
            "loaded portal fixtures"
        );
        Ok(store)
    }

    pub fn from_parts(
        cases: Vec<Case>,
        articles: Vec<KnowledgeArticle>,
        search_results: Vec<SearchResult>,
        task_groups: Vec<TaskGroup>,
        profile: PortalProfile,
    ) -> Self {
        Self {
            cases,
            articles,
            search_results,
            task_groups,
            profile,
            revision: 0,
        }
    }

    fn warn_dangling_article_ids(&self) {
        let referenced = self
            .task_groups
            .iter()
            .flat_map(|g| g.article_ids.iter())
            .chain(self.profile.recommendations.values().flatten());
        for id in referenced {
            if self.article(id).is_none() {
                warn!(article_id = %id, "fixture references unknown knowledge article");
            }
        }
    }

    /// Shift every case timestamp so the fixtures read as if recorded at `now`.
    pub fn rebase_to(&mut self, now: DateTime<Utc>) {
        let offset = now - self.profile.recorded_at;
        for case in &mut self.cases {
            case.created_at += offset;
            case.updated_at += offset;
            case.sla_deadline += offset;
            for comment in &mut case.comments {
                comment.created_at += offset;
            }
        }
        for result in &mut self.search_results {
            if let Some(date) = result.date.as_mut() {
                *date += offset;
            }
        }
        self.profile.recorded_at = now;
        self.revision += 1;
        info!(offset_minutes = offset.num_minutes(), "rebased fixture timestamps");
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn case(&self, id: &str) -> Option<&Case> {
        self.cases.iter().find(|c| c.id == id)
    }

    pub fn articles(&self) -> &[KnowledgeArticle] {
        &self.articles
    }

    pub fn article(&self, id: &str) -> Option<&KnowledgeArticle> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub fn search_results(&self) -> &[SearchResult] {
        &self.search_results
    }

    pub fn task_groups(&self) -> &[TaskGroup] {
        &self.task_groups
    }

    pub fn task_group(&self, id: &str) -> Option<&TaskGroup> {
        self.task_groups.iter().find(|g| g.id == id)
    }

    pub fn task_groups_by_persona(&self, persona: Persona) -> Vec<&TaskGroup> {
        self.task_groups
            .iter()
            .filter(|g| g.persona == persona)
            .collect()
    }

    /// Articles of a group in the group's order; unknown groups and ids yield nothing.
    pub fn articles_for_task_group(&self, group_id: &str) -> Vec<&KnowledgeArticle> {
        self.task_group(group_id)
            .map(|g| g.article_ids.iter().filter_map(|id| self.article(id)).collect())
            .unwrap_or_default()
    }

    pub fn recommended_articles(&self, category: RequestCategory) -> Vec<&KnowledgeArticle> {
        self.profile
            .recommendations
            .get(&category)
            .map(|ids| ids.iter().filter_map(|id| self.article(id)).collect())
            .unwrap_or_default()
    }

    pub fn recommended_article_ids(&self, category: RequestCategory) -> Vec<String> {
        self.recommended_articles(category)
            .into_iter()
            .map(|a| a.id.clone())
            .collect()
    }

    pub fn profile(&self) -> &PortalProfile {
        &self.profile
    }

    pub fn current_user(&self) -> &PortalUser {
        &self.profile.current_user
    }

    pub fn append_comment(
        &mut self,
        case_id: &str,
        author: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<CaseComment, StoreError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(StoreError::EmptyComment);
        }
        let case = self.case_mut(case_id)?;
        if !case.is_active() {
            return Err(StoreError::CaseInactive {
                case_number: case.case_number.clone(),
                status: case.status,
            });
        }
        let comment = CaseComment {
            id: format!("cmt-{}", Uuid::new_v4().simple()),
            author: author.to_string(),
            content: content.to_string(),
            created_at: now,
            is_internal: false,
        };
        case.comments.push(comment.clone());
        case.updated_at = now;
        self.revision += 1;
        Ok(comment)
    }

    /// Moves a case along one lifecycle edge and returns the previous status.
    pub fn transition_status(
        &mut self,
        case_id: &str,
        next: CaseStatus,
        now: DateTime<Utc>,
    ) -> Result<CaseStatus, StoreError> {
        let case = self.case_mut(case_id)?;
        let previous = case.status;
        if !previous.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                case_number: case.case_number.clone(),
                from: previous,
                to: next,
            });
        }
        case.status = next;
        case.updated_at = now;
        self.revision += 1;
        Ok(previous)
    }

    /// Sequential number after the highest existing one, stamped with `now`'s year.
    pub fn next_case_number(&self, now: DateTime<Utc>) -> String {
        let next = self
            .cases
            .iter()
            .filter_map(|c| c.case_number.rsplit('-').next())
            .filter_map(|seq| seq.parse::<u32>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        format!("{CASE_NUMBER_PREFIX}-{}-{next:05}", now.year())
    }

    pub fn create_case(&mut self, submission: CaseSubmission, now: DateTime<Utc>) -> &Case {
        let user = self.profile.current_user.clone();
        let attachments = submission
            .attachments
            .into_iter()
            .map(|meta| {
                let id = format!("att-{}", Uuid::new_v4().simple());
                Attachment {
                    url: format!("/attachments/{id}"),
                    id,
                    name: meta.name,
                    size: meta.size,
                    content_type: meta.content_type,
                }
            })
            .collect();
        let case = Case {
            id: format!("case-{}", Uuid::new_v4().simple()),
            case_number: self.next_case_number(now),
            category: submission.category,
            sub_category: submission.sub_category,
            event_id: submission.event_id,
            event_name: None,
            venue_partner_id: submission.venue_partner_id,
            market: submission.market,
            urgency: submission.urgency,
            description: submission.description,
            tried_solutions: submission.tried_solutions,
            attachments,
            status: CaseStatus::Open,
            assigned_queue: submission.category.route_queue(submission.urgency).to_string(),
            created_at: now,
            updated_at: now,
            sla_deadline: now + submission.urgency.sla_target(),
            source: Some(CaseSource::Portal),
            comments: Vec::new(),
            contact_name: user.name,
            contact_email: user.email,
            partner_id: user.partner_id,
            role: user.role,
            company: user.company,
        };
        self.cases.push(case);
        self.revision += 1;
        &self.cases[self.cases.len() - 1]
    }

    fn case_mut(&mut self, case_id: &str) -> Result<&mut Case, StoreError> {
        self.cases
            .iter_mut()
            .find(|c| c.id == case_id)
            .ok_or_else(|| StoreError::CaseNotFound(case_id.to_string()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("parsing fixture {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub case_id: String,
    pub case_number: String,
    pub assigned_queue: String,
    pub sla_deadline: DateTime<Utc>,
    /// True while cases only live in process memory.
    pub simulated: bool,
}

/// Seam for a real support API; the portal ships with [`InMemoryBackend`].
#[async_trait]
pub trait CaseBackend: Send + Sync {
    async fn submit_case(
        &self,
        submission: CaseSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, StoreError>;

    async fn append_comment(
        &self,
        case_id: &str,
        author: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<CaseComment, StoreError>;

    async fn transition_status(
        &self,
        case_id: &str,
        next: CaseStatus,
        now: DateTime<Utc>,
    ) -> Result<CaseStatus, StoreError>;
}

#[derive(Debug)]
pub struct InMemoryBackend {
    store: RwLock<MockStore>,
}

impl InMemoryBackend {
    pub fn new(store: MockStore) -> Self {
        Self {
            store: RwLock::new(store),
        }
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, MockStore> {
        self.store.read().await
    }
}

#[async_trait]
impl CaseBackend for InMemoryBackend {
    async fn submit_case(
        &self,
        submission: CaseSubmission,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, StoreError> {
        let mut store = self.store.write().await;
        let case = store.create_case(submission, now);
        info!(
            case_number = %case.case_number,
            queue = %case.assigned_queue,
            urgency = %case.urgency,
            "recorded simulated case submission"
        );
        Ok(SubmissionReceipt {
            case_id: case.id.clone(),
            case_number: case.case_number.clone(),
            assigned_queue: case.assigned_queue.clone(),
            sla_deadline: case.sla_deadline,
            simulated: true,
        })
    }

    async fn append_comment(
        &self,
        case_id: &str,
        author: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<CaseComment, StoreError> {
        let mut store = self.store.write().await;
        let comment = store.append_comment(case_id, author, content, now)?;
        info!(case_id, comment_id = %comment.id, "appended comment");
        Ok(comment)
    }

    async fn transition_status(
        &self,
        case_id: &str,
        next: CaseStatus,
        now: DateTime<Utc>,
    ) -> Result<CaseStatus, StoreError> {
        let mut store = self.store.write().await;
        let previous = store.transition_status(case_id, next, now)?;
        info!(case_id, from = %previous, to = %next, "case status changed");
        Ok(previous)
    }
}
