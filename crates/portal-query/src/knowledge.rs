use std::collections::HashSet;

use portal_core::{ArticleKind, KnowledgeArticle, SearchResult, SearchResultKind, TaskGroup};
use serde::{Deserialize, Serialize};

use crate::Selection;

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleFilterParams {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub query: String,
    pub kind: Selection<ArticleKind>,
}

impl ArticleFilter {
    pub fn from_params(params: &ArticleFilterParams) -> Self {
        Self {
            query: params.q.as_deref().unwrap_or_default().trim().to_string(),
            kind: Selection::parse(params.kind.as_deref()),
        }
    }

    pub fn matches(&self, article: &KnowledgeArticle) -> bool {
        let needle = self.query.to_lowercase();
        let text = needle.is_empty()
            || contains_ci(&article.title, &needle)
            || contains_ci(&article.description, &needle);
        text && self.kind.matches(Some(&article.kind))
    }
}

/// Knowledge base listing, most relevant first.
pub fn filter_articles<'a>(
    articles: &'a [KnowledgeArticle],
    filter: &ArticleFilter,
) -> Vec<&'a KnowledgeArticle> {
    let mut out: Vec<&KnowledgeArticle> = articles.iter().filter(|a| filter.matches(a)).collect();
    out.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    out
}

/// Searches the articles bundled by task groups. A blank query finds nothing.
pub fn search_task_articles<'a>(
    groups: &[TaskGroup],
    articles: &'a [KnowledgeArticle],
    query: &str,
) -> Vec<&'a KnowledgeArticle> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    groups
        .iter()
        .flat_map(|g| g.article_ids.iter())
        .filter(|id| seen.insert(id.as_str()))
        .filter_map(|id| articles.iter().find(|a| &a.id == id))
        .filter(|a| contains_ci(&a.title, &needle) || contains_ci(&a.description, &needle))
        .collect()
}

/// Per-tab totals on the search page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchCounts {
    pub all: usize,
    pub knowledge: usize,
    pub training: usize,
    pub video: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHits<'a> {
    pub query: String,
    pub results: Vec<&'a SearchResult>,
    pub counts: SearchCounts,
}

impl<'a> SearchHits<'a> {
    pub fn in_tab(&self, tab: &Selection<SearchResultKind>) -> Vec<&'a SearchResult> {
        self.results
            .iter()
            .copied()
            .filter(|r| tab.matches(Some(&r.kind)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome<'a> {
    /// No query yet; the page shows suggestion chips instead of results.
    NotSearched,
    Searched(SearchHits<'a>),
}

pub fn federated_search<'a>(results: &'a [SearchResult], query: &str) -> SearchOutcome<'a> {
    let query = query.trim();
    if query.is_empty() {
        return SearchOutcome::NotSearched;
    }
    let needle = query.to_lowercase();
    let results: Vec<&SearchResult> = results
        .iter()
        .filter(|r| contains_ci(&r.title, &needle) || contains_ci(&r.snippet, &needle))
        .collect();
    let count = |kind: SearchResultKind| results.iter().filter(|r| r.kind == kind).count();
    let counts = SearchCounts {
        all: results.len(),
        knowledge: count(SearchResultKind::Knowledge),
        training: count(SearchResultKind::Training),
        video: count(SearchResultKind::Video),
    };
    SearchOutcome::Searched(SearchHits {
        query: query.to_string(),
        results,
        counts,
    })
}
