//! Template-facing view models. Everything here is plain strings and flags so
//! the templates stay free of logic.

use chrono::{DateTime, Utc};
use portal_core::sla::SlaCountdown;
use portal_core::{
    initials, Attachment, Badge, Case, CaseComment, CaseStatus, KnowledgeArticle, PortalUser,
    SearchResult, TaskGroup,
};
use portal_locale::{LocaleContext, UserRole};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct NavLink {
    pub href: &'static str,
    pub label: String,
    pub active: bool,
}

/// One `<option>` or tab.
#[derive(Debug, Clone)]
pub struct Choice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>, current: &str) -> Self {
        let value = value.into();
        Self {
            selected: value == current,
            label: label.into(),
            value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TabLink {
    pub href: String,
    pub label: String,
    pub count: usize,
    pub css_class: &'static str,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct Notice {
    pub message: String,
    pub css_class: &'static str,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            css_class: "notice-success",
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            css_class: "notice-warning",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            css_class: "notice-error",
        }
    }

    /// Banner for a `?notice=` code set by a redirect. Unknown codes show nothing.
    pub fn from_code(code: &str, case_number: Option<&str>) -> Option<Self> {
        let case_number = case_number.unwrap_or("your case");
        Some(match code {
            "submitted" => Self::success(format!(
                "Case {case_number} submitted. This portal runs on sample data, so the case \
                 only exists until the server restarts."
            )),
            "comment-added" => Self::success("Your comment has been added."),
            "comment-empty" => Self::warning("Comments cannot be empty."),
            "comment-closed" => Self::warning("This case is closed to new comments."),
            "status-changed" => Self::success("Case status updated."),
            "status-rejected" => Self::warning("That status change is not allowed."),
            "language-unsupported" => {
                Self::warning("That language is not offered in the selected market.")
            }
            _ => return None,
        })
    }
}

/// `?notice=<code>&case=<number>` left by a post-redirect-get.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoticeParams {
    #[serde(default)]
    pub notice: Option<String>,
    #[serde(default)]
    pub case: Option<String>,
}

impl NoticeParams {
    pub fn notice(&self) -> Option<Notice> {
        self.notice
            .as_deref()
            .and_then(|code| Notice::from_code(code, self.case.as_deref()))
    }
}

/// Shared header, navigation and locale switcher.
#[derive(Debug, Clone)]
pub struct Layout {
    pub title: String,
    pub lang: &'static str,
    pub nav: Vec<NavLink>,
    pub markets: Vec<Choice>,
    pub languages: Vec<Choice>,
    pub show_languages: bool,
    pub roles: Vec<Choice>,
    pub market_flag: String,
    pub location_label: String,
    pub language_label: String,
    pub user_name: String,
    pub user_initials: String,
    pub company: String,
    pub notice: Option<Notice>,
    pub return_to: String,
}

const NAV: [(&str, &str); 6] = [
    ("/", "home"),
    ("/cases", "myCases"),
    ("/cases/new", "newCase"),
    ("/guides", "taskGuides"),
    ("/knowledge", "knowledgeBase"),
    ("/search", "search"),
];

impl Layout {
    pub fn build(
        locale: &LocaleContext,
        user: &PortalUser,
        title: impl Into<String>,
        active: &str,
        return_to: impl Into<String>,
    ) -> Self {
        let config = locale.config();
        let market = locale.market().as_str();
        let language = locale.language().as_str();
        let role = locale.role().as_str();
        Self {
            title: title.into(),
            lang: language,
            nav: NAV
                .iter()
                .map(|&(href, key)| NavLink {
                    href,
                    label: locale.t(key),
                    active: href == active,
                })
                .collect(),
            markets: locale
                .catalog()
                .markets()
                .iter()
                .map(|m| Choice::new(m.market.as_str(), format!("{} {}", m.flag, m.label), market))
                .collect(),
            languages: config
                .languages
                .iter()
                .map(|l| Choice::new(l.as_str(), l.native_name(), language))
                .collect(),
            show_languages: config.has_multiple_languages(),
            roles: [UserRole::Partner, UserRole::AccountManager]
                .into_iter()
                .map(|r| Choice::new(r.as_str(), r.label(), role))
                .collect(),
            market_flag: config.flag.clone(),
            location_label: locale.t("location"),
            language_label: locale.t("language"),
            user_name: user.name.clone(),
            user_initials: initials(&user.name),
            company: user.company.clone(),
            notice: None,
            return_to: return_to.into(),
        }
    }

    pub fn with_notice(mut self, notice: Option<Notice>) -> Self {
        self.notice = notice;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SlaView {
    pub text: String,
    pub css_class: &'static str,
}

impl SlaView {
    pub fn for_case(case: &Case, now: DateTime<Utc>) -> Option<Self> {
        case.active_sla_deadline().map(|deadline| {
            let countdown = SlaCountdown::compute(deadline, now);
            Self {
                text: countdown.describe(),
                css_class: countdown.css_class(),
            }
        })
    }
}

pub const EXCERPT_CHARS: usize = 140;

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}

/// Card status line, translated when the dictionary has it.
fn progress_text(status: CaseStatus, locale: &LocaleContext) -> String {
    let key = match status {
        CaseStatus::Resolved | CaseStatus::Closed => "resolved",
        CaseStatus::InProgress => "inProgress",
        CaseStatus::Pending => "awaitingResponse",
        CaseStatus::Open => "submitted",
        CaseStatus::Unknown => return status.progress_message().to_string(),
    };
    let text = locale.t(key);
    if text == key {
        status.progress_message().to_string()
    } else {
        text
    }
}

/// Case card on the list and home pages.
#[derive(Debug, Clone)]
pub struct CaseRow {
    pub id: String,
    pub case_number: String,
    pub category_label: &'static str,
    pub sub_category_label: String,
    pub excerpt: String,
    pub company: String,
    pub status: Badge,
    pub urgency: Badge,
    pub progress: String,
    pub source_label: &'static str,
    pub updated: String,
    pub sla: Option<SlaView>,
}

impl CaseRow {
    pub fn build(case: &Case, locale: &LocaleContext, now: DateTime<Utc>) -> Self {
        Self {
            id: case.id.clone(),
            case_number: case.case_number.clone(),
            category_label: case.category_label(),
            sub_category_label: case.sub_category_label().to_string(),
            excerpt: excerpt(&case.description),
            company: case.company.clone(),
            status: case.status.badge(),
            urgency: case.urgency.badge(),
            progress: progress_text(case.status, locale),
            source_label: case.source_label(),
            updated: locale.format_timestamp(case.updated_at),
            sla: SlaView::for_case(case, now),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentView {
    pub name: String,
    pub size: String,
    pub content_type: String,
    pub url: String,
}

impl AttachmentView {
    pub fn build(attachment: &Attachment) -> Self {
        Self {
            name: attachment.name.clone(),
            size: human_size(attachment.size),
            content_type: attachment.content_type.clone(),
            url: attachment.url.clone(),
        }
    }
}

pub fn human_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

#[derive(Debug, Clone)]
pub struct CommentView {
    pub author: String,
    pub initials: String,
    pub content: String,
    pub when: String,
    pub internal: bool,
}

impl CommentView {
    pub fn build(comment: &CaseComment, locale: &LocaleContext) -> Self {
        Self {
            author: comment.author.clone(),
            initials: initials(&comment.author),
            content: comment.content.clone(),
            when: locale.format_timestamp(comment.created_at),
            internal: comment.is_internal,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArticleView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind_label: &'static str,
    pub source: String,
    pub url: String,
    pub relevance: u32,
    pub external: bool,
}

impl ArticleView {
    pub fn build(article: &KnowledgeArticle) -> Self {
        Self {
            id: article.id.clone(),
            title: article.title.clone(),
            description: article.description.clone(),
            kind_label: article.kind.label(),
            source: article.source.clone(),
            url: article.url.clone(),
            relevance: (article.relevance_score.clamp(0.0, 1.0) * 100.0).round() as u32,
            external: article.url.starts_with("http"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResultView {
    pub title: String,
    pub snippet: String,
    pub kind_label: &'static str,
    pub source: String,
    pub url: String,
    pub date: Option<String>,
}

impl ResultView {
    pub fn build(result: &SearchResult, locale: &LocaleContext) -> Self {
        Self {
            title: result.title.clone(),
            snippet: result.snippet.clone(),
            kind_label: result.kind.label(),
            source: result.source.clone(),
            url: result.url.clone(),
            date: result.date.map(|d| locale.format_date(d)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupCard {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub article_count: usize,
}

impl GroupCard {
    pub fn build(group: &TaskGroup) -> Self {
        Self {
            id: group.id.clone(),
            title: group.title.clone(),
            description: group.description.clone(),
            icon: group.icon.clone(),
            article_count: group.article_ids.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(48_213), "47.1 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn long_descriptions_are_cut() {
        let text = "word ".repeat(60);
        let cut = excerpt(&text);
        assert!(cut.ends_with('…'));
        assert!(cut.chars().count() <= EXCERPT_CHARS + 1);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn notice_codes_map_to_banners() {
        let notice = Notice::from_code("submitted", Some("TM-2024-00009")).unwrap();
        assert!(notice.message.contains("TM-2024-00009"));
        assert_eq!(notice.css_class, "notice-success");
        assert!(Notice::from_code("bogus", None).is_none());
    }
}
