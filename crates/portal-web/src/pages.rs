use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use portal_core::{ArticleKind, Persona, SearchResultKind};
use portal_locale::{LanguageCode, MarketCode, UserRole};
use portal_query::{
    federated_search, filter_articles, search_task_articles, ArticleFilter, ArticleFilterParams,
    DashboardStats, SearchOutcome, Selection, ALL,
};
use portal_store::FeaturedTopic;
use serde::Deserialize;
use tracing::{info, warn};

use crate::views::{ArticleView, CaseRow, GroupCard, Layout, NoticeParams, ResultView, TabLink};
use crate::{href_with_query, render_html, render_html_status, AppState};

const FEATURED_GROUPS: usize = 6;
const HOME_RESOURCES: usize = 4;

#[derive(Template)]
#[template(path = "home.html")]
struct HomeTemplate {
    layout: Layout,
    open_label: String,
    open_count: usize,
    critical_label: String,
    critical: Vec<CaseRow>,
    recent_label: String,
    recent: Vec<CaseRow>,
    resources_label: String,
    resources: Vec<ArticleView>,
    groups: Vec<GroupCard>,
    topics: Vec<FeaturedTopic>,
    suggestions: Vec<String>,
    search_placeholder: String,
}

pub(crate) async fn home_handler(
    State(state): State<Arc<AppState>>,
    Query(notice): Query<NoticeParams>,
) -> Response {
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let now = Utc::now();
    let stats = DashboardStats::compute(store.cases());
    let rows = |cases: &[&portal_core::Case]| {
        cases
            .iter()
            .map(|c| CaseRow::build(c, &locale, now))
            .collect::<Vec<_>>()
    };
    let layout = Layout::build(&locale, store.current_user(), locale.t("dashboard"), "/", "/")
        .with_notice(notice.notice());
    render_html(HomeTemplate {
        open_label: locale.t("openCases"),
        open_count: stats.open,
        critical_label: locale.t("criticalIssues"),
        critical: rows(&stats.critical),
        recent_label: locale.t("recentCases"),
        recent: rows(&stats.recent),
        resources_label: locale.t("recommendedResources"),
        resources: filter_articles(store.articles(), &ArticleFilter::default())
            .into_iter()
            .take(HOME_RESOURCES)
            .map(ArticleView::build)
            .collect(),
        groups: store
            .task_groups()
            .iter()
            .take(FEATURED_GROUPS)
            .map(GroupCard::build)
            .collect(),
        topics: store.profile().featured_topics.clone(),
        suggestions: store.profile().search_suggestions.clone(),
        search_placeholder: locale.t("searchKnowledgeBase"),
        layout,
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct SearchParams {
    #[serde(default)]
    q: Option<String>,
    #[serde(default)]
    tab: Option<String>,
}

#[derive(Template)]
#[template(path = "search.html")]
struct SearchTemplate {
    layout: Layout,
    query: String,
    searched: bool,
    tabs: Vec<TabLink>,
    results: Vec<ResultView>,
    suggestions: Vec<String>,
}

const SEARCH_TABS: [(Option<SearchResultKind>, &str); 4] = [
    (None, "All"),
    (Some(SearchResultKind::Knowledge), "Knowledge"),
    (Some(SearchResultKind::Training), "Training"),
    (Some(SearchResultKind::Video), "Videos"),
];

pub(crate) async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
    Query(notice): Query<NoticeParams>,
) -> Response {
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let query = params.q.clone().unwrap_or_default();
    let tab: Selection<SearchResultKind> = Selection::parse(params.tab.as_deref());
    let return_to = href_with_query(
        "/search",
        &[("q", &query), ("tab", params.tab.as_deref().unwrap_or_default())],
    );
    let layout = Layout::build(&locale, store.current_user(), locale.t("search"), "/search", return_to)
        .with_notice(notice.notice());

    let (searched, tabs, results) = match federated_search(store.search_results(), &query) {
        SearchOutcome::NotSearched => (false, Vec::new(), Vec::new()),
        SearchOutcome::Searched(hits) => {
            let tabs = SEARCH_TABS
                .iter()
                .map(|(kind, label)| {
                    let value = kind.map(SearchResultKind::as_str).unwrap_or(ALL);
                    let count = match kind {
                        None => hits.counts.all,
                        Some(SearchResultKind::Knowledge) => hits.counts.knowledge,
                        Some(SearchResultKind::Training) => hits.counts.training,
                        Some(_) => hits.counts.video,
                    };
                    TabLink {
                        href: href_with_query("/search", &[("q", &hits.query), ("tab", value)]),
                        label: label.to_string(),
                        count,
                        css_class: "search-tab",
                        active: tab.as_param() == value,
                    }
                })
                .collect();
            let results = hits
                .in_tab(&tab)
                .into_iter()
                .map(|r| ResultView::build(r, &locale))
                .collect();
            (true, tabs, results)
        }
    };
    render_html(SearchTemplate {
        layout,
        query: query.trim().to_string(),
        searched,
        tabs,
        results,
        suggestions: store.profile().search_suggestions.clone(),
    })
}

#[derive(Template)]
#[template(path = "knowledge.html")]
struct KnowledgeTemplate {
    layout: Layout,
    query: String,
    kind_value: String,
    tabs: Vec<TabLink>,
    articles: Vec<ArticleView>,
    count: usize,
    empty_text: String,
    placeholder: String,
}

pub(crate) async fn knowledge_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArticleFilterParams>,
    Query(notice): Query<NoticeParams>,
) -> Response {
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let filter = ArticleFilter::from_params(&params);
    let articles: Vec<ArticleView> = filter_articles(store.articles(), &filter)
        .into_iter()
        .map(ArticleView::build)
        .collect();

    let kind_tab = |kind: Option<ArticleKind>| {
        let value = kind.map(ArticleKind::as_str).unwrap_or(ALL);
        let counted = ArticleFilter {
            query: filter.query.clone(),
            kind: kind.map(Selection::Only).unwrap_or_default(),
        };
        TabLink {
            href: href_with_query(
                "/knowledge",
                &[("q", &filter.query), ("kind", if value == ALL { "" } else { value })],
            ),
            label: kind.map(ArticleKind::tab_label).unwrap_or("All").to_string(),
            count: store.articles().iter().filter(|a| counted.matches(a)).count(),
            css_class: "kind-tab",
            active: filter.kind.as_param() == value,
        }
    };
    let tabs = std::iter::once(kind_tab(None))
        .chain(ArticleKind::ALL.into_iter().map(|k| kind_tab(Some(k))))
        .collect();

    let return_to = href_with_query(
        "/knowledge",
        &[("q", &filter.query), ("kind", params.kind.as_deref().unwrap_or_default())],
    );
    let layout = Layout::build(
        &locale,
        store.current_user(),
        locale.t("knowledgeBase"),
        "/knowledge",
        return_to,
    )
    .with_notice(notice.notice());
    render_html(KnowledgeTemplate {
        layout,
        query: filter.query.clone(),
        kind_value: params.kind.clone().unwrap_or_default(),
        tabs,
        count: articles.len(),
        articles,
        empty_text: locale.t("noArticlesFound"),
        placeholder: locale.t("searchKnowledgeBase"),
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct GuideParams {
    #[serde(default)]
    group: Option<String>,
    #[serde(default)]
    q: Option<String>,
}

struct PersonaSection {
    label: &'static str,
    groups: Vec<GroupCard>,
}

struct SelectedGroup {
    title: String,
    description: String,
    articles: Vec<ArticleView>,
}

#[derive(Template)]
#[template(path = "guides.html")]
struct GuidesTemplate {
    layout: Layout,
    query: String,
    searched: bool,
    matches: Vec<ArticleView>,
    sections: Vec<PersonaSection>,
    selected: Option<SelectedGroup>,
    empty_text: String,
}

pub(crate) async fn guides_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GuideParams>,
    Query(notice): Query<NoticeParams>,
) -> Response {
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let selected = match params.group.as_deref().filter(|g| !g.is_empty()) {
        Some(id) => match store.task_group(id) {
            Some(group) => Some(SelectedGroup {
                title: group.title.clone(),
                description: group.description.clone(),
                articles: store
                    .articles_for_task_group(id)
                    .into_iter()
                    .map(ArticleView::build)
                    .collect(),
            }),
            None => {
                drop(store);
                return not_found_page(&state, "That task guide does not exist.".to_string()).await;
            }
        },
        None => None,
    };
    let query = params.q.clone().unwrap_or_default().trim().to_string();
    let matches = search_task_articles(store.task_groups(), store.articles(), &query)
        .into_iter()
        .map(ArticleView::build)
        .collect();
    let return_to = href_with_query(
        "/guides",
        &[("group", params.group.as_deref().unwrap_or_default()), ("q", &query)],
    );
    let layout = Layout::build(&locale, store.current_user(), locale.t("taskGuides"), "/guides", return_to)
        .with_notice(notice.notice());
    render_html(GuidesTemplate {
        layout,
        searched: !query.is_empty(),
        query,
        matches,
        sections: Persona::ALL
            .into_iter()
            .map(|persona| PersonaSection {
                label: persona.label(),
                groups: store
                    .task_groups_by_persona(persona)
                    .into_iter()
                    .map(GroupCard::build)
                    .collect(),
            })
            .collect(),
        selected,
        empty_text: locale.t("noArticlesFound"),
    })
}

#[derive(Debug, Deserialize)]
pub(crate) struct LocaleForm {
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    return_to: Option<String>,
}

/// Local paths only, so the switcher cannot be used as an open redirect.
/// Browsers read `/\host` like `//host`, so backslashes are refused outright.
fn safe_return_path(raw: Option<&str>) -> &str {
    match raw {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.contains('\\')
                && !path.chars().any(char::is_control) =>
        {
            path
        }
        _ => "/",
    }
}

/// Drops a banner left over from an earlier redirect so it is not shown twice.
fn strip_notice(path: &str) -> String {
    let Some((base, query)) = path.split_once('?') else {
        return path.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            !pair.is_empty() && key != "notice" && key != "case"
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

pub(crate) async fn locale_handler(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LocaleForm>,
) -> Response {
    let mut rejected = false;
    {
        let mut locale = state.locale.write().await;
        if let Some(raw) = form.market.as_deref().filter(|v| !v.is_empty()) {
            let changed = raw
                .parse::<MarketCode>()
                .map_err(|err| err.to_string())
                .and_then(|m| locale.set_market(m).map_err(|err| err.to_string()));
            if let Err(err) = changed {
                warn!(%err, "ignoring market switch");
            }
        }
        if let Some(raw) = form.language.as_deref().filter(|v| !v.is_empty()) {
            let changed = raw
                .parse::<LanguageCode>()
                .map_err(|err| err.to_string())
                .and_then(|l| locale.set_language(l).map_err(|err| err.to_string()));
            if let Err(err) = changed {
                warn!(%err, "rejected language switch");
                rejected = true;
            }
        }
        if let Some(raw) = form.role.as_deref().filter(|v| !v.is_empty()) {
            match raw.parse::<UserRole>() {
                Ok(role) => locale.set_role(role),
                Err(err) => warn!(%err, "ignoring role switch"),
            }
        }
        info!(
            market = %locale.market(),
            language = %locale.language(),
            role = locale.role().as_str(),
            "locale updated"
        );
    }
    let target = strip_notice(safe_return_path(form.return_to.as_deref()));
    if rejected {
        let sep = if target.contains('?') { '&' } else { '?' };
        return Redirect::to(&format!("{target}{sep}notice=language-unsupported")).into_response();
    }
    Redirect::to(&target).into_response()
}

pub(crate) async fn app_css_handler(State(state): State<Arc<AppState>>) -> Response {
    let css_path = state.config.workspace_root.join("assets/static/app.css");
    match tokio::fs::read_to_string(&css_path).await {
        Ok(css) => ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, Html("/* missing app.css */".to_string())).into_response(),
    }
}

#[derive(Template)]
#[template(path = "not_found.html")]
struct NotFoundTemplate {
    layout: Layout,
    heading: String,
    message: String,
    back_label: String,
}

pub(crate) async fn not_found_page(state: &AppState, message: String) -> Response {
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let heading = locale.t("pageNotFound");
    render_html_status(
        StatusCode::NOT_FOUND,
        NotFoundTemplate {
            layout: Layout::build(&locale, store.current_user(), heading.clone(), "", "/"),
            heading,
            message,
            back_label: locale.t("backToCases"),
        },
    )
}

pub(crate) async fn not_found_handler(State(state): State<Arc<AppState>>) -> Response {
    let message = "The page you are looking for does not exist.".to_string();
    not_found_page(&state, message).await
}

#[cfg(test)]
mod tests {
    use super::{safe_return_path, strip_notice};
    use crate::test_support::*;
    use axum::http::StatusCode;

    #[test]
    fn return_paths_stay_local() {
        assert_eq!(safe_return_path(Some("/cases?tab=active")), "/cases?tab=active");
        assert_eq!(safe_return_path(Some("//evil.example")), "/");
        assert_eq!(safe_return_path(Some("https://evil.example")), "/");
        assert_eq!(safe_return_path(None), "/");
        assert_eq!(safe_return_path(Some("/\\evil.example")), "/");
        assert_eq!(safe_return_path(Some("/cases\\..\\x")), "/");
        assert_eq!(safe_return_path(Some("/\t/evil.example")), "/");
        assert_eq!(safe_return_path(Some("/cases\r\nSet-Cookie: x=1")), "/");
    }

    #[test]
    fn earlier_notices_are_dropped_from_return_paths() {
        assert_eq!(strip_notice("/knowledge"), "/knowledge");
        assert_eq!(strip_notice("/knowledge?notice=language-unsupported"), "/knowledge");
        assert_eq!(
            strip_notice("/cases?tab=active&notice=submitted&case=TM-2024-00009"),
            "/cases?tab=active"
        );
    }

    #[tokio::test]
    async fn home_shows_dashboard_counters() {
        let app = test_app();
        let (status, _, text) = get(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("Critical Issues"));
        assert!(text.contains("Recent Cases"));
        assert!(text.contains("TM-2024-00001"));
        assert!(text.contains("scanner troubleshooting"));
    }

    #[tokio::test]
    async fn empty_search_offers_suggestions() {
        let app = test_app();
        let (status, _, text) = get(&app, "/search?q=+++").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("settlement reports"));
        assert!(!text.contains("result-card"));
    }

    #[tokio::test]
    async fn search_counts_results_per_tab() {
        let app = test_app();
        let (_, _, text) = get(&app, "/search?q=settlement").await;
        assert!(text.contains("Settlement Reports Explained"));
        assert!(text.contains("Settlement Basics"));

        let (_, _, text) = get(&app, "/search?q=settlement&tab=training").await;
        assert!(text.contains("Settlement Basics"));
        assert!(!text.contains("Settlement Reports Explained"));
    }

    #[tokio::test]
    async fn knowledge_base_filters_by_kind() {
        let app = test_app();
        let (status, _, text) = get(&app, "/knowledge?kind=video").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("Creating Your First Event"));
        assert!(!text.contains("Pricing Checklist"));

        let (_, _, text) = get(&app, "/knowledge?q=zzz-nothing").await;
        assert!(text.contains("No articles found matching your criteria."));
    }

    #[tokio::test]
    async fn guides_list_personas_and_open_a_group() {
        let app = test_app();
        let (_, _, text) = get(&app, "/guides").await;
        assert!(text.contains("Venue Operations"));
        assert!(text.contains("Prepare for Onsale"));

        let (status, _, text) = get(&app, "/guides?group=prepare-onsale").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("QA Checklist Before Onsale"));

        let (status, _, _) = get(&app, "/guides?group=missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, _, text) = get(&app, "/guides?q=scanner").await;
        assert!(text.contains("Scanner Troubleshooting Guide"));
    }

    #[tokio::test]
    async fn market_switch_translates_and_rejects_foreign_language() {
        let app = test_app();
        let (status, headers, _) =
            post_form(&app, "/locale", "market=FR&return_to=%2Fcases", false).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/cases");
        let (_, _, text) = get(&app, "/cases").await;
        assert!(text.contains("Mes dossiers"));
        assert!(text.contains("lang=\"fr\""));

        let (_, headers, _) =
            post_form(&app, "/locale", "language=de&return_to=%2Fknowledge", false).await;
        assert_eq!(location(&headers), "/knowledge?notice=language-unsupported");
        let (_, _, text) = get(&app, "/knowledge?notice=language-unsupported").await;
        assert!(text.contains("That language is not offered in the selected market."));

        let (_, headers, _) = post_form(
            &app,
            "/locale",
            "language=de&return_to=%2Fknowledge%3Fkind%3Dvideo%26notice%3Dlanguage-unsupported",
            false,
        )
        .await;
        assert_eq!(
            location(&headers),
            "/knowledge?kind=video&notice=language-unsupported"
        );
    }
}
