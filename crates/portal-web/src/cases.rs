use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Path as AxumPath, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Form, Json,
};
use chrono::{DateTime, Utc};
use portal_core::{Badge, Case, CaseSource, CaseStatus, RequestCategory, Urgency};
use portal_locale::{LocaleContext, MarketCode};
use portal_query::{CaseFilter, CaseFilterParams, CaseTab, Selection, StatusCounts, ALL};
use portal_store::{CaseBackend, StoreError};
use serde::Deserialize;
use tracing::warn;

use crate::pages::not_found_page;
use crate::views::{
    AttachmentView, CaseRow, Choice, CommentView, Layout, NoticeParams, SlaView, TabLink,
};
use crate::{href_with_query, render_html, server_error, with_hx_trigger, AppState};

/// Filtered rows plus the counters around them; shared by the page and its partial.
struct CaseTable {
    rows: Vec<CaseRow>,
    count_text: String,
    empty_text: String,
    has_filters: bool,
    clear_label: String,
    new_case_label: String,
}

impl CaseTable {
    fn build(cases: &[&Case], filter: &CaseFilter, locale: &LocaleContext, now: DateTime<Utc>) -> Self {
        let n = cases.len();
        Self {
            rows: cases.iter().map(|c| CaseRow::build(c, locale, now)).collect(),
            count_text: format!("Showing {n} case{}", if n == 1 { "" } else { "s" }),
            empty_text: locale.t("noCasesFound"),
            has_filters: filter.has_active_filters(),
            clear_label: locale.t("clearFilters"),
            new_case_label: locale.t("newCase"),
        }
    }
}

#[derive(Template)]
#[template(path = "cases.html")]
struct CasesTemplate {
    layout: Layout,
    query: String,
    status_value: String,
    status_tabs: Vec<TabLink>,
    view_tabs: Vec<TabLink>,
    urgency_options: Vec<Choice>,
    category_options: Vec<Choice>,
    source_options: Vec<Choice>,
    table: CaseTable,
}

#[derive(Template)]
#[template(path = "cases_table_partial.html")]
struct CasesTablePartialTemplate {
    table: CaseTable,
}

struct CaseDetailView {
    id: String,
    case_number: String,
    category_label: &'static str,
    sub_category_label: String,
    description: String,
    status: Badge,
    urgency: Badge,
    source_label: &'static str,
    created: String,
    updated: String,
    event: Option<String>,
    venue_partner_id: String,
    market: String,
    assigned_queue: String,
    contact_name: String,
    contact_initials: String,
    contact_email: String,
    company: String,
    role: String,
    partner_id: String,
    tried: Vec<String>,
    attachments: Vec<AttachmentView>,
    comments: Vec<CommentView>,
    is_active: bool,
}

impl CaseDetailView {
    fn build(case: &Case, locale: &LocaleContext) -> Self {
        let event = match (&case.event_id, &case.event_name) {
            (Some(id), Some(name)) => Some(format!("{name} ({id})")),
            (Some(id), None) => Some(id.clone()),
            (None, Some(name)) => Some(name.clone()),
            (None, None) => None,
        };
        let market = case
            .market
            .parse::<MarketCode>()
            .ok()
            .and_then(|code| locale.catalog().market(code))
            .map(|m| format!("{} {}", m.flag, m.label))
            .unwrap_or_else(|| case.market.to_uppercase());
        Self {
            id: case.id.clone(),
            case_number: case.case_number.clone(),
            category_label: case.category_label(),
            sub_category_label: case.sub_category_label().to_string(),
            description: case.description.clone(),
            status: case.status.badge(),
            urgency: case.urgency.badge(),
            source_label: case.source_label(),
            created: locale.format_timestamp(case.created_at),
            updated: locale.format_timestamp(case.updated_at),
            event,
            venue_partner_id: case.venue_partner_id.clone(),
            market,
            assigned_queue: case.assigned_queue.clone(),
            contact_name: case.contact_name.clone(),
            contact_initials: case.contact_initials(),
            contact_email: case.contact_email.clone(),
            company: case.company.clone(),
            role: case.role.clone(),
            partner_id: case.partner_id.clone(),
            tried: case.tried_solutions.clone(),
            attachments: case.attachments.iter().map(AttachmentView::build).collect(),
            comments: case
                .comments
                .iter()
                .map(|c| CommentView::build(c, locale))
                .collect(),
            is_active: case.is_active(),
        }
    }
}

#[derive(Template)]
#[template(path = "case_detail.html")]
struct CaseDetailTemplate {
    layout: Layout,
    detail: CaseDetailView,
    case_id: String,
    sla: Option<SlaView>,
    refresh_secs: u64,
    can_change_status: bool,
    transitions: Vec<Choice>,
    back_label: String,
}

#[derive(Template)]
#[template(path = "sla_partial.html")]
struct SlaPartialTemplate {
    case_id: String,
    sla: SlaView,
    refresh_secs: u64,
}

fn filter_href(params: &CaseFilterParams) -> String {
    let value = |v: &Option<String>| v.clone().unwrap_or_default();
    href_with_query(
        "/cases",
        &[
            ("q", &value(&params.q)),
            ("status", &value(&params.status)),
            ("urgency", &value(&params.urgency)),
            ("category", &value(&params.category)),
            ("source", &value(&params.source)),
            ("tab", &value(&params.tab)),
        ],
    )
}

fn status_tabs(filter: &CaseFilter, counts: &StatusCounts) -> Vec<TabLink> {
    let current = filter.status.as_param();
    counts
        .tabs()
        .into_iter()
        .map(|tab| {
            let mut params = filter.to_params();
            params.status = (tab.value != ALL).then(|| tab.value.to_string());
            TabLink {
                href: filter_href(&params),
                label: tab.label.to_string(),
                count: tab.count,
                css_class: tab.css_class,
                active: tab.value == current,
            }
        })
        .collect()
}

fn view_tabs(filter: &CaseFilter, counts: &StatusCounts) -> Vec<TabLink> {
    CaseTab::ALL
        .into_iter()
        .map(|tab| {
            let mut params = filter.to_params();
            params.tab = (tab != CaseTab::All).then(|| tab.as_str().to_string());
            TabLink {
                href: filter_href(&params),
                label: tab.label().to_string(),
                count: counts.tab_count(tab),
                css_class: "view-tab",
                active: tab == filter.tab,
            }
        })
        .collect()
}

fn options<T: Copy>(
    all_label: &str,
    values: &[T],
    current: &str,
    describe: impl Fn(T) -> (&'static str, &'static str),
) -> Vec<Choice> {
    std::iter::once(Choice::new(ALL, all_label, current))
        .chain(values.iter().map(|v| {
            let (value, label) = describe(*v);
            Choice::new(value, label, current)
        }))
        .collect()
}

pub(crate) async fn cases_page_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CaseFilterParams>,
    Query(notice): Query<NoticeParams>,
) -> Response {
    let filter = CaseFilter::from_params(&params);
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let table = {
        let mut memo = state.memo.lock().await;
        let cases = memo.resolve(&filter, store.revision(), store.cases());
        CaseTable::build(&cases, &filter, &locale, Utc::now())
    };
    let counts = StatusCounts::tally(store.cases());
    let layout = Layout::build(
        &locale,
        store.current_user(),
        locale.t("myCases"),
        "/cases",
        filter_href(&params),
    )
    .with_notice(notice.notice());
    render_html(CasesTemplate {
        layout,
        query: filter.query.clone(),
        status_value: match &filter.status {
            Selection::All => String::new(),
            other => other.as_param().to_string(),
        },
        status_tabs: status_tabs(&filter, &counts),
        view_tabs: view_tabs(&filter, &counts),
        urgency_options: options(
            "All Urgencies",
            &Urgency::ALL,
            filter.urgency.as_param(),
            |u| (u.as_str(), u.label()),
        ),
        category_options: options(
            "All Categories",
            &RequestCategory::ALL,
            filter.category.as_param(),
            |c| (c.as_str(), c.label()),
        ),
        source_options: options(
            "All Sources",
            &CaseSource::ALL,
            filter.source.as_param(),
            |s| (s.as_str(), s.label()),
        ),
        table,
    })
}

pub(crate) async fn cases_table_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CaseFilterParams>,
) -> Response {
    let filter = CaseFilter::from_params(&params);
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let mut memo = state.memo.lock().await;
    let cases = memo.resolve(&filter, store.revision(), store.cases());
    let table = CaseTable::build(&cases, &filter, &locale, Utc::now());
    with_hx_trigger(
        render_html(CasesTablePartialTemplate { table }),
        "casesTableLoaded",
    )
}

pub(crate) async fn case_detail_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Query(notice): Query<NoticeParams>,
) -> Response {
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let Some(case) = store.case(&id) else {
        drop(store);
        return not_found_page(&state, locale.t("caseNotFound")).await;
    };
    let can_change_status = locale.is_account_manager();
    let transitions = case
        .status
        .next_statuses()
        .into_iter()
        .map(|s| Choice::new(s.as_str(), s.label(), ""))
        .collect();
    let layout = Layout::build(
        &locale,
        store.current_user(),
        case.case_number.clone(),
        "/cases",
        format!("/cases/{}", urlencoding::encode(&case.id)),
    )
    .with_notice(notice.notice());
    render_html(CaseDetailTemplate {
        layout,
        detail: CaseDetailView::build(case, &locale),
        case_id: case.id.clone(),
        sla: SlaView::for_case(case, Utc::now()),
        refresh_secs: state.config.sla_refresh.as_secs(),
        can_change_status,
        transitions,
        back_label: locale.t("backToCases"),
    })
}

/// htmx stops polling when it receives this status.
const HTMX_STOP_POLLING: u16 = 286;

pub(crate) async fn sla_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let store = state.backend.read().await;
    let Some(case) = store.case(&id) else {
        return (StatusCode::NOT_FOUND, Html(String::new())).into_response();
    };
    match SlaView::for_case(case, Utc::now()) {
        Some(sla) => render_html(SlaPartialTemplate {
            case_id: case.id.clone(),
            sla,
            refresh_secs: state.config.sla_refresh.as_secs(),
        }),
        None => (
            StatusCode::from_u16(HTMX_STOP_POLLING).unwrap_or(StatusCode::OK),
            Html(String::new()),
        )
            .into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommentForm {
    #[serde(default)]
    content: String,
}

fn case_redirect(id: &str, notice: &str) -> Response {
    Redirect::to(&format!("/cases/{}?notice={notice}", urlencoding::encode(id))).into_response()
}

pub(crate) async fn comment_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let author = state.backend.read().await.current_user().name.clone();
    match state
        .backend
        .append_comment(&id, &author, &form.content, Utc::now())
        .await
    {
        Ok(_) => case_redirect(&id, "comment-added"),
        Err(StoreError::EmptyComment) => case_redirect(&id, "comment-empty"),
        Err(StoreError::CaseInactive { .. }) => case_redirect(&id, "comment-closed"),
        Err(StoreError::CaseNotFound(_)) => {
            let message = state.locale_snapshot().await.t("caseNotFound");
            not_found_page(&state, message).await
        }
        Err(err) => server_error(err.into()),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusForm {
    status: String,
}

pub(crate) async fn status_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Form(form): Form<StatusForm>,
) -> Response {
    if !state.locale.read().await.is_account_manager() {
        return (
            StatusCode::FORBIDDEN,
            Html("Only account managers can change case status.".to_string()),
        )
            .into_response();
    }
    let Ok(next) = form.status.parse::<CaseStatus>() else {
        warn!(case_id = %id, status = %form.status, "unrecognized status change");
        return case_redirect(&id, "status-rejected");
    };
    match state.backend.transition_status(&id, next, Utc::now()).await {
        Ok(_) => case_redirect(&id, "status-changed"),
        Err(StoreError::InvalidTransition { .. }) => case_redirect(&id, "status-rejected"),
        Err(StoreError::CaseNotFound(_)) => {
            let message = state.locale_snapshot().await.t("caseNotFound");
            not_found_page(&state, message).await
        }
        Err(err) => server_error(err.into()),
    }
}

pub(crate) async fn api_cases_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CaseFilterParams>,
) -> Response {
    let filter = CaseFilter::from_params(&params);
    let store = state.backend.read().await;
    let mut memo = state.memo.lock().await;
    let cases: Vec<Case> = memo
        .resolve(&filter, store.revision(), store.cases())
        .into_iter()
        .cloned()
        .collect();
    Json(cases).into_response()
}

pub(crate) async fn api_case_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let store = state.backend.read().await;
    match store.case(&id) {
        Some(case) => Json(case.clone()).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("case `{id}` not found") })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::http::{header, StatusCode};
    use portal_core::Case;

    #[tokio::test]
    async fn case_list_renders_every_fixture_case() {
        let app = test_app();
        let (status, _, text) = get(&app, "/cases").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("Showing 8 cases"));
        assert!(text.contains("TM-2024-00001"));
    }

    #[tokio::test]
    async fn filter_form_refreshes_the_table_on_every_change() {
        let app = test_app();
        let (_, _, text) = get(&app, "/cases").await;
        assert!(text.contains(r#"hx-get="/cases/table""#));
        assert!(text.contains(r#"hx-trigger="input changed, change""#));
        assert!(!text.contains("delay:"));
    }

    #[tokio::test]
    async fn table_partial_applies_filters_and_sets_trigger() {
        let app = test_app();
        let (status, headers, text) =
            get(&app, "/cases/table?urgency=critical&tab=active").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["hx-trigger"], "casesTableLoaded");
        assert!(text.contains("Showing 1 case<"));
        assert!(text.contains("TM-2024-00001"));
        assert!(!text.contains("<html"));
    }

    #[tokio::test]
    async fn unrecognized_filter_shows_empty_state() {
        let app = test_app();
        let (_, _, text) = get(&app, "/cases/table?status=escalated").await;
        assert!(text.contains("Showing 0 cases"));
        assert!(text.contains("No cases matching your criteria."));
        assert!(text.contains("Clear Filters"));
    }

    #[tokio::test]
    async fn unknown_case_is_a_not_found_page_with_link_back() {
        let app = test_app();
        let (status, _, text) = get(&app, "/cases/case-404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(text.contains("The requested case could not be found."));
        assert!(text.contains("href=\"/cases\""));
    }

    #[tokio::test]
    async fn active_case_polls_its_sla_badge() {
        let app = test_app();
        let (status, _, text) = get(&app, "/cases/case-1").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("hx-get=\"/cases/case-1/sla\""));
        assert!(text.contains("every 60s"));
        assert!(text.contains("sla-critical"));

        let (status, _, text) = get(&app, "/cases/case-6/sla").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("Overdue by"));
    }

    #[tokio::test]
    async fn resolved_case_stops_sla_polling() {
        let app = test_app();
        let (status, _, text) = get(&app, "/cases/case-4/sla").await;
        assert_eq!(status.as_u16(), 286);
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn comments_append_to_active_cases_only() {
        let app = test_app();
        let (status, headers, _) =
            post_form(&app, "/cases/case-1/comments", "content=Doors+open+at+7", false).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(location(&headers), "/cases/case-1?notice=comment-added");

        let (_, _, text) = get(&app, "/cases/case-1?notice=comment-added").await;
        assert!(text.contains("Doors open at 7"));
        assert!(text.contains("Your comment has been added."));

        let (_, headers, _) = post_form(&app, "/cases/case-5/comments", "content=hello", false).await;
        assert_eq!(location(&headers), "/cases/case-5?notice=comment-closed");

        let (_, headers, _) = post_form(&app, "/cases/case-1/comments", "content=+++", false).await;
        assert_eq!(location(&headers), "/cases/case-1?notice=comment-empty");
    }

    #[tokio::test]
    async fn status_changes_need_an_account_manager() {
        let app = test_app();
        let (status, _, _) = post_form(&app, "/cases/case-3/status", "status=in-progress", false).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        post_form(&app, "/locale", "role=account-manager&return_to=/cases", false).await;
        let (_, headers, _) =
            post_form(&app, "/cases/case-3/status", "status=in-progress", false).await;
        assert_eq!(location(&headers), "/cases/case-3?notice=status-changed");
        let (_, headers, _) = post_form(&app, "/cases/case-3/status", "status=closed", false).await;
        assert_eq!(location(&headers), "/cases/case-3?notice=status-rejected");
    }

    #[tokio::test]
    async fn json_api_filters_and_looks_up_cases() {
        let app = test_app();
        let (status, headers, text) = get(&app, "/api/cases?source=email").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        let cases: Vec<Case> = serde_json::from_str(&text).unwrap();
        assert!(!cases.is_empty());
        assert!(cases.iter().all(|c| c.source == Some(portal_core::CaseSource::Email)));

        let (status, _, _) = get(&app, "/api/cases/case-404").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
