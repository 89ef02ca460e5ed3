use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use askama::Template;
use axum::{
    extract::{Multipart, Path as AxumPath, State},
    http::{header::HeaderName, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use portal_core::{AttachmentMeta, RequestCategory, UnknownVariant, Urgency, TRIED_SOLUTION_OPTIONS};
use portal_intake::{
    ArticlesGate, IntakeError, IntakeForm, MAX_ATTACHMENTS, MAX_DESCRIPTION_CHARS,
    MIN_DESCRIPTION_CHARS,
};
use portal_locale::LocaleContext;
use portal_store::{CaseBackend, MockStore};
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::pages::not_found_page;
use crate::views::{human_size, ArticleView, Choice, Layout, Notice};
use crate::{href_with_query, is_htmx, render_html, render_html_status, server_error, AppState};

const TRIED_FIELD_PREFIX: &str = "tried.";

#[derive(Debug, Clone)]
struct SolutionChoice {
    field: String,
    label: &'static str,
    checked: bool,
}

#[derive(Debug, Clone)]
struct AttachmentRow {
    index: usize,
    name: String,
    size: String,
}

/// Everything the new-case form renders, derived from one draft.
#[derive(Debug, Clone)]
struct IntakeView {
    draft_id: String,
    categories: Vec<Choice>,
    category_selected: bool,
    sub_categories: Vec<Choice>,
    sub_category_selected: bool,
    show_review: bool,
    reviewed: bool,
    articles: Vec<ArticleView>,
    details_enabled: bool,
    event_id: String,
    venue_partner_id: String,
    markets: Vec<Choice>,
    urgencies: Vec<Choice>,
    escalation: Option<String>,
    description: String,
    description_chars: usize,
    max_description: usize,
    min_description: usize,
    solutions: Vec<SolutionChoice>,
    other_enabled: bool,
    other_solution: String,
    attachments: Vec<AttachmentRow>,
    slots_left: usize,
    max_attachments: usize,
    missing: Vec<&'static str>,
    submittable: bool,
    submit_label: String,
    notice: Option<Notice>,
}

impl IntakeView {
    fn build(
        id: Uuid,
        form: &IntakeForm,
        store: &MockStore,
        locale: &LocaleContext,
        notice: Option<Notice>,
    ) -> Self {
        let category = form.category();
        let current_category = category.map(RequestCategory::as_str).unwrap_or_default();
        let current_sub = form.sub_category().unwrap_or_default();
        let current_urgency = form.urgency().map(Urgency::as_str).unwrap_or_default();
        Self {
            draft_id: id.to_string(),
            categories: RequestCategory::ALL
                .into_iter()
                .map(|c| Choice::new(c.as_str(), c.label(), current_category))
                .collect(),
            category_selected: category.is_some(),
            sub_categories: category
                .map(|c| {
                    c.sub_categories()
                        .iter()
                        .map(|o| Choice::new(o.value, o.label, current_sub))
                        .collect()
                })
                .unwrap_or_default(),
            sub_category_selected: form.sub_category().is_some(),
            show_review: form.sub_category().is_some() && form.gate() != ArticlesGate::NoGateNeeded,
            reviewed: form.articles_reviewed(),
            articles: form
                .recommended_article_ids()
                .iter()
                .filter_map(|id| store.article(id))
                .map(ArticleView::build)
                .collect(),
            details_enabled: form.detail_entry_enabled(),
            event_id: form.event_id().to_string(),
            venue_partner_id: form.venue_partner_id().to_string(),
            markets: locale
                .catalog()
                .markets()
                .iter()
                .map(|m| {
                    Choice::new(
                        m.market.as_str().to_ascii_lowercase(),
                        format!("{} {}", m.flag, m.label),
                        form.market(),
                    )
                })
                .collect(),
            urgencies: Urgency::ALL
                .into_iter()
                .map(|u| Choice::new(u.as_str(), u.option_label(), current_urgency))
                .collect(),
            escalation: form.escalation_notice(),
            description: form.description().to_string(),
            description_chars: form.description_chars(),
            max_description: MAX_DESCRIPTION_CHARS,
            min_description: MIN_DESCRIPTION_CHARS,
            solutions: TRIED_SOLUTION_OPTIONS
                .iter()
                .map(|o| SolutionChoice {
                    field: format!("{TRIED_FIELD_PREFIX}{}", o.value),
                    label: o.label,
                    checked: form.is_tried(o.value),
                })
                .collect(),
            other_enabled: form.other_solution_enabled(),
            other_solution: form.other_solution().to_string(),
            attachments: form
                .attachments()
                .iter()
                .enumerate()
                .map(|(index, a)| AttachmentRow {
                    index,
                    name: a.name.clone(),
                    size: human_size(a.size),
                })
                .collect(),
            slots_left: MAX_ATTACHMENTS.saturating_sub(form.attachments().len()),
            max_attachments: MAX_ATTACHMENTS,
            missing: form
                .missing_requirements()
                .into_iter()
                .map(|r| r.label())
                .collect(),
            submittable: form.is_submittable(),
            submit_label: locale.t("submitRequest"),
            notice,
        }
    }
}

#[derive(Template)]
#[template(path = "intake.html")]
struct IntakeTemplate {
    layout: Layout,
    form: IntakeView,
}

#[derive(Template)]
#[template(path = "intake_form_partial.html")]
struct IntakeFormPartialTemplate {
    form: IntakeView,
}

/// A rejected step. Warnings leave the form usable and are not reported as errors.
#[derive(Debug)]
struct StepFailure {
    message: String,
    warning: bool,
}

impl From<IntakeError> for StepFailure {
    fn from(err: IntakeError) -> Self {
        Self {
            warning: err.is_warning(),
            message: err.to_string(),
        }
    }
}

impl From<UnknownVariant> for StepFailure {
    fn from(err: UnknownVariant) -> Self {
        Self {
            message: err.to_string(),
            warning: false,
        }
    }
}

impl StepFailure {
    fn status(&self) -> StatusCode {
        if self.warning {
            StatusCode::OK
        } else {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    }

    fn notice(self) -> Notice {
        if self.warning {
            Notice::warning(self.message)
        } else {
            Notice::error(self.message)
        }
    }
}

/// Renders a draft as a fragment for htmx or as the whole page otherwise.
async fn render_draft(
    state: &AppState,
    headers: &HeaderMap,
    id: Uuid,
    form: &IntakeForm,
    store: &MockStore,
    outcome: Result<(), StepFailure>,
) -> Response {
    let (status, notice) = match outcome {
        Ok(()) => (StatusCode::OK, None),
        Err(failure) => (failure.status(), Some(failure.notice())),
    };
    let locale = state.locale_snapshot().await;
    let view = IntakeView::build(id, form, store, &locale, notice);
    if is_htmx(headers) {
        return render_html_status(status, IntakeFormPartialTemplate { form: view });
    }
    let layout = Layout::build(
        &locale,
        store.current_user(),
        locale.t("newCase"),
        "/cases/new",
        format!("/cases/new/{id}"),
    );
    render_html_status(status, IntakeTemplate { layout, form: view })
}

async fn draft_not_found(state: &AppState) -> Response {
    not_found_page(state, "That case draft no longer exists. Start a new case.".to_string()).await
}

/// Applies one step to a draft and re-renders it.
async fn apply_step<F>(state: &AppState, headers: &HeaderMap, raw_id: &str, step: F) -> Response
where
    F: FnOnce(&mut IntakeForm, &MockStore) -> Result<(), StepFailure>,
{
    let Ok(id) = Uuid::parse_str(raw_id) else {
        return draft_not_found(state).await;
    };
    let store = state.backend.read().await;
    let mut drafts = state.drafts.write().await;
    let Some(form) = drafts.get_mut(&id, Instant::now()) else {
        drop(drafts);
        drop(store);
        return draft_not_found(state).await;
    };
    let outcome = step(form, &*store);
    if let Err(failure) = &outcome {
        debug!(draft = %id, error = %failure.message, "intake step rejected");
    }
    let form = form.clone();
    drop(drafts);
    render_draft(state, headers, id, &form, &store, outcome).await
}

#[derive(Template)]
#[template(path = "intake_start.html")]
struct IntakeStartTemplate {
    layout: Layout,
}

/// Landing page for `/cases/new`; the draft itself is only created on POST.
pub(crate) async fn start_page_handler(State(state): State<Arc<AppState>>) -> Response {
    let locale = state.locale_snapshot().await;
    let store = state.backend.read().await;
    let layout = Layout::build(
        &locale,
        store.current_user(),
        locale.t("newCase"),
        "/cases/new",
        "/cases/new",
    );
    render_html(IntakeStartTemplate { layout })
}

pub(crate) async fn new_draft_handler(State(state): State<Arc<AppState>>) -> Response {
    let market = state.locale.read().await.market().as_str().to_string();
    let id = {
        let mut drafts = state.drafts.write().await;
        let id = drafts.insert(IntakeForm::new(&market), Instant::now());
        info!(draft = %id, open_drafts = drafts.len(), "started new case draft");
        id
    };
    Redirect::to(&format!("/cases/new/{id}")).into_response()
}

pub(crate) async fn draft_page_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
) -> Response {
    apply_step(&state, &headers, &draft, |_, _| Ok(())).await
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryForm {
    #[serde(default)]
    category: String,
}

pub(crate) async fn category_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
    Form(input): Form<CategoryForm>,
) -> Response {
    apply_step(&state, &headers, &draft, |form, store| {
        let category: RequestCategory = input.category.parse()?;
        form.select_category(category, store.recommended_article_ids(category))?;
        Ok(())
    })
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubCategoryForm {
    #[serde(default)]
    sub_category: String,
}

pub(crate) async fn subcategory_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
    Form(input): Form<SubCategoryForm>,
) -> Response {
    apply_step(&state, &headers, &draft, |form, _| {
        Ok(form.select_sub_category(&input.sub_category)?)
    })
    .await
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReviewForm {
    #[serde(default)]
    reviewed: Option<String>,
}

pub(crate) async fn review_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
    Form(input): Form<ReviewForm>,
) -> Response {
    apply_step(&state, &headers, &draft, |form, _| {
        Ok(form.acknowledge_articles(input.reviewed.is_some())?)
    })
    .await
}

/// Detail fields that are absent from the post are left alone.
#[derive(Debug, Deserialize)]
pub(crate) struct DetailsForm {
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    venue_partner_id: Option<String>,
    #[serde(default)]
    market: Option<String>,
    #[serde(default)]
    urgency: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

pub(crate) async fn details_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
    Form(input): Form<DetailsForm>,
) -> Response {
    apply_step(&state, &headers, &draft, |form, _| {
        let urgency = match input.urgency.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<Urgency>()?),
        };
        if let Some(event_id) = &input.event_id {
            form.set_event_id(event_id)?;
        }
        if let Some(partner) = &input.venue_partner_id {
            form.set_venue_partner_id(partner)?;
        }
        if let Some(market) = &input.market {
            form.set_market(market)?;
        }
        if let Some(urgency) = urgency {
            form.set_urgency(urgency)?;
        }
        if let Some(description) = &input.description {
            form.set_description(description)?;
        }
        Ok(())
    })
    .await
}

pub(crate) async fn tried_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
    Form(input): Form<HashMap<String, String>>,
) -> Response {
    apply_step(&state, &headers, &draft, |form, _| {
        let selected = input
            .keys()
            .filter_map(|key| key.strip_prefix(TRIED_FIELD_PREFIX));
        form.set_tried_solutions(selected)?;
        if let Some(text) = input.get("other_solution") {
            form.set_other_solution(text)?;
        }
        Ok(())
    })
    .await
}

pub(crate) async fn attachments_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
    mut multipart: Multipart,
) -> Response {
    let mut batch = Vec::new();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(err) => {
                warn!(error = %err, "unreadable attachment upload");
                return err.into_response();
            }
        };
        let Some(name) = field.file_name().map(str::to_string).filter(|n| !n.is_empty()) else {
            continue;
        };
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let size = match field.bytes().await {
            Ok(bytes) => bytes.len() as u64,
            Err(err) => return err.into_response(),
        };
        batch.push(AttachmentMeta {
            name,
            size,
            content_type,
        });
    }
    apply_step(&state, &headers, &draft, |form, _| {
        form.add_attachments(batch)?;
        Ok(())
    })
    .await
}

pub(crate) async fn remove_attachment_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((draft, index)): AxumPath<(String, usize)>,
) -> Response {
    apply_step(&state, &headers, &draft, |form, _| {
        form.remove_attachment(index)?;
        Ok(())
    })
    .await
}

pub(crate) async fn submit_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(draft): AxumPath<String>,
) -> Response {
    let Ok(id) = Uuid::parse_str(&draft) else {
        return draft_not_found(&state).await;
    };
    let submitted = {
        let mut drafts = state.drafts.write().await;
        match drafts.get_mut(&id, Instant::now()) {
            Some(form) => Some((form.submit(), form.clone())),
            None => None,
        }
    };
    let Some((outcome, form)) = submitted else {
        return draft_not_found(&state).await;
    };
    let submission = match outcome {
        Ok(submission) => submission,
        Err(err) => {
            let store = state.backend.read().await;
            return render_draft(&state, &headers, id, &form, &store, Err(err.into())).await;
        }
    };
    let receipt = match state.backend.submit_case(submission, Utc::now()).await {
        Ok(receipt) => receipt,
        Err(err) => return server_error(err.into()),
    };
    state.drafts.write().await.remove(&id);
    let target = href_with_query(
        "/cases",
        &[("notice", "submitted"), ("case", &receipt.case_number)],
    );
    if is_htmx(&headers) {
        let mut resp = StatusCode::OK.into_response();
        match HeaderValue::from_str(&target) {
            Ok(value) => {
                resp.headers_mut()
                    .insert(HeaderName::from_static("hx-redirect"), value);
            }
            Err(err) => return server_error(err.into()),
        }
        return resp;
    }
    Redirect::to(&target).into_response()
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;

    async fn start_draft(app: &Router) -> String {
        let (status, headers, _) = post_form(app, "/cases/new", "", false).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        location(&headers)
    }

    const LONG_DESCRIPTION: &str = "Scanners at the north gate reject every mobile ticket.";

    #[tokio::test]
    async fn new_case_redirects_to_a_fresh_draft() {
        let app = test_app();
        let draft = start_draft(&app).await;
        assert!(draft.starts_with("/cases/new/"));
        let (status, _, text) = get(&app, &draft).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("value=\"event-day\""));
    }

    #[tokio::test]
    async fn viewing_the_start_page_creates_no_draft() {
        let app = test_app_with(|config| config.max_drafts = 1);
        let draft = start_draft(&app).await;
        for _ in 0..5 {
            let (status, _, text) = get(&app, "/cases/new").await;
            assert_eq!(status, StatusCode::OK);
            assert!(text.contains("action=\"/cases/new\""));
        }
        let (status, _, _) = get(&app, &draft).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn oldest_draft_is_evicted_at_capacity() {
        let app = test_app_with(|config| config.max_drafts = 2);
        let first = start_draft(&app).await;
        let second = start_draft(&app).await;
        get(&app, &first).await;
        let third = start_draft(&app).await;

        let (status, _, _) = get(&app, &second).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        for draft in [&first, &third] {
            let (status, _, _) = get(&app, draft).await;
            assert_eq!(status, StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn recommended_articles_gate_detail_entry() {
        let app = test_app();
        let draft = start_draft(&app).await;
        post_form(&app, &format!("{draft}/category"), "category=event-day", true).await;
        let (status, _, text) = post_form(
            &app,
            &format!("{draft}/subcategory"),
            "sub_category=scanner-sync",
            true,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("I have reviewed these articles"));

        let (status, _, text) = post_form(
            &app,
            &format!("{draft}/details"),
            "urgency=critical",
            true,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(text.contains("review the recommended articles before entering details"));

        post_form(&app, &format!("{draft}/review"), "reviewed=on", true).await;
        let form = format!("urgency=critical&description={}", LONG_DESCRIPTION.replace(' ', "+"));
        let (status, _, text) = post_form(&app, &format!("{draft}/details"), &form, true).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("escalated to the Event-Day Support queue"));
    }

    #[tokio::test]
    async fn unknown_category_is_rejected_without_changing_the_draft() {
        let app = test_app();
        let draft = start_draft(&app).await;
        let (status, _, text) =
            post_form(&app, &format!("{draft}/category"), "category=refunds", true).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(text.contains("unrecognized category"));
    }

    #[tokio::test]
    async fn sixth_attachment_is_a_warning_and_adds_nothing() {
        let app = test_app();
        let draft = start_draft(&app).await;
        post_form(&app, &format!("{draft}/category"), "category=other", true).await;
        post_form(&app, &format!("{draft}/subcategory"), "sub_category=general-inquiry", true).await;

        let boundary = "portal-upload-boundary";
        let mut body = String::new();
        for i in 0..6 {
            body.push_str(&format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; \
                 filename=\"scan-{i}.png\"\r\nContent-Type: image/png\r\n\r\nPNG{i}\r\n"
            ));
        }
        body.push_str(&format!("--{boundary}--\r\n"));
        let req = Request::builder()
            .method("POST")
            .uri(format!("{draft}/attachments"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("hx-request", "true")
            .body(Body::from(body))
            .unwrap();
        let (status, _, text) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("maximum 5 attachments allowed (0 attached, 6 selected)"));
        assert!(!text.contains("scan-0.png"));
    }

    #[tokio::test]
    async fn complete_draft_submits_and_lands_on_case_list() {
        let app = test_app();
        let draft = start_draft(&app).await;
        post_form(&app, &format!("{draft}/category"), "category=other", false).await;
        post_form(&app, &format!("{draft}/subcategory"), "sub_category=feedback", false).await;
        let form = format!("urgency=low&description={}", LONG_DESCRIPTION.replace(' ', "+"));
        post_form(&app, &format!("{draft}/details"), &form, false).await;
        post_form(
            &app,
            &format!("{draft}/tried"),
            "tried.other=on&other_solution=Rebooted+the+scanners",
            false,
        )
        .await;

        let (status, headers, _) = post_form(&app, &format!("{draft}/submit"), "", false).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let target = location(&headers);
        assert!(target.starts_with("/cases?notice=submitted&case=TM-"));
        assert!(target.ends_with("-00009"));

        let (_, _, text) = get(&app, &target).await;
        assert!(text.contains("Showing 9 cases"));
        assert!(text.contains("submitted."));

        let (status, _, _) = get(&app, &draft).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn incomplete_draft_lists_what_is_missing() {
        let app = test_app();
        let draft = start_draft(&app).await;
        let (status, _, text) = post_form(&app, &format!("{draft}/submit"), "", true).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(text.contains("still required: request category"));
    }

    #[tokio::test]
    async fn malformed_or_unknown_draft_ids_are_not_found() {
        let app = test_app();
        let (status, _, _) = get(&app, "/cases/new/not-a-uuid").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = post_form(
            &app,
            "/cases/new/00000000-0000-4000-8000-000000000000/category",
            "category=other",
            true,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
