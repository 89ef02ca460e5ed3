//! Axum + Askama web UI for the partner support portal.

mod cases;
pub mod config;
pub mod drafts;
mod intake;
mod pages;
mod views;

use std::sync::Arc;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use portal_locale::{LocaleCatalog, LocaleContext};
use portal_query::FilterMemo;
use portal_store::{InMemoryBackend, MockStore};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub use config::PortalConfig;
pub use drafts::DraftStore;

pub const CRATE_NAME: &str = "portal-web";

const ATTACHMENT_BODY_LIMIT: usize = 50 * 1024 * 1024;

pub struct AppState {
    pub config: PortalConfig,
    pub backend: Arc<InMemoryBackend>,
    pub locale: RwLock<LocaleContext>,
    pub drafts: RwLock<DraftStore>,
    pub memo: Mutex<FilterMemo>,
}

impl AppState {
    pub fn load(config: PortalConfig) -> anyhow::Result<Self> {
        let mut store = MockStore::load(&config.fixtures_dir)?;
        if config.rebase_fixtures {
            store.rebase_to(Utc::now());
        }
        let catalog = match &config.locales_path {
            Some(path) => LocaleCatalog::load(path)?,
            None => LocaleCatalog::builtin()?,
        };
        let locale = LocaleContext::new(Arc::new(catalog), config.default_market)
            .context("default market is not in the locale catalog")?;
        Ok(Self {
            backend: Arc::new(InMemoryBackend::new(store)),
            locale: RwLock::new(locale),
            drafts: RwLock::new(DraftStore::new(config.max_drafts, config.draft_ttl)),
            memo: Mutex::new(FilterMemo::new()),
            config,
        })
    }

    /// Copy of the current locale so no lock is held while rendering.
    pub async fn locale_snapshot(&self) -> LocaleContext {
        self.locale.read().await.clone()
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(pages::home_handler))
        .route("/cases", get(cases::cases_page_handler))
        .route("/cases/table", get(cases::cases_table_handler))
        .route(
            "/cases/new",
            get(intake::start_page_handler).post(intake::new_draft_handler),
        )
        .route("/cases/new/{draft}", get(intake::draft_page_handler))
        .route("/cases/new/{draft}/category", post(intake::category_handler))
        .route("/cases/new/{draft}/subcategory", post(intake::subcategory_handler))
        .route("/cases/new/{draft}/review", post(intake::review_handler))
        .route("/cases/new/{draft}/details", post(intake::details_handler))
        .route("/cases/new/{draft}/tried", post(intake::tried_handler))
        .route(
            "/cases/new/{draft}/attachments",
            post(intake::attachments_handler).layer(DefaultBodyLimit::max(ATTACHMENT_BODY_LIMIT)),
        )
        .route(
            "/cases/new/{draft}/attachments/{index}/remove",
            post(intake::remove_attachment_handler),
        )
        .route("/cases/new/{draft}/submit", post(intake::submit_handler))
        .route("/cases/{id}", get(cases::case_detail_handler))
        .route("/cases/{id}/sla", get(cases::sla_handler))
        .route("/cases/{id}/comments", post(cases::comment_handler))
        .route("/cases/{id}/status", post(cases::status_handler))
        .route("/search", get(pages::search_handler))
        .route("/knowledge", get(pages::knowledge_handler))
        .route("/guides", get(pages::guides_handler))
        .route("/locale", post(pages::locale_handler))
        .route("/api/cases", get(cases::api_cases_handler))
        .route("/api/cases/{id}", get(cases::api_case_handler))
        .route("/assets/static/app.css", get(pages::app_css_handler))
        .fallback(pages::not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

pub async fn serve(config: PortalConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.bind_addr, config.port);
    let state = AppState::load(config)?;
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "partner portal listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn render_html_status<T: Template>(status: StatusCode, tpl: T) -> Response {
    let mut resp = render_html(tpl);
    if resp.status() == StatusCode::OK {
        *resp.status_mut() = status;
    }
    resp
}

fn server_error(err: anyhow::Error) -> Response {
    error!(error = %format!("{err:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}

/// Requests issued by htmx get fragments; plain form posts get whole pages.
fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("hx-request")
}

fn with_hx_trigger(mut resp: Response, event: &'static str) -> Response {
    resp.headers_mut().insert(
        header::HeaderName::from_static("hx-trigger"),
        HeaderValue::from_static(event),
    );
    resp
}

/// `path?k=v&...`, skipping empty values.
fn href_with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    let query = pairs
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::path::{Path, PathBuf};
    use tower::ServiceExt;

    pub fn workspace_root() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .canonicalize()
            .unwrap()
    }

    pub fn test_app() -> Router {
        test_app_with(|_| {})
    }

    pub fn test_app_with(adjust: impl FnOnce(&mut PortalConfig)) -> Router {
        let mut config = PortalConfig::for_workspace(workspace_root());
        adjust(&mut config);
        app(AppState::load(config).unwrap())
    }

    pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, String) {
        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    pub async fn get(app: &Router, uri: &str) -> (StatusCode, HeaderMap, String) {
        send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_form(
        app: &Router,
        uri: &str,
        form: &str,
        htmx: bool,
    ) -> (StatusCode, HeaderMap, String) {
        let mut req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if htmx {
            req = req.header("hx-request", "true");
        }
        send(app, req.body(Body::from(form.to_string())).unwrap()).await
    }

    pub fn location(headers: &HeaderMap) -> String {
        headers[header::LOCATION].to_str().unwrap().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::{app, header, href_with_query, AppState, PortalConfig, StatusCode};

    #[test]
    fn query_hrefs_encode_values_and_skip_blanks() {
        assert_eq!(href_with_query("/cases", &[("q", ""), ("status", "")]), "/cases");
        assert_eq!(
            href_with_query("/cases", &[("q", "gate b&c"), ("status", "open")]),
            "/cases?q=gate%20b%26c&status=open"
        );
    }

    #[tokio::test]
    async fn handler_smoke_get_index() {
        let app = test_app();
        let (status, _, text) = get(&app, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(text.contains("Jamie Smith"));
        assert!(text.contains("Open Cases"));
    }

    #[tokio::test]
    async fn unknown_path_renders_not_found_page() {
        let app = test_app();
        let (status, _, text) = get(&app, "/no/such/page").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(text.contains("Page not found"));
    }

    #[tokio::test]
    async fn serves_stylesheet() {
        let app = test_app();
        let (status, headers, _) = get(&app, "/assets/static/app.css").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/css; charset=utf-8");
    }

    #[tokio::test]
    async fn missing_stylesheet_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PortalConfig::for_workspace(dir.path());
        config.fixtures_dir = workspace_root().join("fixtures");
        let app = app(AppState::load(config).unwrap());
        let (status, _, _) = get(&app, "/assets/static/app.css").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn missing_fixtures_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppState::load(PortalConfig::for_workspace(dir.path())).err().unwrap();
        assert!(format!("{err:#}").contains("reading fixture"));
    }
}
