use crate::client::{CatalogClient, ClientConfig, SourceError};
use crate::view::PagePayload;
use crate::{Catalog, PageView, ViewConfig, ViewState};
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use parking_lot::RwLock;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info};

type SharedState = Arc<AppState>;
const TAILWIND_TAG: &str = r#"<script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>"#;

/// Progress of the startup catalog load.
#[derive(Debug, Clone)]
pub enum LoadState {
    Loading,
    Ready(Arc<Catalog>),
    Failed(String),
}

pub struct AppState {
    pub load: RwLock<LoadState>,
    pub view: ViewConfig,
    pub base_url: String,
}

impl AppState {
    fn snapshot(&self) -> LoadState {
        self.load.read().clone()
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub base_url: String,
    pub client: ClientConfig,
    pub view: ViewConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_url: "http://127.0.0.1:8080".to_string(),
            client: ClientConfig::default(),
            view: ViewConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Client(SourceError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Client(err) => write!(f, "client setup failed: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<SourceError> for WebError {
    fn from(value: SourceError) -> Self {
        WebError::Client(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        load: RwLock::new(LoadState::Loading),
        view: config.view,
        base_url: config.base_url.clone(),
    });
    let client = CatalogClient::from_config(&config.client)?;
    let loader = tokio::spawn(load_into(client, Arc::clone(&state)));

    let router = build_router(state);
    info!(
        %config.addr,
        upstream = %config.client.base_url,
        base = %config.base_url,
        per_page = config.view.items_per_page,
        "Binding HTTP listener"
    );
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    // Drops any detail requests still in flight.
    loader.abort();
    info!("HTTP server exited");
    Ok(())
}

async fn load_into(client: CatalogClient, state: SharedState) {
    let next = match client.load_catalog().await {
        Ok(catalog) => {
            info!(entities = catalog.entities().len(), "catalog ready");
            LoadState::Ready(Arc::new(catalog))
        }
        Err(err) => {
            error!(error = %err, "catalog load failed");
            LoadState::Failed(err.user_message().to_string())
        }
    };
    *state.load.write() = next;
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(catalog_html))
        .route("/api/view", get(api_view))
        .route("/api/tags", get(api_tags))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    let catalog = match state.snapshot() {
        LoadState::Loading => "loading",
        LoadState::Ready(_) => "ready",
        LoadState::Failed(_) => "failed",
    };
    Json(json!({ "status": "ok", "service": "pokedex-web", "catalog": catalog }))
}

#[derive(Debug, Default, Deserialize)]
struct ViewParams {
    q: Option<String>,
    tag: Option<String>,
    page: Option<usize>,
}

/// Search input arrives already debounced by the page script.
fn state_from_params(params: &ViewParams, config: &ViewConfig, catalog: &Catalog) -> ViewState {
    let term = params.q.as_deref().unwrap_or_default().trim();
    let state = ViewState::from_config(config)
        .set_search_term(term)
        .set_debounced_term(term)
        .set_tag(params.tag.clone().unwrap_or_default());
    let total = catalog.view(&state).total_pages;
    state.go_to_page(params.page.unwrap_or(1), total)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ViewResponsePayload {
    #[serde(flatten)]
    view: PagePayload,
    warning: Option<String>,
}

async fn api_view(
    State(state): State<SharedState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<ViewResponsePayload>, ApiError> {
    let catalog = ready_catalog(&state)?;
    let view_state = state_from_params(&params, &state.view, &catalog);
    let view = catalog.view(&view_state);
    Ok(Json(ViewResponsePayload {
        view: view.to_payload(),
        warning: catalog.tag_warning().map(str::to_string),
    }))
}

async fn api_tags(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let catalog = ready_catalog(&state)?;
    match catalog.tags() {
        Some(tags) => Ok(Json(json!({ "tags": tags }))),
        None => Err(ApiError::bad_gateway(
            catalog.tag_warning().unwrap_or("Failed to fetch Pokémon types"),
        )),
    }
}

fn ready_catalog(state: &AppState) -> Result<Arc<Catalog>, ApiError> {
    match state.snapshot() {
        LoadState::Ready(catalog) => Ok(catalog),
        LoadState::Loading => Err(ApiError::unavailable("Catalog is still loading")),
        LoadState::Failed(message) => Err(ApiError::bad_gateway(message)),
    }
}

async fn catalog_html(
    State(state): State<SharedState>,
    Query(params): Query<ViewParams>,
) -> impl IntoResponse {
    let catalog = match state.snapshot() {
        LoadState::Ready(catalog) => catalog,
        LoadState::Loading => return Html(render_loading_page()),
        LoadState::Failed(message) => return Html(render_error_page(&message)),
    };
    let view_state = state_from_params(&params, &state.view, &catalog);
    let view = catalog.view(&view_state);
    let template = CatalogTemplate::new(&catalog, &view_state, &view, &state);
    Html(
        template
            .render()
            .unwrap_or_else(|err| render_error_page(&err.to_string())),
    )
}

struct CardBlock {
    name: String,
    alt: String,
    image_url: String,
    has_image: bool,
    tag_line: String,
}

struct TagOption {
    value: String,
    selected: bool,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Pokémon Explorer</title>
    {{ tailwind_tag|safe }}
    <link rel="canonical" href="{{ base_url }}/">
  </head>
  <body class="bg-slate-50 text-slate-900">
    <div class="container mx-auto p-6">
      <h1 class="text-4xl font-bold text-center mb-6">Pokémon Explorer</h1>

      {% if has_warning %}
      <p class="text-center text-amber-600 font-semibold mb-4">{{ tag_warning }}</p>
      {% endif %}

      <form method="get" action="/" class="flex justify-between" id="filters">
        <input
          id="search"
          type="text"
          name="q"
          value="{{ search_term }}"
          placeholder="Search Pokémon..."
          autocomplete="off"
          class="border border-gray-400 p-2 w-5/12 mb-4 rounded-lg"
        />
        <select
          name="tag"
          class="border border-gray-400 p-2 mb-6 rounded-lg w-5/12"
          onchange="this.form.submit()"
          {% if !tags_enabled %}disabled{% endif %}
        >
          <option value="">All Types</option>
          {% for tag in tag_options %}
          <option value="{{ tag.value }}"{% if tag.selected %} selected{% endif %}>{{ tag.value }}</option>
          {% endfor %}
        </select>
      </form>

      <div class="grid grid-cols-2 md:grid-cols-4 lg:grid-cols-6 gap-6">
        {% for card in cards %}
        <div class="border p-4 rounded-lg shadow-md bg-white text-center transition transform hover:scale-105">
          {% if card.has_image %}
          <img src="{{ card.image_url }}" alt="{{ card.alt }}" class="mx-auto mb-2 w-24 h-24" />
          {% endif %}
          <h2 class="text-lg font-bold">{{ card.name }}</h2>
          <p class="text-sm text-gray-500">{{ card.tag_line }}</p>
        </div>
        {% endfor %}
      </div>

      {% if no_results %}
      <p class="text-center text-gray-500 mt-4">No Pokémon found.</p>
      {% endif %}

      <nav aria-label="Pagination" class="flex items-center justify-between border-t border-gray-200 bg-white px-4 py-3 sm:px-6 mt-6">
        <div class="hidden sm:block">
          <p class="text-sm text-gray-700">
            Page <span class="font-medium">{{ current_page }}</span> of
            <span class="font-medium">{{ total_pages }}</span>
          </p>
        </div>
        <div class="flex flex-1 justify-between sm:justify-end">
          {% if has_previous %}
          <a href="{{ previous_href|safe }}" class="relative inline-flex items-center rounded-md px-3 py-2 text-sm font-semibold bg-white text-gray-900 ring-1 ring-inset ring-gray-300 hover:bg-gray-50">Previous</a>
          {% else %}
          <button disabled class="relative inline-flex items-center rounded-md px-3 py-2 text-sm font-semibold bg-gray-200 text-gray-400 ring-1 ring-inset ring-gray-300">Previous</button>
          {% endif %}
          {% if has_next %}
          <a href="{{ next_href|safe }}" class="relative ml-3 inline-flex items-center rounded-md px-3 py-2 text-sm font-semibold bg-white text-gray-900 ring-1 ring-inset ring-gray-300 hover:bg-gray-50">Next</a>
          {% else %}
          <button disabled class="relative ml-3 inline-flex items-center rounded-md px-3 py-2 text-sm font-semibold bg-gray-200 text-gray-400 ring-1 ring-inset ring-gray-300">Next</button>
          {% endif %}
        </div>
      </nav>
    </div>
    <script>
      (function () {
        var input = document.getElementById("search");
        var timer = null;
        input.addEventListener("input", function () {
          clearTimeout(timer);
          timer = setTimeout(function () { input.form.submit(); }, {{ debounce_ms }});
        });
        window.addEventListener("pagehide", function () { clearTimeout(timer); });
        if (input.value) {
          input.focus();
          input.setSelectionRange(input.value.length, input.value.length);
        }
      })();
    </script>
  </body>
</html>"#,
    ext = "html"
)]
struct CatalogTemplate<'a> {
    tailwind_tag: &'static str,
    base_url: &'a str,
    search_term: &'a str,
    has_warning: bool,
    tag_warning: &'a str,
    tags_enabled: bool,
    tag_options: Vec<TagOption>,
    cards: Vec<CardBlock>,
    no_results: bool,
    current_page: usize,
    total_pages: usize,
    has_previous: bool,
    previous_href: String,
    has_next: bool,
    next_href: String,
    debounce_ms: u128,
}

impl<'a> CatalogTemplate<'a> {
    fn new(
        catalog: &'a Catalog,
        view_state: &'a ViewState,
        view: &PageView<'_>,
        state: &'a AppState,
    ) -> Self {
        let selected = view.tag.as_deref();
        let tag_options = catalog
            .tags()
            .unwrap_or_default()
            .iter()
            .map(|tag| TagOption {
                value: tag.clone(),
                selected: selected == Some(tag.as_str()),
            })
            .collect();
        let cards = view
            .items
            .iter()
            .map(|entity| CardBlock {
                name: entity.display_name(),
                alt: entity.name().to_string(),
                image_url: entity.image_url().unwrap_or_default().to_string(),
                has_image: entity.image_url().is_some(),
                tag_line: entity.tag_line(),
            })
            .collect();
        let page_href = |page: usize| view_href(&view.query, selected, page);
        Self {
            tailwind_tag: TAILWIND_TAG,
            base_url: &state.base_url,
            search_term: view_state.search_term(),
            has_warning: catalog.tag_warning().is_some(),
            tag_warning: catalog.tag_warning().unwrap_or_default(),
            tags_enabled: catalog.tags().is_some(),
            tag_options,
            cards,
            no_results: view.is_empty(),
            current_page: view.current_page,
            total_pages: view.total_pages,
            has_previous: view.has_previous,
            previous_href: page_href(view.current_page.saturating_sub(1).max(1)),
            has_next: view.has_next,
            next_href: page_href(view.current_page + 1),
            debounce_ms: state.view.debounce.as_millis(),
        }
    }
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

fn view_href(term: &str, tag: Option<&str>, page: usize) -> String {
    let mut href = format!("/?page={page}");
    if !term.is_empty() {
        href.push_str(&format!("&q={}", encode_component(term)));
    }
    if let Some(tag) = tag {
        href.push_str(&format!("&tag={}", encode_component(tag)));
    }
    href
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <meta http-equiv="refresh" content="1" />
    <title>Pokémon Explorer</title>
    {{ tailwind_tag|safe }}
  </head>
  <body class="bg-slate-50 text-slate-900">
    <p class="text-center text-xl font-bold">Loading...</p>
  </body>
</html>"#,
    ext = "html"
)]
struct LoadingTemplate {
    tailwind_tag: &'static str,
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Pokémon Explorer • Error</title>
    {{ tailwind_tag|safe }}
  </head>
  <body class="bg-slate-50 text-slate-900">
    <p class="text-center text-red-500 font-bold">{{ message }}</p>
  </body>
</html>"#,
    ext = "html"
)]
struct ErrorTemplate<'a> {
    tailwind_tag: &'static str,
    message: &'a str,
}

fn render_loading_page() -> String {
    LoadingTemplate {
        tailwind_tag: TAILWIND_TAG,
    }
    .render()
    .unwrap_or_else(|err| {
        error!(error = %err, "loading page render failed");
        "Loading...".to_string()
    })
}

fn render_error_page(message: &str) -> String {
    ErrorTemplate {
        tailwind_tag: TAILWIND_TAG,
        message,
    }
    .render()
    .unwrap_or_else(|err| {
        error!(error = %err, "error page render failed");
        "Internal error".to_string()
    })
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use crate::{EntityDetail, TagVocabulary};
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn fixture(tags: TagVocabulary) -> Catalog {
        Catalog::from_parts(
            vec![
                EntityDetail::new(
                    "pikachu",
                    Some("https://img/25.png".to_string()),
                    ["electric"],
                ),
                EntityDetail::new("bulbasaur", None, ["grass", "poison"]),
                EntityDetail::new("ivysaur", None, ["grass", "poison"]),
            ],
            tags,
        )
    }

    fn test_router(load: LoadState, per_page: usize) -> Router {
        let state = Arc::new(AppState {
            load: RwLock::new(load),
            view: ViewConfig {
                items_per_page: per_page,
                ..ViewConfig::default()
            },
            base_url: "http://127.0.0.1:8080".to_string(),
        });
        build_router(state)
    }

    fn ready(per_page: usize) -> Router {
        let tags = TagVocabulary::Available(vec![
            "electric".to_string(),
            "grass".to_string(),
            "poison".to_string(),
        ]);
        test_router(LoadState::Ready(Arc::new(fixture(tags))), per_page)
    }

    async fn get_text(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn api_view_filters_by_search() {
        let (status, body) = get_text(ready(12), "/api/view?q=PIKA").await;
        assert!(status.is_success());
        let payload: ViewResponsePayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.view.filtered_count, 1);
        assert_eq!(payload.view.results[0].name(), "pikachu");
        assert!(payload.warning.is_none());
    }

    #[tokio::test]
    async fn api_view_pages_and_clamps() {
        let (_, body) = get_text(ready(1), "/api/view?tag=poison&page=9").await;
        let payload: ViewResponsePayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.view.total_pages, 2);
        assert_eq!(payload.view.page, 2);
        assert_eq!(payload.view.results[0].name(), "ivysaur");
        assert!(!payload.view.has_next);
        assert!(payload.view.has_previous);
    }

    #[tokio::test]
    async fn api_view_while_loading_is_unavailable() {
        let (status, body) = get_text(test_router(LoadState::Loading, 12), "/api/view").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("still loading"));
    }

    #[tokio::test]
    async fn api_tags_lists_vocabulary() {
        let (status, body) = get_text(ready(12), "/api/tags").await;
        assert!(status.is_success());
        assert!(body.contains("\"poison\""));
    }

    #[tokio::test]
    async fn page_renders_cards_and_pagination() {
        let (status, html) = get_text(ready(2), "/").await;
        assert!(status.is_success());
        assert!(html.contains("Pokémon Explorer"));
        assert!(html.contains("<h2 class=\"text-lg font-bold\">Pikachu</h2>"));
        assert!(html.contains("grass, poison"));
        assert!(html.contains("<option value=\"\">All Types</option>"));
        assert!(html.contains("href=\"/?page=2\""));
        assert!(html.contains("<button disabled class=\"relative inline-flex"));
        assert!(!html.contains("No Pokémon found."));
    }

    #[tokio::test]
    async fn page_shows_no_results() {
        let (_, html) = get_text(ready(12), "/?q=mewtwo").await;
        assert!(html.contains("No Pokémon found."));
        assert!(!html.contains(">Next</a>"));
        assert!(!html.contains(">Previous</a>"));
    }

    #[tokio::test]
    async fn page_shows_loading_then_error() {
        let (_, html) = get_text(test_router(LoadState::Loading, 12), "/").await;
        assert!(html.contains("Loading..."));
        let failed = LoadState::Failed("Failed to fetch Pokémon data".to_string());
        let (_, html) = get_text(test_router(failed, 12), "/").await;
        assert!(html.contains("Failed to fetch Pokémon data"));
        assert!(!html.contains("All Types"));
    }

    #[tokio::test]
    async fn tag_failure_keeps_entities_visible() {
        let catalog = fixture(TagVocabulary::Unavailable(
            "Failed to fetch Pokémon types".to_string(),
        ));
        let router = test_router(LoadState::Ready(Arc::new(catalog)), 12);
        let (_, html) = get_text(router.clone(), "/?tag=poison").await;
        assert!(html.contains("Failed to fetch Pokémon types"));
        assert!(html.contains("Pikachu"));
        assert!(html.contains("disabled"));
        let (status, _) = get_text(router, "/api/tags").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn dropped_tag_is_not_reported_or_linked() {
        let catalog = fixture(TagVocabulary::Unavailable(
            "Failed to fetch Pokémon types".to_string(),
        ));
        let router = test_router(LoadState::Ready(Arc::new(catalog)), 2);
        let (_, body) = get_text(router.clone(), "/api/view?tag=poison").await;
        let payload: ViewResponsePayload = serde_json::from_str(&body).unwrap();
        assert_eq!(payload.view.tag, None);
        assert_eq!(payload.view.filtered_count, 3);
        assert_eq!(
            payload.warning.as_deref(),
            Some("Failed to fetch Pokémon types")
        );

        let (_, html) = get_text(router, "/?tag=poison").await;
        assert!(html.contains("href=\"/?page=2\""));
        assert!(!html.contains("tag=poison"));
    }

    #[tokio::test]
    async fn error_page_escapes_message() {
        let failed = LoadState::Failed("<b>upstream</b> & co".to_string());
        let (_, html) = get_text(test_router(failed, 12), "/").await;
        assert!(html.contains("&lt;b&gt;upstream"));
        assert!(html.contains("&amp; co"));
        assert!(!html.contains("<b>upstream"));
        assert!(html.contains(TAILWIND_TAG));
    }

    #[tokio::test]
    async fn pages_share_stylesheet_tag() {
        let (_, html) = get_text(ready(12), "/").await;
        assert_eq!(html.matches(TAILWIND_TAG).count(), 1);
        let (_, html) = get_text(test_router(LoadState::Loading, 12), "/").await;
        assert!(html.contains(TAILWIND_TAG));
    }

    #[tokio::test]
    async fn health_reports_catalog_state() {
        let (_, body) = get_text(ready(12), "/healthz").await;
        assert!(body.contains("\"catalog\":\"ready\""));
    }

    #[test]
    fn view_href_encodes_components() {
        assert_eq!(view_href("", None, 1), "/?page=1");
        assert_eq!(
            view_href("mr mime", Some("psychic"), 3),
            "/?page=3&q=mr%20mime&tag=psychic"
        );
    }
}
