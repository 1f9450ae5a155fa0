//! HTTP frontend: a server-rendered search page plus a JSON API.
//!
//! Every query is scored in-process over the in-memory catalog; the server
//! holds no search state beyond the catalog itself. Cards are rendered with
//! pre-render highlight markers already in place, and the page hands the
//! grid to the browser's MathJax for typesetting; the asynchronous engine
//! and debounced input surface live on that side of the interface.

use crate::app::DEBOUNCE_WINDOW;
use crate::catalog::Catalog;
use crate::dom::Document;
use crate::highlight::TokenPatterns;
use crate::render::build_cards;
use crate::search::{normalize, rank_scored};
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
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
use tracing::info;

type SharedState = Arc<AppState>;

const DEFAULT_API_LIMIT: usize = 10;
const MAX_API_LIMIT: usize = 100;

pub struct AppState {
    pub catalog: Catalog,
    pub base_url: String,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub base_url: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            base_url: "http://127.0.0.1:8080".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

pub async fn serve(config: WebConfig, catalog: Catalog) -> Result<(), WebError> {
    let state = Arc::new(AppState {
        catalog,
        base_url: config.base_url.clone(),
    });
    let router = build_router(state);
    info!(%config.addr, base = %config.base_url, "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/cards", get(cards_fragment))
        .route("/api/search", get(api_search))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
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

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
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

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchHitPayload {
    title: String,
    tags: Vec<String>,
    link: String,
    score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SearchResponsePayload {
    query: String,
    tokens: Vec<String>,
    limit: usize,
    total: usize,
    results: Vec<SearchHitPayload>,
}

impl SearchResponsePayload {
    fn build(catalog: &Catalog, query: &str, limit: usize) -> Self {
        let tokens = normalize(query);
        let ranked = rank_scored(catalog.entries(), &tokens);
        let total = ranked.len();
        let results = ranked
            .into_iter()
            .take(limit)
            .map(|scored| SearchHitPayload {
                title: scored.entry.title.clone(),
                tags: scored.entry.tags.clone(),
                link: scored.entry.link.clone(),
                score: scored.score,
            })
            .collect();
        Self {
            query: query.to_string(),
            tokens,
            limit,
            total,
            results,
        }
    }
}

/// Server-side card rendering: rank, build the card tree with pre-render
/// markers, serialize. Typesetting happens in the browser afterwards.
fn render_cards_html(catalog: &Catalog, query: &str) -> (String, usize) {
    let tokens = normalize(query);
    let ranked = rank_scored(catalog.entries(), &tokens);
    let entries: Vec<_> = ranked.iter().map(|scored| scored.entry).collect();
    let patterns = TokenPatterns::compile(&tokens);
    let mut doc = Document::new();
    let root = build_cards(&mut doc, &entries, &patterns);
    (doc.to_html(root), entries.len())
}

async fn home(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let query = params.q.unwrap_or_default();
    let (cards, count) = render_cards_html(&state.catalog, &query);
    let template = HomeTemplate {
        version: env!("CARGO_PKG_VERSION"),
        query: query.clone(),
        catalog_len: state.catalog.len(),
        count,
        cards,
        api_link: format!("/api/search?q={}", encode_component(&query)),
        debounce_ms: DEBOUNCE_WINDOW.as_millis() as u64,
    };
    Html(template.render().unwrap_or_else(|err| {
        format!("<!DOCTYPE html><html><body><p>render error: {err}</p></body></html>")
    }))
}

async fn cards_fragment(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let query = params.q.unwrap_or_default();
    let (cards, _) = render_cards_html(&state.catalog, &query);
    Html(cards)
}

async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponsePayload>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_API_LIMIT);
    if limit == 0 || limit > MAX_API_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_API_LIMIT}"
        )));
    }
    let query = params.q.unwrap_or_default();
    Ok(Json(SearchResponsePayload::build(
        &state.catalog,
        &query,
        limit,
    )))
}

async fn health(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "theoremdex-web",
        "cards": state.catalog.len(),
    }))
}

fn encode_component(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Theoremdex • Search</title>
    <style>
      body { margin: 0; font-family: system-ui, sans-serif; background: #f8fafc; color: #0f172a; }
      main { max-width: 72rem; margin: 0 auto; padding: 2.5rem 1rem; }
      .eyebrow { text-transform: uppercase; letter-spacing: 0.05em; font-size: 0.8rem; color: #64748b; }
      h1 { margin: 0.25rem 0 0.5rem; font-size: 2.25rem; }
      .lede { color: #475569; margin-bottom: 1.5rem; }
      .searchbar input { width: 100%; padding: 0.75rem 1rem; font-size: 1.1rem; border: 1px solid #cbd5e1; border-radius: 0.5rem; box-sizing: border-box; }
      .meta { font-size: 0.9rem; color: #64748b; }
      .theorem-grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(20rem, 1fr)); gap: 1rem; }
      .theorem-card { background: #fff; border-radius: 0.5rem; box-shadow: 0 1px 3px rgba(15, 23, 42, 0.15); padding: 1rem 1.25rem; }
      .theorem-card.selected { outline: 2px solid #0f172a; }
      .theorem-card h3 { margin: 0 0 0.5rem; }
      .tags .tag { display: inline-block; background: #e2e8f0; border-radius: 999px; padding: 0.1rem 0.6rem; margin-right: 0.35rem; font-size: 0.8rem; }
      .read-more { display: inline-block; margin-top: 0.75rem; color: #1d4ed8; text-decoration: none; }
      mark { background: #fde68a; padding: 0 0.1em; border-radius: 0.15em; }
    </style>
    <script>
      MathJax = {
        tex: {
          inlineMath: [['$', '$'], ['\\(', '\\)']],
          displayMath: [['$$', '$$'], ['\\[', '\\]']]
        }
      };
    </script>
    <script defer src="https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-mml-chtml.js"></script>
  </head>
  <body>
    <main>
      <header>
        <p class="eyebrow">Theoremdex v{{ version }}</p>
        <h1>Theorem library</h1>
        <p class="lede">{{ catalog_len }} cards. Search by title, tag, or statement; matches are highlighted without touching the math.</p>
      </header>
      <form class="searchbar" action="/" method="get">
        <input id="searchInput" name="q" value="{{ query }}" placeholder="Search theorems…" autocomplete="off" autofocus />
      </form>
      <p class="meta"><span id="resultCount">{{ count }}</span> shown · <a href="{{ api_link }}">JSON</a></p>
      <div id="results">{{ cards|safe }}</div>
    </main>
    <script>
      (function () {
        var DEBOUNCE_MS = {{ debounce_ms }};
        var input = document.getElementById('searchInput');
        var results = document.getElementById('results');
        var counter = document.getElementById('resultCount');
        var timer = null;
        var selected = -1;

        function cards() {
          return results.querySelectorAll('.theorem-card');
        }

        function typeset() {
          if (window.MathJax && MathJax.typesetPromise) {
            MathJax.typesetPromise([results]).catch(function () {
              if (MathJax.typeset) { MathJax.typeset([results]); }
            });
          } else if (window.MathJax && MathJax.typeset) {
            MathJax.typeset([results]);
          }
        }

        function refresh() {
          fetch('/cards?q=' + encodeURIComponent(input.value))
            .then(function (response) { return response.text(); })
            .then(function (html) {
              results.innerHTML = html;
              counter.textContent = cards().length;
              selected = -1;
              typeset();
            });
        }

        function mark() {
          cards().forEach(function (card, index) {
            card.classList.toggle('selected', index === selected);
          });
        }

        function open(card) {
          var anchor = card.querySelector('.read-more');
          if (anchor) { window.open(anchor.getAttribute('href'), '_blank', 'noopener'); }
        }

        input.addEventListener('input', function () {
          clearTimeout(timer);
          timer = setTimeout(refresh, DEBOUNCE_MS);
        });

        input.addEventListener('keydown', function (event) {
          var total = cards().length;
          if (event.key === 'ArrowDown') {
            event.preventDefault();
            selected = Math.min(selected + 1, total - 1);
            mark();
          } else if (event.key === 'ArrowUp') {
            event.preventDefault();
            selected = selected <= 0 ? -1 : selected - 1;
            mark();
          } else if (event.key === 'Enter') {
            if (selected >= 0 && selected < total) {
              event.preventDefault();
              open(cards()[selected]);
            }
          }
        });

        results.addEventListener('click', function (event) {
          var card = event.target.closest('.theorem-card');
          if (card && !event.target.closest('a')) { open(card); }
        });

        typeset();
      })();
    </script>
  </body>
</html>"#,
    ext = "html"
)]
struct HomeTemplate {
    version: &'static str,
    query: String,
    catalog_len: usize,
    count: usize,
    cards: String,
    api_link: String,
    debounce_ms: u64,
}

#[cfg(all(test, feature = "web"))]
mod tests {
    use super::*;
    use axum::{body, body::Body, http::Request};
    use tower::ServiceExt;

    fn test_router() -> Router {
        let state = Arc::new(AppState {
            catalog: Catalog::embedded(),
            base_url: "http://127.0.0.1:8080".to_string(),
        });
        build_router(state)
    }

    #[tokio::test]
    async fn api_search_ranks_fermat_first() {
        let router = test_router();
        let response = router
            .oneshot(
                Request::get("/api/search?q=ferma")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: SearchResponsePayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload.query, "ferma");
        assert_eq!(payload.tokens, vec!["ferma".to_string()]);
        assert_eq!(payload.results[0].title, "Fermat's Little Theorem");
        assert!(payload.results[0].score > payload.results[1].score);
    }

    #[tokio::test]
    async fn api_search_without_query_returns_whole_catalog() {
        let router = test_router();
        let response = router
            .oneshot(
                Request::get("/api/search?limit=100")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: SearchResponsePayload = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload.total, Catalog::embedded().len());
    }

    #[tokio::test]
    async fn api_search_rejects_zero_limit() {
        let router = test_router();
        let response = router
            .oneshot(
                Request::get("/api/search?q=x&limit=0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cards_fragment_highlights_outside_math() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/cards?q=prime").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<mark>prime</mark>") || html.contains("<mark>Prime</mark>"));
        // Math notation survives untouched for the browser engine.
        assert!(html.contains("$p$"));
        assert!(!html.contains("$<mark>"));
    }

    #[tokio::test]
    async fn home_page_embeds_engine_and_input_surface() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/?q=euler").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("mathjax"));
        assert!(html.contains("searchInput"));
        assert!(html.contains("DEBOUNCE_MS = 200"));
        assert!(html.contains("theorem-grid"));
    }

    #[tokio::test]
    async fn health_reports_card_count() {
        let router = test_router();
        let response = router
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_success());
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["cards"], Catalog::embedded().len());
    }
}
