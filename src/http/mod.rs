//! HTTP API server (spec §4.8): axum router bound to loopback, serving
//! the Query Engine and Facet pipeline as read-only JSON endpoints plus
//! the embedded TUI-adjacent web frontend.
//!
//! No CORS layer: the server is loopback-only and has no cross-origin
//! consumer to support (spec §4.8 binds to `127.0.0.1`, not a public
//! interface).

mod error;
mod filters;
mod handlers;

use crate::cancel::CancellationToken;
use crate::facets::FacetWorker;
use crate::query::QueryEngine;
use crate::store::NodeStore;
use anyhow::{Context, Result};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::RustEmbed;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

const READ_TIMEOUT: Duration = Duration::from_secs(5);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(RustEmbed)]
#[folder = "web/dist/"]
struct WebAssets;

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryEngine>,
    pub store: Arc<dyn NodeStore>,
    pub insights_enabled: bool,
    pub facet_worker: Option<Arc<FacetWorker>>,
}

/// Starts the HTTP API server on `bind_addr`, spawning the Facet Worker
/// as a background task when `state.insights_enabled` (spec §4.8). Runs
/// until `cancel` fires, then attempts a five-second graceful shutdown.
pub async fn start_server(
    bind_addr: SocketAddr,
    state: AppState,
    caller: Option<Arc<crate::facets::LlmCaller>>,
    cancel: CancellationToken,
) -> Result<()> {
    if let (Some(worker), Some(caller)) = (state.facet_worker.clone(), caller) {
        let store = state.store.clone();
        let query = state.query.clone();
        let worker_cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = worker.run(store, query, caller, worker_cancel).await {
                tracing::warn!(error = %e, "facet worker run failed");
            }
        });
    }

    let app = Router::new()
        .route("/api/overview", get(handlers::get_overview))
        .route("/api/analytics", get(handlers::get_analytics))
        .route(
            "/api/analytics/session/:id",
            get(handlers::get_session_analytics),
        )
        .route("/api/session/:id", get(handlers::get_session))
        .route("/api/facets", get(handlers::get_facets))
        .route(
            "/api/facets/session/:id",
            get(handlers::get_session_facet),
        )
        .route("/api/facets/status", get(handlers::get_facet_status))
        .route("/api/health", get(health))
        .route("/analytics", get(serve_index))
        .route("/session/*rest", get(serve_index))
        .fallback(get(serve_asset))
        .layer(TimeoutLayer::new(READ_TIMEOUT))
        .with_state(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .context("failed to bind HTTP API listener")?;
    tracing::info!(%bind_addr, "HTTP API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !cancel.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            tracing::info!("HTTP API shutting down, waiting up to {SHUTDOWN_TIMEOUT:?}");
        })
        .await
        .context("HTTP API server error")?;

    Ok(())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn serve_index() -> Response {
    serve_embedded("index.html")
}

async fn serve_asset(uri: axum::http::Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    if path.is_empty() {
        return serve_embedded("index.html");
    }
    serve_embedded(path)
}

fn serve_embedded(path: &str) -> Response {
    match WebAssets::get(path) {
        Some(file) => {
            let mime = guess_mime(path);
            ([(header::CONTENT_TYPE, mime)], file.data).into_response()
        }
        None if path == "index.html" => {
            (StatusCode::NOT_FOUND, Html("web frontend not embedded")).into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

fn guess_mime(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("woff2") => "font/woff2",
        _ => "application/octet-stream",
    }
}
