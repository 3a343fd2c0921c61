//! voxbridge server library logic.

pub mod api;
pub mod api_ws;
pub mod config;
pub mod delivery;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use config::Config;
use delivery::{ArtifactStore, Delivery};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use voxbridge_voice::SpeechService;

/// Maximum JSON request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Room for multipart boundaries and part headers around the recording.
const MULTIPART_SLACK_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Remote speech task service.
    pub speech: SpeechService,
    /// Result delivery for one-shot synthesis.
    pub delivery: Delivery,
    /// Directory of the browser client, if served.
    pub static_dir: Option<std::path::PathBuf>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            speech: SpeechService::new(config.speech.clone()),
            delivery: Delivery::new(
                config.delivery.mode,
                ArtifactStore::new(
                    config.delivery.audio_dir.clone(),
                    config.delivery.url_prefix.clone(),
                ),
            ),
            static_dir: config.server.static_dir.clone(),
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let recognize_limit = state.speech.config().max_audio_bytes + MULTIPART_SLACK_BYTES;

    let recognize_routes = Router::new()
        .route("/api/recognize", post(api::recognize_handler))
        .layer(DefaultBodyLimit::max(recognize_limit));

    let router = Router::new()
        .route("/health", get(health))
        .route("/api/synthesize", post(api::synthesize_handler))
        .route("/ws", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .merge(recognize_routes);

    // Persisted synthesis results. The directory is created on first write,
    // so the service is mounted unconditionally.
    let store = state.delivery.store();
    let prefix = store.url_prefix().trim_matches('/');
    let router = if prefix.is_empty() {
        tracing::warn!("delivery.url_prefix is empty, synthesized audio will not be served");
        router
    } else {
        tracing::info!(path = ?store.dir(), prefix = %prefix, "serving synthesized audio");
        router.nest_service(&format!("/{}", prefix), ServeDir::new(store.dir()))
    };

    let router = match &state.static_dir {
        Some(dir) if dir.join("index.html").exists() => {
            tracing::info!(path = ?dir, "serving client static files");
            router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))))
        }
        Some(dir) => {
            tracing::warn!(path = ?dir, "client directory has no index.html, skipping static file serving");
            router
        }
        None => router,
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
