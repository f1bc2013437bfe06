//! HTTP surface of the orchestration layer.
//!
//! - `GET  /health`  backend reachability
//! - `POST /upload`  dataset proxy with AI insights
//! - `POST /ask-ai`  direct Gemini chat
//! - `GET  /static/*` browser client assets, when the directory exists

pub mod ask_ai;
pub mod health;
pub mod upload;

use crate::config::Config;
use crate::gemini::GeminiClient;
use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::info;

/// Per-process state shared by all handlers. Immutable after startup.
#[derive(Debug)]
pub struct AppState {
    /// Backend base URL, no trailing slash.
    pub backend_url: String,
    /// Client for upload forwarding (bounded by `upload_timeout_secs`).
    pub upload_client: reqwest::Client,
    pub upload_timeout_secs: u64,
    /// Client for the health probe (short timeout).
    pub probe_client: reqwest::Client,
    pub probe_path: String,
    /// `None` when no API key is configured.
    pub gemini: Option<GeminiClient>,
    /// Static client assets, if present on disk.
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Build state from configuration; relative paths resolve against `workdir`.
    pub fn from_config(config: &Config, workdir: &Path) -> Result<Self> {
        // The backend is local; system proxies must not intercept it.
        let upload_client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(config.backend.upload_timeout_secs))
            .build()
            .context("Failed to create backend HTTP client")?;

        let probe_client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_millis(config.backend.probe_timeout_ms))
            .build()
            .context("Failed to create health probe HTTP client")?;

        let gemini =
            GeminiClient::from_config(&config.gemini).context("Failed to create Gemini client")?;

        let static_dir = workdir.join(&config.server.static_dir);
        let static_dir = static_dir.is_dir().then_some(static_dir);

        Ok(Self {
            backend_url: config.backend.base_url().trim_end_matches('/').to_string(),
            upload_client,
            upload_timeout_secs: config.backend.upload_timeout_secs,
            probe_client,
            probe_path: config.backend.probe_path.clone(),
            gemini,
            static_dir,
            max_upload_bytes: config.server.max_upload_bytes,
        })
    }

    /// Full URL of a backend route.
    pub fn backend_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.backend_url, path.trim_start_matches('/'))
    }

    pub fn probe_url(&self) -> String {
        self.backend_endpoint(&self.probe_path)
    }
}

/// Build the router with CORS open to any origin (the React client is served
/// from a different port).
pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/upload", post(upload::upload))
        .route("/ask-ai", post(ask_ai::ask_ai));

    if let Some(ref dir) = state.static_dir {
        info!("Serving static files from {}", dir.display());
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(cors)
        .with_state(state)
}
