//! `POST /ask-ai`: direct chat relay to Gemini.

use super::SharedState;
use crate::error::ApiError;
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const DEFAULT_PROMPT: &str = "Hello";

#[derive(Debug, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub response: String,
}

/// The body is read raw so a missing key is reported as 403 before any
/// body validation. An absent or unparseable body falls back to the
/// default prompt.
pub async fn ask_ai(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<AskResponse>, ApiError> {
    let Some(gemini) = state.gemini.as_ref() else {
        return Err(ApiError::ApiKeyMissing);
    };

    let request: AskRequest = serde_json::from_slice(&body).unwrap_or_default();
    let prompt = request
        .prompt
        .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

    info!("💬 Relaying {} char prompt to Gemini", prompt.len());

    let response = gemini.generate(&prompt).await.map_err(|e| {
        warn!("Gemini chat failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(AskResponse { response }))
}
