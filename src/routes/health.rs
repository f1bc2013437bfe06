//! `GET /health`.

use super::SharedState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use tracing::debug;

/// Reachability of the R backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Alive,
    Unreachable,
}

/// Health payload. Field names are what the browser client reads.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Liveness of this server; always `"alive"` when the handler runs.
    pub python: String,
    pub r_backend: BackendStatus,
}

pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let r_backend = probe_backend(&state.probe_client, &state.probe_url()).await;
    Json(HealthResponse {
        python: "alive".to_string(),
        r_backend,
    })
}

/// Any HTTP response counts as alive; any transport error, including a
/// timeout, counts as unreachable.
pub async fn probe_backend(client: &reqwest::Client, url: &str) -> BackendStatus {
    match client.get(url).send().await {
        Ok(response) => {
            debug!("Backend probe {} -> {}", url, response.status());
            BackendStatus::Alive
        }
        Err(e) => {
            debug!("Backend probe {} failed: {}", url, e);
            BackendStatus::Unreachable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_response_wire_shape() {
        let response = HealthResponse {
            python: "alive".to_string(),
            r_backend: BackendStatus::Unreachable,
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({ "python": "alive", "r_backend": "unreachable" })
        );
    }
}
