//! HTTP-facing error type.
//!
//! Every failure a route can produce maps to one status code and a JSON
//! body of the form `{"error": "..."}`. The one exception is a logic-level
//! rejection from the R backend, whose JSON is returned to the client as-is.

use crate::gemini::GeminiError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors returned by the HTTP routes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The multipart body has no `dataset` file field.
    #[error("No file part")]
    MissingFile,

    /// The `dataset` field carries an empty filename.
    #[error("No selected file")]
    EmptyFilename,

    /// Malformed request input.
    #[error("{0}")]
    BadRequest(String),

    /// The backend refused the connection or could not be reached.
    #[error("Could not connect to R Analysis Backend. Is R installed?")]
    BackendUnreachable,

    /// The backend accepted the connection but did not answer in time.
    #[error("R Analysis Backend did not respond within {0}s")]
    BackendTimeout(u64),

    /// The backend answered with a non-success HTTP status.
    #[error("R Backend failed: {0}")]
    BackendFailed(String),

    /// The backend answered 200 with an `error` key in its JSON.
    #[error("R backend reported an error: {0}")]
    BackendRejected(Value),

    /// AI features requested without an API key.
    #[error("API Key not set")]
    ApiKeyMissing,

    /// Anything else.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingFile
            | ApiError::EmptyFilename
            | ApiError::BadRequest(_)
            | ApiError::BackendRejected(_) => StatusCode::BAD_REQUEST,
            ApiError::ApiKeyMissing => StatusCode::FORBIDDEN,
            ApiError::BackendUnreachable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BackendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::BackendFailed(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<GeminiError> for ApiError {
    fn from(e: GeminiError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BackendRejected(body) => body,
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::MissingFile.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::EmptyFilename.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::ApiKeyMissing.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::BackendUnreachable.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::BackendTimeout(5).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError::BackendFailed("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::BackendFailed("stack trace".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(response).await,
            json!({ "error": "R Backend failed: stack trace" })
        );
    }

    #[tokio::test]
    async fn test_backend_rejection_passes_body_through() {
        let backend_body = json!({ "error": "bad file format", "detail": [1, 2] });
        let response = ApiError::BackendRejected(backend_body.clone()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await, backend_body);
    }
}
