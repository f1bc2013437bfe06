//! `POST /upload`: dataset proxy to the R backend.
//!
//! The uploaded file is forwarded byte-for-byte to the backend's `/upload`
//! route. A successful analysis gets an `ai_insights` field, generated by
//! Gemini from the backend's `summary` when a key is configured.

use super::SharedState;
use crate::error::ApiError;
use crate::gemini::GeminiClient;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use reqwest::multipart::{Form, Part};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Multipart field carrying the dataset, both inbound and to the backend.
pub const DATASET_FIELD: &str = "dataset";

/// `ai_insights` value when no API key is configured.
pub const INSIGHTS_NOT_CONFIGURED: &str = "Gemini API Key not configured.";

const NO_SUMMARY: &str = "No summary provided.";

/// An uploaded file held in memory for the duration of one request.
#[derive(Debug)]
pub struct Dataset {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

pub async fn upload(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    // A body that is not multipart at all has no file part either.
    let multipart = multipart.map_err(|e| {
        warn!("Upload without a multipart body: {}", e);
        ApiError::MissingFile
    })?;
    let dataset = read_dataset(multipart).await?;
    info!(
        "📥 Received file: {} ({} bytes)",
        dataset.filename,
        dataset.bytes.len()
    );

    let mut result = forward_to_backend(&state, dataset).await?;

    let ai_insights = match state.gemini.as_ref() {
        None => INSIGHTS_NOT_CONFIGURED.to_string(),
        Some(gemini) => match generate_insights(gemini, &result).await {
            Ok(text) => text,
            Err(e) => {
                warn!("AI insight generation failed: {}", e);
                format!("AI Insight Generation Failed: {}", e)
            }
        },
    };

    result.insert("ai_insights".to_string(), Value::String(ai_insights));
    Ok(Json(Value::Object(result)))
}

/// Pull the `dataset` file field out of the multipart body.
///
/// Fields with other names, or a `dataset` field without a filename (a
/// plain form value, not a file), are skipped.
async fn read_dataset(mut multipart: Multipart) -> Result<Dataset, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Error parsing multipart body: {}", e)))?
    {
        if field.name() != Some(DATASET_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        if filename.is_empty() {
            return Err(ApiError::EmptyFilename);
        }

        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload data: {}", e)))?;

        return Ok(Dataset {
            filename,
            content_type,
            bytes,
        });
    }

    Err(ApiError::MissingFile)
}

/// POST the dataset to the backend and return its JSON object on success.
async fn forward_to_backend(
    state: &SharedState,
    dataset: Dataset,
) -> Result<Map<String, Value>, ApiError> {
    let url = state.backend_endpoint("/upload");

    let mut part = Part::bytes(dataset.bytes.to_vec()).file_name(dataset.filename.clone());
    if let Some(ref content_type) = dataset.content_type {
        part = part.mime_str(content_type).map_err(|e| {
            ApiError::BadRequest(format!("Invalid content type '{}': {}", content_type, e))
        })?;
    }
    let form = Form::new().part(DATASET_FIELD, part);

    info!("📤 Forwarding {} to R Backend at {}", dataset.filename, url);

    let response = state
        .upload_client
        .post(&url)
        .multipart(form)
        .send()
        .await
        .map_err(|e| classify_transport_error(e, state.upload_timeout_secs))?;

    let status = response.status();
    info!("⬅️ R Backend responded: {}", status);

    let text = response
        .text()
        .await
        .map_err(|e| classify_transport_error(e, state.upload_timeout_secs))?;

    if !status.is_success() {
        warn!("❌ R Error detected: {}", text);
        return Err(ApiError::BackendFailed(text));
    }

    let data: Value = serde_json::from_str(&text)
        .map_err(|e| ApiError::Internal(format!("Invalid JSON from R Backend: {}", e)))?;

    let Value::Object(data) = data else {
        return Err(ApiError::Internal(
            "R Backend returned JSON that is not an object".to_string(),
        ));
    };

    if let Some(error) = data.get("error") {
        warn!("⚠️ R Logic Error: {}", error);
        return Err(ApiError::BackendRejected(Value::Object(data)));
    }

    Ok(data)
}

fn classify_transport_error(e: reqwest::Error, timeout_secs: u64) -> ApiError {
    if e.is_timeout() {
        ApiError::BackendTimeout(timeout_secs)
    } else if e.is_connect() {
        ApiError::BackendUnreachable
    } else {
        ApiError::Internal(e.to_string())
    }
}

async fn generate_insights(
    gemini: &GeminiClient,
    result: &Map<String, Value>,
) -> Result<String, crate::gemini::GeminiError> {
    let prompt = insight_prompt(&summary_context(result));
    gemini.generate(&prompt).await
}

/// The backend's `summary` as prompt text. Plumber serializes scalars as
/// one-element arrays, so non-string values are passed as JSON.
fn summary_context(result: &Map<String, Value>) -> String {
    match result.get("summary") {
        None | Some(Value::Null) => NO_SUMMARY.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) if items.len() == 1 && items[0].is_string() => {
            items[0].as_str().unwrap_or_default().to_string()
        }
        Some(other) => other.to_string(),
    }
}

fn insight_prompt(summary: &str) -> String {
    format!(
        "Role: Data Analyst. Task: Provide 3 short, punchy insights about this dataset summary. Data Summary: {}",
        summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_summary_context_variants() {
        assert_eq!(summary_context(&object(json!({}))), NO_SUMMARY);
        assert_eq!(summary_context(&object(json!({ "summary": null }))), NO_SUMMARY);
        assert_eq!(
            summary_context(&object(json!({ "summary": "5 rows, 3 cols" }))),
            "5 rows, 3 cols"
        );
        assert_eq!(
            summary_context(&object(json!({ "summary": ["5 rows, 3 cols"] }))),
            "5 rows, 3 cols"
        );
        assert_eq!(
            summary_context(&object(json!({ "summary": { "rows": 5 } }))),
            r#"{"rows":5}"#
        );
    }

    #[test]
    fn test_insight_prompt_embeds_summary() {
        let prompt = insight_prompt("mean age 42");
        assert!(prompt.starts_with("Role: Data Analyst."));
        assert!(prompt.contains("3 short, punchy insights"));
        assert!(prompt.ends_with("Data Summary: mean age 42"));
    }
}
