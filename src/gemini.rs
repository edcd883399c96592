use crate::models::EncodedImage;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error, info};

pub const MODEL: &str = "gemini-2.5-flash";
pub const API_ERROR_PREFIX: &str = "Mozo Image Scanner API Error";
const GENERIC_SERVICE_ERROR: &str =
    "An unexpected error occurred while communicating with the Mozo Image Scanner API.";

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("API returned no text in the response.")]
    EmptyResponse,
    #[error("{0}")]
    Service(String),
}

impl AnalysisError {
    /// Wraps an upstream failure with the application prefix, falling back to
    /// a generic message when the upstream error carries none.
    pub(crate) fn service(upstream: impl Into<String>) -> Self {
        let upstream = upstream.into();
        if upstream.trim().is_empty() {
            AnalysisError::Service(GENERIC_SERVICE_ERROR.to_string())
        } else {
            AnalysisError::Service(format!("{}: {}", API_ERROR_PREFIX, upstream))
        }
    }
}

// Helper function to truncate base64 data in JSON for cleaner logging
fn truncate_base64_in_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let serde_json::Value::String(s) = val {
                        if s.len() > 100
                            && s.chars()
                                .all(|c| c.is_alphanumeric() || c == '+' || c == '/' || c == '=')
                        {
                            *val = serde_json::Value::String(format!(
                                "{}...[truncated {} chars]",
                                &s[..50],
                                s.len() - 50
                            ));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        serde_json::Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

/// Client for the Gemini `generateContent` endpoint. One instance per
/// process; each [`analyze`](GeminiClient::analyze) call is a fresh,
/// independent attempt with no retries.
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self::with_base_url(api_key, base_url)
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    /// Sends one multimodal request: the image part first, the prompt text
    /// second. Inputs are validated by the caller, not here.
    pub async fn analyze(
        &self,
        image: &EncodedImage,
        prompt: &str,
    ) -> Result<String, AnalysisError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, MODEL, self.api_key
        );

        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let request_body = json!({
            "contents": [{
                "parts": [
                    {"inlineData": {"data": image.data, "mimeType": image.mime_type}},
                    {"text": prompt}
                ]
            }]
        });

        let mut loggable = request_body.clone();
        truncate_base64_in_json(&mut loggable);
        debug!(
            "📤 Request body: {}",
            serde_json::to_string_pretty(&loggable).unwrap_or_default()
        );

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AnalysisError::service(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response
            .text()
            .await
            .map_err(|e| AnalysisError::service(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API error response: {}", response_text);
            return Err(AnalysisError::service(upstream_message(
                status,
                &response_text,
            )));
        }

        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| AnalysisError::service(format!("parse error: {}", e)))?;

        match extract_first_text(&parsed) {
            Some(text) => {
                info!("✅ Extracted {} chars of analysis text", text.len());
                Ok(text)
            }
            None => {
                info!("⚠️ No text found in API response");
                Err(AnalysisError::EmptyResponse)
            }
        }
    }
}

/// Pulls the human-readable message out of a Gemini error body, falling back
/// to the raw body, then to the bare status line.
fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<GeminiErrorResponse>(body) {
        if !parsed.error.message.trim().is_empty() {
            return parsed.error.message;
        }
    }
    if !body.trim().is_empty() {
        return format!("status={} body={}", status, body.trim());
    }
    status.to_string()
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    message: String,
}

fn extract_first_text(resp: &GeminiResponse) -> Option<String> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Text { text } = p {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    return Some(trimmed.to_string());
                }
            }
        }
    }
    None
}
