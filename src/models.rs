use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The user's currently selected file. Lives in the intake component for the
/// duration of one analysis attempt; replaced wholesale when a new file is
/// picked. Never persisted.
#[derive(Debug, Clone)]
pub struct ImageAsset {
    pub bytes: Bytes,
    pub mime_type: String,
    pub display_name: String,
}

/// Base64 rendition of an [`ImageAsset`], paired with its MIME type. Created
/// fresh per submission and consumed by exactly one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanRequest {
    pub prompt: String,
}

/// What the display surface renders after an attempt: either the extracted
/// text or a single displayable error message.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnalysisResult {
    Text {
        text: String,
    },
    Error {
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

/// One analysis attempt as the scan screen sees it.
///
/// Transitions: Idle -> Submitting -> (Succeeded | Failed) -> Idle on the
/// next file selection. Exactly one attempt may be `Submitting` at a time.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum AnalysisState {
    Idle,
    Submitting {
        attempt_id: Uuid,
        started_at: DateTime<Utc>,
    },
    Succeeded {
        text: String,
        finished_at: DateTime<Utc>,
    },
    Failed {
        error_message: String,
        finished_at: DateTime<Utc>,
    },
}

impl AnalysisState {
    pub fn is_submitting(&self) -> bool {
        matches!(self, AnalysisState::Submitting { .. })
    }
}

impl Default for AnalysisState {
    fn default() -> Self {
        AnalysisState::Idle
    }
}

/// Display-only hints the host advertises to whatever renders the upload
/// form. None of these are enforced by the core logic.
#[derive(Debug, Serialize, Clone)]
pub struct ScanGuidance {
    pub accepted_types: Vec<&'static str>,
    pub max_size_hint_bytes: u64,
    pub default_prompt: &'static str,
}

pub const DEFAULT_PROMPT: &str =
    "What do you see in this image? Provide a detailed description.";

impl Default for ScanGuidance {
    fn default() -> Self {
        Self {
            accepted_types: vec!["image/png", "image/jpeg", "image/gif"],
            max_size_hint_bytes: 10 * 1024 * 1024,
            default_prompt: DEFAULT_PROMPT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn analysis_result_serializes_with_camel_case_error_key() {
        let err = AnalysisResult::Error {
            error_message: "boom".into(),
        };
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({ "errorMessage": "boom" }));

        let ok = AnalysisResult::Text { text: "A cat.".into() };
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, serde_json::json!({ "text": "A cat." }));
    }

    #[test]
    fn state_machine_starts_idle_and_tags_phases() {
        let state = AnalysisState::default();
        assert_eq!(state, AnalysisState::Idle);
        assert!(!state.is_submitting());

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json, serde_json::json!({ "phase": "idle" }));

        let submitting = AnalysisState::Submitting {
            attempt_id: Uuid::new_v4(),
            started_at: Utc::now(),
        };
        assert!(submitting.is_submitting());
        let json = serde_json::to_value(&submitting).unwrap();
        assert_eq!(json["phase"], "submitting");
    }
}
