use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    gemini::{AnalysisError, GeminiClient},
    intake::{ImageIntake, IntakeError},
    models::{AnalysisResult, AnalysisState, ImageAsset, ScanGuidance, ScanRequest},
};

/// The one scan screen the host drives: current selection plus the state of
/// the current analysis attempt. Single writer per attempt; the lock is never
/// held across the network call.
#[derive(Debug, Default)]
pub struct ScanScreen {
    pub intake: ImageIntake,
    pub state: AnalysisState,
}

#[derive(Clone)]
pub struct AppState {
    pub screen: Arc<Mutex<ScanScreen>>,
    pub gemini: Arc<GeminiClient>,
}

impl AppState {
    pub fn new(gemini: GeminiClient) -> Self {
        Self {
            screen: Arc::default(),
            gemini: Arc::new(gemini),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Please select an image and enter a prompt.")]
    Validation,
    #[error("An analysis is already in progress.")]
    Busy,
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl ScanError {
    fn status(&self) -> StatusCode {
        match self {
            ScanError::Validation | ScanError::Intake(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScanError::Busy => StatusCode::CONFLICT,
            ScanError::Analysis(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let body = AnalysisResult::Error {
            error_message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/image", post(select_image))
        .route("/api/image/preview", get(image_preview))
        .route("/api/scan", post(submit_scan))
        .route("/api/scan/state", get(scan_state))
        .route("/api/config", get(scan_config))
        // Intake enforces no size limit; the 10MB guidance is display-only.
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .with_state(state)
}

/// Selects a new image. Clears any previous result or error before the asset
/// is swapped, so a stale answer never outlives its image.
pub async fn select_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<StatusCode, ScanError> {
    let mut asset = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| IntakeError::Encoding(e.to_string()))?
    {
        if field.name() == Some("file") {
            let display_name = field.file_name().unwrap_or("upload").to_string();
            let mime_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| IntakeError::Encoding(e.to_string()))?;
            asset = Some(ImageAsset::from_upload(display_name, mime_type, bytes));
            break;
        }
    }
    let asset = asset.ok_or(ScanError::Validation)?;

    let mut screen = state.screen.lock();
    if screen.state.is_submitting() {
        return Err(ScanError::Busy);
    }
    screen.state = AnalysisState::Idle;
    screen.intake.select(asset);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn image_preview(State(state): State<AppState>) -> Response {
    let screen = state.screen.lock();
    match screen.intake.preview() {
        Some(preview) => (
            [(header::CONTENT_TYPE, preview.mime_type.clone())],
            preview.bytes.clone(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Runs one analysis attempt. The `Submitting` marker set under the lock is
/// what excludes a second submission; the awaited call happens lock-free.
///
/// The analyze-and-record sequence runs in a spawned task so the terminal
/// state write survives the caller disconnecting mid-request; a `Submitting`
/// screen always reaches `Succeeded` or `Failed`.
pub async fn submit_scan(
    State(state): State<AppState>,
    Json(body): Json<ScanRequest>,
) -> Result<Json<AnalysisResult>, ScanError> {
    let (encoded, attempt_id) = {
        let mut screen = state.screen.lock();
        if screen.state.is_submitting() {
            return Err(ScanError::Busy);
        }
        if body.prompt.trim().is_empty() || screen.intake.asset().is_none() {
            return Err(ScanError::Validation);
        }
        let encoded = screen.intake.encode()?;
        let attempt_id = Uuid::new_v4();
        screen.state = AnalysisState::Submitting {
            attempt_id,
            started_at: Utc::now(),
        };
        (encoded, attempt_id)
    };

    tracing::info!("🎯 Analysis attempt {} dispatched", attempt_id);
    let attempt = {
        let gemini = state.gemini.clone();
        let screen = state.screen.clone();
        let prompt = body.prompt.clone();
        tokio::spawn(async move {
            let outcome = gemini.analyze(&encoded, &prompt).await;
            let mut screen = screen.lock();
            match outcome {
                Ok(text) => {
                    tracing::info!(
                        "✅ Analysis attempt {} succeeded ({} chars)",
                        attempt_id,
                        text.len()
                    );
                    screen.state = AnalysisState::Succeeded {
                        text: text.clone(),
                        finished_at: Utc::now(),
                    };
                    Ok(text)
                }
                Err(e) => {
                    tracing::error!("❌ Analysis attempt {} failed: {}", attempt_id, e);
                    screen.state = AnalysisState::Failed {
                        error_message: e.to_string(),
                        finished_at: Utc::now(),
                    };
                    Err(e)
                }
            }
        })
    };

    match attempt.await {
        Ok(Ok(text)) => Ok(Json(AnalysisResult::Text { text })),
        Ok(Err(e)) => Err(ScanError::Analysis(e)),
        Err(join_err) => {
            // Task panicked; release the screen so the next attempt can run.
            let mut screen = state.screen.lock();
            if matches!(
                screen.state,
                AnalysisState::Submitting { attempt_id: id, .. } if id == attempt_id
            ) {
                screen.state = AnalysisState::Failed {
                    error_message: AnalysisError::service(join_err.to_string()).to_string(),
                    finished_at: Utc::now(),
                };
            }
            Err(ScanError::Analysis(AnalysisError::service(
                join_err.to_string(),
            )))
        }
    }
}

pub async fn scan_state(State(state): State<AppState>) -> Json<AnalysisState> {
    Json(state.screen.lock().state.clone())
}

pub async fn scan_config() -> Json<ScanGuidance> {
    Json(ScanGuidance::default())
}
