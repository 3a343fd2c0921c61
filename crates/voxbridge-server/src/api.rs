//! One-shot HTTP API handlers.

use crate::delivery::SynthesisResponse;
use crate::AppState;
use axum::{
    extract::{Extension, Json, Multipart},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use voxbridge_voice::{ClientSink, SpeechError, SynthesisRequest};

/// Multipart field carrying the recording.
const AUDIO_FIELD: &str = "audio";

/// Request body for `POST /api/synthesize`.
#[derive(Debug, Deserialize)]
pub struct SynthesizeRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub rate: Option<f32>,
    #[serde(default)]
    pub pitch: Option<f32>,
}

impl From<SynthesizeRequest> for SynthesisRequest {
    fn from(req: SynthesizeRequest) -> Self {
        Self {
            text: req.text,
            rate: req.rate,
            pitch: req.pitch,
            voice: None,
        }
    }
}

/// Response body for `POST /api/recognize`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RecognizeResponse {
    pub success: bool,
    pub text: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unprocessable audio: {0}")]
    Unprocessable(String),
    #[error("upstream failure: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl From<SpeechError> for ApiError {
    fn from(e: SpeechError) -> Self {
        let message = e.to_string();
        match e {
            SpeechError::Validation(_) => ApiError::BadRequest(message),
            SpeechError::Transcode(_) => ApiError::Unprocessable(message),
            SpeechError::Protocol(_) | SpeechError::RemoteTask { .. } | SpeechError::Transport(_) => {
                ApiError::BadGateway(message)
            }
            SpeechError::Configuration(_) | SpeechError::Persistence(_) => {
                ApiError::InternalServerError(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Handler for `POST /api/synthesize`.
///
/// Runs one synthesis task and delivers the full audio as a URL or inline
/// data URI, depending on the deployment's delivery mode.
pub async fn synthesize_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SynthesizeRequest>,
) -> Result<Json<SynthesisResponse>, ApiError> {
    let request = SynthesisRequest::from(payload);
    let audio = state
        .speech
        .synthesize(&request, ClientSink::OneShot)
        .await?;

    let format = &state.speech.config().synthesis.format;
    let response = state.delivery.deliver(&audio, format).await?;
    Ok(Json(response))
}

/// Handler for `POST /api/recognize`.
///
/// Accepts a multipart upload whose `audio` field (or, failing that, the
/// first field) holds the recording.
pub async fn recognize_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<RecognizeResponse>, ApiError> {
    let mut audio = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart error: {}", e)))?
    {
        let named = field.name() == Some(AUDIO_FIELD);
        if audio.is_some() && !named {
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;
        audio = Some(data);
        if named {
            break;
        }
    }

    let audio = audio.ok_or_else(|| ApiError::BadRequest("no audio file provided".to_string()))?;
    let text = state
        .speech
        .recognize(&audio, ClientSink::OneShot)
        .await?;

    Ok(Json(RecognizeResponse {
        success: true,
        text,
    }))
}
