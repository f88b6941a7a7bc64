//! services/api/src/web/media.rs
//!
//! One-shot media endpoints: speech synthesis and transcription, image
//! generation and document summaries. Binary payloads travel as data URIs.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use progress_core::data_uri::DataUri;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SUPPORTED_VOICES;
use crate::error::{audio_failure_message, port_rejection, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SynthesizeRequest {
    pub text: String,
    /// Defaults to the voice stored in the user's profile.
    pub voice: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SynthesizeResponse {
    pub audio_data_uri: String,
}

#[derive(Deserialize, ToSchema)]
pub struct TranscribeRequest {
    pub audio_data_uri: String,
}

#[derive(Serialize, ToSchema)]
pub struct TranscribeResponse {
    pub text: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ImageRequest {
    pub prompt: String,
}

#[derive(Serialize, ToSchema)]
pub struct ImageResponse {
    pub image_data_uri: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SummarizeRequest {
    pub document_data_uri: String,
}

#[derive(Serialize, ToSchema)]
pub struct SummarizeResponse {
    pub summary: String,
}

fn parse_data_uri(raw: &str) -> Result<DataUri, HandlerError> {
    raw.parse::<DataUri>()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid data URI: {}", e)))
}

fn require_text(value: &str, field: &str) -> Result<(), HandlerError> {
    if value.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, format!("{} cannot be empty", field)));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

#[utoipa::path(
    post,
    path = "/speech/synthesize",
    request_body = SynthesizeRequest,
    responses(
        (status = 200, description = "Synthesized speech", body = SynthesizeResponse),
        (status = 400, description = "Empty text or unknown voice"),
        (status = 429, description = "Speech quota exceeded"),
        (status = 503, description = "Speech service busy")
    )
)]
pub async fn synthesize_speech_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<SynthesizeRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_text(&req.text, "Text")?;

    let voice = match req.voice {
        Some(voice) => {
            let voice = voice.trim().to_lowercase();
            if !SUPPORTED_VOICES.contains(&voice.as_str()) {
                return Err((StatusCode::BAD_REQUEST, format!("Unsupported voice '{}'", voice)));
            }
            Some(voice)
        }
        None => state.db.get_profile(user_id).await.ok().map(|p| p.voice),
    };

    let audio = state
        .tts_adapter
        .generate_audio(&req.text, voice.as_deref())
        .await
        .map_err(|e| {
            error!("Speech synthesis failed: {:?}", e);
            let (status, _) = port_rejection(&e);
            (status, audio_failure_message(&e).to_string())
        })?;

    Ok(Json(SynthesizeResponse {
        audio_data_uri: DataUri::encode(state.tts_adapter.audio_mime_type(), &audio),
    }))
}

#[utoipa::path(
    post,
    path = "/speech/transcribe",
    request_body = TranscribeRequest,
    responses(
        (status = 200, description = "Transcribed text", body = TranscribeResponse),
        (status = 400, description = "Invalid or empty audio")
    )
)]
pub async fn transcribe_speech_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranscribeRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let audio = parse_data_uri(&req.audio_data_uri)?;
    if audio.bytes.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Audio cannot be empty".to_string()));
    }

    let text = state
        .stt_adapter
        .transcribe_audio(&audio.bytes, &audio.mime_type)
        .await
        .map_err(|e| {
            error!("Transcription failed: {:?}", e);
            port_rejection(&e)
        })?;

    Ok(Json(TranscribeResponse { text }))
}

#[utoipa::path(
    post,
    path = "/images",
    request_body = ImageRequest,
    responses(
        (status = 200, description = "Generated image", body = ImageResponse),
        (status = 400, description = "Empty prompt")
    )
)]
pub async fn generate_image_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ImageRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    require_text(&req.prompt, "Prompt")?;

    let image_data_uri = state
        .image_adapter
        .generate_image(req.prompt.trim())
        .await
        .map_err(|e| {
            error!("Image generation failed: {:?}", e);
            port_rejection(&e)
        })?;

    Ok(Json(ImageResponse { image_data_uri }))
}

#[utoipa::path(
    post,
    path = "/documents/summarize",
    request_body = SummarizeRequest,
    responses(
        (status = 200, description = "Summary of the document", body = SummarizeResponse),
        (status = 400, description = "Invalid document")
    )
)]
pub async fn summarize_document_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SummarizeRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let document = parse_data_uri(&req.document_data_uri)?;
    if document.bytes.is_empty() {
        warn!("Rejected an empty document");
        return Err((StatusCode::BAD_REQUEST, "Document cannot be empty".to_string()));
    }
    if !document.is_image() && std::str::from_utf8(&document.bytes).is_err() {
        warn!("Rejected a document of type '{}'", document.mime_type);
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Documents of type '{}' cannot be summarized", document.mime_type),
        ));
    }

    let summary = state
        .summary_adapter
        .summarize_document(req.document_data_uri.trim())
        .await
        .map_err(|e| {
            error!("Document summary failed: {:?}", e);
            port_rejection(&e)
        })?;

    Ok(Json(SummarizeResponse { summary }))
}
