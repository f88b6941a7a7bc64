//! services/api/src/web/feedback.rs
//!
//! Likes and dislikes on assistant replies, and the admin listing of them.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use chrono::{DateTime, Utc};
use progress_core::domain::{Feedback, FeedbackRating, NewFeedback, Role};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_rejection, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, Serialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RatingDto {
    Like,
    Dislike,
}

impl From<RatingDto> for FeedbackRating {
    fn from(rating: RatingDto) -> Self {
        match rating {
            RatingDto::Like => FeedbackRating::Like,
            RatingDto::Dislike => FeedbackRating::Dislike,
        }
    }
}

impl From<FeedbackRating> for RatingDto {
    fn from(rating: FeedbackRating) -> Self {
        match rating {
            FeedbackRating::Like => RatingDto::Like,
            FeedbackRating::Dislike => RatingDto::Dislike,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct FeedbackRequest {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub rating: RatingDto,
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub message_content: String,
    pub rating: RatingDto,
    pub reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl From<Feedback> for FeedbackResponse {
    fn from(feedback: Feedback) -> Self {
        Self {
            id: feedback.id,
            user_id: feedback.user_id,
            conversation_id: feedback.conversation_id,
            message_id: feedback.message_id,
            message_content: feedback.message_content,
            rating: feedback.rating.into(),
            reason: feedback.reason,
            submitted_at: feedback.submitted_at,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

#[utoipa::path(
    post,
    path = "/feedback",
    request_body = FeedbackRequest,
    responses(
        (status = 201, description = "Feedback recorded", body = FeedbackResponse),
        (status = 400, description = "Only assistant replies can be rated"),
        (status = 404, description = "Conversation or message not found"),
        (status = 409, description = "The same rating is already being submitted")
    )
)]
pub async fn submit_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<FeedbackRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let rating = FeedbackRating::from(req.rating);
    let _guard = state
        .feedback_gate
        .try_acquire((user_id, rating))
        .map_err(|e| {
            warn!("Feedback from {} rejected: {}", user_id, e);
            (StatusCode::CONFLICT, "Feedback is already being submitted".to_string())
        })?;

    let message = async {
        state.db.get_conversation(user_id, req.conversation_id).await?;
        state.db.get_message(req.conversation_id, req.message_id).await
    }
    .await
    .map_err(|e| port_rejection(&e))?;

    if message.role != Role::Assistant {
        return Err((
            StatusCode::BAD_REQUEST,
            "Only assistant replies can be rated".to_string(),
        ));
    }

    let reason = req
        .reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());
    let feedback = state
        .db
        .save_feedback(NewFeedback {
            user_id,
            conversation_id: req.conversation_id,
            message_id: req.message_id,
            message_content: message.content,
            rating,
            reason,
        })
        .await
        .map_err(|e| {
            error!("Failed to save feedback: {:?}", e);
            port_rejection(&e)
        })?;

    info!("Recorded {} feedback on message {}", rating, req.message_id);
    Ok((StatusCode::CREATED, Json(FeedbackResponse::from(feedback))))
}

#[utoipa::path(
    get,
    path = "/admin/feedback",
    responses(
        (status = 200, description = "All feedback, newest first", body = [FeedbackResponse]),
        (status = 403, description = "Not an admin")
    )
)]
pub async fn list_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let user = state
        .db
        .get_user_by_id(user_id)
        .await
        .map_err(|e| port_rejection(&e))?;
    if !state.config.is_admin(&user.email) {
        warn!("User {} tried to read the feedback list", user_id);
        return Err((StatusCode::FORBIDDEN, "Admin access required".to_string()));
    }

    let feedback = state.db.list_feedback().await.map_err(|e| {
        error!("Failed to list feedback: {:?}", e);
        port_rejection(&e)
    })?;
    Ok(Json(
        feedback
            .into_iter()
            .map(FeedbackResponse::from)
            .collect::<Vec<_>>(),
    ))
}
