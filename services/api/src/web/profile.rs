//! services/api/src/web/profile.rs
//!
//! Profile and memory endpoints for the signed-in user.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use progress_core::domain::{Location, ProfileUpdate, UserProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SUPPORTED_VOICES;
use crate::error::{port_rejection, HandlerError};
use crate::web::state::AppState;

/// Oldest age a profile accepts.
pub const MAX_AGE: u32 = 150;

pub fn validate_age(age: Option<u32>) -> Result<Option<u32>, HandlerError> {
    match age {
        Some(age) if age > MAX_AGE => Err((
            StatusCode::BAD_REQUEST,
            format!("Age must be at most {}", MAX_AGE),
        )),
        _ => Ok(age),
    }
}

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq)]
pub struct LocationDto {
    pub latitude: f64,
    pub longitude: f64,
}

impl From<LocationDto> for Location {
    fn from(dto: LocationDto) -> Self {
        Location {
            latitude: dto.latitude,
            longitude: dto.longitude,
        }
    }
}

impl From<Location> for LocationDto {
    fn from(location: Location) -> Self {
        LocationDto {
            latitude: location.latitude,
            longitude: location.longitude,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub age: Option<u32>,
    pub location: Option<LocationDto>,
    pub voice: String,
    pub voice_mode_enabled: bool,
    pub memory: String,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            age: profile.age,
            location: profile.location.map(LocationDto::from),
            voice: profile.voice,
            voice_mode_enabled: profile.voice_mode_enabled,
            memory: profile.memory,
        }
    }
}

/// Fields left out are not changed.
#[derive(Deserialize, ToSchema, Default)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u32>,
    pub location: Option<LocationDto>,
    pub voice: Option<String>,
    pub voice_mode_enabled: Option<bool>,
    pub memory: Option<String>,
}

impl UpdateProfileRequest {
    fn into_update(self) -> Result<ProfileUpdate, HandlerError> {
        let voice = match self.voice {
            Some(voice) => {
                let voice = voice.trim().to_lowercase();
                if !SUPPORTED_VOICES.contains(&voice.as_str()) {
                    return Err((
                        StatusCode::BAD_REQUEST,
                        format!("Unsupported voice '{}'", voice),
                    ));
                }
                Some(voice)
            }
            None => None,
        };
        if self.first_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err((StatusCode::BAD_REQUEST, "First name cannot be empty".to_string()));
        }
        let age = validate_age(self.age)?;
        Ok(ProfileUpdate {
            first_name: self.first_name.map(|n| n.trim().to_string()),
            last_name: self.last_name.map(|n| n.trim().to_string()),
            age,
            location: self.location.map(Location::from),
            voice,
            voice_mode_enabled: self.voice_mode_enabled,
            memory: self.memory,
        })
    }
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MemoryDto {
    pub memory: String,
}

async fn load_profile(state: &AppState, user_id: Uuid) -> Result<UserProfile, HandlerError> {
    state.db.get_profile(user_id).await.map_err(|e| {
        error!("Failed to load profile for user {}: {:?}", user_id, e);
        port_rejection(&e)
    })
}

async fn store_profile(state: &AppState, profile: &UserProfile) -> Result<(), HandlerError> {
    state.db.save_profile(profile).await.map_err(|e| {
        error!("Failed to save profile for user {}: {:?}", profile.user_id, e);
        port_rejection(&e)
    })
}

//=========================================================================================
// Handlers
//=========================================================================================

#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The user's profile", body = ProfileResponse),
        (status = 401, description = "Not signed in"),
        (status = 404, description = "Profile not found")
    )
)]
pub async fn get_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let profile = load_profile(&state, user_id).await?;
    Ok(Json(ProfileResponse::from(profile)))
}

#[utoipa::path(
    put,
    path = "/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "The updated profile", body = ProfileResponse),
        (status = 400, description = "Invalid field value"),
        (status = 401, description = "Not signed in")
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let update = req.into_update()?;
    let mut profile = load_profile(&state, user_id).await?;
    profile.apply(update);
    store_profile(&state, &profile).await?;
    Ok(Json(ProfileResponse::from(profile)))
}

#[utoipa::path(
    get,
    path = "/profile/memory",
    responses(
        (status = 200, description = "What the assistant remembers about the user", body = MemoryDto)
    )
)]
pub async fn get_memory_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, HandlerError> {
    let profile = load_profile(&state, user_id).await?;
    Ok(Json(MemoryDto {
        memory: profile.memory,
    }))
}

#[utoipa::path(
    put,
    path = "/profile/memory",
    request_body = MemoryDto,
    responses(
        (status = 200, description = "Memory replaced", body = MemoryDto)
    )
)]
pub async fn update_memory_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<MemoryDto>,
) -> Result<impl IntoResponse, HandlerError> {
    let mut profile = load_profile(&state, user_id).await?;
    profile.memory = req.memory;
    store_profile(&state, &profile).await?;
    Ok(Json(MemoryDto {
        memory: profile.memory,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voices_are_validated_and_normalized() {
        let update = UpdateProfileRequest {
            voice: Some(" Nova ".to_string()),
            ..Default::default()
        }
        .into_update()
        .unwrap();
        assert_eq!(update.voice.as_deref(), Some("nova"));

        let err = UpdateProfileRequest {
            voice: Some("erinome".to_string()),
            ..Default::default()
        }
        .into_update()
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn blank_first_names_are_rejected() {
        let err = UpdateProfileRequest {
            first_name: Some("  ".to_string()),
            ..Default::default()
        }
        .into_update()
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn ages_beyond_the_limit_are_rejected() {
        let update = UpdateProfileRequest {
            age: Some(MAX_AGE),
            ..Default::default()
        }
        .into_update()
        .unwrap();
        assert_eq!(update.age, Some(MAX_AGE));

        let err = UpdateProfileRequest {
            age: Some(u32::MAX),
            ..Default::default()
        }
        .into_update()
        .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
        assert_eq!(validate_age(None).unwrap(), None);
    }
}
