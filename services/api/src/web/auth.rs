//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for signup, login, logout and password resets.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use progress_core::domain::{Location, UserProfile};
use progress_core::ports::PortError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{port_rejection, HandlerError};
use crate::web::profile::{validate_age, LocationDto};
use crate::web::state::AppState;

/// Shortest password accepted at signup and reset.
pub const MIN_PASSWORD_LEN: usize = 6;

/// How long an emailed reset token stays valid.
const RESET_TOKEN_TTL_HOURS: i64 = 1;

const SESSION_COOKIE: &str = "session";

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u32>,
    pub location: Option<LocationDto>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(Deserialize, ToSchema)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &str) -> Result<(), HandlerError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> Result<String, HandlerError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password".to_string())
        })
}

/// Hex SHA-256 of a reset token. Only the digest is stored.
fn hash_reset_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Reads the auth session id from the `Cookie` header.
pub fn session_id_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())?
        .split(';')
        .find_map(|c| c.trim().strip_prefix("session="))
        .filter(|id| !id.is_empty())
}

fn session_cookie(session_id: &str, max_age_seconds: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, session_id, max_age_seconds
    )
}

/// Creates an auth session and returns the `Set-Cookie` value for it.
async fn start_session(state: &AppState, user_id: Uuid) -> Result<String, HandlerError> {
    let auth_session_id = Uuid::new_v4().to_string();
    let ttl = Duration::days(state.config.session_ttl_days);

    state
        .db
        .create_auth_session(&auth_session_id, user_id, Utc::now() + ttl)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;

    Ok(session_cookie(&auth_session_id, ttl.num_seconds()))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account and profile
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let email = normalize_email(&req.email);
    if !email.contains('@') {
        return Err((StatusCode::BAD_REQUEST, "A valid email is required".to_string()));
    }
    validate_password(&req.password)?;
    let first_name = req.first_name.trim().to_string();
    if first_name.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "First name is required".to_string()));
    }
    let age = validate_age(req.age)?;

    let password_hash = hash_password(&req.password)?;

    let user = state
        .db
        .create_user_with_email(&email, &password_hash)
        .await
        .map_err(|e| {
            error!("Failed to create user: {:?}", e);
            match e {
                PortError::Conflict(_) => (StatusCode::CONFLICT, "Email already registered".to_string()),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create user".to_string()),
            }
        })?;

    let profile = UserProfile {
        user_id: user.user_id,
        first_name,
        last_name: req.last_name.trim().to_string(),
        email: user.email.clone(),
        age,
        location: req.location.map(Location::from),
        voice: state.config.tts_voice.clone(),
        voice_mode_enabled: false,
        memory: String::new(),
    };
    state.db.create_profile(&profile).await.map_err(|e| {
        error!("Failed to create profile: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create profile".to_string())
    })?;

    let cookie = start_session(&state, user.user_id).await?;
    info!("New user signed up: {}", user.user_id);

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user_id: user.user_id,
            email: user.email,
        }),
    ))
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let invalid = || (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string());

    let user_creds = state
        .db
        .get_user_by_email(&normalize_email(&req.email))
        .await
        .map_err(|e| {
            warn!("Login failed: {:?}", e);
            invalid()
        })?;

    let parsed_hash = PasswordHash::new(&user_creds.hashed_password).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        invalid()
    })?;

    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| invalid())?;

    let cookie = start_session(&state, user_creds.user_id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user_id: user_creds.user_id,
            email: user_creds.email,
        }),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let auth_session_id = session_id_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .db
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    Ok((StatusCode::OK, [(header::SET_COOKIE, session_cookie("", 0))]))
}

/// POST /auth/password-reset - Email a one-time reset token
///
/// Answers 202 whether or not the account exists.
#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 202, description = "Reset email sent if the account exists")
    )
)]
pub async fn request_password_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetRequest>,
) -> StatusCode {
    let email = normalize_email(&req.email);
    let user = match state.db.get_user_by_email(&email).await {
        Ok(user) => user,
        Err(e) => {
            info!("Password reset requested for unknown account: {:?}", e);
            return StatusCode::ACCEPTED;
        }
    };

    let token = Uuid::new_v4().simple().to_string();
    let expires_at = Utc::now() + Duration::hours(RESET_TOKEN_TTL_HOURS);
    if let Err(e) = state
        .db
        .create_password_reset(&hash_reset_token(&token), user.user_id, expires_at)
        .await
    {
        error!("Failed to store password reset: {:?}", e);
        return StatusCode::ACCEPTED;
    }
    if let Err(e) = state.mailer.send_password_reset(&user.email, &token).await {
        error!("Failed to send password reset email: {:?}", e);
    }
    StatusCode::ACCEPTED
}

/// POST /auth/password-reset/confirm - Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 204, description = "Password updated"),
        (status = 400, description = "Invalid or expired token, or weak password")
    )
)]
pub async fn confirm_password_reset_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<StatusCode, HandlerError> {
    validate_password(&req.new_password)?;

    let user_id = state
        .db
        .consume_password_reset(&hash_reset_token(req.token.trim()))
        .await
        .map_err(|e| match e {
            PortError::NotFound(_) => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired reset token".to_string(),
            ),
            other => {
                error!("Failed to consume password reset: {:?}", other);
                port_rejection(&other)
            }
        })?;

    let password_hash = hash_password(&req.new_password)?;
    state
        .db
        .update_password(user_id, &password_hash)
        .await
        .map_err(|e| {
            error!("Failed to update password: {:?}", e);
            port_rejection(&e)
        })?;

    info!("Password reset completed for user {}", user_id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_read_from_the_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; session=abc-123; other=1".parse().unwrap());
        assert_eq!(session_id_from_headers(&headers), Some("abc-123"));

        headers.insert(header::COOKIE, "session=".parse().unwrap());
        assert_eq!(session_id_from_headers(&headers), None);
        assert_eq!(session_id_from_headers(&HeaderMap::new()), None);
    }

    #[test]
    fn reset_tokens_are_stored_as_digests() {
        let digest = hash_reset_token("token");
        assert_eq!(digest.len(), 64);
        assert_ne!(digest, "token");
        assert_eq!(digest, hash_reset_token("token"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert_eq!(validate_password("12345").unwrap_err().0, StatusCode::BAD_REQUEST);
        assert!(validate_password("123456").is_ok());
    }

    #[test]
    fn hashed_passwords_verify() {
        let hash = hash_password("correct horse").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default().verify_password(b"correct horse", &parsed).is_ok());
        assert!(Argon2::default().verify_password(b"wrong", &parsed).is_err());
    }
}
