//! services/api/src/web/router.rs
//!
//! Assembles the HTTP router: public auth routes, cookie-protected routes,
//! CORS, the body size limit and the Swagger UI.

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::web::{
    auth, conversations, feedback, media, messages, middleware::require_auth, profile,
    rest::ApiDoc, state::AppState, ws_handler::ws_handler,
};

fn cors_layer(origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);
    match origin.parse::<HeaderValue>() {
        Ok(origin) => cors.allow_origin(origin),
        Err(e) => {
            warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
            cors
        }
    }
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/auth/password-reset", post(auth::request_password_reset_handler))
        .route(
            "/auth/password-reset/confirm",
            post(auth::confirm_password_reset_handler),
        );

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/profile",
            get(profile::get_profile_handler).put(profile::update_profile_handler),
        )
        .route(
            "/profile/memory",
            get(profile::get_memory_handler).put(profile::update_memory_handler),
        )
        .route(
            "/conversations",
            get(conversations::list_conversations_handler).post(conversations::create_conversation_handler),
        )
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation_handler)
                .patch(conversations::rename_conversation_handler)
                .delete(conversations::delete_conversation_handler),
        )
        .route(
            "/conversations/{id}/messages",
            get(messages::list_messages_handler).post(messages::send_message_handler),
        )
        .route(
            "/conversations/{id}/messages/{message_id}",
            patch(messages::edit_message_handler),
        )
        .route("/conversations/{id}/regenerate", post(messages::regenerate_handler))
        .route("/feedback", post(feedback::submit_feedback_handler))
        .route("/admin/feedback", get(feedback::list_feedback_handler))
        .route("/speech/synthesize", post(media::synthesize_speech_handler))
        .route("/speech/transcribe", post(media::transcribe_speech_handler))
        .route("/images", post(media::generate_image_handler))
        .route("/documents/summarize", post(media::summarize_document_handler))
        .route("/ws", get(ws_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(app_state.config.max_body_bytes))
        .layer(cors_layer(&app_state.config.cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
