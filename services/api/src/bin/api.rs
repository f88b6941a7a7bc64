//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        tts::parse_voice, DbAdapter, LogMailer, MemoryStore, OpenAiChatAdapter, OpenAiImageAdapter,
        OpenAiSttAdapter, OpenAiSummaryAdapter, OpenAiTitleAdapter, OpenAiTtsAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        build_router,
        events::EventHub,
        state::{AppState, FEEDBACK_COOLDOWN},
    },
};
use async_openai::{config::OpenAIConfig, types::SpeechModel, Client};
use progress_core::{gate::InFlightGate, ports::DatabaseService};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    let db: Arc<dyn DatabaseService> = if config.uses_memory_store() {
        warn!("Using the in-memory store. Nothing will survive a restart.");
        Arc::new(MemoryStore::new())
    } else {
        info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&config.database_url)
            .await?;
        let db_adapter = DbAdapter::new(db_pool);
        info!("Running database migrations...");
        db_adapter.run_migrations().await?;
        info!("Database migrations complete.");
        Arc::new(db_adapter)
    };

    // --- 3. Initialize Service Adapters ---
    let openai_config = OpenAIConfig::new().with_api_key(
        config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| ApiError::Internal("OPENAI_API_KEY is required".to_string()))?,
    );
    let openai_client = Client::with_config(openai_config);

    let tts_voice = parse_voice(&config.tts_voice).ok_or_else(|| {
        ApiError::Internal(format!(
            "Invalid TTS voice specified in config: '{}'",
            config.tts_voice
        ))
    })?;
    let tts_adapter = Arc::new(OpenAiTtsAdapter::new(
        openai_client.clone(),
        SpeechModel::Tts1Hd,
        tts_voice,
    ));
    let stt_adapter = Arc::new(OpenAiSttAdapter::new(
        openai_client.clone(),
        config.stt_model.clone(),
    ));
    let chat_adapter = Arc::new(OpenAiChatAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
    ));
    let title_adapter = Arc::new(OpenAiTitleAdapter::new(
        openai_client.clone(),
        config.title_model.clone(),
    ));
    let summary_adapter = Arc::new(OpenAiSummaryAdapter::new(
        openai_client.clone(),
        config.chat_model.clone(),
    ));
    let image_adapter = Arc::new(OpenAiImageAdapter::new(
        openai_client,
        &config.image_model,
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        db,
        config: config.clone(),
        chat_adapter,
        title_adapter,
        summary_adapter,
        stt_adapter,
        tts_adapter,
        image_adapter,
        mailer: Arc::new(LogMailer),
        events: Arc::new(EventHub::new()),
        generation_gate: InFlightGate::new(),
        feedback_gate: InFlightGate::with_cooldown(FEEDBACK_COOLDOWN),
    });

    // --- 5. Start the Server ---
    let app = build_router(app_state);
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
