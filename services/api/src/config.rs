//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// Voices accepted by the speech endpoint.
pub const SUPPORTED_VOICES: &[&str] = &["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

/// `DATABASE_URL` value that selects the in-memory store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub chat_model: String,
    pub title_model: String,
    pub image_model: String,
    pub stt_model: String,
    pub tts_voice: String,
    /// Lowercased emails allowed to read all feedback.
    pub admin_emails: Vec<String>,
    pub cors_origin: String,
    pub session_ttl_days: i64,
    pub max_body_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load API Keys (as optional) ---
        let openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());

        // --- Load Adapter-specific Settings ---
        let chat_model = var_or("CHAT_MODEL", "gpt-4o-mini");
        let title_model = var_or("TITLE_MODEL", "gpt-4o-mini");
        let image_model = var_or("IMAGE_MODEL", "dall-e-3");
        let stt_model = var_or("STT_MODEL", "whisper-1");

        let tts_voice = var_or("TTS_VOICE", "alloy").to_lowercase();
        if !SUPPORTED_VOICES.contains(&tts_voice.as_str()) {
            return Err(ConfigError::InvalidValue(
                "TTS_VOICE".to_string(),
                format!("'{}' is not one of {}", tts_voice, SUPPORTED_VOICES.join(", ")),
            ));
        }

        // --- Load Access and HTTP Settings ---
        let admin_emails = lookup("ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(|e| e.trim().to_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        let session_ttl_days = parse_number(&lookup, "SESSION_TTL_DAYS", 30)?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be positive".to_string(),
            ));
        }
        let max_body_bytes = parse_number(&lookup, "MAX_BODY_BYTES", 10 * 1024 * 1024)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            chat_model,
            title_model,
            image_model,
            stt_model,
            tts_voice,
            admin_emails,
            cors_origin,
            session_ttl_days,
            max_body_bytes,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }

    pub fn is_admin(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.admin_emails.iter().any(|admin| *admin == email)
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
