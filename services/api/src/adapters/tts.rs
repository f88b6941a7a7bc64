//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `TextToSpeechService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    types::{CreateSpeechRequestArgs, SpeechModel, SpeechResponseFormat, Voice},
    Client,
};
use async_trait::async_trait;
use progress_core::ports::{PortError, PortResult, TextToSpeechService};
use tracing::warn;

use super::classify_openai_error;

/// Maps a stored voice preference onto an API voice.
pub fn parse_voice(name: &str) -> Option<Voice> {
    match name.trim().to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    default_voice: Voice,
}

impl OpenAiTtsAdapter {
    /// Creates a new `OpenAiTtsAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, default_voice: Voice) -> Self {
        Self {
            client,
            model,
            default_voice,
        }
    }

    fn voice_for(&self, requested: Option<&str>) -> Voice {
        match requested {
            Some(name) => parse_voice(name).unwrap_or_else(|| {
                warn!("Unknown voice '{}', using the default voice", name);
                self.default_voice.clone()
            }),
            None => self.default_voice.clone(),
        }
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Generates MP3 audio from the given text.
    async fn generate_audio(&self, text: &str, voice: Option<&str>) -> PortResult<Vec<u8>> {
        let request = CreateSpeechRequestArgs::default()
            .model(self.model.clone())
            .input(text)
            .voice(self.voice_for(voice))
            .response_format(SpeechResponseFormat::Mp3)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .audio()
            .speech(request)
            .await
            .map_err(classify_openai_error)?;

        Ok(response.bytes.to_vec())
    }

    fn audio_mime_type(&self) -> &'static str {
        "audio/mpeg"
    }
}
