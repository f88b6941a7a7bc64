//! services/api/src/adapters/stt.rs
//!
//! This module contains the adapter for OpenAI's Speech-to-Text (Whisper) service.
//! It implements the `SpeechToTextService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    types::{AudioInput, CreateTranscriptionRequestArgs},
    Client,
};
use async_trait::async_trait;
use hound::{WavSpec, WavWriter};
use progress_core::ports::{PortError, PortResult, SpeechToTextService};

use super::classify_openai_error;

/// Sample rate of the raw PCM dictation frames sent over the WebSocket.
pub const DICTATION_SAMPLE_RATE: u32 = 48_000;

/// Wraps mono 16-bit little-endian PCM in a WAV container.
pub fn pcm16_to_wav(pcm_data: &[u8], sample_rate: u32) -> Result<Vec<u8>, hound::Error> {
    let mut cursor = std::io::Cursor::new(Vec::new());

    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::new(&mut cursor, spec)?;
    for chunk in pcm_data.chunks_exact(2) {
        let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    Ok(cursor.into_inner())
}

/// File name the transcription API uses to detect the container format.
fn file_name_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    match essence {
        "audio/wav" | "audio/x-wav" | "audio/wave" => "audio.wav",
        "audio/mpeg" | "audio/mp3" => "audio.mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "audio.m4a",
        "audio/ogg" => "audio.ogg",
        _ => "audio.webm",
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `SpeechToTextService` port using the OpenAI Whisper API.
#[derive(Clone)]
pub struct OpenAiSttAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiSttAdapter {
    /// Creates a new `OpenAiSttAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `SpeechToTextService` Trait Implementation
//=========================================================================================

#[async_trait]
impl SpeechToTextService for OpenAiSttAdapter {
    async fn transcribe_audio(&self, audio_data: &[u8], mime_type: &str) -> PortResult<String> {
        if audio_data.is_empty() {
            return Err(PortError::Unexpected("No audio to transcribe".to_string()));
        }

        let input = AudioInput::from_vec_u8(file_name_for(mime_type).to_string(), audio_data.to_vec());
        let request = CreateTranscriptionRequestArgs::default()
            .file(input)
            .model(&self.model)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .audio()
            .transcribe(request)
            .await
            .map_err(classify_openai_error)?;

        Ok(response.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_is_wrapped_in_a_wav_header() {
        let pcm: Vec<u8> = [0i16, 1000, -1000, 0]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let wav = pcm16_to_wav(&pcm, DICTATION_SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.ends_with(&pcm));
    }

    #[test]
    fn file_names_follow_the_mime_type() {
        assert_eq!(file_name_for("audio/wav"), "audio.wav");
        assert_eq!(file_name_for("audio/webm;codecs=opus"), "audio.webm");
        assert_eq!(file_name_for("audio/mpeg"), "audio.mp3");
    }
}
