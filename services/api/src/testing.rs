//! services/api/src/testing.rs
//!
//! Scriptable fakes for the model ports and helpers to assemble an `AppState`
//! around the in-memory store.

use async_trait::async_trait;
use progress_core::domain::{GenerationRequest, Message, NewMessage, Role, UserProfile};
use progress_core::gate::InFlightGate;
use progress_core::ports::{
    ChatModelService, DatabaseService, DocumentSummaryService, ImageGenerationService, Mailer,
    PortError, PortResult, SpeechToTextService, TextToSpeechService, TitleGenerationService,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::adapters::MemoryStore;
use crate::config::Config;
use crate::web::events::EventHub;
use crate::web::state::{AppState, FEEDBACK_COOLDOWN};

pub const FAKE_REPLY: &str = "Rust is a systems programming language.";
pub const FAKE_TITLE: &str = "Rust Basics";
pub const FAKE_TRANSCRIPT: &str = "hello from the microphone";
pub const FAKE_SUMMARY: &str = "A short summary.";
pub const FAKE_IMAGE: &str = "data:image/png;base64,aW1n";
pub const ADMIN_EMAIL: &str = "admin@example.com";

#[derive(Default)]
pub struct Switch {
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl Switch {
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) -> PortResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err(PortError::Unexpected("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
pub struct FakeChat {
    switch: Switch,
    last_prompt: Mutex<Option<String>>,
}

impl FakeChat {
    pub fn fail(&self) {
        self.switch.fail();
    }

    pub fn calls(&self) -> usize {
        self.switch.calls()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModelService for FakeChat {
    async fn generate_response(&self, request: &GenerationRequest) -> PortResult<String> {
        *self.last_prompt.lock().unwrap() = Some(request.message.clone());
        self.switch.hit()?;
        Ok(FAKE_REPLY.to_string())
    }
}

#[derive(Default)]
pub struct FakeTitle(Switch);

impl FakeTitle {
    pub fn fail(&self) {
        self.0.fail();
    }
}

#[async_trait]
impl TitleGenerationService for FakeTitle {
    async fn generate_title(&self, _first_message: &str) -> PortResult<String> {
        self.0.hit()?;
        Ok(FAKE_TITLE.to_string())
    }
}

#[derive(Default)]
pub struct FakeSummary(Switch);

impl FakeSummary {
    pub fn calls(&self) -> usize {
        self.0.calls()
    }
}

#[async_trait]
impl DocumentSummaryService for FakeSummary {
    async fn summarize_document(&self, _document_data_uri: &str) -> PortResult<String> {
        self.0.hit()?;
        Ok(FAKE_SUMMARY.to_string())
    }
}

#[derive(Default)]
pub struct FakeStt {
    switch: Switch,
    last_mime_type: Mutex<Option<String>>,
}

impl FakeStt {
    pub fn last_mime_type(&self) -> Option<String> {
        self.last_mime_type.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechToTextService for FakeStt {
    async fn transcribe_audio(&self, _audio_data: &[u8], mime_type: &str) -> PortResult<String> {
        *self.last_mime_type.lock().unwrap() = Some(mime_type.to_string());
        self.switch.hit()?;
        Ok(FAKE_TRANSCRIPT.to_string())
    }
}

#[derive(Default)]
pub struct FakeTts {
    switch: Switch,
    quota_exceeded: AtomicBool,
}

impl FakeTts {
    pub fn calls(&self) -> usize {
        self.switch.calls()
    }

    pub fn exceed_quota(&self) {
        self.quota_exceeded.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TextToSpeechService for FakeTts {
    async fn generate_audio(&self, text: &str, _voice: Option<&str>) -> PortResult<Vec<u8>> {
        self.switch.hit()?;
        if self.quota_exceeded.load(Ordering::SeqCst) {
            return Err(PortError::QuotaExceeded("429".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }

    fn audio_mime_type(&self) -> &'static str {
        "audio/mpeg"
    }
}

#[derive(Default)]
pub struct FakeImage(Switch);

#[async_trait]
impl ImageGenerationService for FakeImage {
    async fn generate_image(&self, _prompt: &str) -> PortResult<String> {
        self.0.hit()?;
        Ok(FAKE_IMAGE.to_string())
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    /// `(email, token)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_password_reset(&self, email: &str, token: &str) -> PortResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((email.to_string(), token.to_string()));
        Ok(())
    }
}

/// Every fake, kept around so tests can script and inspect them after the
/// state has been built.
pub struct TestServices {
    pub db: Arc<MemoryStore>,
    pub chat: Arc<FakeChat>,
    pub title: Arc<FakeTitle>,
    pub summary: Arc<FakeSummary>,
    pub stt: Arc<FakeStt>,
    pub tts: Arc<FakeTts>,
    pub image: Arc<FakeImage>,
    pub mailer: Arc<RecordingMailer>,
}

impl TestServices {
    pub fn new() -> Self {
        Self {
            db: Arc::new(MemoryStore::new()),
            chat: Arc::default(),
            title: Arc::default(),
            summary: Arc::default(),
            stt: Arc::default(),
            tts: Arc::default(),
            image: Arc::default(),
            mailer: Arc::default(),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            db: self.db.clone(),
            config: Arc::new(test_config()),
            chat_adapter: self.chat.clone(),
            title_adapter: self.title.clone(),
            summary_adapter: self.summary.clone(),
            stt_adapter: self.stt.clone(),
            tts_adapter: self.tts.clone(),
            image_adapter: self.image.clone(),
            mailer: self.mailer.clone(),
            events: Arc::new(EventHub::new()),
            generation_gate: InFlightGate::new(),
            feedback_gate: InFlightGate::with_cooldown(FEEDBACK_COOLDOWN),
        })
    }
}

pub fn test_config() -> Config {
    Config::from_lookup(|key| match key {
        "DATABASE_URL" => Some("memory://".to_string()),
        "ADMIN_EMAILS" => Some(ADMIN_EMAIL.to_string()),
        _ => None,
    })
    .expect("test configuration is valid")
}

/// Creates a user with a profile, bypassing password hashing.
pub async fn seed_user(state: &AppState, email: &str, voice_mode_enabled: bool) -> Uuid {
    let user = state
        .db
        .create_user_with_email(email, "not-a-real-hash")
        .await
        .unwrap();
    state
        .db
        .create_profile(&UserProfile {
            user_id: user.user_id,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: email.to_string(),
            age: None,
            location: None,
            voice: "alloy".to_string(),
            voice_mode_enabled,
            memory: String::new(),
        })
        .await
        .unwrap();
    user.user_id
}

pub async fn add_message(state: &AppState, conversation_id: Uuid, role: Role, content: &str) -> Message {
    state
        .db
        .create_message(NewMessage {
            conversation_id,
            role,
            content: content.to_string(),
            attachment_data_uri: None,
        })
        .await
        .unwrap()
}
