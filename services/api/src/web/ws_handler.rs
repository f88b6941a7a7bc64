//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! A session follows one conversation: it relays changes published on the
//! event hub, runs typing reveals, coordinates audio playback and handles
//! dictation.

use crate::{
    adapters::stt::{pcm16_to_wav, DICTATION_SAMPLE_RATE},
    error::audio_failure_message,
    web::{
        events::ConversationEvent,
        protocol::{ClientMessage, ServerMessage},
        rest::MessageResponse,
        state::{AppState, DictationChunk, DownloadPlan, SessionState},
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use bytes::Bytes;
use futures::{
    stream::{SplitStream, StreamExt},
    SinkExt,
};
use progress_core::{
    audio::{AudioCommand, Clip},
    data_uri::DataUri,
    domain::Role,
    typing::TypingEffect,
};
use std::sync::Arc;
use tokio::sync::{broadcast::error::RecvError, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Frames waiting for the socket writer before producers start waiting.
const OUTBOUND_CAPACITY: usize = 256;

/// Outbound frames of one connection. A writer task owns the socket sink.
type WsSender = mpsc::Sender<Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

/// Serializes and sends one protocol message. Returns false once the client is gone.
async fn send_json(ws_sender: &WsSender, msg: &ServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return false;
        }
    };
    ws_sender.send(Message::Text(json.into())).await.is_ok()
}

async fn send_error(ws_sender: &WsSender, message: &str) {
    let msg = ServerMessage::Error {
        message: message.to_string(),
    };
    if !send_json(ws_sender, &msg).await {
        warn!("Could not deliver error to client: {}", message);
    }
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: Uuid) {
    info!("New WebSocket connection established for user: {}", user_id);

    // Every task of the session sends through the channel; only the writer touches the sink.
    let (mut sink, receiver) = socket.split();
    let (ws_sender, mut outbound) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    run_session(receiver, &app_state, user_id, &ws_sender).await;

    drop(ws_sender);
    if let Err(e) = writer.await {
        warn!("WebSocket writer ended abnormally: {}", e);
    }
    info!("WebSocket connection closed.");
}

async fn run_session(
    mut receiver: SplitStream<WebSocket>,
    app_state: &Arc<AppState>,
    user_id: Uuid,
    ws_sender: &WsSender,
) {
    // --- 1. Initialization Phase ---
    let conversation_id = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => match serde_json::from_str::<ClientMessage>(&init_json) {
            Ok(ClientMessage::Init { conversation_id }) => conversation_id,
            _ => {
                error!("First message was not a valid Init message.");
                send_error(ws_sender, "The first message must be 'init'.").await;
                return;
            }
        },
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    if let Err(e) = app_state.db.get_conversation(user_id, conversation_id).await {
        error!("User {} cannot open conversation {}: {:?}", user_id, conversation_id, e);
        send_error(ws_sender, "Conversation not found.").await;
        return;
    }

    let voice = match app_state.db.get_profile(user_id).await {
        Ok(profile) => Some(profile.voice),
        Err(e) => {
            warn!("No profile for user {}, using the default voice: {:?}", user_id, e);
            None
        }
    };
    let session = Arc::new(Mutex::new(SessionState::new(user_id, conversation_id, voice)));
    let mut events = app_state.events.subscribe(conversation_id);

    if !send_json(ws_sender, &ServerMessage::SessionInitialized { conversation_id }).await {
        error!("Failed to send session initialized message.");
        drop(events);
        app_state.events.unsubscribe(conversation_id);
        return;
    }

    // --- 2. Main Message Loop ---
    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_text_message(text.to_string(), app_state, &session, ws_sender).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    handle_binary_message(&data, app_state, &session, ws_sender).await;
                }
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message.");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
                None => {
                    info!("Client disconnected.");
                    break;
                }
            },
            event = events.recv() => match event {
                Ok(event) => handle_event(event, app_state, &session, ws_sender).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Session for conversation {} skipped {} events", conversation_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    // --- 3. Cleanup ---
    session.lock().await.typing_token.cancel();
    drop(events);
    app_state.events.unsubscribe(conversation_id);
}

/// Relays one hub event to the client.
async fn handle_event(
    event: ConversationEvent,
    app_state: &Arc<AppState>,
    session_state_lock: &Arc<Mutex<SessionState>>,
    ws_sender: &WsSender,
) {
    match event {
        ConversationEvent::MessageAdded(message) => {
            let reveal = message.role == Role::Assistant;
            let (message_id, content) = (message.id, message.content.clone());
            send_json(
                ws_sender,
                &ServerMessage::MessageAdded {
                    message: MessageResponse::from(message),
                },
            )
            .await;
            if reveal {
                start_typing(session_state_lock, ws_sender, message_id, content, true).await;
            }
        }
        ConversationEvent::MessageUpdated(message) => {
            send_json(
                ws_sender,
                &ServerMessage::MessageUpdated {
                    message: MessageResponse::from(message),
                },
            )
            .await;
        }
        ConversationEvent::MessagesRemoved(message_ids) => {
            send_json(ws_sender, &ServerMessage::MessagesRemoved { message_ids }).await;
        }
        ConversationEvent::ThinkingStarted { placeholder_id } => {
            send_json(ws_sender, &ServerMessage::ThinkingStarted { placeholder_id }).await;
        }
        ConversationEvent::ThinkingCleared { placeholder_id } => {
            send_json(ws_sender, &ServerMessage::ThinkingCleared { placeholder_id }).await;
        }
        ConversationEvent::ReplyAudio(clip) => {
            let commands = session_state_lock.lock().await.audio.autoplay(clip);
            execute_audio_commands(commands, app_state, session_state_lock, ws_sender).await;
        }
    }
}

/// Helper function to handle the logic for different `ClientMessage` variants.
async fn handle_text_message(
    text: String,
    app_state: &Arc<AppState>,
    session_state_lock: &Arc<Mutex<SessionState>>,
    ws_sender: &WsSender,
) {
    let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            return;
        }
    };

    match client_msg {
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
        }
        ClientMessage::Reveal { message_id } => {
            let conversation_id = session_state_lock.lock().await.conversation_id;
            let messages = match app_state.db.list_messages(conversation_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    error!("Failed to load messages for reveal: {:?}", e);
                    send_error(ws_sender, "Failed to load the conversation.").await;
                    return;
                }
            };
            let is_latest = messages.last().is_some_and(|m| m.id == message_id);
            match messages.into_iter().find(|m| m.id == message_id) {
                Some(message) => {
                    start_typing(session_state_lock, ws_sender, message_id, message.content, is_latest).await;
                }
                None => send_error(ws_sender, "Message not found.").await,
            }
        }
        ClientMessage::ToggleAudio { message_id } => {
            let commands = session_state_lock.lock().await.audio.toggle(message_id);
            execute_audio_commands(commands, app_state, session_state_lock, ws_sender).await;
        }
        ClientMessage::PauseAudio => {
            let commands = session_state_lock.lock().await.audio.pause();
            execute_audio_commands(commands, app_state, session_state_lock, ws_sender).await;
        }
        ClientMessage::ResumeAudio => {
            let commands = session_state_lock.lock().await.audio.resume();
            execute_audio_commands(commands, app_state, session_state_lock, ws_sender).await;
        }
        ClientMessage::AudioEnded { message_id } => {
            session_state_lock.lock().await.audio.ended(message_id);
        }
        ClientMessage::DownloadAudio { message_id } => {
            let plan = session_state_lock.lock().await.request_download(message_id);
            match plan {
                DownloadPlan::Ready(audio_data_uri) => {
                    send_json(
                        ws_sender,
                        &ServerMessage::AudioDownload {
                            message_id,
                            audio_data_uri,
                        },
                    )
                    .await;
                }
                DownloadPlan::Pending => {
                    debug!("Download of {} waits for the synthesis in progress.", message_id);
                }
                DownloadPlan::Synthesize(commands) => {
                    execute_audio_commands(commands, app_state, session_state_lock, ws_sender).await;
                }
            }
        }
        ClientMessage::DictationStarted => {
            session_state_lock.lock().await.dictation = Some(Vec::new());
        }
        ClientMessage::DictationEnded => {
            let pcm = session_state_lock.lock().await.dictation.take().unwrap_or_default();
            transcribe_dictation(app_state, ws_sender, pcm).await;
        }
    }
}

/// Buffers dictation audio sent as binary frames.
async fn handle_binary_message(
    data: &[u8],
    app_state: &Arc<AppState>,
    session_state_lock: &Arc<Mutex<SessionState>>,
    ws_sender: &WsSender,
) {
    let outcome = session_state_lock
        .lock()
        .await
        .push_dictation(data, app_state.config.max_body_bytes);
    match outcome {
        DictationChunk::Buffered => {}
        DictationChunk::NotDictating => debug!("Ignoring audio received outside of a dictation."),
        DictationChunk::TooLong => {
            warn!("Dictation exceeded {} bytes and was discarded.", app_state.config.max_body_bytes);
            send_error(ws_sender, "The recording is too long.").await;
        }
    }
}

async fn transcribe_dictation(app_state: &Arc<AppState>, ws_sender: &WsSender, pcm: Vec<u8>) {
    if pcm.is_empty() {
        send_error(ws_sender, "No audio was recorded.").await;
        return;
    }
    let wav = match pcm16_to_wav(&pcm, DICTATION_SAMPLE_RATE) {
        Ok(wav) => wav,
        Err(e) => {
            error!("Failed to encode dictation audio: {}", e);
            send_error(ws_sender, "Failed to process the recording.").await;
            return;
        }
    };
    match app_state.stt_adapter.transcribe_audio(&wav, "audio/wav").await {
        Ok(text) => {
            send_json(ws_sender, &ServerMessage::Transcription { text }).await;
        }
        Err(e) => {
            error!("Dictation transcription failed: {:?}", e);
            send_error(ws_sender, "Failed to transcribe audio. Please try again.").await;
        }
    }
}

//=========================================================================================
// Typing reveals
//=========================================================================================

/// Starts revealing `text`, cancelling any reveal already running in this session.
async fn start_typing(
    session_state_lock: &Arc<Mutex<SessionState>>,
    ws_sender: &WsSender,
    message_id: Uuid,
    text: String,
    is_latest: bool,
) {
    let token = session_state_lock.lock().await.restart_typing();
    let effect = TypingEffect::new(text, is_latest);
    let ws_sender = ws_sender.clone();
    tokio::spawn(async move {
        typing_process(effect, message_id, ws_sender, token).await;
    });
}

async fn typing_process(
    effect: TypingEffect,
    message_id: Uuid,
    ws_sender: WsSender,
    cancellation_token: CancellationToken,
) {
    let tick = effect.tick();
    for (index, frame) in effect.enumerate() {
        if index > 0 {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Typing reveal of {} cancelled.", message_id);
                    return;
                }
                _ = tokio::time::sleep(tick) => {}
            }
        }
        let msg = ServerMessage::Typing {
            message_id,
            text: frame.rendered(),
            done: frame.complete,
        };
        if cancellation_token.is_cancelled() || !send_json(&ws_sender, &msg).await {
            return;
        }
    }
}

//=========================================================================================
// Audio playback
//=========================================================================================

async fn execute_audio_commands(
    commands: Vec<AudioCommand>,
    app_state: &Arc<AppState>,
    session_state_lock: &Arc<Mutex<SessionState>>,
    ws_sender: &WsSender,
) {
    for command in commands {
        match command {
            AudioCommand::Synthesize { message_id } => {
                spawn_synthesis(app_state.clone(), session_state_lock.clone(), ws_sender.clone(), message_id);
            }
            other => {
                if !send_playback_command(ws_sender, other).await {
                    return;
                }
            }
        }
    }
}

/// Synthesizes speech for a message in the background and plays it if the
/// message is still the one the user asked for.
fn spawn_synthesis(
    app_state: Arc<AppState>,
    session_state_lock: Arc<Mutex<SessionState>>,
    ws_sender: WsSender,
    message_id: Uuid,
) {
    tokio::spawn(async move {
        send_json(&ws_sender, &ServerMessage::AudioLoading { message_id }).await;

        let (conversation_id, voice) = {
            let session = session_state_lock.lock().await;
            (session.conversation_id, session.voice.clone())
        };
        let result = async {
            let message = app_state.db.get_message(conversation_id, message_id).await?;
            app_state
                .tts_adapter
                .generate_audio(&message.content, voice.as_deref())
                .await
        }
        .await;

        match result {
            Ok(bytes) => {
                let clip = Clip {
                    message_id,
                    mime_type: app_state.tts_adapter.audio_mime_type().to_string(),
                    bytes: Arc::new(bytes),
                };
                let (commands, download) = {
                    let mut session = session_state_lock.lock().await;
                    let commands = session.audio.audio_ready(clip.clone());
                    let download = !commands.is_empty() && session.take_pending_download(message_id);
                    (commands, download)
                };
                for command in commands {
                    if !send_playback_command(&ws_sender, command).await {
                        return;
                    }
                }
                if download {
                    let msg = ServerMessage::AudioDownload {
                        message_id,
                        audio_data_uri: DataUri::encode(&clip.mime_type, &clip.bytes),
                    };
                    send_json(&ws_sender, &msg).await;
                }
            }
            Err(e) => {
                error!("Speech synthesis for message {} failed: {:?}", message_id, e);
                {
                    let mut session = session_state_lock.lock().await;
                    session.audio.audio_failed(message_id);
                    session.take_pending_download(message_id);
                }
                send_error(&ws_sender, audio_failure_message(&e)).await;
            }
        }
    });
}

/// Sends a playback command to the client. Audio itself follows `audio_play`
/// as a binary frame.
async fn send_playback_command(ws_sender: &WsSender, command: AudioCommand) -> bool {
    match command {
        AudioCommand::Play(clip) => {
            let announced = send_json(
                ws_sender,
                &ServerMessage::AudioPlay {
                    message_id: clip.message_id,
                    mime_type: clip.mime_type.clone(),
                },
            )
            .await;
            announced
                && ws_sender
                    .send(Message::Binary(Bytes::from(clip.bytes.as_ref().clone())))
                    .await
                    .is_ok()
        }
        AudioCommand::Pause { message_id } => send_json(ws_sender, &ServerMessage::AudioPause { message_id }).await,
        AudioCommand::Resume { message_id } => send_json(ws_sender, &ServerMessage::AudioResume { message_id }).await,
        AudioCommand::Stop { message_id } => send_json(ws_sender, &ServerMessage::AudioStop { message_id }).await,
        AudioCommand::Synthesize { message_id } => {
            debug!("Unexpected synthesis request for {} during playback.", message_id);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, TestServices};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tokio::time::timeout;

    struct Harness {
        services: TestServices,
        state: Arc<AppState>,
        session: Arc<Mutex<SessionState>>,
        conversation_id: Uuid,
        tx: WsSender,
        rx: mpsc::Receiver<Message>,
    }

    async fn harness() -> Harness {
        let services = TestServices::new();
        let state = services.state();
        let user_id = testing::seed_user(&state, "ada@example.com", false).await;
        let conversation = state.db.create_conversation(user_id, "Chat").await.unwrap();
        let session = Arc::new(Mutex::new(SessionState::new(user_id, conversation.id, None)));
        let (tx, rx) = mpsc::channel(64);
        Harness {
            services,
            state,
            session,
            conversation_id: conversation.id,
            tx,
            rx,
        }
    }

    impl Harness {
        async fn client_sends(&self, msg: Value) {
            handle_text_message(msg.to_string(), &self.state, &self.session, &self.tx).await;
        }

        async fn next_frame(&mut self) -> Message {
            timeout(Duration::from_secs(5), self.rx.recv())
                .await
                .expect("a frame within five seconds")
                .expect("the session is still sending")
        }

        async fn next_json(&mut self) -> Value {
            match self.next_frame().await {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("expected a text frame, got {:?}", other),
            }
        }

        /// Skips frames until one of type `kind` arrives.
        async fn wait_for(&mut self, kind: &str) -> Value {
            loop {
                if let Message::Text(text) = self.next_frame().await {
                    let value: Value = serde_json::from_str(text.as_str()).unwrap();
                    if value["type"] == kind {
                        return value;
                    }
                }
            }
        }
    }

    fn clip(message_id: Uuid, bytes: &[u8]) -> Clip {
        Clip {
            message_id,
            mime_type: "audio/mpeg".to_string(),
            bytes: Arc::new(bytes.to_vec()),
        }
    }

    #[tokio::test]
    async fn download_synthesizes_plays_then_offers_the_file() {
        let mut h = harness().await;
        let reply = testing::add_message(&h.state, h.conversation_id, Role::Assistant, "Hello there").await;

        h.client_sends(json!({ "type": "download_audio", "message_id": reply.id })).await;

        assert_eq!(h.next_json().await["type"], "audio_loading");
        let play = h.next_json().await;
        assert_eq!(play["type"], "audio_play");
        assert_eq!(play["mime_type"], "audio/mpeg");
        match h.next_frame().await {
            Message::Binary(bytes) => assert_eq!(&bytes[..], b"Hello there"),
            other => panic!("expected the audio, got {:?}", other),
        }
        let download = h.next_json().await;
        assert_eq!(download["type"], "audio_download");
        assert_eq!(download["audio_data_uri"], DataUri::encode("audio/mpeg", b"Hello there"));
        assert!(h.session.lock().await.pending_download.is_none());

        // The second download is served from the playing clip.
        h.client_sends(json!({ "type": "download_audio", "message_id": reply.id })).await;
        assert_eq!(h.next_json().await["type"], "audio_download");
        assert_eq!(h.services.tts.calls(), 1);
    }

    #[tokio::test]
    async fn download_during_playback_request_reuses_the_synthesis() {
        let mut h = harness().await;
        let reply = testing::add_message(&h.state, h.conversation_id, Role::Assistant, "Hello there").await;

        h.client_sends(json!({ "type": "toggle_audio", "message_id": reply.id })).await;
        h.client_sends(json!({ "type": "download_audio", "message_id": reply.id })).await;

        let download = h.wait_for("audio_download").await;
        assert_eq!(download["message_id"], json!(reply.id));
        assert_eq!(h.services.tts.calls(), 1);
    }

    #[tokio::test]
    async fn failed_synthesis_reports_an_error_and_clears_the_download() {
        let mut h = harness().await;
        h.services.tts.exceed_quota();
        let reply = testing::add_message(&h.state, h.conversation_id, Role::Assistant, "Hello there").await;

        h.client_sends(json!({ "type": "download_audio", "message_id": reply.id })).await;

        let error = h.wait_for("error").await;
        assert!(error["message"].as_str().unwrap().contains("quota"));
        let session = h.session.lock().await;
        assert!(session.pending_download.is_none());
        assert!(!session.audio.is_loading(reply.id));
    }

    #[tokio::test]
    async fn voice_mode_audio_interrupts_the_previous_reply() {
        let mut h = harness().await;
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());

        handle_event(ConversationEvent::ReplyAudio(clip(first, b"one")), &h.state, &h.session, &h.tx).await;
        assert_eq!(h.next_json().await, json!({ "type": "audio_play", "message_id": first, "mime_type": "audio/mpeg" }));
        assert!(matches!(h.next_frame().await, Message::Binary(_)));

        handle_event(ConversationEvent::ReplyAudio(clip(second, b"two")), &h.state, &h.session, &h.tx).await;
        assert_eq!(h.next_json().await, json!({ "type": "audio_stop", "message_id": first }));
        assert_eq!(h.next_json().await["message_id"], json!(second));
        match h.next_frame().await {
            Message::Binary(bytes) => assert_eq!(&bytes[..], b"two"),
            other => panic!("expected the audio, got {:?}", other),
        }
        assert!(h.session.lock().await.audio.is_playing(second));
    }

    #[tokio::test]
    async fn a_new_reveal_cancels_the_running_one() {
        let mut h = harness().await;
        let (long_id, short_id) = (Uuid::new_v4(), Uuid::new_v4());
        let long_text = "word ".repeat(400);

        start_typing(&h.session, &h.tx, long_id, long_text, true).await;
        let first = h.next_json().await;
        assert_eq!(first["message_id"], json!(long_id));
        assert_eq!(first["done"], false);

        start_typing(&h.session, &h.tx, short_id, "Done.".to_string(), false).await;

        let mut finished_short = false;
        while let Ok(Some(frame)) = timeout(Duration::from_millis(300), h.rx.recv()).await {
            let Message::Text(text) = frame else { continue };
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["message_id"] == json!(long_id) {
                assert_eq!(value["done"], false, "the cancelled reveal must not finish");
            } else {
                assert_eq!(value, json!({ "type": "typing", "message_id": short_id, "text": "Done.", "done": true }));
                finished_short = true;
            }
        }
        assert!(finished_short);
    }

    #[tokio::test]
    async fn dictation_is_transcribed_as_wav() {
        let mut h = harness().await;

        h.client_sends(json!({ "type": "dictation_started" })).await;
        handle_binary_message(&[0u8; 3200], &h.state, &h.session, &h.tx).await;
        handle_binary_message(&[0u8; 3200], &h.state, &h.session, &h.tx).await;
        h.client_sends(json!({ "type": "dictation_ended" })).await;

        assert_eq!(h.next_json().await, json!({ "type": "transcription", "text": testing::FAKE_TRANSCRIPT }));
        assert_eq!(h.services.stt.last_mime_type().as_deref(), Some("audio/wav"));
        assert!(h.session.lock().await.dictation.is_none());
    }

    #[tokio::test]
    async fn oversized_dictation_is_discarded() {
        let mut h = harness().await;
        let limit = h.state.config.max_body_bytes;

        h.client_sends(json!({ "type": "dictation_started" })).await;
        handle_binary_message(&vec![0u8; limit + 1], &h.state, &h.session, &h.tx).await;
        assert_eq!(h.next_json().await["message"], "The recording is too long.");

        h.client_sends(json!({ "type": "dictation_ended" })).await;
        assert_eq!(h.next_json().await["message"], "No audio was recorded.");
        assert!(h.services.stt.last_mime_type().is_none());
    }
}
