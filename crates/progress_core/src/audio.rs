//! crates/progress_core/src/audio.rs
//!
//! Audio playback coordination. A session plays at most one message's audio
//! at a time; switching to another message stops the previous one first.
//!
//! The coordinator owns no timers or sockets. Each call returns the commands
//! the caller has to carry out (synthesize audio, start or stop playback).

use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioState {
    #[default]
    Idle,
    Loading,
    Playing,
    Paused,
}

/// Synthesized audio for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clip {
    pub message_id: Uuid,
    pub mime_type: String,
    pub bytes: Arc<Vec<u8>>,
}

/// A side effect requested by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCommand {
    /// Synthesize speech for the message, then report back with
    /// `audio_ready` or `audio_failed`.
    Synthesize { message_id: Uuid },
    /// Start playing the clip from the beginning.
    Play(Clip),
    Pause { message_id: Uuid },
    Resume { message_id: Uuid },
    /// Stop and discard the element of a message that is no longer current.
    Stop { message_id: Uuid },
}

#[derive(Debug, Default)]
pub struct AudioCoordinator {
    state: AudioState,
    current: Option<Uuid>,
    /// Audio of the element that is playing or paused.
    active: Option<Clip>,
}

impl AudioCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> AudioState {
        self.state
    }

    pub fn current_message(&self) -> Option<Uuid> {
        self.current
    }

    /// True when `message_id` is the message whose audio is currently playing.
    pub fn is_playing(&self, message_id: Uuid) -> bool {
        self.state == AudioState::Playing && self.current == Some(message_id)
    }

    /// True while speech for `message_id` is being synthesized.
    pub fn is_loading(&self, message_id: Uuid) -> bool {
        self.state == AudioState::Loading && self.current == Some(message_id)
    }

    /// The play/pause button of a message was pressed.
    pub fn toggle(&mut self, message_id: Uuid) -> Vec<AudioCommand> {
        if self.current == Some(message_id) && self.active.is_some() {
            return match self.state {
                AudioState::Playing => self.pause(),
                AudioState::Paused => self.resume(),
                _ => Vec::new(),
            };
        }
        if self.is_loading(message_id) {
            return Vec::new();
        }
        self.load(message_id)
    }

    /// Switches to `message_id` and asks for its audio. Used by the toggle and
    /// by voice mode, which auto-plays fresh replies.
    pub fn load(&mut self, message_id: Uuid) -> Vec<AudioCommand> {
        let mut commands = self.stop_active();
        self.state = AudioState::Loading;
        self.current = Some(message_id);
        commands.push(AudioCommand::Synthesize { message_id });
        commands
    }

    /// Synthesized audio arrived. Audio for a message that is no longer
    /// current is dropped.
    pub fn audio_ready(&mut self, clip: Clip) -> Vec<AudioCommand> {
        if self.current != Some(clip.message_id) || self.state != AudioState::Loading {
            return Vec::new();
        }
        let mut commands = self.stop_active();
        self.current = Some(clip.message_id);
        self.state = AudioState::Playing;
        self.active = Some(clip.clone());
        commands.push(AudioCommand::Play(clip));
        commands
    }

    /// Plays audio that was synthesized without a button press, as voice mode
    /// does for fresh replies. Whatever was active is stopped first.
    pub fn autoplay(&mut self, clip: Clip) -> Vec<AudioCommand> {
        let mut commands = self.stop_active();
        self.current = Some(clip.message_id);
        self.state = AudioState::Playing;
        self.active = Some(clip.clone());
        commands.push(AudioCommand::Play(clip));
        commands
    }

    pub fn audio_failed(&mut self, message_id: Uuid) {
        if self.current == Some(message_id) && self.state == AudioState::Loading {
            self.state = AudioState::Idle;
            self.current = None;
        }
    }

    pub fn pause(&mut self) -> Vec<AudioCommand> {
        match (&self.active, self.state) {
            (Some(clip), AudioState::Playing) => {
                self.state = AudioState::Paused;
                vec![AudioCommand::Pause {
                    message_id: clip.message_id,
                }]
            }
            _ => Vec::new(),
        }
    }

    pub fn resume(&mut self) -> Vec<AudioCommand> {
        match (&self.active, self.state) {
            (Some(clip), AudioState::Paused) => {
                self.state = AudioState::Playing;
                vec![AudioCommand::Resume {
                    message_id: clip.message_id,
                }]
            }
            _ => Vec::new(),
        }
    }

    /// The client finished playing a clip.
    pub fn ended(&mut self, message_id: Uuid) {
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|clip| clip.message_id == message_id);
        if is_active {
            self.active = None;
            self.current = None;
            self.state = AudioState::Idle;
        }
    }

    /// Audio already synthesized for `message_id`, if any.
    pub fn cached_audio(&self, message_id: Uuid) -> Option<&Clip> {
        self.active
            .as_ref()
            .filter(|clip| clip.message_id == message_id)
    }

    fn stop_active(&mut self) -> Vec<AudioCommand> {
        match self.active.take() {
            Some(clip) => vec![AudioCommand::Stop {
                message_id: clip.message_id,
            }],
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(message_id: Uuid) -> Clip {
        Clip {
            message_id,
            mime_type: "audio/mpeg".to_string(),
            bytes: Arc::new(vec![1, 2, 3]),
        }
    }

    fn playing_count(commands: &[AudioCommand], playing: &mut Option<Uuid>) -> usize {
        for command in commands {
            match command {
                AudioCommand::Play(clip) => {
                    assert!(playing.is_none(), "started a clip while another was playing");
                    *playing = Some(clip.message_id);
                }
                AudioCommand::Resume { message_id } => {
                    assert!(playing.is_none());
                    *playing = Some(*message_id);
                }
                AudioCommand::Stop { message_id } | AudioCommand::Pause { message_id } => {
                    if *playing == Some(*message_id) {
                        *playing = None;
                    }
                }
                AudioCommand::Synthesize { .. } => {}
            }
        }
        usize::from(playing.is_some())
    }

    #[test]
    fn first_toggle_requests_synthesis() {
        let mut audio = AudioCoordinator::new();
        let id = Uuid::new_v4();
        assert_eq!(audio.toggle(id), vec![AudioCommand::Synthesize { message_id: id }]);
        assert!(audio.is_loading(id));
        // A second press while loading does nothing.
        assert!(audio.toggle(id).is_empty());
    }

    #[test]
    fn toggle_pauses_and_resumes_the_same_message() {
        let mut audio = AudioCoordinator::new();
        let id = Uuid::new_v4();
        audio.toggle(id);
        audio.audio_ready(clip(id));
        assert!(audio.is_playing(id));

        assert_eq!(audio.toggle(id), vec![AudioCommand::Pause { message_id: id }]);
        assert_eq!(audio.state(), AudioState::Paused);
        assert_eq!(audio.toggle(id), vec![AudioCommand::Resume { message_id: id }]);
        assert_eq!(audio.state(), AudioState::Playing);
    }

    #[test]
    fn switching_messages_stops_the_previous_clip() {
        let mut audio = AudioCoordinator::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut playing = None;

        let cmds = audio.toggle(a);
        playing_count(&cmds, &mut playing);
        let cmds = audio.audio_ready(clip(a));
        assert_eq!(playing_count(&cmds, &mut playing), 1);

        let cmds = audio.toggle(b);
        assert!(cmds.contains(&AudioCommand::Stop { message_id: a }));
        assert_eq!(playing_count(&cmds, &mut playing), 0);

        let cmds = audio.audio_ready(clip(b));
        assert_eq!(playing_count(&cmds, &mut playing), 1);
        assert_eq!(playing, Some(b));
        assert!(audio.cached_audio(a).is_none());
        assert!(audio.cached_audio(b).is_some());
    }

    #[test]
    fn stale_audio_is_ignored() {
        let mut audio = AudioCoordinator::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        audio.toggle(a);
        audio.toggle(b);
        assert!(audio.audio_ready(clip(a)).is_empty());
        assert!(audio.is_loading(b));
    }

    #[test]
    fn never_two_clips_playing_across_random_sequences() {
        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        let mut audio = AudioCoordinator::new();
        let mut playing = None;
        // A fixed interleaving of presses, arrivals, pauses and endings.
        let script = [0, 1, 10, 2, 11, 12, 20, 0, 10, 21, 30, 1, 11, 22, 30, 31];
        for step in script {
            let cmds = match step {
                0..=2 => audio.toggle(ids[step]),
                10..=12 => audio.audio_ready(clip(ids[step - 10])),
                20..=22 => {
                    audio.ended(ids[step - 20]);
                    if playing == Some(ids[step - 20]) {
                        playing = None;
                    }
                    Vec::new()
                }
                30 => audio.pause(),
                _ => audio.resume(),
            };
            assert!(playing_count(&cmds, &mut playing) <= 1);
        }
    }

    #[test]
    fn autoplay_interrupts_the_current_clip() {
        let mut audio = AudioCoordinator::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let mut playing = None;
        playing_count(&audio.toggle(a), &mut playing);
        playing_count(&audio.audio_ready(clip(a)), &mut playing);

        let cmds = audio.autoplay(clip(b));
        assert_eq!(cmds[0], AudioCommand::Stop { message_id: a });
        assert_eq!(playing_count(&cmds, &mut playing), 1);
        assert!(audio.is_playing(b));
    }

    #[test]
    fn ended_and_failed_return_to_idle() {
        let mut audio = AudioCoordinator::new();
        let id = Uuid::new_v4();
        audio.toggle(id);
        audio.audio_failed(id);
        assert_eq!(audio.state(), AudioState::Idle);
        assert_eq!(audio.current_message(), None);

        audio.toggle(id);
        audio.audio_ready(clip(id));
        audio.ended(id);
        assert_eq!(audio.state(), AudioState::Idle);
        assert!(audio.cached_audio(id).is_none());
    }
}
