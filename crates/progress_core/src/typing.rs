//! crates/progress_core/src/typing.rs
//!
//! Simulated streaming. A reply arrives from the model as one finished string;
//! `TypingEffect` reveals it a few characters at a time so a client can render
//! it as if it were being typed.

use std::time::Duration;

/// Glyph appended to the visible text while the reveal is still running.
pub const CURSOR: char = '▋';

/// Texts shorter than this are always shown whole.
pub const MIN_ANIMATED_CHARS: usize = 20;

/// Rates at or above this many words per minute are too fast to be worth animating.
pub const INSTANT_WPM: u32 = 10_000;

/// The shortest delay between two frames. Faster rates reveal several
/// characters per frame instead.
pub const MIN_TICK: Duration = Duration::from_millis(16);

/// Average characters per word, spaces included.
const CHARS_PER_WORD: f64 = 5.0;

/// Picks a reveal speed from the text length. Short replies are typed fast,
/// long ones slower so the reader can follow.
pub fn words_per_minute(char_count: usize) -> u32 {
    match char_count {
        n if n < 100 => 25_000,
        n if n < 300 => 20_000,
        n if n < 800 => 10_000,
        n if n < 1500 => 5_000,
        _ => 3_000,
    }
}

pub fn chars_per_second(wpm: u32) -> f64 {
    f64::from(wpm) * CHARS_PER_WORD / 60.0
}

/// Delay between two revealed characters.
pub fn char_interval(wpm: u32) -> Duration {
    Duration::from_secs_f64(1.0 / chars_per_second(wpm))
}

/// One rendering of the partially revealed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The revealed prefix, without the cursor.
    pub visible: String,
    pub complete: bool,
}

impl Frame {
    /// The text as it should be displayed, cursor included while typing.
    pub fn rendered(&self) -> String {
        if self.complete {
            self.visible.clone()
        } else {
            let mut out = String::with_capacity(self.visible.len() + CURSOR.len_utf8());
            out.push_str(&self.visible);
            out.push(CURSOR);
            out
        }
    }
}

/// Iterator over the frames of one reveal.
///
/// Every frame extends the previous one; the last frame holds the full text
/// and is marked complete. An empty text yields nothing.
#[derive(Debug, Clone)]
pub struct TypingEffect {
    text: String,
    /// Byte offsets of every char boundary after the first char.
    boundaries: Vec<usize>,
    revealed: usize,
    chars_per_frame: usize,
    tick: Duration,
    finished: bool,
}

impl TypingEffect {
    /// Plans the reveal of `text`. Messages that are not the most recent one
    /// are shown immediately.
    pub fn new(text: impl Into<String>, is_latest: bool) -> Self {
        let text = text.into();
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, c)| i + c.len_utf8())
            .collect();
        let char_count = boundaries.len();
        let wpm = words_per_minute(char_count);

        let instant = !is_latest || char_count < MIN_ANIMATED_CHARS || wpm >= INSTANT_WPM;
        let (chars_per_frame, tick) = if instant {
            (char_count.max(1), Duration::ZERO)
        } else {
            frame_schedule(char_interval(wpm))
        };

        Self {
            finished: text.is_empty(),
            text,
            boundaries,
            revealed: 0,
            chars_per_frame,
            tick,
        }
    }

    /// True when the whole text is delivered in a single frame.
    pub fn is_instant(&self) -> bool {
        self.chars_per_frame >= self.boundaries.len()
    }

    /// Delay the driver should wait between frames.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    pub fn chars_per_frame(&self) -> usize {
        self.chars_per_frame
    }

    /// Number of frames this effect will yield in total.
    pub fn frame_count(&self) -> usize {
        self.boundaries.len().div_ceil(self.chars_per_frame)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Stretches the per-character interval to at least `MIN_TICK`, batching
/// characters so the overall duration stays the same.
fn frame_schedule(per_char: Duration) -> (usize, Duration) {
    if per_char >= MIN_TICK {
        return (1, per_char);
    }
    let per_char_secs = per_char.as_secs_f64().max(f64::EPSILON);
    let batch = (MIN_TICK.as_secs_f64() / per_char_secs).ceil() as usize;
    (batch, per_char.mul_f64(batch as f64))
}

impl Iterator for TypingEffect {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.finished {
            return None;
        }
        self.revealed = (self.revealed + self.chars_per_frame).min(self.boundaries.len());
        let end = self.boundaries[self.revealed - 1];
        let complete = self.revealed == self.boundaries.len();
        self.finished = complete;
        Some(Frame {
            visible: self.text[..end].to_string(),
            complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text(chars: usize) -> String {
        "abcdefghij".chars().cycle().take(chars).collect()
    }

    #[test]
    fn rate_tiers_follow_length() {
        assert_eq!(words_per_minute(0), 25_000);
        assert_eq!(words_per_minute(99), 25_000);
        assert_eq!(words_per_minute(100), 20_000);
        assert_eq!(words_per_minute(299), 20_000);
        assert_eq!(words_per_minute(300), 10_000);
        assert_eq!(words_per_minute(799), 10_000);
        assert_eq!(words_per_minute(800), 5_000);
        assert_eq!(words_per_minute(1499), 5_000);
        assert_eq!(words_per_minute(1500), 3_000);
    }

    #[test]
    fn interval_matches_rate() {
        // 3000 wpm -> 250 chars per second -> 4ms per char.
        assert_eq!(char_interval(3_000), Duration::from_millis(4));
    }

    #[test]
    fn short_text_is_shown_at_once() {
        let frames: Vec<_> = TypingEffect::new("hello there", true).collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].visible, "hello there");
        assert!(frames[0].complete);
        assert_eq!(frames[0].rendered(), "hello there");
    }

    #[test]
    fn medium_text_is_fast_enough_to_skip() {
        let effect = TypingEffect::new(long_text(500), true);
        assert!(effect.is_instant());
        assert_eq!(effect.count(), 1);
    }

    #[test]
    fn older_messages_are_never_animated() {
        let effect = TypingEffect::new(long_text(2_000), false);
        assert!(effect.is_instant());
        let frames: Vec<_> = effect.collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].complete);
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert_eq!(TypingEffect::new("", true).count(), 0);
    }

    #[test]
    fn long_text_reveals_full_text_exactly_once_and_stops() {
        let text = long_text(1_000);
        let mut effect = TypingEffect::new(text.clone(), true);
        assert!(!effect.is_instant());
        assert!(effect.tick() >= MIN_TICK);
        let expected = effect.frame_count();

        let frames: Vec<_> = effect.by_ref().collect();
        assert_eq!(frames.len(), expected);
        assert_eq!(frames.iter().filter(|f| f.complete).count(), 1);
        assert!(frames.last().is_some_and(|f| f.complete && f.visible == text));
        for pair in frames.windows(2) {
            assert!(pair[1].visible.len() > pair[0].visible.len());
            assert!(pair[1].visible.starts_with(&pair[0].visible));
        }
        assert!(effect.next().is_none());
    }

    #[test]
    fn batching_preserves_total_duration() {
        let effect = TypingEffect::new(long_text(1_000), true);
        // 5000 wpm -> 2.4ms per char, batched up to the minimum tick.
        let per_char = char_interval(5_000);
        let total = effect.tick().mul_f64(effect.frame_count() as f64);
        let ideal = per_char.mul_f64(1_000.0);
        let slack = effect.tick();
        assert!(total >= ideal);
        assert!(total <= ideal + slack);
    }

    #[test]
    fn cursor_only_while_incomplete() {
        let mut effect = TypingEffect::new(long_text(900), true);
        let first = effect.next().unwrap();
        assert!(!first.complete);
        assert!(first.rendered().ends_with(CURSOR));
        let last = effect.last().unwrap();
        assert!(!last.rendered().ends_with(CURSOR));
    }

    #[test]
    fn multibyte_text_is_split_on_char_boundaries() {
        let text: String = "héllo wörld ✨ ".chars().cycle().take(1_600).collect();
        let frames: Vec<_> = TypingEffect::new(text.clone(), true).collect();
        assert!(frames.len() > 1);
        assert_eq!(frames.last().unwrap().visible, text);
    }
}
