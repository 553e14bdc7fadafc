#![forbid(unsafe_code)]

//! Spoken feedback for focus and hover.
//!
//! # Resolution
//!
//! For a focused or hovered element the spoken text is
//!
//! ```text
//! [group text + separator, if the group differs from the last one spoken] + element text
//! ```
//!
//! # Invariants
//!
//! 1. One "last group" per coordinator. It is committed only when the audio
//!    output accepted the announcement, so a failed playback repeats the
//!    group text next time.
//! 2. One audio output. A new announcement cancels the one in flight.
//! 3. Nothing is spoken before the first engagement (key, pointer, touch or
//!    click) when interaction is required.
//!
//! # Failure Modes
//!
//! - `AudioOutput::play` errors are logged and kept for
//!   [`SpeechCoordinator::take_dropped`]; playback returns to Idle and the
//!   announcement is not retried.

use std::fmt;

use kiosk_core::event::{ElementId, InputKind};

use crate::focus::registry::ElementRegistry;

/// Failure reported by an audio backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    /// No output device or synthesizer.
    Unavailable,
    /// The backend rejected or aborted playback.
    Playback(String),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "audio output unavailable"),
            Self::Playback(msg) => write!(f, "playback failed: {msg}"),
        }
    }
}

impl std::error::Error for AudioError {}

/// The single audio sink.
pub trait AudioOutput {
    /// Start speaking `text`. Returns once playback has been accepted.
    fn play(&mut self, text: &str) -> Result<(), AudioError>;

    /// Stop whatever is playing.
    fn cancel(&mut self);
}

/// In-memory sink for simulators and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryAudio {
    played: Vec<String>,
    cancels: usize,
    fail_next: Option<AudioError>,
}

impl MemoryAudio {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `play` fail with `error`.
    pub fn fail_next(&mut self, error: AudioError) {
        self.fail_next = Some(error);
    }

    #[must_use]
    pub fn played(&self) -> &[String] {
        &self.played
    }

    #[must_use]
    pub fn cancels(&self) -> usize {
        self.cancels
    }
}

impl AudioOutput for MemoryAudio {
    fn play(&mut self, text: &str) -> Result<(), AudioError> {
        if let Some(err) = self.fail_next.take() {
            return Err(err);
        }
        self.played.push(text.to_string());
        Ok(())
    }

    fn cancel(&mut self) {
        self.cancels += 1;
    }
}

/// Playback state of the single output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing {
        seq: u64,
    },
}

/// An announcement handed to audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub seq: u64,
    pub text: String,
    pub element: Option<ElementId>,
    /// Group text was prefixed.
    pub group_changed: bool,
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub require_interaction: bool,
    pub separator: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_interaction: true,
            separator: ", ".into(),
        }
    }
}

/// Resolves, dedupes and sequences spoken feedback.
#[derive(Debug)]
pub struct SpeechCoordinator<A: AudioOutput> {
    audio: A,
    config: SpeechConfig,
    has_interacted: bool,
    last_group: Option<String>,
    last_hovered: Option<ElementId>,
    state: PlaybackState,
    next_seq: u64,
    failures: u64,
    dropped: Vec<AudioError>,
}

impl<A: AudioOutput> SpeechCoordinator<A> {
    pub fn new(audio: A) -> Self {
        Self::with_config(audio, SpeechConfig::default())
    }

    pub fn with_config(audio: A, config: SpeechConfig) -> Self {
        Self {
            audio,
            config,
            has_interacted: false,
            last_group: None,
            last_hovered: None,
            state: PlaybackState::Idle,
            next_seq: 1,
            failures: 0,
            dropped: Vec::new(),
        }
    }

    /// Feed every raw input kind; engagement kinds open the gate for good.
    pub fn note_interaction(&mut self, kind: InputKind) {
        if kind.is_engagement() && !self.has_interacted {
            tracing::debug!(source = kind.as_str(), "speech unlocked");
            self.has_interacted = true;
        }
    }

    fn may_speak(&self) -> bool {
        self.config.enabled && (self.has_interacted || !self.config.require_interaction)
    }

    /// Announce an element that received focus.
    pub fn on_focus_in(&mut self, registry: &ElementRegistry, id: ElementId) -> Option<Announcement> {
        self.announce_element(registry, id)
    }

    /// Announce a hovered element if the hover qualifies: focusable, has
    /// text, and is not the element hovered last.
    pub fn on_hover(&mut self, registry: &ElementRegistry, id: ElementId) -> Option<Announcement> {
        if self.last_hovered == Some(id) {
            return None;
        }
        let qualifies = registry.is_focusable(id) && registry.get(id).and_then(|s| s.text()).is_some();
        if !qualifies {
            return None;
        }
        self.last_hovered = Some(id);
        self.announce_element(registry, id)
    }

    fn announce_element(&mut self, registry: &ElementRegistry, id: ElementId) -> Option<Announcement> {
        if !self.may_speak() {
            return None;
        }
        let label = registry.get(id)?.text()?.to_string();
        let group = registry.group_tag(id);
        let group_tag = group.map(|g| g.tag.clone());
        let group_changed = group_tag != self.last_group;
        let group_text = group
            .filter(|_| group_changed)
            .map(|g| g.text.trim())
            .filter(|t| !t.is_empty());
        let text = match group_text {
            Some(g) => format!("{g}{}{label}", self.config.separator),
            None => label,
        };
        let prefixed = group_text.is_some();

        let announcement = self.play(text, Some(id), prefixed)?;
        self.last_group = group_tag;
        Some(announcement)
    }

    /// Speak arbitrary text (e.g. an idle warning). Group context is left
    /// untouched.
    pub fn announce_text(&mut self, text: &str) -> Option<Announcement> {
        if !self.may_speak() || text.trim().is_empty() {
            return None;
        }
        self.play(text.to_string(), None, false)
    }

    fn play(&mut self, text: String, element: Option<ElementId>, group_changed: bool) -> Option<Announcement> {
        if let PlaybackState::Playing { seq } = self.state {
            tracing::trace!(superseded = seq, "cancel in-flight announcement");
            self.audio.cancel();
            self.state = PlaybackState::Idle;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        match self.audio.play(&text) {
            Ok(()) => {
                tracing::debug!(seq, ?element, %text, "announce");
                self.state = PlaybackState::Playing { seq };
                Some(Announcement {
                    seq,
                    text,
                    element,
                    group_changed,
                })
            }
            Err(err) => {
                self.failures += 1;
                tracing::warn!(seq, error = %err, "announcement dropped");
                self.dropped.push(err);
                self.state = PlaybackState::Idle;
                None
            }
        }
    }

    /// The backend finished announcement `seq`.
    pub fn playback_finished(&mut self, seq: u64) {
        if self.state == (PlaybackState::Playing { seq }) {
            self.state = PlaybackState::Idle;
        }
    }

    /// Forget group and hover context (screen change, session reset).
    pub fn reset_context(&mut self) {
        self.last_group = None;
        self.last_hovered = None;
        self.stop();
    }

    /// Cancel anything in flight.
    pub fn stop(&mut self) {
        if matches!(self.state, PlaybackState::Playing { .. }) {
            self.audio.cancel();
            self.state = PlaybackState::Idle;
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.stop();
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    #[must_use]
    pub fn has_interacted(&self) -> bool {
        self.has_interacted
    }

    #[must_use]
    pub fn last_group(&self) -> Option<&str> {
        self.last_group.as_deref()
    }

    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Announcements the backend refused.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Drain backend errors recorded since the last call.
    pub fn take_dropped(&mut self) -> Vec<AudioError> {
        std::mem::take(&mut self.dropped)
    }

    #[must_use]
    pub fn audio(&self) -> &A {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut A {
        &mut self.audio
    }
}
