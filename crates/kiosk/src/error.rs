#![forbid(unsafe_code)]

//! Kiosk error model and graceful degradation.
//!
//! # Design Principles
//!
//! 1. **Nothing is fatal**: an unattended kiosk keeps serving. Every variant
//!    maps to a [`DegradationAction`] that keeps the session alive.
//! 2. **Domain errors stay typed**: each subsystem keeps its own error and
//!    the facade wraps it, so callers can match on what matters.
//! 3. **Observability**: [`Error::error_type`] gives a stable label for
//!    tracing fields.

use std::fmt;

use kiosk_core::fault::CallbackFault;
use kiosk_runtime::config::ConfigError;
use kiosk_widgets::speech::AudioError;

// ── Unified Error ───────────────────────────────────────────────────────

/// Top-level error type for the kiosk core.
#[derive(Debug)]
pub enum Error {
    /// Configuration file could not be read or parsed.
    Config(ConfigError),
    /// The audio output refused an announcement.
    Audio(AudioError),
    /// A tick or activity subscriber panicked.
    Callback(CallbackFault),
}

/// Standard result type for kiosk APIs.
pub type Result<T> = std::result::Result<T, Error>;

// ── Graceful Degradation ────────────────────────────────────────────────

/// What the shell does instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationAction {
    /// Fall back to built-in defaults for every tunable.
    UseDefaults,
    /// Drop the announcement; playback returns to idle.
    SkipAnnouncement,
    /// Keep the subscriber registered and the ticker running.
    ContinueTicking,
}

impl Error {
    /// Determine the degradation action for this error.
    #[must_use]
    pub fn degradation(&self) -> DegradationAction {
        match self {
            Self::Config(_) => DegradationAction::UseDefaults,
            Self::Audio(_) => DegradationAction::SkipAnnouncement,
            Self::Callback(_) => DegradationAction::ContinueTicking,
        }
    }

    /// Error type label for tracing.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Audio(_) => "audio",
            Self::Callback(_) => "callback",
        }
    }
}

// ── Display ─────────────────────────────────────────────────────────────

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "config: {err}"),
            Self::Audio(err) => write!(f, "audio: {err}"),
            Self::Callback(fault) => write!(f, "callback: {fault}"),
        }
    }
}

impl fmt::Display for DegradationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UseDefaults => write!(f, "use_defaults"),
            Self::SkipAnnouncement => write!(f, "skip_announcement"),
            Self::ContinueTicking => write!(f, "continue_ticking"),
        }
    }
}

// ── std::error::Error ───────────────────────────────────────────────────

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Audio(err) => Some(err),
            Self::Callback(fault) => Some(fault),
        }
    }
}

// ── From conversions ────────────────────────────────────────────────────

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<AudioError> for Error {
    fn from(err: AudioError) -> Self {
        Self::Audio(err)
    }
}

impl From<CallbackFault> for Error {
    fn from(fault: CallbackFault) -> Self {
        Self::Callback(fault)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Config(ConfigError::Io(err))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
