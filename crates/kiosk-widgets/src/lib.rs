#![forbid(unsafe_code)]

//! Kiosk Widgets
//!
//! Focus and speech for the kiosk core.
//!
//! # Key Components
//!
//! - [`ElementRegistry`] - Host-owned mirror of the interactive element tree
//! - [`FocusNavigator`] - Arrow-key traversal (linear and group-boundary)
//! - [`FocusTrap`] - Tab cycling inside a scope
//! - [`ModalFocusStack`] - Modals with trap, focus restoration, and the idle-warning gate
//! - [`SpeechCoordinator`] - Group-aware announcement dedup over one audio output
//!
//! # Role in the kiosk core
//! Everything here is synchronous and owned by the shell. Nothing in this
//! crate reads the clock; time-driven behavior lives in `kiosk-runtime`.

pub mod focus;
pub mod modal;
pub mod speech;

pub use focus::{
    Direction, ElementKind, ElementRegistry, ElementSpec, FocusChange, FocusCursor,
    FocusNavigator, FocusTrap, GroupMarker, KeyOutcome, compute_focusable,
};
pub use modal::{ModalFocusStack, ModalGate, ModalId, ModalKind, ModalTransition};
pub use speech::{
    Announcement, AudioError, AudioOutput, MemoryAudio, PlaybackState, SpeechConfig,
    SpeechCoordinator,
};
