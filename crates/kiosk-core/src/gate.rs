#![forbid(unsafe_code)]

//! Warning-suppression capability.
//!
//! The idle session controller never inspects modal or screen state itself.
//! It is handed a [`WarningGate`] at construction; the modal subsystem owns
//! the implementation and is the only writer.

/// Read-only view of whether an idle warning may be raised or spoken.
pub trait WarningGate {
    /// A warning UI is already on screen; do not raise another.
    fn warning_visible(&self) -> bool;

    /// The entry screen is showing; raise the warning silently.
    fn on_entry_screen(&self) -> bool;
}

/// A gate that never suppresses anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenGate;

impl WarningGate for OpenGate {
    fn warning_visible(&self) -> bool {
        false
    }

    fn on_entry_screen(&self) -> bool {
        false
    }
}
