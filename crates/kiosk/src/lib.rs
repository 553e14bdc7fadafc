#![forbid(unsafe_code)]

//! Kiosk coordination core: public facade.
//!
//! Re-exports the types a host needs and provides [`KioskShell`], which
//! wires the scheduler, idle session, focus, modals and speech together.
//!
//! ```no_run
//! use std::rc::Rc;
//! use kiosk::prelude::*;
//!
//! let mut shell = KioskShell::new(Rc::new(SystemClock), MemoryAudio::new());
//! let events = shell.pump();
//! assert!(events.is_empty());
//! ```

pub mod error;
pub mod logging;
pub mod shell;

// --- Core re-exports -------------------------------------------------------

pub use kiosk_core::{
    ActivitySignal, CallbackFault, Clock, ElementId, InputEvent, InputKind, KeyCode, KeyEvent,
    ManualClock, Millis, Modifiers, SystemClock, UserActivityBroadcaster, WarningGate,
};

// --- Runtime re-exports ----------------------------------------------------

pub use kiosk_runtime::{
    ConfigError, CountdownConfig, CountdownEngine, CountdownSnapshot, IdleConfig, IdlePhase,
    IdleSessionController, KioskConfig, Precision, TickScheduler, WarningNotice,
    format_remaining,
};

// --- Widget re-exports -----------------------------------------------------

pub use kiosk_widgets::{
    Announcement, AudioError, AudioOutput, ElementRegistry, ElementSpec, FocusChange, FocusCursor,
    MemoryAudio, ModalFocusStack, ModalKind, SpeechCoordinator,
};

pub use error::{DegradationAction, Error, Result};
pub use shell::{InputResult, KioskShell, ShellEvent};

/// Everything a host usually needs.
pub mod prelude {
    pub use crate::error::{DegradationAction, Error, Result};
    pub use crate::shell::{InputResult, KioskShell, ShellEvent};
    pub use kiosk_core::{
        Clock, ElementId, InputEvent, InputKind, KeyCode, KeyEvent, ManualClock, Millis,
        Modifiers, SystemClock,
    };
    pub use kiosk_runtime::{IdlePhase, KioskConfig};
    pub use kiosk_widgets::{AudioError, AudioOutput, ElementSpec, MemoryAudio, ModalKind};
}
