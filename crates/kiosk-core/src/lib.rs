#![forbid(unsafe_code)]

//! Core: input events, clocks, and the canonical activity signal.
//!
//! # Role in the kiosk core
//! `kiosk-core` is the input layer. The host translates platform events into
//! [`event::InputEvent`] values; [`activity::UserActivityBroadcaster`] turns
//! the activity kinds into one canonical signal; [`clock::Clock`] supplies
//! the single notion of "now" that the runtime schedules against.
//!
//! # How it fits in the system
//! `kiosk-runtime` (ticks, countdowns, idle session) and `kiosk-widgets`
//! (focus, traps, speech) both consume these types, and neither depends on
//! the other except through the [`gate::WarningGate`] capability defined here.

pub mod activity;
pub mod clock;
pub mod event;
pub mod fault;
pub mod gate;

pub use activity::{ActivitySignal, ActivitySubscription, UserActivityBroadcaster};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{ElementId, InputEvent, InputKind, KeyCode, KeyEvent, Millis, Modifiers};
pub use fault::{CallbackFault, isolate};
pub use gate::{OpenGate, WarningGate};
