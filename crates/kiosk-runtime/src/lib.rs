#![forbid(unsafe_code)]

//! Kiosk Runtime
//!
//! Time-driven coordination for the kiosk core.
//!
//! # Key Components
//!
//! - [`TickScheduler`] - One shared timer per granularity, fanned out to subscribers
//! - [`CountdownEngine`] - Anchor-based countdown with exactly-once timeout
//! - [`IdleSessionController`] - Active → Warning → Expired session state machine
//! - [`KioskConfig`] - Tunables loaded from TOML or JSON
//!
//! # Role in the kiosk core
//! `kiosk-runtime` owns every notion of elapsed time. It consumes the clock
//! and the canonical activity signal from `kiosk-core`; the facade crate wires
//! its callbacks into focus, modals and speech.

pub mod config;
pub mod countdown;
pub mod idle;
pub mod scheduler;

pub use config::{ConfigError, KioskConfig};
pub use countdown::{
    CountdownConfig, CountdownControl, CountdownEngine, CountdownSnapshot, Precision,
};
pub use idle::{IdleConfig, IdlePhase, IdleSessionController, WarningNotice, format_remaining};
pub use scheduler::{MIN_GRANULARITY_MS, TickHandle, TickScheduler};
