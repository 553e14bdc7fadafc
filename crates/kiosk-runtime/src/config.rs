#![forbid(unsafe_code)]

//! Kiosk configuration as data.
//!
//! One [`KioskConfig`] holds every tunable of the coordination core and can
//! be loaded from TOML or JSON at startup.
//!
//! ```toml
//! # kiosk.toml
//! [idle]
//! duration_ms = 120000
//! warning_threshold_ms = 20000
//!
//! [auto_advance]
//! duration_ms = 30000
//! precision = "s"
//!
//! [speech]
//! enabled = true
//! ```
//!
//! Millisecond fields are signed so that a negative value in a hand-edited
//! file parses and is then clamped, instead of failing the whole load.
//! Only I/O and syntax problems surface as [`ConfigError`].

use std::path::Path;

use kiosk_core::event::Millis;
use serde::{Deserialize, Serialize};

use crate::countdown::{CountdownConfig, DEFAULT_COUNTDOWN_MS, Precision};
use crate::idle::{
    DEFAULT_IDLE_DURATION_MS, DEFAULT_IDLE_GRANULARITY_MS, DEFAULT_RESET_COLLAPSE_WINDOW_MS,
    DEFAULT_WARNING_THRESHOLD_MS, IdleConfig,
};
use crate::scheduler::MIN_GRANULARITY_MS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub idle: IdlePolicyConfig,
    pub auto_advance: AutoAdvancePolicyConfig,
    pub speech: SpeechPolicyConfig,
    pub shell: ShellPolicyConfig,
}

/// `[idle]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdlePolicyConfig {
    pub duration_ms: i64,
    pub warning_threshold_ms: i64,
    pub enabled: bool,
    pub reset_on_user_activity: bool,
    pub reset_collapse_window_ms: i64,
    pub granularity_ms: i64,
}

impl Default for IdlePolicyConfig {
    fn default() -> Self {
        let d = IdleConfig::default();
        Self {
            duration_ms: d.duration_ms as i64,
            warning_threshold_ms: d.warning_threshold_ms as i64,
            enabled: d.enabled,
            reset_on_user_activity: d.reset_on_user_activity,
            reset_collapse_window_ms: d.reset_collapse_window_ms as i64,
            granularity_ms: d.granularity_ms as i64,
        }
    }
}

/// `[auto_advance]` section: defaults for screens that move on by themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoAdvancePolicyConfig {
    pub duration_ms: i64,
    pub precision: Precision,
    pub restart_on_timeout: bool,
}

impl Default for AutoAdvancePolicyConfig {
    fn default() -> Self {
        Self {
            duration_ms: DEFAULT_COUNTDOWN_MS as i64,
            precision: Precision::Seconds,
            restart_on_timeout: false,
        }
    }
}

/// `[speech]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechPolicyConfig {
    pub enabled: bool,
    /// Stay silent until the first key, pointer, touch or click.
    pub require_interaction: bool,
    /// Joins group text and element text.
    pub separator: String,
}

impl Default for SpeechPolicyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            require_interaction: true,
            separator: ", ".into(),
        }
    }
}

/// `[shell]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellPolicyConfig {
    /// Screen the kiosk returns to on idle expiry.
    pub entry_screen: String,
}

impl Default for ShellPolicyConfig {
    fn default() -> Self {
        Self {
            entry_screen: "welcome".into(),
        }
    }
}

/// Negative or zero becomes `fallback`.
fn positive_ms(field: &'static str, value: i64, fallback: Millis) -> Millis {
    if value <= 0 {
        tracing::warn!(field, value, fallback, "non-positive duration clamped");
        fallback
    } else {
        value as Millis
    }
}

/// Negative becomes `fallback`; zero is allowed.
fn non_negative_ms(field: &'static str, value: i64, fallback: Millis) -> Millis {
    if value < 0 {
        tracing::warn!(field, value, fallback, "negative duration clamped");
        fallback
    } else {
        value as Millis
    }
}

impl KioskConfig {
    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    /// Load from a TOML file on disk.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_toml_str(&content)
    }

    /// Load from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    /// Load from a JSON file on disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;
        Self::from_json_str(&content)
    }

    /// Load by extension: `.json` is JSON, anything else TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Problems that will be clamped at conversion time. An empty list means
    /// the config is used as written.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let idle = &self.idle;

        if idle.duration_ms <= 0 {
            errors.push(format!("idle.duration_ms must be > 0, got {}", idle.duration_ms));
        }
        if idle.warning_threshold_ms < 0 {
            errors.push(format!(
                "idle.warning_threshold_ms must be >= 0, got {}",
                idle.warning_threshold_ms
            ));
        }
        if idle.duration_ms > 0 && idle.warning_threshold_ms >= idle.duration_ms {
            errors.push(format!(
                "idle.warning_threshold_ms ({}) must be below idle.duration_ms ({}); no warning phase",
                idle.warning_threshold_ms, idle.duration_ms
            ));
        }
        if idle.reset_collapse_window_ms < 0 {
            errors.push(format!(
                "idle.reset_collapse_window_ms must be >= 0, got {}",
                idle.reset_collapse_window_ms
            ));
        }
        if idle.granularity_ms < MIN_GRANULARITY_MS as i64 {
            errors.push(format!(
                "idle.granularity_ms must be >= {MIN_GRANULARITY_MS}, got {}",
                idle.granularity_ms
            ));
        }
        if self.auto_advance.duration_ms <= 0 {
            errors.push(format!(
                "auto_advance.duration_ms must be > 0, got {}",
                self.auto_advance.duration_ms
            ));
        }
        if self.shell.entry_screen.trim().is_empty() {
            errors.push("shell.entry_screen must not be empty".into());
        }

        errors
    }

    /// Build the idle controller config, clamping invalid values.
    #[must_use]
    pub fn to_idle_config(&self) -> IdleConfig {
        let idle = &self.idle;
        IdleConfig {
            duration_ms: positive_ms("idle.duration_ms", idle.duration_ms, DEFAULT_IDLE_DURATION_MS),
            warning_threshold_ms: non_negative_ms(
                "idle.warning_threshold_ms",
                idle.warning_threshold_ms,
                DEFAULT_WARNING_THRESHOLD_MS,
            ),
            enabled: idle.enabled,
            reset_on_user_activity: idle.reset_on_user_activity,
            reset_collapse_window_ms: non_negative_ms(
                "idle.reset_collapse_window_ms",
                idle.reset_collapse_window_ms,
                DEFAULT_RESET_COLLAPSE_WINDOW_MS,
            ),
            granularity_ms: positive_ms(
                "idle.granularity_ms",
                idle.granularity_ms,
                DEFAULT_IDLE_GRANULARITY_MS,
            ),
        }
        .sanitized()
    }

    /// Countdown config for an auto-advance screen.
    #[must_use]
    pub fn to_auto_advance_config(&self) -> CountdownConfig {
        let a = &self.auto_advance;
        CountdownConfig::new(positive_ms(
            "auto_advance.duration_ms",
            a.duration_ms,
            DEFAULT_COUNTDOWN_MS,
        ))
        .precision(a.precision)
        .restart_on_timeout(a.restart_on_timeout)
    }

    /// Entry screen name, falling back to the default when blank.
    #[must_use]
    pub fn entry_screen(&self) -> String {
        let name = self.shell.entry_screen.trim();
        if name.is_empty() {
            tracing::warn!("blank shell.entry_screen; using default");
            ShellPolicyConfig::default().entry_screen
        } else {
            name.to_string()
        }
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

/// Errors that can occur when loading a configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error reading a file.
    Io(std::io::Error),
    /// TOML parse error.
    Toml(toml::de::Error),
    /// JSON parse error.
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Toml(e) => write!(f, "TOML parse error: {e}"),
            Self::Json(e) => write!(f, "JSON parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Toml(e) => Some(e),
            Self::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
