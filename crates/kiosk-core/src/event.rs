#![forbid(unsafe_code)]

//! Canonical input event types.
//!
//! The host application translates whatever its platform delivers (browser
//! events, touch-panel reports, a keypad driver) into [`InputEvent`] values
//! and feeds them to the coordination core in arrival order.
//!
//! # Design Notes
//!
//! - Timestamps are epoch milliseconds ([`Millis`]), matching the clock the
//!   tick scheduler runs on.
//! - `target` names the element the event was dispatched to, if any.
//! - `Modifiers` use bitflags for easy combination.

use bitflags::bitflags;

/// Milliseconds, either a duration or an epoch timestamp.
pub type Millis = u64;

/// Handle for an element mounted in the element registry.
pub type ElementId = u64;

/// Raw input kinds the core understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Key pressed.
    KeyDown,
    /// Key released.
    KeyUp,
    /// Mouse or pen button pressed.
    PointerDown,
    /// Mouse or pen button released.
    PointerUp,
    /// Finger touched the panel.
    TouchStart,
    /// Finger left the panel.
    TouchEnd,
    /// Activation (click or tap) on an element.
    Click,
    /// Pointer entered an element without pressing.
    PointerOver,
    /// An element received focus through some external path.
    FocusIn,
}

impl InputKind {
    /// Every kind, in declaration order.
    pub const ALL: [InputKind; 9] = [
        InputKind::KeyDown,
        InputKind::KeyUp,
        InputKind::PointerDown,
        InputKind::PointerUp,
        InputKind::TouchStart,
        InputKind::TouchEnd,
        InputKind::Click,
        InputKind::PointerOver,
        InputKind::FocusIn,
    ];

    /// Stable event-type name, as reported in activity signals and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeyDown => "keydown",
            Self::KeyUp => "keyup",
            Self::PointerDown => "pointerdown",
            Self::PointerUp => "pointerup",
            Self::TouchStart => "touchstart",
            Self::TouchEnd => "touchend",
            Self::Click => "click",
            Self::PointerOver => "pointerover",
            Self::FocusIn => "focusin",
        }
    }

    /// Whether this kind counts as deliberate user activity.
    ///
    /// Hover and focus changes never count.
    #[must_use]
    pub const fn is_activity(self) -> bool {
        matches!(
            self,
            Self::KeyDown
                | Self::KeyUp
                | Self::PointerDown
                | Self::PointerUp
                | Self::TouchStart
                | Self::TouchEnd
                | Self::Click
        )
    }

    /// Whether this kind unlocks audio playback (first-interaction gate).
    #[must_use]
    pub const fn is_engagement(self) -> bool {
        matches!(
            self,
            Self::KeyDown | Self::PointerDown | Self::TouchStart | Self::Click
        )
    }
}

/// A raw input event as delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// What happened.
    pub kind: InputKind,
    /// When it happened (epoch ms).
    pub timestamp: Millis,
    /// Key payload for `KeyDown` / `KeyUp`.
    pub key: Option<KeyEvent>,
    /// Element the event was dispatched to.
    pub target: Option<ElementId>,
}

impl InputEvent {
    /// Create an event with no key payload and no target.
    #[must_use]
    pub const fn new(kind: InputKind, timestamp: Millis) -> Self {
        Self {
            kind,
            timestamp,
            key: None,
            target: None,
        }
    }

    /// Key press at `timestamp`.
    #[must_use]
    pub const fn key_down(key: KeyEvent, timestamp: Millis) -> Self {
        Self {
            kind: InputKind::KeyDown,
            timestamp,
            key: Some(key),
            target: None,
        }
    }

    /// Attach a target element.
    #[must_use]
    pub const fn with_target(mut self, target: ElementId) -> Self {
        self.target = Some(target);
        self
    }
}

/// A keyboard event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// The key code that was pressed.
    pub code: KeyCode,

    /// Modifier keys held during the event.
    pub modifiers: Modifiers,
}

impl KeyEvent {
    /// Create a new key event with no modifiers.
    #[must_use]
    pub const fn new(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: Modifiers::NONE,
        }
    }

    /// Create a key event with modifiers.
    #[must_use]
    pub const fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    /// Check if Shift modifier is held.
    #[must_use]
    pub const fn shift(&self) -> bool {
        self.modifiers.contains(Modifiers::SHIFT)
    }

    /// Tab in the backward direction: `BackTab`, or `Tab` with Shift held.
    #[must_use]
    pub const fn is_back_tab(&self) -> bool {
        matches!(self.code, KeyCode::BackTab)
            || (matches!(self.code, KeyCode::Tab) && self.shift())
    }

    /// Tab in either direction.
    #[must_use]
    pub const fn is_tab(&self) -> bool {
        matches!(self.code, KeyCode::Tab | KeyCode::BackTab)
    }
}

/// Key codes relevant to kiosk navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    /// A regular character key.
    Char(char),

    /// Enter/Return key.
    Enter,

    /// Escape key.
    Escape,

    /// Tab key.
    Tab,

    /// Shift+Tab (back-tab).
    BackTab,

    /// Up arrow key.
    Up,

    /// Down arrow key.
    Down,

    /// Left arrow key.
    Left,

    /// Right arrow key.
    Right,
}

bitflags! {
    /// Modifier keys that can be held during a key event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Modifiers: u8 {
        /// No modifiers.
        const NONE  = 0b0000;
        /// Shift key.
        const SHIFT = 0b0001;
        /// Alt/Option key.
        const ALT   = 0b0010;
        /// Control key.
        const CTRL  = 0b0100;
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::NONE
    }
}
