#![forbid(unsafe_code)]

//! Focus: element registry, traversal, and traps.
//!
//! There is exactly one [`FocusCursor`] per kiosk. Navigation and traps
//! move it and report a [`FocusChange`]; the caller forwards that change to
//! speech.

pub mod navigation;
pub mod registry;
pub mod trap;

use kiosk_core::event::ElementId;

pub use navigation::{Direction, FocusNavigator, compute_focusable, group_step, linear_step};
pub use registry::{ElementKind, ElementRegistry, ElementSpec, GroupMarker};
pub use trap::FocusTrap;

/// Focus moved from `from` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FocusChange {
    pub from: Option<ElementId>,
    pub to: ElementId,
}

/// Result of offering a key to a focus handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not a key this handler deals with; let it propagate.
    Ignored,
    /// Handled (default action suppressed), with the resulting move if any.
    Consumed(Option<FocusChange>),
}

impl KeyOutcome {
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(self, Self::Consumed(_))
    }

    #[must_use]
    pub fn change(self) -> Option<FocusChange> {
        match self {
            Self::Consumed(change) => change,
            Self::Ignored => None,
        }
    }
}

/// The single focus cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusCursor {
    current: Option<ElementId>,
}

impl FocusCursor {
    #[must_use]
    pub fn at(current: Option<ElementId>) -> Self {
        Self { current }
    }

    #[must_use]
    pub fn current(&self) -> Option<ElementId> {
        self.current
    }

    /// Move focus. Returns `None` if `to` already has focus.
    pub fn focus(&mut self, to: ElementId) -> Option<FocusChange> {
        if self.current == Some(to) {
            return None;
        }
        let from = self.current.replace(to);
        tracing::debug!(?from, to, "focus");
        Some(FocusChange { from, to })
    }

    pub fn blur(&mut self) -> Option<ElementId> {
        self.current.take()
    }

    /// Drop focus if the focused element is no longer mounted.
    pub fn revalidate(&mut self, registry: &ElementRegistry) -> bool {
        match self.current {
            Some(id) if !registry.contains(id) => {
                self.current = None;
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}
