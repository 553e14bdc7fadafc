#![forbid(unsafe_code)]

//! Focus trap: Tab and Shift+Tab cycle inside one scope.
//!
//! # Invariants
//!
//! 1. While active, Tab on the last candidate focuses the first and
//!    Shift+Tab on the first focuses the last.
//! 2. A current element outside the scope enters at the first (Tab) or last
//!    (Shift+Tab) candidate.
//! 3. Candidates are recomputed on every key, so elements mounted or
//!    disabled while the trap is up are honored immediately.
//!
//! # Failure Modes
//!
//! - An empty scope (or one that was unmounted) consumes Tab and moves
//!   nothing.
//! - An inactive trap ignores every key.

use kiosk_core::event::{ElementId, KeyEvent};

use super::navigation::compute_focusable;
use super::registry::ElementRegistry;
use super::{FocusChange, FocusCursor, KeyOutcome};

/// Tab-cycling constraint over a scope root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FocusTrap {
    scope: Option<ElementId>,
    active: bool,
}

impl FocusTrap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trap Tab inside `scope`.
    pub fn activate(&mut self, scope: ElementId) {
        self.scope = Some(scope);
        self.active = true;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.scope = None;
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[must_use]
    pub fn scope(&self) -> Option<ElementId> {
        if self.active { self.scope } else { None }
    }

    fn candidates(&self, registry: &ElementRegistry) -> Vec<ElementId> {
        match self.scope() {
            Some(scope) => compute_focusable(registry, Some(scope)),
            None => Vec::new(),
        }
    }

    /// Handle Tab / Shift+Tab.
    pub fn handle_key(
        &self,
        registry: &ElementRegistry,
        cursor: &mut FocusCursor,
        key: &KeyEvent,
    ) -> KeyOutcome {
        if !self.active || !key.is_tab() {
            return KeyOutcome::Ignored;
        }
        let set = self.candidates(registry);
        let Some(last) = set.len().checked_sub(1) else {
            return KeyOutcome::Consumed(None);
        };
        let pos = cursor
            .current()
            .and_then(|c| set.iter().position(|id| *id == c));
        let target = if key.is_back_tab() {
            match pos {
                Some(0) | None => set[last],
                Some(i) => set[i - 1],
            }
        } else {
            match pos {
                Some(i) if i < last => set[i + 1],
                _ => set[0],
            }
        };
        KeyOutcome::Consumed(cursor.focus(target))
    }

    /// Focus the first candidate.
    pub fn focus_first(&self, registry: &ElementRegistry, cursor: &mut FocusCursor) -> Option<FocusChange> {
        let first = self.candidates(registry).first().copied()?;
        cursor.focus(first)
    }

    /// Focus the last candidate.
    pub fn focus_last(&self, registry: &ElementRegistry, cursor: &mut FocusCursor) -> Option<FocusChange> {
        let last = self.candidates(registry).last().copied()?;
        cursor.focus(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::registry::ElementSpec;
    use kiosk_core::event::{KeyCode, Modifiers};

    fn tab() -> KeyEvent {
        KeyEvent::new(KeyCode::Tab)
    }

    fn shift_tab() -> KeyEvent {
        KeyEvent::new(KeyCode::Tab).with_modifiers(Modifiers::SHIFT)
    }

    fn scope_of_three() -> (ElementRegistry, ElementId, [ElementId; 3], ElementId) {
        let mut reg = ElementRegistry::new();
        let outside = reg.mount_root(ElementSpec::interactive("outside"));
        let scope = reg.mount_root(ElementSpec::container());
        let a = reg.mount(scope, ElementSpec::interactive("a")).unwrap();
        let b = reg.mount(scope, ElementSpec::interactive("b")).unwrap();
        let c = reg.mount(scope, ElementSpec::interactive("c")).unwrap();
        (reg, scope, [a, b, c], outside)
    }

    #[test]
    fn tab_wraps_last_to_first() {
        let (reg, scope, [a, b, c], _) = scope_of_three();
        let mut trap = FocusTrap::new();
        trap.activate(scope);
        let mut cursor = FocusCursor::at(Some(c));
        let out = trap.handle_key(&reg, &mut cursor, &tab());
        assert_eq!(out.change(), Some(FocusChange { from: Some(c), to: a }));
        trap.handle_key(&reg, &mut cursor, &tab());
        assert_eq!(cursor.current(), Some(b));
    }

    #[test]
    fn shift_tab_wraps_first_to_last() {
        let (reg, scope, [a, b, c], _) = scope_of_three();
        let mut trap = FocusTrap::new();
        trap.activate(scope);
        let mut cursor = FocusCursor::at(Some(a));
        trap.handle_key(&reg, &mut cursor, &shift_tab());
        assert_eq!(cursor.current(), Some(c));
        trap.handle_key(&reg, &mut cursor, &KeyEvent::new(KeyCode::BackTab));
        assert_eq!(cursor.current(), Some(b));
    }

    #[test]
    fn outside_focus_enters_at_edges() {
        let (reg, scope, [a, _, c], outside) = scope_of_three();
        let mut trap = FocusTrap::new();
        trap.activate(scope);

        let mut cursor = FocusCursor::at(Some(outside));
        trap.handle_key(&reg, &mut cursor, &tab());
        assert_eq!(cursor.current(), Some(a));

        let mut cursor = FocusCursor::at(Some(outside));
        trap.handle_key(&reg, &mut cursor, &shift_tab());
        assert_eq!(cursor.current(), Some(c));
    }

    #[test]
    fn inactive_trap_ignores_tab() {
        let (reg, scope, [a, ..], _) = scope_of_three();
        let mut trap = FocusTrap::new();
        let mut cursor = FocusCursor::at(Some(a));
        assert_eq!(trap.handle_key(&reg, &mut cursor, &tab()), KeyOutcome::Ignored);
        trap.activate(scope);
        trap.deactivate();
        assert_eq!(trap.handle_key(&reg, &mut cursor, &tab()), KeyOutcome::Ignored);
        assert_eq!(cursor.current(), Some(a));
    }

    #[test]
    fn empty_scope_consumes_without_moving() {
        let mut reg = ElementRegistry::new();
        let scope = reg.mount_root(ElementSpec::container());
        let mut trap = FocusTrap::new();
        trap.activate(scope);
        let mut cursor = FocusCursor::default();
        assert_eq!(
            trap.handle_key(&reg, &mut cursor, &tab()),
            KeyOutcome::Consumed(None)
        );
        assert_eq!(trap.focus_first(&reg, &mut cursor), None);
    }

    #[test]
    fn recomputes_after_disable() {
        let (mut reg, scope, [a, b, c], _) = scope_of_three();
        let mut trap = FocusTrap::new();
        trap.activate(scope);
        let mut cursor = FocusCursor::at(Some(a));
        reg.update(b, |s| s.disabled = true);
        trap.handle_key(&reg, &mut cursor, &tab());
        assert_eq!(cursor.current(), Some(c));
    }

    #[test]
    fn focus_first_and_last() {
        let (reg, scope, [a, _, c], _) = scope_of_three();
        let mut trap = FocusTrap::new();
        trap.activate(scope);
        let mut cursor = FocusCursor::default();
        assert_eq!(trap.focus_last(&reg, &mut cursor).map(|f| f.to), Some(c));
        assert_eq!(trap.focus_first(&reg, &mut cursor).map(|f| f.to), Some(a));
    }
}
