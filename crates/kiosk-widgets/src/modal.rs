#![forbid(unsafe_code)]

//! Modal stack with focus trapping, focus restoration, and the idle-warning
//! gate.
//!
//! # Invariants
//!
//! 1. **Auto-focus**: opening a modal focuses its first candidate (the modal
//!    frame).
//! 2. **Focus trap**: Tab is constrained to the top modal.
//! 3. **Focus restoration**: closing a modal returns focus to where it was
//!    before that modal opened.
//! 4. **LIFO ordering**: nested modals restore in reverse opening order.
//! 5. **Frame flag**: the root is marked as a modal frame while open and gets
//!    its previous flag back on close.
//!
//! # Failure Modes
//!
//! - If the saved focus target was unmounted or disabled meanwhile, focus
//!   moves to the first focusable element of the context being returned to.
//! - Opening a modal over an unmounted root is refused.
//!
//! # Warning gate
//!
//! [`ModalGate`] is the [`WarningGate`] handed to the idle controller. This
//! stack is its only writer: it tracks whether an idle-warning modal is open
//! and whether the entry screen is showing.

use std::cell::Cell;
use std::rc::Rc;

use kiosk_core::event::{ElementId, KeyEvent};
use kiosk_core::gate::WarningGate;

use crate::focus::{FocusChange, FocusCursor, FocusTrap, KeyOutcome, compute_focusable};
use crate::focus::registry::ElementRegistry;

/// Identifier of an open modal.
pub type ModalId = u64;

/// What a modal is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModalKind {
    Dialog,
    IdleWarning,
}

/// Result of opening or closing a modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModalTransition {
    pub id: ModalId,
    pub root: ElementId,
    pub kind: ModalKind,
    /// Focus movement caused by the transition.
    pub focus: Option<FocusChange>,
}

#[derive(Debug, Clone)]
struct ModalEntry {
    id: ModalId,
    root: ElementId,
    kind: ModalKind,
    return_focus: Option<ElementId>,
    was_modal: bool,
}

/// Shared, read-only view of modal and screen state for the idle controller.
#[derive(Debug, Default)]
pub struct ModalGate {
    warnings_open: Cell<usize>,
    entry_screen: Cell<bool>,
}

impl WarningGate for ModalGate {
    fn warning_visible(&self) -> bool {
        self.warnings_open.get() > 0
    }

    fn on_entry_screen(&self) -> bool {
        self.entry_screen.get()
    }
}

/// Modal stack with integrated focus management.
#[derive(Debug)]
pub struct ModalFocusStack {
    entries: Vec<ModalEntry>,
    trap: FocusTrap,
    gate: Rc<ModalGate>,
    next_id: ModalId,
}

impl Default for ModalFocusStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ModalFocusStack {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            trap: FocusTrap::new(),
            gate: Rc::new(ModalGate::default()),
            next_id: 1,
        }
    }

    /// The gate to inject into the idle controller.
    #[must_use]
    pub fn gate(&self) -> Rc<ModalGate> {
        Rc::clone(&self.gate)
    }

    /// Record whether the entry screen is showing.
    pub fn set_entry_screen(&self, on_entry: bool) {
        self.gate.entry_screen.set(on_entry);
    }

    /// Open a modal rooted at `root`, trap Tab inside it, and focus its first
    /// candidate. Returns `None` if `root` is not mounted.
    pub fn open(
        &mut self,
        registry: &mut ElementRegistry,
        cursor: &mut FocusCursor,
        root: ElementId,
        kind: ModalKind,
    ) -> Option<ModalTransition> {
        let Some(was_modal) = registry.get(root).map(|spec| spec.modal) else {
            tracing::warn!(root, "modal root not mounted; open refused");
            return None;
        };
        registry.update(root, |spec| spec.modal = true);
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(ModalEntry {
            id,
            root,
            kind,
            return_focus: cursor.current(),
            was_modal,
        });
        if kind == ModalKind::IdleWarning {
            self.gate.warnings_open.set(self.gate.warnings_open.get() + 1);
        }
        self.trap.activate(root);
        let focus = self.trap.focus_first(registry, cursor);
        tracing::debug!(id, root, ?kind, depth = self.entries.len(), "modal opened");
        Some(ModalTransition {
            id,
            root,
            kind,
            focus,
        })
    }

    /// Close the top modal and restore focus.
    pub fn close(&mut self, registry: &mut ElementRegistry, cursor: &mut FocusCursor) -> Option<ModalTransition> {
        let entry = self.entries.pop()?;
        registry.update(entry.root, |spec| spec.modal = entry.was_modal);
        if entry.kind == ModalKind::IdleWarning {
            self.gate
                .warnings_open
                .set(self.gate.warnings_open.get().saturating_sub(1));
        }

        let scope = self.entries.last().map(|e| e.root);
        match scope {
            Some(root) => self.trap.activate(root),
            None => self.trap.deactivate(),
        }

        let candidates = compute_focusable(registry, scope);
        let target = entry
            .return_focus
            .filter(|id| candidates.contains(id))
            .or_else(|| candidates.first().copied());
        let focus = match target {
            Some(t) => cursor.focus(t),
            None => {
                cursor.blur();
                None
            }
        };
        tracing::debug!(id = entry.id, ?target, depth = self.entries.len(), "modal closed");
        Some(ModalTransition {
            id: entry.id,
            root: entry.root,
            kind: entry.kind,
            focus,
        })
    }

    /// Close every modal, innermost first.
    pub fn close_all(&mut self, registry: &mut ElementRegistry, cursor: &mut FocusCursor) -> Vec<ModalTransition> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some(t) = self.close(registry, cursor) {
            out.push(t);
        }
        out
    }

    /// Close the top modal if it is of `kind`.
    pub fn close_kind(
        &mut self,
        registry: &mut ElementRegistry,
        cursor: &mut FocusCursor,
        kind: ModalKind,
    ) -> Option<ModalTransition> {
        if self.entries.last().is_some_and(|e| e.kind == kind) {
            self.close(registry, cursor)
        } else {
            None
        }
    }

    /// Route Tab / Shift+Tab to the active trap.
    pub fn handle_key(&self, registry: &ElementRegistry, cursor: &mut FocusCursor, key: &KeyEvent) -> KeyOutcome {
        self.trap.handle_key(registry, cursor, key)
    }

    /// Root of the top modal, i.e. the current navigation scope.
    #[must_use]
    pub fn scope(&self) -> Option<ElementId> {
        self.entries.last().map(|e| e.root)
    }

    #[must_use]
    pub fn top_kind(&self) -> Option<ModalKind> {
        self.entries.last().map(|e| e.kind)
    }

    #[must_use]
    pub fn is_open(&self, kind: ModalKind) -> bool {
        self.entries.iter().any(|e| e.kind == kind)
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_focus_trapped(&self) -> bool {
        self.trap.is_active()
    }

    #[must_use]
    pub fn trap(&self) -> &FocusTrap {
        &self.trap
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::registry::ElementSpec;
    use kiosk_core::event::KeyCode;

    struct Screen {
        reg: ElementRegistry,
        buttons: Vec<ElementId>,
    }

    fn screen() -> Screen {
        let mut reg = ElementRegistry::new();
        let page = reg.mount_root(ElementSpec::container());
        let buttons = (1..=3)
            .map(|i| reg.mount(page, ElementSpec::interactive(format!("b{i}"))).unwrap())
            .collect();
        Screen { reg, buttons }
    }

    fn dialog(reg: &mut ElementRegistry, n: usize) -> (ElementId, Vec<ElementId>) {
        let root = reg.mount_root(ElementSpec::container().label("Dialog"));
        let items = (0..n)
            .map(|i| reg.mount(root, ElementSpec::interactive(format!("d{i}"))).unwrap())
            .collect();
        (root, items)
    }

    #[test]
    fn open_traps_and_focuses_frame() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let mut cursor = FocusCursor::at(Some(s.buttons[2]));
        let (root, items) = dialog(&mut s.reg, 2);

        let t = modals.open(&mut s.reg, &mut cursor, root, ModalKind::Dialog).unwrap();
        assert!(modals.is_focus_trapped());
        assert_eq!(t.focus.map(|f| f.to), Some(root));
        assert_eq!(cursor.current(), Some(root));

        modals.handle_key(&s.reg, &mut cursor, &KeyEvent::new(KeyCode::Tab));
        assert_eq!(cursor.current(), Some(items[0]));
    }

    #[test]
    fn close_restores_focus() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let mut cursor = FocusCursor::at(Some(s.buttons[2]));
        let (root, _) = dialog(&mut s.reg, 2);
        modals.open(&mut s.reg, &mut cursor, root, ModalKind::Dialog);

        let t = modals.close(&mut s.reg, &mut cursor).unwrap();
        assert!(!modals.is_focus_trapped());
        assert_eq!(t.focus.map(|f| f.to), Some(s.buttons[2]));
        assert_eq!(cursor.current(), Some(s.buttons[2]));
    }

    #[test]
    fn close_clears_the_frame_flag() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let mut cursor = FocusCursor::at(Some(s.buttons[0]));
        let (root, items) = dialog(&mut s.reg, 2);

        modals.open(&mut s.reg, &mut cursor, root, ModalKind::Dialog);
        assert!(s.reg.get(root).unwrap().modal);
        modals.close(&mut s.reg, &mut cursor);
        assert!(!s.reg.get(root).unwrap().modal);
        assert_eq!(compute_focusable(&s.reg, Some(root)), items);

        let framed = s.reg.mount_root(ElementSpec::container().modal(true));
        modals.open(&mut s.reg, &mut cursor, framed, ModalKind::Dialog);
        modals.close(&mut s.reg, &mut cursor);
        assert!(s.reg.get(framed).unwrap().modal);
    }

    #[test]
    fn nested_modals_restore_lifo() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let mut cursor = FocusCursor::at(Some(s.buttons[1]));
        let (outer, outer_items) = dialog(&mut s.reg, 2);
        let (inner, _) = dialog(&mut s.reg, 1);

        modals.open(&mut s.reg, &mut cursor, outer, ModalKind::Dialog);
        cursor.focus(outer_items[1]);
        modals.open(&mut s.reg, &mut cursor, inner, ModalKind::Dialog);
        assert_eq!(modals.depth(), 2);

        modals.close(&mut s.reg, &mut cursor);
        assert_eq!(cursor.current(), Some(outer_items[1]));
        assert_eq!(modals.scope(), Some(outer));
        assert!(modals.is_focus_trapped());

        modals.close(&mut s.reg, &mut cursor);
        assert_eq!(cursor.current(), Some(s.buttons[1]));
    }

    #[test]
    fn removed_return_target_falls_back_to_first() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let mut cursor = FocusCursor::at(Some(s.buttons[1]));
        let (root, _) = dialog(&mut s.reg, 1);
        modals.open(&mut s.reg, &mut cursor, root, ModalKind::Dialog);
        s.reg.unmount(s.buttons[1]);
        s.reg.unmount(root);

        modals.close(&mut s.reg, &mut cursor);
        assert_eq!(cursor.current(), Some(s.buttons[0]));
    }

    #[test]
    fn gate_tracks_idle_warning() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let gate = modals.gate();
        let mut cursor = FocusCursor::default();
        let (root, _) = dialog(&mut s.reg, 1);

        assert!(!gate.warning_visible());
        modals.open(&mut s.reg, &mut cursor, root, ModalKind::IdleWarning);
        assert!(gate.warning_visible());
        assert!(modals.is_open(ModalKind::IdleWarning));
        assert!(modals.close_kind(&mut s.reg, &mut cursor, ModalKind::Dialog).is_none());
        modals.close_kind(&mut s.reg, &mut cursor, ModalKind::IdleWarning);
        assert!(!gate.warning_visible());

        modals.set_entry_screen(true);
        assert!(gate.on_entry_screen());
    }

    #[test]
    fn close_all_unwinds_everything() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let mut cursor = FocusCursor::at(Some(s.buttons[0]));
        let (a, _) = dialog(&mut s.reg, 1);
        let (b, _) = dialog(&mut s.reg, 1);
        modals.open(&mut s.reg, &mut cursor, a, ModalKind::Dialog);
        modals.open(&mut s.reg, &mut cursor, b, ModalKind::IdleWarning);
        let closed = modals.close_all(&mut s.reg, &mut cursor);
        assert_eq!(closed.len(), 2);
        assert_eq!(closed[0].root, b);
        assert!(modals.is_empty());
        assert!(!modals.gate().warning_visible());
        assert_eq!(cursor.current(), Some(s.buttons[0]));
    }

    #[test]
    fn open_on_missing_root_is_refused() {
        let mut s = screen();
        let mut modals = ModalFocusStack::new();
        let mut cursor = FocusCursor::default();
        assert!(modals.open(&mut s.reg, &mut cursor, 9_999, ModalKind::Dialog).is_none());
        assert!(modals.is_empty());
    }
}
