#![forbid(unsafe_code)]

//! Keyboard traversal over the focusable set.
//!
//! # Algorithm
//!
//! 1. Recompute the focusable set from the registry (never cached).
//! 2. Left/Right: step one position with wraparound.
//! 3. Up/Down: scan with wraparound for the nearest element whose group tag
//!    differs from the current element's.
//!
//! # Invariants
//!
//! - Both steps are total: an empty set yields `None`, an unknown current
//!   element lands on the first candidate.
//! - `Right` repeated `len` times returns to the start.
//! - A grouped step never lands on an element sharing the current group;
//!   with a single group it does not move.

use ahash::AHashSet;
use kiosk_core::event::{ElementId, KeyCode, KeyEvent};

use super::registry::ElementRegistry;
use super::{FocusCursor, KeyOutcome};

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Backward,
}

/// Ordered focusable elements.
///
/// With a scope: the scope root first if it is a modal frame, then focusable
/// descendants in document order. Without: each registered section in
/// registration order, then everything not covered by a section.
#[must_use]
pub fn compute_focusable(registry: &ElementRegistry, scope: Option<ElementId>) -> Vec<ElementId> {
    match scope {
        Some(root) => {
            let Some(spec) = registry.get(root) else {
                return Vec::new();
            };
            let mut out = Vec::new();
            if spec.modal && registry.is_visible(root) {
                out.push(root);
            }
            out.extend(
                registry
                    .document_order(Some(root))
                    .into_iter()
                    .filter(|id| *id != root || !spec.modal)
                    .filter(|id| registry.is_focusable(*id)),
            );
            out
        }
        None => {
            let mut seen = AHashSet::new();
            let mut out = Vec::new();
            let sectioned = registry
                .sections()
                .flat_map(|(_, root)| registry.document_order(Some(root)));
            for id in sectioned.chain(registry.document_order(None)) {
                if registry.is_focusable(id) && seen.insert(id) {
                    out.push(id);
                }
            }
            out
        }
    }
}

/// `(i ± 1) mod len`; an absent current element yields the first entry.
#[must_use]
pub fn linear_step(set: &[ElementId], current: Option<ElementId>, dir: Direction) -> Option<ElementId> {
    if set.is_empty() {
        return None;
    }
    let len = set.len();
    let Some(i) = current.and_then(|c| set.iter().position(|id| *id == c)) else {
        return Some(set[0]);
    };
    let next = match dir {
        Direction::Forward => (i + 1) % len,
        Direction::Backward => (i + len - 1) % len,
    };
    Some(set[next])
}

/// Nearest element (with wraparound) whose group tag differs from the
/// current one. `scope_root` is skipped so only leaves participate.
///
/// Returns `None` when the set is empty or no other group exists.
#[must_use]
pub fn group_step(
    registry: &ElementRegistry,
    set: &[ElementId],
    current: Option<ElementId>,
    scope_root: Option<ElementId>,
    dir: Direction,
) -> Option<ElementId> {
    let leaves: Vec<ElementId> = set
        .iter()
        .copied()
        .filter(|id| Some(*id) != scope_root)
        .collect();
    if leaves.is_empty() {
        return None;
    }
    let len = leaves.len();
    let Some(i) = current.and_then(|c| leaves.iter().position(|id| *id == c)) else {
        return Some(leaves[0]);
    };
    let tag = |id: ElementId| registry.group_tag(id).map(|g| g.tag.as_str());
    let here = tag(leaves[i]);
    (1..len)
        .map(|k| match dir {
            Direction::Forward => (i + k) % len,
            Direction::Backward => (i + len - k) % len,
        })
        .map(|j| leaves[j])
        .find(|id| tag(*id) != here)
}

/// Arrow-key navigator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FocusNavigator;

impl FocusNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Whether `key` is one this navigator consumes.
    #[must_use]
    pub fn handles(key: &KeyEvent) -> bool {
        matches!(
            key.code,
            KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down
        )
    }

    /// Move focus for an arrow key within `scope` (the top modal, if any).
    pub fn handle_key(
        &self,
        registry: &ElementRegistry,
        cursor: &mut FocusCursor,
        key: &KeyEvent,
        scope: Option<ElementId>,
    ) -> KeyOutcome {
        if !Self::handles(key) {
            return KeyOutcome::Ignored;
        }
        let set = compute_focusable(registry, scope);
        let current = cursor.current();
        let target = match key.code {
            KeyCode::Right => linear_step(&set, current, Direction::Forward),
            KeyCode::Left => linear_step(&set, current, Direction::Backward),
            KeyCode::Down => group_step(registry, &set, current, scope, Direction::Forward),
            KeyCode::Up => group_step(registry, &set, current, scope, Direction::Backward),
            _ => None,
        };
        tracing::trace!(key = ?key.code, ?current, ?target, candidates = set.len(), "arrow");
        KeyOutcome::Consumed(target.and_then(|t| cursor.focus(t)))
    }
}
