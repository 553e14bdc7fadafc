#![forbid(unsafe_code)]

//! Element registry: the host's mirror of the interactive element tree.
//!
//! The host mounts and unmounts elements as screens change. Focus traversal
//! never caches a focusable list; it walks this registry on every key press,
//! so mount/unmount churn between two key presses is always observed.
//!
//! # Invariants
//!
//! - Every node except a root has exactly one parent, and appears once in
//!   that parent's child list (document order).
//! - Unmounting removes the whole subtree and every section rooted in it.
//! - Section order is registration order; re-registering a name moves its
//!   root but keeps its position.

use ahash::{AHashMap, AHashSet};
use kiosk_core::event::ElementId;

/// What kind of element a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Button, tile, link: can receive focus.
    Interactive,
    /// Layout wrapper. Focusable only as a modal frame.
    Container,
}

/// Nearest-ancestor grouping marker (a menu row, a category strip).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupMarker {
    /// Identity used for group comparisons.
    pub tag: String,
    /// Spoken when focus enters the group.
    pub text: String,
}

impl GroupMarker {
    pub fn new(tag: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            text: text.into(),
        }
    }
}

/// Mount-time description of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpec {
    pub kind: ElementKind,
    pub label: Option<String>,
    pub group: Option<GroupMarker>,
    pub disabled: bool,
    /// Not rendered. Hides the whole subtree.
    pub hidden: bool,
    /// Rendered with an empty box.
    pub zero_size: bool,
    /// Subtree is inert (background behind a modal).
    pub inert: bool,
    /// Subtree is hidden from assistive technology.
    pub aria_hidden: bool,
    /// Root of a modal dialog.
    pub modal: bool,
}

impl ElementSpec {
    /// An interactive element with a spoken label.
    pub fn interactive(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::container()
        }
        .kind(ElementKind::Interactive)
    }

    /// A plain container.
    #[must_use]
    pub fn container() -> Self {
        Self {
            kind: ElementKind::Container,
            label: None,
            group: None,
            disabled: false,
            hidden: false,
            zero_size: false,
            inert: false,
            aria_hidden: false,
            modal: false,
        }
    }

    #[must_use]
    pub fn kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    #[must_use]
    pub fn group(mut self, tag: impl Into<String>, text: impl Into<String>) -> Self {
        self.group = Some(GroupMarker::new(tag, text));
        self
    }

    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    #[must_use]
    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    #[must_use]
    pub fn zero_size(mut self, zero_size: bool) -> Self {
        self.zero_size = zero_size;
        self
    }

    #[must_use]
    pub fn inert(mut self, inert: bool) -> Self {
        self.inert = inert;
        self
    }

    #[must_use]
    pub fn aria_hidden(mut self, aria_hidden: bool) -> Self {
        self.aria_hidden = aria_hidden;
        self
    }

    #[must_use]
    pub fn modal(mut self, modal: bool) -> Self {
        self.modal = modal;
        self
    }

    /// Non-empty label text.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.label.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone)]
struct Node {
    spec: ElementSpec,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Section {
    name: String,
    root: ElementId,
}

/// The element tree.
#[derive(Debug, Clone, Default)]
pub struct ElementRegistry {
    nodes: AHashMap<ElementId, Node>,
    roots: Vec<ElementId>,
    sections: Vec<Section>,
    next_id: ElementId,
}

impl ElementRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    fn alloc(&mut self) -> ElementId {
        self.next_id = self.next_id.max(1);
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Mount a top-level element.
    pub fn mount_root(&mut self, spec: ElementSpec) -> ElementId {
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node {
                spec,
                parent: None,
                children: Vec::new(),
            },
        );
        self.roots.push(id);
        id
    }

    /// Mount `spec` as the last child of `parent`. Returns `None` if the
    /// parent is not mounted.
    pub fn mount(&mut self, parent: ElementId, spec: ElementSpec) -> Option<ElementId> {
        if !self.nodes.contains_key(&parent) {
            tracing::debug!(parent, "mount under unknown parent ignored");
            return None;
        }
        let id = self.alloc();
        self.nodes.insert(
            id,
            Node {
                spec,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        Some(id)
    }

    /// Remove `id` and its subtree. Returns the number of removed elements.
    pub fn unmount(&mut self, id: ElementId) -> usize {
        let Some(node) = self.nodes.get(&id) else {
            return 0;
        };
        match node.parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.retain(|c| *c != id);
                }
            }
            None => self.roots.retain(|r| *r != id),
        }

        let mut removed = AHashSet::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(&next) {
                stack.extend(node.children);
                removed.insert(next);
            }
        }
        self.sections.retain(|s| !removed.contains(&s.root));
        tracing::trace!(root = id, removed = removed.len(), "unmounted");
        removed.len()
    }

    /// Edit an element in place. Returns `false` if it is not mounted.
    pub fn update(&mut self, id: ElementId, f: impl FnOnce(&mut ElementSpec)) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                f(&mut node.spec);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn get(&self, id: ElementId) -> Option<&ElementSpec> {
        self.nodes.get(&id).map(|n| &n.spec)
    }

    #[must_use]
    pub fn contains(&self, id: ElementId) -> bool {
        self.nodes.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    #[must_use]
    pub fn children(&self, id: ElementId) -> &[ElementId] {
        self.nodes.get(&id).map_or(&[], |n| n.children.as_slice())
    }

    /// Ancestors of `id`, nearest first, excluding `id`.
    #[must_use]
    pub fn ancestors(&self, id: ElementId) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut cur = self.parent(id);
        while let Some(p) = cur {
            out.push(p);
            cur = self.parent(p);
        }
        out
    }

    /// Whether `id` is `ancestor` or lies inside it.
    #[must_use]
    pub fn is_within(&self, id: ElementId, ancestor: ElementId) -> bool {
        id == ancestor || self.ancestors(id).contains(&ancestor)
    }

    /// Nearest group marker on `id` or an ancestor.
    #[must_use]
    pub fn group_tag(&self, id: ElementId) -> Option<&GroupMarker> {
        let mut cur = Some(id);
        while let Some(at) = cur {
            let node = self.nodes.get(&at)?;
            if let Some(group) = &node.spec.group {
                return Some(group);
            }
            cur = node.parent;
        }
        None
    }

    /// Pre-order walk of the subtree at `root`, or of every root.
    #[must_use]
    pub fn document_order(&self, root: Option<ElementId>) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = match root {
            Some(r) if self.contains(r) => vec![r],
            Some(_) => return out,
            None => self.roots.iter().rev().copied().collect(),
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev());
        }
        out
    }

    /// Rendered and reachable: no hidden, inert or aria-hidden node on the
    /// path to the root, and not zero-size itself.
    #[must_use]
    pub fn is_visible(&self, id: ElementId) -> bool {
        let Some(node) = self.nodes.get(&id) else {
            return false;
        };
        if node.spec.zero_size {
            return false;
        }
        let mut cur = Some(id);
        while let Some(at) = cur {
            let Some(n) = self.nodes.get(&at) else {
                return false;
            };
            if n.spec.hidden || n.spec.inert || n.spec.aria_hidden {
                return false;
            }
            cur = n.parent;
        }
        true
    }

    /// Interactive, enabled and visible.
    #[must_use]
    pub fn is_focusable(&self, id: ElementId) -> bool {
        self.get(id).is_some_and(|s| {
            s.kind == ElementKind::Interactive && !s.disabled
        }) && self.is_visible(id)
    }

    /// Register (or move) a named section. Returns `false` if `root` is not
    /// mounted.
    pub fn register_section(&mut self, name: impl Into<String>, root: ElementId) -> bool {
        if !self.contains(root) {
            return false;
        }
        let name = name.into();
        match self.sections.iter_mut().find(|s| s.name == name) {
            Some(section) => section.root = root,
            None => self.sections.push(Section { name, root }),
        }
        true
    }

    pub fn unregister_section(&mut self, name: &str) -> bool {
        let before = self.sections.len();
        self.sections.retain(|s| s.name != name);
        self.sections.len() < before
    }

    /// Section roots in registration order.
    pub fn sections(&self) -> impl Iterator<Item = (&str, ElementId)> {
        self.sections.iter().map(|s| (s.name.as_str(), s.root))
    }

    #[must_use]
    pub fn section_root(&self, name: &str) -> Option<ElementId> {
        self.sections.iter().find(|s| s.name == name).map(|s| s.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(reg: &mut ElementRegistry, parent: ElementId, tag: &str, labels: &[&str]) -> Vec<ElementId> {
        let row = reg
            .mount(parent, ElementSpec::container().group(tag, tag.to_uppercase()))
            .unwrap();
        labels
            .iter()
            .map(|l| reg.mount(row, ElementSpec::interactive(*l)).unwrap())
            .collect()
    }

    #[test]
    fn document_order_is_preorder() {
        let mut reg = ElementRegistry::new();
        let root = reg.mount_root(ElementSpec::container());
        let a = row(&mut reg, root, "r1", &["a", "b"]);
        let b = row(&mut reg, root, "r2", &["c"]);
        let order = reg.document_order(None);
        let leaves: Vec<_> = order.into_iter().filter(|id| reg.is_focusable(*id)).collect();
        assert_eq!(leaves, vec![a[0], a[1], b[0]]);
    }

    #[test]
    fn group_tag_nearest_wins() {
        let mut reg = ElementRegistry::new();
        let root = reg.mount_root(ElementSpec::container().group("outer", "Outer"));
        let inner = row(&mut reg, root, "inner", &["x"]);
        let plain = reg.mount(root, ElementSpec::interactive("y")).unwrap();
        let tagged = reg
            .mount(root, ElementSpec::interactive("z").group("self", "Self"))
            .unwrap();

        assert_eq!(reg.group_tag(inner[0]).map(|g| g.tag.as_str()), Some("inner"));
        assert_eq!(reg.group_tag(plain).map(|g| g.tag.as_str()), Some("outer"));
        assert_eq!(reg.group_tag(tagged).map(|g| g.tag.as_str()), Some("self"));
        assert_eq!(reg.group_tag(9_999), None);
    }

    #[test]
    fn unmount_removes_subtree_and_sections() {
        let mut reg = ElementRegistry::new();
        let root = reg.mount_root(ElementSpec::container());
        let panel = reg.mount(root, ElementSpec::container()).unwrap();
        let btn = reg.mount(panel, ElementSpec::interactive("ok")).unwrap();
        assert!(reg.register_section("panel", panel));
        assert!(reg.register_section("page", root));

        assert_eq!(reg.unmount(panel), 2);
        assert!(!reg.contains(btn));
        assert!(reg.children(root).is_empty());
        let names: Vec<_> = reg.sections().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, vec!["page"]);
        assert_eq!(reg.unmount(panel), 0);
    }

    #[test]
    fn visibility_predicates() {
        let mut reg = ElementRegistry::new();
        let root = reg.mount_root(ElementSpec::container());
        let ok = reg.mount(root, ElementSpec::interactive("ok")).unwrap();
        let off = reg
            .mount(root, ElementSpec::interactive("off").disabled(true))
            .unwrap();
        let flat = reg
            .mount(root, ElementSpec::interactive("flat").zero_size(true))
            .unwrap();
        let shade = reg.mount(root, ElementSpec::container().inert(true)).unwrap();
        let under = reg.mount(shade, ElementSpec::interactive("under")).unwrap();
        let mute = reg
            .mount(root, ElementSpec::container().aria_hidden(true))
            .unwrap();
        let muted = reg.mount(mute, ElementSpec::interactive("muted")).unwrap();
        let label_less = reg.mount(root, ElementSpec::container()).unwrap();

        assert!(reg.is_focusable(ok));
        for id in [off, flat, under, muted, label_less] {
            assert!(!reg.is_focusable(id), "{id} should not be focusable");
        }

        reg.update(shade, |s| s.inert = false);
        assert!(reg.is_focusable(under));
    }

    #[test]
    fn reregistering_section_keeps_position() {
        let mut reg = ElementRegistry::new();
        let a = reg.mount_root(ElementSpec::container());
        let b = reg.mount_root(ElementSpec::container());
        let c = reg.mount_root(ElementSpec::container());
        reg.register_section("first", a);
        reg.register_section("second", b);
        reg.register_section("first", c);
        let got: Vec<_> = reg.sections().map(|(n, r)| (n.to_string(), r)).collect();
        assert_eq!(got, vec![("first".to_string(), c), ("second".to_string(), b)]);
        assert!(!reg.register_section("ghost", 4_242));
        assert!(reg.unregister_section("first"));
        assert!(!reg.unregister_section("first"));
    }

    #[test]
    fn mount_under_missing_parent_is_rejected() {
        let mut reg = ElementRegistry::new();
        assert_eq!(reg.mount(77, ElementSpec::interactive("x")), None);
        assert!(reg.is_empty());
    }
}
