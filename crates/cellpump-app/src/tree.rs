// SPDX-License-Identifier: MIT
//
// Visual tree — the retained hierarchy of controls behind the frame.
//
// Nodes live in a generational arena. A `NodeId` is an index plus the
// generation of the slot when the node was created; freeing a node bumps
// the slot's generation, so an old id never resolves to whatever reuses
// the slot later.
//
// This module only stores structure. Attaching and detaching (with the
// lifecycle hooks, focus registration and events that go with them) is
// done by `ConsoleApp`, which owns the tree.

use std::any::Any;
use std::fmt;

use cellpump_term::input::KeyEvent;

use crate::canvas::Canvas;

// ─── Ids & geometry ─────────────────────────────────────────────────────────

/// Handle to a node. Stale handles fail lookups instead of aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Position and size of a node, relative to its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

impl Rect {
    #[must_use]
    pub const fn new(x: u16, y: u16, w: u16, h: u16) -> Self {
        Self { x, y, w, h }
    }

    /// A rectangle of the given size at the parent's origin.
    #[must_use]
    pub const fn sized(w: u16, h: u16) -> Self {
        Self::new(0, 0, w, h)
    }
}

/// Where a node is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Alive,
    /// Part of a subtree that is being detached.
    BeingRemoved,
    /// Explicitly disposed; teardown in progress.
    Disposing,
    /// Gone. Only observable from inside the final hooks.
    Disposed,
}

// ─── Control ────────────────────────────────────────────────────────────────

/// Downcasting support for [`Control`], implemented for every `'static`
/// type.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// The behavior of a node: how it paints and what it does with keys.
///
/// Everything has a default, so a control only implements what it uses.
/// Hooks run on the pump thread in tree order: `before_added` and `added`
/// pre-order on attach, `before_removed`, `removed` and `disposed`
/// post-order on detach.
pub trait Control: AsAny + Send {
    /// Name used in diagnostics, such as the unsupported-removal error.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or("Control")
    }

    /// Paint into the node's area. The canvas is clipped to the node.
    fn paint(&mut self, _canvas: &mut Canvas<'_>) {}

    /// Handle a key while focused.
    fn handle_key(&mut self, _key: &KeyEvent) {}

    fn can_focus(&self) -> bool {
        false
    }

    fn on_focus(&mut self) {}

    fn on_blur(&mut self) {}

    /// Whether children of this control may be removed or disposed
    /// individually.
    fn accepts_child_removal(&self) -> bool {
        false
    }

    fn before_added(&mut self) {}

    fn added(&mut self) {}

    fn before_removed(&mut self) {}

    fn removed(&mut self) {}

    fn disposed(&mut self) {}
}

// ─── Arena ──────────────────────────────────────────────────────────────────

struct Node {
    control: Box<dyn Control>,
    bounds: Rect,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
    state: NodeState,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// Arena of nodes with a fixed root.
pub struct Tree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
}

impl Tree {
    /// A tree whose root is `root`, attached from the start.
    #[must_use]
    pub fn new(root: Box<dyn Control>, bounds: Rect) -> Self {
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
        };
        tree.root = tree.insert(root, bounds);
        if let Some(node) = tree.node_mut(tree.root) {
            node.attached = true;
        }
        tree
    }

    #[inline]
    #[must_use]
    pub const fn root(&self) -> NodeId {
        self.root
    }

    /// Live node count, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.node.is_some()).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.node.as_mut())
    }

    /// Add a detached, parentless node.
    pub fn insert(&mut self, control: Box<dyn Control>, bounds: Rect) -> NodeId {
        let node = Node {
            control,
            bounds,
            parent: None,
            children: Vec::new(),
            attached: false,
            state: NodeState::Alive,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            #[allow(clippy::cast_possible_truncation)] // Four billion nodes is not a UI.
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                node: Some(node),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Drop a node from the arena and return its control. Children are
    /// not touched; callers free subtrees bottom-up.
    pub fn free(&mut self, id: NodeId) -> Option<Box<dyn Control>> {
        if id == self.root {
            return None;
        }
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Some(node.control)
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    #[must_use]
    pub fn bounds(&self, id: NodeId) -> Option<Rect> {
        self.node(id).map(|n| n.bounds)
    }

    /// Move or resize a node. Returns whether the node exists.
    pub fn set_bounds(&mut self, id: NodeId, bounds: Rect) -> bool {
        self.node_mut(id).map(|n| n.bounds = bounds).is_some()
    }

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Whether the node is reachable from the root.
    #[must_use]
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.attached)
    }

    #[must_use]
    pub fn state(&self, id: NodeId) -> Option<NodeState> {
        self.node(id).map(|n| n.state)
    }

    pub(crate) fn set_attached(&mut self, id: NodeId, attached: bool) {
        if let Some(n) = self.node_mut(id) {
            n.attached = attached;
        }
    }

    pub(crate) fn set_state(&mut self, id: NodeId, state: NodeState) {
        if let Some(n) = self.node_mut(id) {
            n.state = state;
        }
    }

    #[must_use]
    pub fn control(&self, id: NodeId) -> Option<&dyn Control> {
        self.node(id).map(|n| n.control.as_ref())
    }

    pub fn control_mut(&mut self, id: NodeId) -> Option<&mut (dyn Control + 'static)> {
        self.node_mut(id).map(|n| n.control.as_mut())
    }

    /// The node's control as its concrete type.
    #[must_use]
    pub fn get<T: Control + 'static>(&self, id: NodeId) -> Option<&T> {
        self.control(id)?.as_any().downcast_ref()
    }

    pub fn get_mut<T: Control + 'static>(&mut self, id: NodeId) -> Option<&mut T> {
        self.control_mut(id)?.as_any_mut().downcast_mut()
    }

    /// Attached, alive, and willing to take focus.
    #[must_use]
    pub fn is_focusable(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| {
            n.attached && n.state == NodeState::Alive && n.control.can_focus()
        })
    }

    /// Whether `id` is `ancestor` or lies below it.
    #[must_use]
    pub fn is_within(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut cur = Some(id);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.parent(c);
        }
        false
    }

    /// `id` and its descendants, parents before children.
    #[must_use]
    pub fn pre_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(n) = stack.pop() {
            if !self.contains(n) {
                continue;
            }
            out.push(n);
            stack.extend(self.children(n).iter().rev());
        }
        out
    }

    /// `id` and its descendants, children before parents.
    #[must_use]
    pub fn post_order(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_post(id, &mut out);
        out
    }

    fn collect_post(&self, id: NodeId, out: &mut Vec<NodeId>) {
        if !self.contains(id) {
            return;
        }
        for &c in self.children(id) {
            self.collect_post(c, out);
        }
        out.push(id);
    }

    // ─── Structure ───────────────────────────────────────────────────────

    /// Append `child` to `parent`'s children. The caller checks that
    /// `child` is parentless and not an ancestor of `parent`.
    pub(crate) fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(c) = self.node_mut(child) {
            c.parent = Some(parent);
        }
        if let Some(p) = self.node_mut(parent) {
            p.children.push(child);
        }
    }

    /// Detach `child` from its parent's child list.
    pub(crate) fn unlink(&mut self, child: NodeId) {
        let Some(parent) = self.parent(child) else {
            return;
        };
        if let Some(p) = self.node_mut(parent) {
            p.children.retain(|&c| c != child);
        }
        if let Some(c) = self.node_mut(child) {
            c.parent = None;
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tree")
            .field("root", &self.root)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
