// SPDX-License-Identifier: MIT
//
// Focus manager.
//
// Tracks which node receives keys. Nodes are registered as they are
// attached, in attach order, and Tab cycles through the focusable ones in
// that order. Moving focus pushes the previous node onto a short history,
// so when the focused node goes away focus can return to where it was.
//
// Global key handlers live here as well: they see every key before the
// focused node does.

use std::collections::HashMap;

use cellpump_term::input::{KeyCode, KeyEvent, Modifiers};
use log::debug;

use crate::event::Event;
use crate::tree::{NodeId, Tree};

/// How many previously focused nodes are remembered.
const MAX_HISTORY: usize = 10;

// ─── Global key handlers ────────────────────────────────────────────────────

/// Identifies a registered global key handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type KeyHandler = Box<dyn FnMut(&KeyEvent) + Send>;

/// Handlers keyed by key and exact modifier set.
///
/// Several handlers may be registered for one combination; the most
/// recent one wins until it is unregistered.
#[derive(Default)]
pub struct GlobalKeyHandlers {
    next_id: u64,
    handlers: HashMap<(KeyCode, Modifiers), Vec<(HandlerId, KeyHandler)>>,
}

impl GlobalKeyHandlers {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        code: KeyCode,
        modifiers: Modifiers,
        handler: impl FnMut(&KeyEvent) + Send + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers
            .entry((code, modifiers))
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Returns whether the handler was registered.
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let mut found = false;
        self.handlers.retain(|_, stack| {
            let before = stack.len();
            stack.retain(|(h, _)| *h != id);
            found |= stack.len() != before;
            !stack.is_empty()
        });
        found
    }

    /// Run the handler for `key`, if any. Returns whether one ran.
    pub fn try_intercept(&mut self, key: &KeyEvent) -> bool {
        match self
            .handlers
            .get_mut(&(key.code, key.modifiers))
            .and_then(|stack| stack.last_mut())
        {
            Some((_, handler)) => {
                handler(key);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ─── Focus manager ──────────────────────────────────────────────────────────

/// Focus state for one app.
#[derive(Default)]
pub struct FocusManager {
    order: Vec<NodeId>,
    focused: Option<NodeId>,
    history: Vec<NodeId>,
    global_keys: GlobalKeyHandlers,
    focus_changed: Event<Option<NodeId>>,
}

impl FocusManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub const fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    /// Registered nodes in attach order.
    #[must_use]
    pub fn registered(&self) -> &[NodeId] {
        &self.order
    }

    #[must_use]
    pub fn is_registered(&self, id: NodeId) -> bool {
        self.order.contains(&id)
    }

    pub const fn global_keys(&mut self) -> &mut GlobalKeyHandlers {
        &mut self.global_keys
    }

    /// Fired with the new focus after every change.
    #[must_use]
    pub const fn focus_changed(&self) -> &Event<Option<NodeId>> {
        &self.focus_changed
    }

    pub(crate) fn register(&mut self, id: NodeId) {
        if !self.order.contains(&id) {
            self.order.push(id);
        }
    }

    /// Forget `id`. The caller clears focus first if `id` holds it.
    pub(crate) fn unregister(&mut self, id: NodeId) {
        self.order.retain(|&n| n != id);
        self.history.retain(|&n| n != id);
    }

    fn change(&mut self, tree: &mut Tree, next: Option<NodeId>) {
        if self.focused == next {
            return;
        }
        if let Some(prev) = self.focused.take() {
            if let Some(c) = tree.control_mut(prev) {
                c.on_blur();
            }
            self.history.push(prev);
            if self.history.len() > MAX_HISTORY {
                self.history.remove(0);
            }
        }
        self.focused = next;
        if let Some(n) = next {
            if let Some(c) = tree.control_mut(n) {
                c.on_focus();
            }
        }
        debug!("focus -> {next:?}");
        self.focus_changed.fire(&next);
    }

    fn candidates(&self, tree: &Tree) -> Vec<NodeId> {
        self.order
            .iter()
            .copied()
            .filter(|&n| tree.is_focusable(n))
            .collect()
    }

    /// Focus `id` if it is registered and focusable.
    pub fn set_focus(&mut self, tree: &mut Tree, id: NodeId) -> bool {
        if !self.is_registered(id) || !tree.is_focusable(id) {
            return false;
        }
        self.change(tree, Some(id));
        true
    }

    /// Move to the next (or previous) focusable node, wrapping around.
    ///
    /// With nothing focused, forward picks the first candidate and
    /// backward the last. Returns whether focus changed.
    pub fn try_move_focus(&mut self, tree: &mut Tree, forward: bool) -> bool {
        let candidates = self.candidates(tree);
        if candidates.is_empty() {
            return false;
        }
        let pos = self
            .focused
            .and_then(|f| candidates.iter().position(|&n| n == f));
        let next = match (pos, forward) {
            (None, true) => candidates[0],
            (None, false) => candidates[candidates.len() - 1],
            (Some(p), true) => candidates[(p + 1) % candidates.len()],
            (Some(p), false) => candidates[(p + candidates.len() - 1) % candidates.len()],
        };
        if Some(next) == self.focused {
            return false;
        }
        self.change(tree, Some(next));
        true
    }

    /// Put focus back after the focused node went away.
    ///
    /// Prefers the most recent history entry that is still registered and
    /// focusable, then the first focusable node. Leaves focus unset when
    /// there is none. Returns whether something got focus.
    pub fn try_restore_focus(&mut self, tree: &mut Tree) -> bool {
        while let Some(prev) = self.history.pop() {
            if self.is_registered(prev) && tree.is_focusable(prev) {
                self.change(tree, Some(prev));
                return true;
            }
        }
        match self.candidates(tree).first() {
            Some(&first) => {
                self.change(tree, Some(first));
                true
            }
            None => false,
        }
    }

    /// Drop focus without choosing a successor.
    pub fn clear_focus(&mut self, tree: &mut Tree) {
        self.change(tree, None);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Control, Rect};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct Root;
    impl Control for Root {}

    #[derive(Default)]
    struct Field {
        focused: bool,
        blurs: usize,
    }
    impl Control for Field {
        fn can_focus(&self) -> bool {
            true
        }
        fn on_focus(&mut self) {
            self.focused = true;
        }
        fn on_blur(&mut self) {
            self.focused = false;
            self.blurs += 1;
        }
    }

    struct Static;
    impl Control for Static {}

    /// Root with the given children attached and registered.
    fn setup(children: Vec<Box<dyn Control>>) -> (Tree, FocusManager, Vec<NodeId>) {
        let mut tree = Tree::new(Box::new(Root), Rect::sized(10, 10));
        let mut fm = FocusManager::new();
        let root = tree.root();
        let ids = children
            .into_iter()
            .map(|c| {
                let id = tree.insert(c, Rect::default());
                tree.link(root, id);
                tree.set_attached(id, true);
                fm.register(id);
                id
            })
            .collect();
        (tree, fm, ids)
    }

    fn fields(n: usize) -> Vec<Box<dyn Control>> {
        (0..n)
            .map(|_| Box::new(Field::default()) as Box<dyn Control>)
            .collect()
    }

    // ── Cycling ─────────────────────────────────────────────────────────

    #[test]
    fn forward_cycles_and_wraps() {
        let (mut tree, mut fm, ids) = setup(fields(3));
        assert!(fm.try_move_focus(&mut tree, true));
        assert_eq!(fm.focused(), Some(ids[0]));
        fm.try_move_focus(&mut tree, true);
        fm.try_move_focus(&mut tree, true);
        assert_eq!(fm.focused(), Some(ids[2]));
        fm.try_move_focus(&mut tree, true);
        assert_eq!(fm.focused(), Some(ids[0]));
    }

    #[test]
    fn backward_from_nothing_picks_last() {
        let (mut tree, mut fm, ids) = setup(fields(3));
        fm.try_move_focus(&mut tree, false);
        assert_eq!(fm.focused(), Some(ids[2]));
        fm.try_move_focus(&mut tree, false);
        assert_eq!(fm.focused(), Some(ids[1]));
    }

    #[test]
    fn skips_unfocusable_nodes() {
        let children: Vec<Box<dyn Control>> =
            vec![Box::new(Static), Box::new(Field::default()), Box::new(Static)];
        let (mut tree, mut fm, ids) = setup(children);
        fm.try_move_focus(&mut tree, true);
        assert_eq!(fm.focused(), Some(ids[1]));
        assert!(!fm.try_move_focus(&mut tree, true));
    }

    #[test]
    fn nothing_focusable() {
        let (mut tree, mut fm, _) = setup(vec![Box::new(Static)]);
        assert!(!fm.try_move_focus(&mut tree, true));
        assert!(!fm.try_restore_focus(&mut tree));
        assert_eq!(fm.focused(), None);
    }

    // ── Hooks & events ──────────────────────────────────────────────────

    #[test]
    fn focus_and_blur_hooks_run() {
        let (mut tree, mut fm, ids) = setup(fields(2));
        fm.set_focus(&mut tree, ids[0]);
        assert!(tree.get::<Field>(ids[0]).unwrap().focused);
        fm.set_focus(&mut tree, ids[1]);
        let first = tree.get::<Field>(ids[0]).unwrap();
        assert!(!first.focused);
        assert_eq!(first.blurs, 1);
        assert!(tree.get::<Field>(ids[1]).unwrap().focused);
    }

    #[test]
    fn focus_changed_fires_once_per_change() {
        let (mut tree, mut fm, ids) = setup(fields(2));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        fm.focus_changed()
            .subscribe(move |f: &Option<NodeId>| s.lock().unwrap().push(*f));
        fm.set_focus(&mut tree, ids[0]);
        fm.set_focus(&mut tree, ids[0]);
        fm.clear_focus(&mut tree);
        assert_eq!(*seen.lock().unwrap(), vec![Some(ids[0]), None]);
    }

    // ── Restore ─────────────────────────────────────────────────────────

    #[test]
    fn restore_prefers_history() {
        let (mut tree, mut fm, ids) = setup(fields(3));
        fm.set_focus(&mut tree, ids[1]);
        fm.set_focus(&mut tree, ids[2]);
        fm.clear_focus(&mut tree);
        fm.unregister(ids[2]);
        assert!(fm.try_restore_focus(&mut tree));
        assert_eq!(fm.focused(), Some(ids[1]));
    }

    #[test]
    fn restore_falls_back_to_first_focusable() {
        let (mut tree, mut fm, ids) = setup(fields(2));
        fm.set_focus(&mut tree, ids[1]);
        fm.clear_focus(&mut tree);
        fm.unregister(ids[1]);
        assert!(fm.try_restore_focus(&mut tree));
        assert_eq!(fm.focused(), Some(ids[0]));
    }

    #[test]
    fn set_focus_rejects_unregistered() {
        let (mut tree, mut fm, ids) = setup(fields(1));
        fm.unregister(ids[0]);
        assert!(!fm.set_focus(&mut tree, ids[0]));
    }

    // ── Global keys ─────────────────────────────────────────────────────

    #[test]
    fn latest_handler_wins_until_unregistered() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut keys = GlobalKeyHandlers::new();
        let h = Arc::clone(&hits);
        keys.register(KeyCode::Char('q'), Modifiers::CTRL, move |_| {
            h.fetch_add(1, Ordering::Relaxed);
        });
        let h = Arc::clone(&hits);
        let top = keys.register(KeyCode::Char('q'), Modifiers::CTRL, move |_| {
            h.fetch_add(100, Ordering::Relaxed);
        });

        let ctrl_q = KeyEvent::with_modifiers(KeyCode::Char('q'), Modifiers::CTRL);
        assert!(keys.try_intercept(&ctrl_q));
        assert_eq!(hits.load(Ordering::Relaxed), 100);

        assert!(keys.unregister(top));
        assert!(keys.try_intercept(&ctrl_q));
        assert_eq!(hits.load(Ordering::Relaxed), 101);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn modifiers_must_match_exactly() {
        let mut keys = GlobalKeyHandlers::new();
        keys.register(KeyCode::Char('q'), Modifiers::CTRL, |_| {});
        assert!(!keys.try_intercept(&KeyEvent::char('q')));
        assert!(!keys.unregister(HandlerId(99)));
    }
}
