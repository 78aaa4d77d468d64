// SPDX-License-Identifier: MIT
//
// Observer lists.
//
// An `Event<T>` is an ordered list of handlers. `fire` calls them
// synchronously, in subscription order, on the calling thread. The list
// is snapshotted before delivery, so a handler may subscribe or
// unsubscribe (through a clone of the event) while it runs: changes apply
// from the next `fire`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Identifies one subscription for [`Event::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

struct Handlers<T> {
    next_id: u64,
    list: Vec<(Subscription, Handler<T>)>,
}

/// A synchronous observer list.
///
/// Clones share the same handler list.
pub struct Event<T> {
    handlers: Arc<Mutex<Handlers<T>>>,
}

impl<T> Event<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Handlers {
                next_id: 0,
                list: Vec::new(),
            })),
        }
    }

    fn handlers(&self) -> std::sync::MutexGuard<'_, Handlers<T>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a handler at the end of the list.
    pub fn subscribe(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let mut h = self.handlers();
        let id = Subscription(h.next_id);
        h.next_id += 1;
        h.list.push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns whether it was subscribed.
    pub fn unsubscribe(&self, id: Subscription) -> bool {
        let mut h = self.handlers();
        let before = h.list.len();
        h.list.retain(|(sid, _)| *sid != id);
        h.list.len() != before
    }

    /// Deliver `arg` to every handler subscribed when the call began.
    pub fn fire(&self, arg: &T) {
        let snapshot: Vec<Handler<T>> = self
            .handlers()
            .list
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in snapshot {
            handler(arg);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers().list.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<T> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event").field("handlers", &self.len()).finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
