//! Typed listener lists
//!
//! Every event kind gets its own [`EventListeners`] list. Registration hands
//! back a [`ListenerId`] which is the only way to remove the listener again.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one registered listener.
///
/// Ids are unique across all lists, so an owner with several lists can
/// route a removal without knowing which list the id came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn next() -> Self {
        Self(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

type Handler<P> = Rc<dyn Fn(&P)>;

/// Listener list for one event kind carrying a `P` payload
pub struct EventListeners<P: ?Sized> {
    entries: RefCell<Vec<(ListenerId, Handler<P>)>>,
}

impl<P: ?Sized> Default for EventListeners<P> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
        }
    }
}

impl<P: ?Sized> EventListeners<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: impl Fn(&P) + 'static) -> ListenerId {
        let id = ListenerId::next();
        self.entries.borrow_mut().push((id, Rc::new(handler)));
        id
    }

    /// Returns false if `id` is not registered on this list
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.borrow().iter().any(|(entry_id, _)| *entry_id == id)
    }

    /// Call every listener registered at the time of the call.
    ///
    /// A listener removed by an earlier one during the same emission is
    /// skipped. Listeners added during emission only see later events.
    pub fn emit(&self, payload: &P) {
        let snapshot: Vec<(ListenerId, Handler<P>)> = self.entries.borrow().clone();
        for (id, handler) in snapshot {
            if self.contains(id) {
                handler(payload);
            }
        }
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl<P: ?Sized> fmt::Debug for EventListeners<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.len())
            .finish()
    }
}
