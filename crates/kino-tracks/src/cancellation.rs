//! Cooperative cancellation
//!
//! A [`TaskCanceller`] owns the right to cancel; the [`CancellationSignal`] it
//! hands out is the read side given to the code doing the work. Work attaches
//! cleanups to the signal with [`CancellationSignal::register`] and those run
//! synchronously, in registration order, when the canceller fires.
//!
//! Cancellers compose: a canceller linked to a parent signal is cancelled
//! before the parent's `cancel()` returns.
//!
//! ```rust
//! use kino_tracks::cancellation::TaskCanceller;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let canceller = TaskCanceller::new();
//! let cleaned = Rc::new(Cell::new(false));
//! let flag = cleaned.clone();
//! canceller.signal().register(move || flag.set(true));
//!
//! canceller.cancel();
//! assert!(cleaned.get());
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::trace;

/// Reason attached to a cancelled signal
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct CancellationError {
    reason: String,
}

impl CancellationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl Default for CancellationError {
    fn default() -> Self {
        Self::new("cancelled")
    }
}

/// Handle returned by [`CancellationSignal::register`], used to deregister
/// a cleanup that has not run yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupHandle(u64);

type Cleanup = Box<dyn FnOnce()>;

#[derive(Default)]
struct SignalState {
    error: Option<CancellationError>,
    cleanups: Vec<(u64, Cleanup)>,
    next_id: u64,
}

/// Read side of a [`TaskCanceller`]
///
/// Cloning is cheap and every clone observes the same state.
#[derive(Clone, Default)]
pub struct CancellationSignal {
    state: Rc<RefCell<SignalState>>,
}

impl CancellationSignal {
    /// Returns true once the owning canceller fired
    pub fn is_cancelled(&self) -> bool {
        self.state.borrow().error.is_some()
    }

    /// The reason given when cancelling, `None` while live
    pub fn cancellation_error(&self) -> Option<CancellationError> {
        self.state.borrow().error.clone()
    }

    /// Attach a cleanup to run on cancellation.
    ///
    /// If the signal is already cancelled the cleanup runs right away,
    /// before this method returns.
    pub fn register(&self, cleanup: impl FnOnce() + 'static) -> CleanupHandle {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        if state.error.is_some() {
            drop(state);
            cleanup();
        } else {
            state.cleanups.push((id, Box::new(cleanup)));
        }
        CleanupHandle(id)
    }

    /// Remove a pending cleanup without running it.
    ///
    /// Returns false if it already ran or was never registered here.
    pub fn deregister(&self, handle: CleanupHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.cleanups.len();
        state.cleanups.retain(|(id, _)| *id != handle.0);
        state.cleanups.len() != before
    }

    /// Number of cleanups still waiting for cancellation
    pub fn pending_cleanups(&self) -> usize {
        self.state.borrow().cleanups.len()
    }

    /// Create a canceller that is cancelled whenever this signal is.
    pub fn child(&self) -> TaskCanceller {
        let canceller = TaskCanceller::new();
        canceller.link_to_signal(self);
        canceller
    }

    fn trigger(&self, error: CancellationError) {
        let cleanups = {
            let mut state = self.state.borrow_mut();
            if state.error.is_some() {
                return;
            }
            state.error = Some(error);
            std::mem::take(&mut state.cleanups)
        };
        trace!(cleanups = cleanups.len(), "Signal cancelled");
        // No borrow is held here: cleanups may register, deregister or
        // cancel other signals.
        for (_, cleanup) in cleanups {
            cleanup();
        }
    }

    pub(crate) fn downgrade(&self) -> WeakSignal {
        WeakSignal(Rc::downgrade(&self.state))
    }
}

/// Non-owning handle on a [`CancellationSignal`]
#[derive(Clone)]
pub(crate) struct WeakSignal(Weak<RefCell<SignalState>>);

impl WeakSignal {
    fn upgrade(&self) -> Option<CancellationSignal> {
        self.0.upgrade().map(|state| CancellationSignal { state })
    }

    /// Same as [`CancellationSignal::deregister`], false if the signal is gone
    pub(crate) fn deregister(&self, handle: CleanupHandle) -> bool {
        self.upgrade().is_some_and(|signal| signal.deregister(handle))
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("CancellationSignal")
            .field("cancelled", &state.error.is_some())
            .field("pending_cleanups", &state.cleanups.len())
            .finish()
    }
}

/// Owner of a [`CancellationSignal`], the only thing able to cancel it
#[derive(Debug, Default)]
pub struct TaskCanceller {
    signal: CancellationSignal,
}

impl TaskCanceller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal to hand to the code that should react to cancellation
    pub fn signal(&self) -> CancellationSignal {
        self.signal.clone()
    }

    /// Returns true once `cancel` has been called (directly or via a parent)
    pub fn is_used(&self) -> bool {
        self.signal.is_cancelled()
    }

    /// Cancel the signal, running every pending cleanup before returning.
    pub fn cancel(&self) {
        self.cancel_with(CancellationError::default());
    }

    /// Cancel with an explicit reason. No-op if already cancelled.
    pub fn cancel_with(&self, error: CancellationError) {
        self.signal.trigger(error);
    }

    /// Make this canceller a child of `parent`: it is cancelled, with the
    /// parent's reason, as soon as `parent` is.
    ///
    /// The link is undone when this canceller is cancelled first.
    pub fn link_to_signal(&self, parent: &CancellationSignal) -> CleanupHandle {
        let child = self.signal.clone();
        let weak_parent = parent.downgrade();
        let handle = parent.register(move || {
            let error = weak_parent
                .upgrade()
                .and_then(|parent| parent.cancellation_error())
                .unwrap_or_default();
            child.trigger(error);
        });

        let weak_parent = parent.downgrade();
        self.signal.register(move || {
            weak_parent.deregister(handle);
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn test_cleanups_run_in_registration_order() {
        let canceller = TaskCanceller::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            canceller.signal().register(move || order.borrow_mut().push(i));
        }

        assert!(!canceller.is_used());
        canceller.cancel();

        assert!(canceller.is_used());
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(canceller.signal().pending_cleanups(), 0);
    }

    #[test]
    fn test_register_after_cancel_runs_immediately() {
        let canceller = TaskCanceller::new();
        canceller.cancel();

        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        canceller.signal().register(move || flag.set(true));

        assert!(ran.get());
    }

    #[test]
    fn test_register_during_cancellation_runs_immediately() {
        let canceller = TaskCanceller::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let signal = canceller.signal();
        let o = order.clone();
        canceller.signal().register(move || {
            o.borrow_mut().push("first");
            let late = o.clone();
            signal.register(move || late.borrow_mut().push("registered while cancelling"));
        });
        let o = order.clone();
        canceller.signal().register(move || o.borrow_mut().push("second"));

        canceller.cancel();

        assert_eq!(
            *order.borrow(),
            vec!["first", "registered while cancelling", "second"]
        );
        assert_eq!(canceller.signal().pending_cleanups(), 0);
    }

    #[test]
    fn test_cleanup_runs_at_most_once() {
        let canceller = TaskCanceller::new();
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        canceller.signal().register(move || counter.set(counter.get() + 1));

        canceller.cancel();
        canceller.cancel();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_deregister() {
        let canceller = TaskCanceller::new();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let handle = canceller.signal().register(move || flag.set(true));

        assert!(canceller.signal().deregister(handle));
        assert!(!canceller.signal().deregister(handle));
        canceller.cancel();

        assert!(!ran.get());
    }

    #[test]
    fn test_cancellation_reason() {
        let canceller = TaskCanceller::new();
        assert_eq!(canceller.signal().cancellation_error(), None);

        canceller.cancel_with(CancellationError::new("track changed"));
        let error = canceller.signal().cancellation_error().unwrap();
        assert_eq!(error.reason(), "track changed");
    }

    #[test]
    fn test_parent_cancels_child_first() {
        let parent = TaskCanceller::new();
        let child = parent.signal().child();
        let order = Rc::new(RefCell::new(Vec::new()));

        let o = order.clone();
        child.signal().register(move || o.borrow_mut().push("child"));
        let o = order.clone();
        parent.signal().register(move || o.borrow_mut().push("parent"));

        parent.cancel_with(CancellationError::new("stop"));

        assert!(child.is_used());
        assert_eq!(*order.borrow(), vec!["child", "parent"]);
        assert_eq!(child.signal().cancellation_error().unwrap().reason(), "stop");
    }

    #[test]
    fn test_child_cancel_unlinks_from_parent() {
        let parent = TaskCanceller::new();
        let child = parent.signal().child();
        assert_eq!(parent.signal().pending_cleanups(), 1);

        child.cancel();

        assert_eq!(parent.signal().pending_cleanups(), 0);
        assert!(!parent.is_used());
    }

    #[test]
    fn test_nested_children() {
        let root = TaskCanceller::new();
        let mid = root.signal().child();
        let leaf = mid.signal().child();

        root.cancel();

        assert!(mid.is_used());
        assert!(leaf.is_used());
    }
}
