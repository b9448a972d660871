//! Shared references - single-value reactive channels
//!
//! A [`SharedReference`] holds the latest value of some type and pushes every
//! new value to its subscribers synchronously, in subscription order. A
//! subscriber publishing on another reference from inside its callback is
//! delivered depth-first, before the outer delivery loop moves on.
//!
//! The producer keeps the [`SharedReference`]; consumers get a
//! [`ReadOnlyReference`], which can observe but never write or finish.
//!
//! ```rust
//! use kino_tracks::reference::{SharedReference, UpdateOptions};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let bitrate = SharedReference::new(400_000u64);
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! bitrate.read_only().on_update(
//!     move |v| sink.borrow_mut().push(*v),
//!     UpdateOptions::default().emit_current_value(),
//! );
//!
//! bitrate.set_value(800_000);
//! assert_eq!(*seen.borrow(), vec![400_000, 800_000]);
//! ```

use crate::cancellation::{CancellationSignal, CleanupHandle, WeakSignal};
use crate::error::{Error, Result};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::error;

type Callback<T> = Rc<dyn Fn(&T)>;

/// Cleanup a subscription left on its `clear_signal`
type ClearSlot = Rc<RefCell<Option<(WeakSignal, CleanupHandle)>>>;

struct Listener<T> {
    id: u64,
    callback: Callback<T>,
    removed: Rc<Cell<bool>>,
    clear: ClearSlot,
}

struct Listeners<T> {
    entries: Vec<Listener<T>>,
    on_finished: Vec<(u64, Box<dyn FnOnce()>)>,
    next_id: u64,
}

/// Drop the `clear_signal` cleanup of a listener that is gone anyway.
fn release(clear: &ClearSlot) {
    let registered = clear.borrow_mut().take();
    if let Some((signal, handle)) = registered {
        signal.deregister(handle);
    }
}

struct Inner<T> {
    value: RefCell<T>,
    listeners: RefCell<Listeners<T>>,
    finished: Cell<bool>,
}

/// Options for `on_update`
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Call the callback once with the current value before returning
    pub emit_current_value: bool,
    /// Remove the subscription when this signal is cancelled
    pub clear_signal: Option<CancellationSignal>,
}

impl UpdateOptions {
    pub fn emit_current_value(mut self) -> Self {
        self.emit_current_value = true;
        self
    }

    pub fn clear_signal(mut self, signal: &CancellationSignal) -> Self {
        self.clear_signal = Some(signal.clone());
        self
    }
}

/// Handle to a subscription made with `on_update`
#[derive(Clone)]
pub struct Subscription {
    removed: Rc<Cell<bool>>,
    unlisten: Rc<dyn Fn()>,
}

impl Subscription {
    fn inert() -> Self {
        Self {
            removed: Rc::new(Cell::new(true)),
            unlisten: Rc::new(|| {}),
        }
    }

    /// Stop receiving updates. Idempotent.
    pub fn unsubscribe(&self) {
        (self.unlisten)();
    }

    /// Returns true while the callback can still be invoked
    pub fn is_active(&self) -> bool {
        !self.removed.get()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

impl<T: Clone + 'static> Inner<T> {
    fn new(value: T) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(value),
            listeners: RefCell::new(Listeners {
                entries: Vec::new(),
                on_finished: Vec::new(),
                next_id: 0,
            }),
            finished: Cell::new(false),
        })
    }

    fn get_value(&self) -> T {
        self.value.borrow().clone()
    }

    fn publish(&self, value: T) {
        *self.value.borrow_mut() = value.clone();
        let snapshot: Vec<(Callback<T>, Rc<Cell<bool>>)> = self
            .listeners
            .borrow()
            .entries
            .iter()
            .map(|l| (l.callback.clone(), l.removed.clone()))
            .collect();
        for (callback, removed) in snapshot {
            // Earlier callbacks may have unsubscribed later ones.
            if !removed.get() {
                callback(&value);
            }
        }
    }

    fn on_update(
        self: &Rc<Self>,
        callback: impl Fn(&T) + 'static,
        options: UpdateOptions,
    ) -> Subscription {
        let callback: Callback<T> = Rc::new(callback);
        if self.finished.get() {
            if options.emit_current_value {
                callback(&self.get_value());
            }
            return Subscription::inert();
        }

        let removed = Rc::new(Cell::new(false));
        let clear: ClearSlot = Rc::new(RefCell::new(None));
        let id = {
            let mut listeners = self.listeners.borrow_mut();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push(Listener {
                id,
                callback: callback.clone(),
                removed: removed.clone(),
                clear: clear.clone(),
            });
            id
        };

        let weak: Weak<Self> = Rc::downgrade(self);
        let flag = removed.clone();
        let slot = clear.clone();
        let unlisten: Rc<dyn Fn()> = Rc::new(move || {
            if flag.replace(true) {
                return;
            }
            release(&slot);
            if let Some(inner) = weak.upgrade() {
                inner.listeners.borrow_mut().entries.retain(|l| l.id != id);
            }
        });
        let subscription = Subscription { removed, unlisten };

        if options.emit_current_value {
            callback(&self.get_value());
        }
        if let Some(signal) = options.clear_signal {
            let handle = subscription.clone();
            let cleanup = signal.register(move || handle.unsubscribe());
            // Already gone if the signal was cancelled or the first emission
            // unsubscribed.
            if subscription.is_active() {
                *clear.borrow_mut() = Some((signal.downgrade(), cleanup));
            }
        }
        subscription
    }

    /// Returns the id of the stored callback, `None` if it ran right away.
    fn on_finished(&self, callback: impl FnOnce() + 'static) -> Option<u64> {
        if self.finished.get() {
            callback();
            return None;
        }
        let mut listeners = self.listeners.borrow_mut();
        let id = listeners.next_id;
        listeners.next_id += 1;
        listeners.on_finished.push((id, Box::new(callback)));
        Some(id)
    }

    fn remove_on_finished(&self, id: u64) {
        self.listeners
            .borrow_mut()
            .on_finished
            .retain(|(entry_id, _)| *entry_id != id);
    }

    fn finish(&self) {
        if self.finished.replace(true) {
            return;
        }
        let (entries, on_finished) = {
            let mut listeners = self.listeners.borrow_mut();
            (
                std::mem::take(&mut listeners.entries),
                std::mem::take(&mut listeners.on_finished),
            )
        };
        for listener in &entries {
            listener.removed.set(true);
            release(&listener.clear);
        }
        for (_, callback) in on_finished {
            callback();
        }
    }

    fn subscriber_count(&self) -> usize {
        self.listeners.borrow().entries.len()
    }
}

/// Writable single-value reference, held by the producer
pub struct SharedReference<T> {
    inner: Rc<Inner<T>>,
}

/// Read-only view of a [`SharedReference`]
pub struct ReadOnlyReference<T> {
    inner: Rc<Inner<T>>,
}

impl<T> Clone for SharedReference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Clone for ReadOnlyReference<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> SharedReference<T> {
    /// Create a live reference holding `value`
    pub fn new(value: T) -> Self {
        Self {
            inner: Inner::new(value),
        }
    }

    /// Create a reference that finishes by itself when `signal` is cancelled
    pub fn with_finish_signal(value: T, signal: &CancellationSignal) -> Self {
        let reference = Self::new(value);
        let weak = Rc::downgrade(&reference.inner);
        signal.register(move || {
            if let Some(inner) = weak.upgrade() {
                inner.finish();
            }
        });
        reference
    }

    pub fn get_value(&self) -> T {
        self.inner.get_value()
    }

    /// Borrow the current value without cloning it.
    ///
    /// `f` must not publish on this same reference.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value and notify subscribers.
    ///
    /// Updating a finished reference is a programming error: it is logged and
    /// ignored. Use [`try_set_value`](Self::try_set_value) to get it back as
    /// an error instead.
    pub fn set_value(&self, value: T) {
        if self.inner.finished.get() {
            error!(
                code = Error::ReferenceFinished.error_code(),
                "Finished shared references cannot be updated"
            );
            return;
        }
        self.inner.publish(value);
    }

    pub fn try_set_value(&self, value: T) -> Result<()> {
        if self.inner.finished.get() {
            return Err(Error::ReferenceFinished);
        }
        self.inner.publish(value);
        Ok(())
    }

    pub fn on_update(
        &self,
        callback: impl Fn(&T) + 'static,
        options: UpdateOptions,
    ) -> Subscription {
        self.inner.on_update(callback, options)
    }

    pub fn on_finished(&self, callback: impl FnOnce() + 'static) {
        self.inner.on_finished(callback);
    }

    /// Permanently stop this reference and detach every subscriber.
    pub fn finish(&self) {
        self.inner.finish()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.get()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    pub fn read_only(&self) -> ReadOnlyReference<T> {
        ReadOnlyReference {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> SharedReference<T> {
    /// Publish only if `value` differs from the current one.
    pub fn set_value_if_changed(&self, value: T) {
        if *self.inner.value.borrow() != value {
            self.set_value(value);
        }
    }
}

impl<T: Clone + 'static> ReadOnlyReference<T> {
    /// A reference that will never change
    pub fn constant(value: T) -> Self {
        let inner = Inner::new(value);
        inner.finish();
        Self { inner }
    }

    pub fn get_value(&self) -> T {
        self.inner.get_value()
    }

    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    pub fn on_update(
        &self,
        callback: impl Fn(&T) + 'static,
        options: UpdateOptions,
    ) -> Subscription {
        self.inner.on_update(callback, options)
    }

    pub fn on_finished(&self, callback: impl FnOnce() + 'static) {
        self.inner.on_finished(callback);
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.get()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }

    /// Returns true if both handles point to the same reference
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<U: Clone + 'static> ReadOnlyReference<Option<U>> {
    /// Call `callback` once with the first defined value.
    ///
    /// Runs immediately if a value is already there. Nothing happens if
    /// `signal` is cancelled first.
    pub fn on_defined(&self, callback: impl FnOnce(&U) + 'static, signal: &CancellationSignal) {
        if let Some(value) = self.get_value() {
            callback(&value);
            return;
        }
        let canceller = Rc::new(signal.child());
        let pending = RefCell::new(Some(callback));
        let stop = canceller.clone();
        self.on_update(
            move |value| {
                let Some(value) = value else {
                    return;
                };
                let callback = pending.borrow_mut().take();
                if let Some(callback) = callback {
                    stop.cancel();
                    callback(value);
                }
            },
            UpdateOptions::default().clear_signal(&canceller.signal()),
        );
    }
}

/// Derive a reference whose value is `map` applied to `source`.
///
/// The derived reference follows `source` until `signal` is cancelled or
/// `source` finishes, then finishes too.
pub fn create_mapped_reference<T, U>(
    source: &ReadOnlyReference<T>,
    map: impl Fn(&T) -> U + 'static,
    signal: &CancellationSignal,
) -> ReadOnlyReference<U>
where
    T: Clone + 'static,
    U: Clone + 'static,
{
    let mapped = SharedReference::with_finish_signal(source.with_value(&map), signal);
    let target = mapped.clone();
    source.on_update(
        move |value| target.set_value(map(value)),
        UpdateOptions::default().clear_signal(signal),
    );
    let target = Rc::downgrade(&mapped.inner);
    let finish_mapped = source.inner.on_finished(move || {
        if let Some(target) = target.upgrade() {
            target.finish();
        }
    });
    if let Some(id) = finish_mapped {
        let weak_source = Rc::downgrade(&source.inner);
        signal.register(move || {
            if let Some(source) = weak_source.upgrade() {
                source.remove_on_finished(id);
            }
        });
    }
    mapped.read_only()
}

impl<T: fmt::Debug> fmt::Debug for SharedReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedReference")
            .field("value", &*self.inner.value.borrow())
            .field("finished", &self.inner.finished.get())
            .finish()
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadOnlyReference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlyReference")
            .field("value", &*self.inner.value.borrow())
            .field("finished", &self.inner.finished.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::TaskCanceller;

    fn recorder<T: Clone + 'static>() -> (Rc<RefCell<Vec<T>>>, impl Fn(&T) + 'static) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |v: &T| sink.borrow_mut().push(v.clone()))
    }

    #[test]
    fn test_get_and_set_value() {
        let reference = SharedReference::new(1);
        assert_eq!(reference.get_value(), 1);
        reference.set_value(2);
        assert_eq!(reference.get_value(), 2);
        assert_eq!(reference.read_only().get_value(), 2);
    }

    #[test]
    fn test_subscribers_called_in_order() {
        let reference = SharedReference::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let order = order.clone();
            reference.on_update(
                move |v| order.borrow_mut().push((name, *v)),
                UpdateOptions::default(),
            );
        }

        reference.set_value(7);

        assert_eq!(*order.borrow(), vec![("a", 7), ("b", 7), ("c", 7)]);
    }

    #[test]
    fn test_emit_current_value() {
        let reference = SharedReference::new("initial".to_string());
        let (seen, callback) = recorder();

        reference.on_update(callback, UpdateOptions::default().emit_current_value());

        assert_eq!(*seen.borrow(), vec!["initial".to_string()]);
    }

    #[test]
    fn test_clear_signal_removes_subscription() {
        let reference = SharedReference::new(0);
        let canceller = TaskCanceller::new();
        let (seen, callback) = recorder();
        reference.on_update(callback, UpdateOptions::default().clear_signal(&canceller.signal()));

        reference.set_value(1);
        canceller.cancel();
        reference.set_value(2);

        assert_eq!(*seen.borrow(), vec![1]);
        assert_eq!(reference.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe() {
        let reference = SharedReference::new(0);
        let (seen, callback) = recorder();
        let subscription = reference.on_update(callback, UpdateOptions::default());

        assert!(subscription.is_active());
        subscription.unsubscribe();
        subscription.unsubscribe();
        reference.set_value(1);

        assert!(!subscription.is_active());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_unsubscribe_during_delivery_skips_later_listener() {
        let reference = SharedReference::new(0);
        let (seen, callback) = recorder();
        let later: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

        let slot = later.clone();
        reference.on_update(
            move |_| {
                if let Some(sub) = slot.borrow().as_ref() {
                    sub.unsubscribe();
                }
            },
            UpdateOptions::default(),
        );
        *later.borrow_mut() = Some(reference.on_update(callback, UpdateOptions::default()));

        reference.set_value(1);

        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn test_finish() {
        let reference = SharedReference::new(1);
        let (seen, callback) = recorder();
        reference.on_update(callback, UpdateOptions::default());
        let finished = Rc::new(Cell::new(0));
        let counter = finished.clone();
        reference.on_finished(move || counter.set(counter.get() + 1));

        reference.finish();
        reference.finish();
        reference.set_value(2);

        assert!(reference.is_finished());
        assert_eq!(reference.get_value(), 1);
        assert!(seen.borrow().is_empty());
        assert_eq!(finished.get(), 1);
        assert_eq!(reference.subscriber_count(), 0);
        assert!(matches!(reference.try_set_value(3), Err(Error::ReferenceFinished)));
    }

    #[test]
    fn test_on_update_after_finish_is_inert() {
        let reference = SharedReference::new(5);
        reference.finish();
        let (seen, callback) = recorder();

        let subscription =
            reference.on_update(callback, UpdateOptions::default().emit_current_value());

        assert_eq!(*seen.borrow(), vec![5]);
        assert!(!subscription.is_active());
        assert_eq!(reference.subscriber_count(), 0);
    }

    #[test]
    fn test_with_finish_signal() {
        let canceller = TaskCanceller::new();
        let reference = SharedReference::with_finish_signal(0, &canceller.signal());

        canceller.cancel();

        assert!(reference.is_finished());
    }

    #[test]
    fn test_reentrant_delivery_is_depth_first() {
        let first = SharedReference::new(0);
        let second = SharedReference::new(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let forward = second.clone();
        let l = log.clone();
        first.on_update(
            move |v| {
                l.borrow_mut().push(format!("first-a:{}", v));
                forward.set_value(v * 10);
            },
            UpdateOptions::default(),
        );
        let l = log.clone();
        first.on_update(
            move |v| l.borrow_mut().push(format!("first-b:{}", v)),
            UpdateOptions::default(),
        );
        let l = log.clone();
        second.on_update(
            move |v| l.borrow_mut().push(format!("second:{}", v)),
            UpdateOptions::default(),
        );

        first.set_value(3);

        assert_eq!(
            *log.borrow(),
            vec!["first-a:3".to_string(), "second:30".to_string(), "first-b:3".to_string()]
        );
    }

    #[test]
    fn test_set_value_from_own_listener() {
        let reference = SharedReference::new(0);
        let (seen, callback) = recorder();
        let inner = reference.clone();
        reference.on_update(
            move |v| {
                if *v < 3 {
                    inner.set_value(v + 1);
                }
            },
            UpdateOptions::default(),
        );
        reference.on_update(callback, UpdateOptions::default());

        reference.set_value(1);

        assert_eq!(reference.get_value(), 3);
        assert_eq!(*seen.borrow(), vec![3, 2, 1]);
    }

    #[test]
    fn test_set_value_if_changed() {
        let reference = SharedReference::new(1);
        let (seen, callback) = recorder();
        reference.on_update(callback, UpdateOptions::default());

        reference.set_value_if_changed(1);
        reference.set_value_if_changed(2);

        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn test_constant_reference() {
        let reference = ReadOnlyReference::constant(Some(4));
        assert!(reference.is_finished());
        assert_eq!(reference.get_value(), Some(4));
    }

    #[test]
    fn test_mapped_reference() {
        let source = SharedReference::new(2);
        let canceller = TaskCanceller::new();
        let doubled = create_mapped_reference(&source.read_only(), |v| v * 2, &canceller.signal());

        assert_eq!(doubled.get_value(), 4);
        source.set_value(5);
        assert_eq!(doubled.get_value(), 10);

        canceller.cancel();
        source.set_value(6);
        assert_eq!(doubled.get_value(), 10);
        assert!(doubled.is_finished());
    }

    #[test]
    fn test_mapped_reference_finishes_with_source() {
        let source = SharedReference::new(2);
        let canceller = TaskCanceller::new();
        let doubled = create_mapped_reference(&source.read_only(), |v| v * 2, &canceller.signal());

        source.finish();

        assert!(doubled.is_finished());
        assert_eq!(source.subscriber_count(), 0);
    }

    #[test]
    fn test_cancelled_mapped_references_release_source() {
        let source = SharedReference::new(1);
        let mut dropped = Vec::new();
        for _ in 0..1000 {
            let canceller = TaskCanceller::new();
            let mapped =
                create_mapped_reference(&source.read_only(), |v| v + 1, &canceller.signal());
            canceller.cancel();
            dropped.push(Rc::downgrade(&mapped.inner));
        }

        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(source.inner.listeners.borrow().on_finished.len(), 0);
        assert!(dropped.iter().all(|weak| weak.upgrade().is_none()));
    }

    #[test]
    fn test_unsubscribe_releases_clear_signal_cleanup() {
        let reference = SharedReference::new(0);
        let canceller = TaskCanceller::new();
        let signal = canceller.signal();
        let subscription =
            reference.on_update(|_| {}, UpdateOptions::default().clear_signal(&signal));
        assert_eq!(signal.pending_cleanups(), 1);

        subscription.unsubscribe();
        assert_eq!(signal.pending_cleanups(), 0);

        reference.on_update(|_| {}, UpdateOptions::default().clear_signal(&signal));
        reference.finish();
        assert_eq!(signal.pending_cleanups(), 0);
    }

    #[test]
    fn test_on_defined() {
        let reference: SharedReference<Option<u32>> = SharedReference::new(None);
        let canceller = TaskCanceller::new();
        let (seen, callback) = recorder();

        reference.read_only().on_defined(move |v| callback(v), &canceller.signal());
        reference.set_value(None);
        reference.set_value(Some(8));
        reference.set_value(Some(9));

        assert_eq!(*seen.borrow(), vec![8]);
        assert_eq!(reference.subscriber_count(), 0);
    }
}
