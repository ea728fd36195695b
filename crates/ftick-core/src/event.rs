#![forbid(unsafe_code)]

//! Typed publish/subscribe channels.
//!
//! [`Event<T>`] keeps an ordered list of `Fn(&T)` handlers. A handler is
//! registered in one of three ways:
//!
//! - **Unmanaged**: [`Event::subscribe_unmanaged`] returns a [`Subscription`]
//!   guard; dropping it (or calling [`Subscription::cancel`]) unsubscribes.
//! - **Lifetime-owned**: [`Event::subscribe_for_lifetime`] removes the handler
//!   when the [`Lifetime`] is disposed.
//! - **One-shot**: [`Event::subscribe_once`] removes the handler right before
//!   its first (and only) invocation.
//!
//! # Invariants
//!
//! 1. Handlers run synchronously, in registration order.
//! 2. `fire` works on a snapshot: handlers added during a firing are not
//!    visited by it; handlers removed during a firing are skipped if they have
//!    not run yet.
//! 3. A one-shot handler is removed before its body runs, so a re-entrant
//!    `fire` from inside it does not invoke it again.
//!
//! # Failure Modes
//!
//! Delivery is **fail-fast**: if a handler panics, the panic unwinds out of
//! [`Event::fire`] and the rest of the snapshot is not delivered. No borrow is
//! held while handlers run, so the event stays usable afterwards.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::lifetime::{Disposable, Lifetime};

type Handler<T> = Rc<dyn Fn(&T)>;

struct Entry<T> {
    id: u64,
    handler: Handler<T>,
    once: bool,
    live: Rc<Cell<bool>>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            handler: Rc::clone(&self.handler),
            once: self.once,
            live: Rc::clone(&self.live),
        }
    }
}

struct EventInner<T> {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry<T>>>,
}

impl<T> EventInner<T> {
    fn remove(&self, id: u64) {
        // The entry is dropped after the borrow ends: its handler may own
        // guards that call back into this event.
        let removed = {
            let mut entries = self.entries.borrow_mut();
            entries
                .iter()
                .position(|e| e.id == id)
                .map(|pos| entries.remove(pos))
        };
        if let Some(entry) = removed {
            entry.live.set(false);
        }
    }
}

// ─── Event ───────────────────────────────────────────────────────────────────

/// A typed publish/subscribe channel.
///
/// Cloning an `Event` creates a new handle to the **same** subscriber list.
pub struct Event<T> {
    inner: Rc<EventInner<T>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("subscribers", &self.inner.entries.borrow().len())
            .finish()
    }
}

impl<T: 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Event<T> {
    /// Create an event with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Rc::new(EventInner {
                next_id: Cell::new(0),
                entries: RefCell::new(Vec::new()),
            }),
        }
    }

    fn register(&self, handler: Handler<T>, once: bool) -> u64 {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);
        self.inner.entries.borrow_mut().push(Entry {
            id,
            handler,
            once,
            live: Rc::new(Cell::new(true)),
        });
        id
    }

    fn remove_on_dispose(&self, lifetime: &Lifetime, id: u64) {
        let weak: Weak<EventInner<T>> = Rc::downgrade(&self.inner);
        lifetime.on_disposed(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        });
    }

    /// Subscribe without an owner. The handler stays registered until the
    /// returned guard is dropped or cancelled.
    pub fn subscribe_unmanaged(&self, handler: impl Fn(&T) + 'static) -> Subscription {
        let id = self.register(Rc::new(handler), false);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        })
    }

    /// Subscribe until `lifetime` is disposed.
    ///
    /// Does nothing if `lifetime` is already expired.
    pub fn subscribe_for_lifetime(&self, lifetime: &Lifetime, handler: impl Fn(&T) + 'static) {
        if lifetime.is_expired() {
            return;
        }
        let id = self.register(Rc::new(handler), false);
        self.remove_on_dispose(lifetime, id);
    }

    /// Subscribe for exactly one delivery.
    pub fn subscribe_once(&self, handler: impl Fn(&T) + 'static) {
        self.register(Rc::new(handler), true);
    }

    /// Subscribe for at most one delivery, cancelled early if `lifetime`
    /// expires first.
    pub fn subscribe_once_for_lifetime(&self, lifetime: &Lifetime, handler: impl Fn(&T) + 'static) {
        if lifetime.is_expired() {
            return;
        }
        let id = self.register(Rc::new(handler), true);
        self.remove_on_dispose(lifetime, id);
    }

    /// A lifetime that expires the next time this event fires.
    #[must_use]
    pub fn create_next_fire_lifetime(&self) -> Lifetime {
        let lifetime = Lifetime::new();
        let handle = lifetime.clone();
        self.subscribe_once_for_lifetime(&lifetime, move |_| {
            handle.try_dispose();
        });
        lifetime
    }

    /// Deliver `value` to every current subscriber, in registration order.
    pub fn fire(&self, value: &T) {
        let snapshot: Vec<Entry<T>> = self.inner.entries.borrow().clone();
        for entry in snapshot {
            if !entry.live.get() {
                continue;
            }
            if entry.once {
                self.inner.remove(entry.id);
            }
            (entry.handler)(value);
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    /// Whether any handler is registered.
    #[must_use]
    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }
}

// ─── Subscription ────────────────────────────────────────────────────────────

/// RAII guard for an unmanaged subscription.
///
/// Dropping the guard unsubscribes. Use [`detach`](Self::detach) to keep the
/// handler registered for as long as the event exists. A `Subscription` is
/// also [`Disposable`], so ownership can be handed to a [`Lifetime`].
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: RefCell::new(Some(Box::new(cancel))),
        }
    }

    /// Unsubscribe now.
    pub fn cancel(self) {
        self.run_cancel();
    }

    /// Leak the subscription: the handler is never removed through this
    /// guard.
    pub fn detach(self) {
        self.cancel.borrow_mut().take();
    }

    /// Whether the guard still owns its handler.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.cancel.borrow().is_some()
    }

    fn run_cancel(&self) {
        let cancel = self.cancel.borrow_mut().take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

impl Disposable for Subscription {
    fn dispose(&self) {
        self.run_cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_cancel();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
