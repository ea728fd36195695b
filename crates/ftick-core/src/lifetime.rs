#![forbid(unsafe_code)]

//! Lifetime-scoped ownership with deterministic, ordered teardown.
//!
//! A [`Lifetime`] is a token that owns teardown work. Anything that wants to
//! outlive "for as long as X exists" registers against X's lifetime, and the
//! registration is torn down automatically when X is disposed.
//!
//! # Design
//!
//! `Lifetime` is cheaply cloneable (`Rc` inside). All clones share one state.
//! Dropping every handle does **not** dispose the lifetime; disposal is always
//! explicit via [`Lifetime::dispose`] or [`Lifetime::try_dispose`].
//!
//! # Invariants
//!
//! 1. State only moves forward: `Active → Expiring → Expired`.
//! 2. Teardown runs at most once, in three passes: plain callbacks, then owned
//!    resources, then parameterized callbacks. Each pass runs in registration
//!    order; categories are never interleaved.
//! 3. Registrations on an `Expired` (or forever) lifetime are silently dropped.
//! 4. Registrations made while `Expiring` join their category's queue and run
//!    in a further round of the three passes before the state becomes
//!    `Expired`.
//! 5. A re-entrant `dispose()` during teardown is a no-op.
//!
//! # Failure Modes
//!
//! - **Teardown panics**: the panic unwinds out of `dispose()`; the lifetime
//!   stays `Expiring` and the remaining teardown does not run.
//! - **Disposing the forever lifetime**: programming error, panics.
//!
//! # Example
//!
//! ```
//! use ftick_core::lifetime::Lifetime;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let lt = Lifetime::new();
//! let ran = Rc::new(Cell::new(0));
//! let r = Rc::clone(&ran);
//! lt.on_disposed(move || r.set(r.get() + 1));
//!
//! lt.dispose();
//! lt.dispose();
//! assert_eq!(ran.get(), 1);
//! assert!(!lt.try_dispose());
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

#[cfg(feature = "tracing")]
use crate::logging::trace;
#[cfg(not(feature = "tracing"))]
use crate::trace;

static NEXT_LIFETIME_ID: AtomicU64 = AtomicU64::new(1);

fn next_lifetime_id() -> u64 {
    NEXT_LIFETIME_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Disposable ──────────────────────────────────────────────────────────────

/// A resource released when its owning [`Lifetime`] is disposed.
pub trait Disposable {
    /// Release the resource. Called exactly once by the owning lifetime.
    fn dispose(&self);
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle state of a [`Lifetime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifetimeState {
    /// Accepting registrations; teardown has not started.
    Active,
    /// Teardown is running.
    Expiring,
    /// Teardown finished. Terminal.
    Expired,
}

/// A callback stored together with its argument, so no closure is boxed.
trait ParameterizedCallback {
    fn invoke(self: Box<Self>);
}

struct WithState<S> {
    state: S,
    callback: fn(S),
}

impl<S> ParameterizedCallback for WithState<S> {
    fn invoke(self: Box<Self>) {
        (self.callback)(self.state);
    }
}

#[derive(Default)]
struct Registries {
    next_slot: u64,
    callbacks: VecDeque<(u64, Box<dyn FnOnce()>)>,
    resources: VecDeque<Box<dyn Disposable>>,
    parameterized: VecDeque<Box<dyn ParameterizedCallback>>,
}

struct LifetimeInner {
    id: u64,
    forever: bool,
    state: Cell<LifetimeState>,
    registries: RefCell<Registries>,
}

// ─── Lifetime ────────────────────────────────────────────────────────────────

/// Scoped ownership token.
///
/// Cheaply cloneable; clones share state. See the [module docs](self).
#[derive(Clone)]
pub struct Lifetime {
    inner: Rc<LifetimeInner>,
}

impl Lifetime {
    // ── Constructors ─────────────────────────────────────────────────

    /// Create a new active lifetime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(LifetimeState::Active, false)
    }

    /// A lifetime that never expires.
    ///
    /// Registrations on it are dropped without running, since they could
    /// never fire. Calling [`dispose`](Self::dispose) on it panics.
    #[must_use]
    pub fn forever() -> Self {
        Self::with_state(LifetimeState::Active, true)
    }

    /// A lifetime that is already expired.
    #[must_use]
    pub fn expired() -> Self {
        Self::with_state(LifetimeState::Expired, false)
    }

    fn with_state(state: LifetimeState, forever: bool) -> Self {
        Self {
            inner: Rc::new(LifetimeInner {
                id: next_lifetime_id(),
                forever,
                state: Cell::new(state),
                registries: RefCell::new(Registries::default()),
            }),
        }
    }

    /// A lifetime that expires as soon as any of `lifetimes` expires.
    ///
    /// Expiring the derived lifetime does not affect its inputs. If any input
    /// is already expired the result is returned expired.
    #[must_use]
    pub fn earliest_of(lifetimes: &[Lifetime]) -> Self {
        let derived = Self::new();
        if lifetimes.iter().any(Lifetime::is_expired) {
            derived.dispose();
            return derived;
        }
        for lifetime in lifetimes {
            let handle = derived.clone();
            lifetime.link(&derived, move || {
                handle.try_dispose();
            });
        }
        derived
    }

    /// A lifetime that expires once every one of `lifetimes` has expired.
    ///
    /// An empty slice (or one whose members are all expired) yields an
    /// already-expired lifetime.
    #[must_use]
    pub fn when_all(lifetimes: &[Lifetime]) -> Self {
        let derived = Self::new();
        let pending: Vec<&Lifetime> = lifetimes.iter().filter(|l| !l.is_expired()).collect();
        if pending.is_empty() {
            derived.dispose();
            return derived;
        }

        let remaining = Rc::new(Cell::new(pending.len()));
        for lifetime in pending {
            let remaining = Rc::clone(&remaining);
            let handle = derived.clone();
            lifetime.link(&derived, move || {
                let left = remaining.get().saturating_sub(1);
                remaining.set(left);
                if left == 0 {
                    handle.try_dispose();
                }
            });
        }
        derived
    }

    /// Create a child that is disposed when `self` is, but not vice versa.
    #[must_use]
    pub fn create_child(&self) -> Self {
        let child = Self::new();
        if self.is_expired() {
            child.dispose();
            return child;
        }
        let handle = child.clone();
        self.link(&child, move || {
            handle.try_dispose();
        });
        child
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Process-unique identifier (for tracing/logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LifetimeState {
        self.inner.state.get()
    }

    /// Whether teardown has completed.
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.state() == LifetimeState::Expired
    }

    /// Whether teardown is currently running.
    #[inline]
    #[must_use]
    pub fn is_expiring(&self) -> bool {
        self.state() == LifetimeState::Expiring
    }

    /// Whether this is a forever lifetime.
    #[inline]
    #[must_use]
    pub fn is_forever(&self) -> bool {
        self.inner.forever
    }

    /// Whether two handles refer to the same lifetime.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Lifetime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn accepts_registrations(&self) -> bool {
        !self.inner.forever && !self.is_expired()
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Run `callback` when this lifetime is disposed.
    pub fn on_disposed(&self, callback: impl FnOnce() + 'static) {
        self.register_callback(Box::new(callback));
    }

    fn register_callback(&self, callback: Box<dyn FnOnce()>) -> Option<u64> {
        if !self.accepts_registrations() {
            return None;
        }
        let mut registries = self.inner.registries.borrow_mut();
        let slot = registries.next_slot;
        registries.next_slot += 1;
        registries.callbacks.push_back((slot, callback));
        Some(slot)
    }

    /// Run `callback` when `self` is disposed, unless `dependent` is disposed
    /// first, in which case the registration is withdrawn from `self`.
    ///
    /// `dependent` only holds a weak reference back to `self`.
    fn link(&self, dependent: &Lifetime, callback: impl FnOnce() + 'static) {
        let Some(slot) = self.register_callback(Box::new(callback)) else {
            return;
        };
        let source = Rc::downgrade(&self.inner);
        dependent.on_disposed(move || {
            let Some(inner) = source.upgrade() else {
                return;
            };
            let withdrawn = {
                let mut registries = inner.registries.borrow_mut();
                let index = registries.callbacks.iter().position(|(s, _)| *s == slot);
                index.and_then(|index| registries.callbacks.remove(index))
            };
            // Dropped outside the borrow: the callback may own lifetimes.
            drop(withdrawn);
        });
    }

    /// Take ownership of `resource` and release it when this lifetime is
    /// disposed.
    pub fn on_disposed_resource(&self, resource: impl Disposable + 'static) {
        if self.accepts_registrations() {
            self.inner
                .registries
                .borrow_mut()
                .resources
                .push_back(Box::new(resource));
        }
    }

    /// Run `callback(state)` when this lifetime is disposed.
    ///
    /// `callback` is a plain function pointer; `state` is stored alongside it
    /// instead of being captured by a closure.
    pub fn on_disposed_with<S: 'static>(&self, state: S, callback: fn(S)) {
        if self.accepts_registrations() {
            self.inner
                .registries
                .borrow_mut()
                .parameterized
                .push_back(Box::new(WithState { state, callback }));
        }
    }

    // ── Disposal ─────────────────────────────────────────────────────

    /// Dispose this lifetime, running all registered teardown.
    ///
    /// Idempotent: calls after the first (including re-entrant calls from
    /// inside teardown) do nothing.
    ///
    /// # Panics
    ///
    /// Panics if called on a [`forever`](Self::forever) lifetime.
    pub fn dispose(&self) {
        assert!(
            !self.inner.forever,
            "the forever lifetime cannot be disposed"
        );
        if self.state() != LifetimeState::Active {
            return;
        }
        self.inner.state.set(LifetimeState::Expiring);
        trace!(lifetime_id = self.inner.id, "lifetime expiring");

        loop {
            let mut ran = false;
            while let Some(callback) = self.pop_callback() {
                callback();
                ran = true;
            }
            while let Some(resource) = self.pop_resource() {
                resource.dispose();
                ran = true;
            }
            while let Some(callback) = self.pop_parameterized() {
                callback.invoke();
                ran = true;
            }
            if !ran {
                break;
            }
        }

        self.inner.state.set(LifetimeState::Expired);
        trace!(lifetime_id = self.inner.id, "lifetime expired");
    }

    /// Dispose if still active. Returns `false` without effect when the
    /// lifetime is already expiring, expired, or is the forever lifetime.
    pub fn try_dispose(&self) -> bool {
        if self.inner.forever || self.state() != LifetimeState::Active {
            return false;
        }
        self.dispose();
        true
    }

    // The registry borrow must be released before teardown code runs, so
    // each pop happens in its own call.
    fn pop_callback(&self) -> Option<Box<dyn FnOnce()>> {
        self.inner
            .registries
            .borrow_mut()
            .callbacks
            .pop_front()
            .map(|(_, callback)| callback)
    }

    fn pop_resource(&self) -> Option<Box<dyn Disposable>> {
        self.inner.registries.borrow_mut().resources.pop_front()
    }

    fn pop_parameterized(&self) -> Option<Box<dyn ParameterizedCallback>> {
        self.inner.registries.borrow_mut().parameterized.pop_front()
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Lifetime {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Lifetime {}

impl fmt::Debug for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifetime")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("forever", &self.inner.forever)
            .finish()
    }
}

impl Disposable for Lifetime {
    fn dispose(&self) {
        Lifetime::dispose(self);
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
