#![forbid(unsafe_code)]

//! Spatial elements.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ftick_core::{Event, Lifetime};

use crate::geometry::{Angle, Bounds};
use crate::velocity::Velocity;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique element identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(u64);

impl ElementId {
    /// Raw numeric id.
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Caller-defined category tag, used for kind-based exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementKind(&'static str);

impl ElementKind {
    /// A kind tag named `name`.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// The tag name.
    pub const fn name(self) -> &'static str {
        self.0
    }
}

struct ElementInner {
    id: ElementId,
    kind: ElementKind,
    bounds: Cell<Bounds>,
    z_index: Cell<i32>,
    lifetime: Lifetime,
    velocity: RefCell<Option<Velocity>>,
    bounds_changed: Event<Bounds>,
}

/// Handle to a positioned element. Clones refer to the same element;
/// equality is identity.
#[derive(Clone)]
pub struct Element {
    inner: Rc<ElementInner>,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind.name())
            .field("bounds", &self.inner.bounds.get())
            .field("z_index", &self.inner.z_index.get())
            .finish()
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Element {}

impl Element {
    /// Create an element of `kind` at `bounds` on z-plane 0.
    pub fn new(kind: ElementKind, bounds: Bounds) -> Self {
        Self {
            inner: Rc::new(ElementInner {
                id: ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)),
                kind,
                bounds: Cell::new(bounds),
                z_index: Cell::new(0),
                lifetime: Lifetime::new(),
                velocity: RefCell::new(None),
                bounds_changed: Event::new(),
            }),
        }
    }

    /// Place the element on z-plane `z`.
    #[must_use]
    pub fn with_z_index(self, z: i32) -> Self {
        self.inner.z_index.set(z);
        self
    }

    /// Attach `velocity` so the driver moves the element.
    #[must_use]
    pub fn with_velocity(self, velocity: Velocity) -> Self {
        self.set_velocity(Some(velocity));
        self
    }

    /// Process-unique id.
    pub fn id(&self) -> ElementId {
        self.inner.id
    }

    /// Kind tag used by exclusion rules.
    pub fn kind(&self) -> ElementKind {
        self.inner.kind
    }

    /// Current bounds.
    pub fn bounds(&self) -> Bounds {
        self.inner.bounds.get()
    }

    /// Z-plane; only same-plane elements collide.
    pub fn z_index(&self) -> i32 {
        self.inner.z_index.get()
    }

    /// Move the element to z-plane `z`.
    pub fn set_z_index(&self, z: i32) {
        self.inner.z_index.set(z);
    }

    /// Disposing this lifetime removes the element from its space.
    pub fn lifetime(&self) -> &Lifetime {
        &self.inner.lifetime
    }

    /// The attached velocity, if any.
    pub fn velocity(&self) -> Option<Velocity> {
        self.inner.velocity.borrow().clone()
    }

    /// Attach or detach a velocity.
    pub fn set_velocity(&self, velocity: Option<Velocity>) {
        *self.inner.velocity.borrow_mut() = velocity;
    }

    /// Fires with the new bounds whenever they change.
    pub fn bounds_changed(&self) -> &Event<Bounds> {
        &self.inner.bounds_changed
    }

    /// Move or resize the element. Fires `bounds_changed` only on change.
    pub fn set_bounds(&self, bounds: Bounds) {
        if self.inner.bounds.replace(bounds) != bounds {
            self.inner.bounds_changed.fire(&bounds);
        }
    }

    /// Move `distance` units along `angle`.
    pub fn move_along(&self, angle: Angle, distance: f32) {
        self.set_bounds(self.bounds().offset(angle, distance));
    }
}
