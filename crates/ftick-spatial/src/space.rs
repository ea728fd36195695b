#![forbid(unsafe_code)]

//! A bounded space of elements.
//!
//! Renderers observe [`Space::elements`] for additions and removals and each
//! element's `bounds_changed` for movement. Disposing an element's lifetime
//! removes it from the space.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use ftick_core::Lifetime;
use ftick_runtime::{ObservableCollection, RuntimeError, RuntimeResult, TimeFunction, TimeScheduler};
use tracing::{debug, warn};

use crate::collider::{HitPredictor, ObstacleResolver};
use crate::driver::VelocityDriver;
use crate::element::{Element, ElementId};
use crate::geometry::Bounds;

static NEXT_SPACE_ID: AtomicU64 = AtomicU64::new(1);

struct SpaceInner {
    id: u64,
    bounds: Cell<Bounds>,
    elements: ObservableCollection<Element>,
    driver: RefCell<Option<Lifetime>>,
}

/// Shared handle to a space.
#[derive(Clone)]
pub struct Space {
    inner: Rc<SpaceInner>,
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Space")
            .field("id", &self.inner.id)
            .field("bounds", &self.inner.bounds.get())
            .field("elements", &self.inner.elements.len())
            .field("driver_running", &self.driver_running())
            .finish()
    }
}

impl Space {
    /// An empty space with outer `bounds`.
    pub fn new(bounds: Bounds) -> Self {
        Self {
            inner: Rc::new(SpaceInner {
                id: NEXT_SPACE_ID.fetch_add(1, Ordering::Relaxed),
                bounds: Cell::new(bounds),
                elements: ObservableCollection::new(),
                driver: RefCell::new(None),
            }),
        }
    }

    /// Process-unique identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Outer bounds; the boundary colliders hug these.
    pub fn bounds(&self) -> Bounds {
        self.inner.bounds.get()
    }

    /// Resize the space. Takes effect on the next tick.
    pub fn set_bounds(&self, bounds: Bounds) {
        self.inner.bounds.set(bounds);
    }

    /// The element collection. Observe it for additions and removals.
    pub fn elements(&self) -> &ObservableCollection<Element> {
        &self.inner.elements
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.elements.len()
    }

    /// Whether the space holds no elements.
    pub fn is_empty(&self) -> bool {
        self.inner.elements.is_empty()
    }

    /// Look up an element by id.
    pub fn element(&self, id: ElementId) -> Option<Element> {
        self.inner
            .elements
            .to_vec()
            .into_iter()
            .find(|e| e.id() == id)
    }

    /// Add `element`. It is removed again when its lifetime expires.
    ///
    /// Expired or already-present elements are ignored, as are elements a
    /// `before_added` observer rejects by shrinking the collection.
    pub fn add(&self, element: &Element) {
        if element.lifetime().is_expired() || self.inner.elements.contains(element) {
            return;
        }
        if let Err(err) = self.inner.elements.add(element.clone()) {
            warn!(space = self.inner.id, element = %element.id(), %err, "element not added");
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let handle = element.clone();
        element.lifetime().on_disposed(move || {
            if let Some(inner) = weak.upgrade() {
                inner.elements.remove(&handle);
            }
        });
    }

    /// Remove `element` by disposing its lifetime.
    pub fn remove(&self, element: &Element) {
        element.lifetime().try_dispose();
    }

    /// Whether a velocity driver is currently registered for this space.
    pub fn driver_running(&self) -> bool {
        self.inner
            .driver
            .borrow()
            .as_ref()
            .is_some_and(|lt| !lt.is_expired())
    }

    /// Register this space's velocity driver with `scheduler`.
    ///
    /// Only one driver may run per space, not one per process: spaces are
    /// passed explicitly, so separate spaces (even on one scheduler) each get
    /// their own driver. Starting a second driver for the same space fails
    /// with [`RuntimeError::DriverAlreadyRunning`] until the returned
    /// lifetime, which stops the driver, is disposed.
    pub fn start_driver(
        &self,
        scheduler: &TimeScheduler,
        resolver: impl ObstacleResolver + 'static,
        predictor: impl HitPredictor + 'static,
    ) -> RuntimeResult<Lifetime> {
        if self.driver_running() {
            warn!(space = self.inner.id, "velocity driver already running");
            return Err(RuntimeError::DriverAlreadyRunning);
        }
        let id = format!("ftick.velocity-driver.{}", self.inner.id);
        let driver = VelocityDriver::new(self, resolver, predictor);
        let lifetime = scheduler.add(TimeFunction::new(id, driver))?;
        debug!(space = self.inner.id, elements = self.len(), "velocity driver started");
        *self.inner.driver.borrow_mut() = Some(lifetime.clone());
        Ok(lifetime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collider::{DefaultObstacleResolver, SteppingHitPredictor};
    use crate::element::ElementKind;
    use ftick_runtime::SchedulerConfig;

    const BOX: ElementKind = ElementKind::new("box");

    #[test]
    fn disposing_lifetime_removes_element() {
        let space = Space::new(Bounds::new(0.0, 0.0, 100.0, 100.0));
        let a = Element::new(BOX, Bounds::new(1.0, 1.0, 1.0, 1.0));
        let b = Element::new(BOX, Bounds::new(5.0, 1.0, 1.0, 1.0));
        space.add(&a);
        space.add(&b);
        space.add(&a);
        assert_eq!(space.len(), 2);
        assert_eq!(space.element(b.id()), Some(b.clone()));

        a.lifetime().dispose();
        assert_eq!(space.elements().to_vec(), vec![b.clone()]);
        space.remove(&b);
        assert!(space.is_empty());
    }

    #[test]
    fn expired_elements_are_ignored() {
        let space = Space::new(Bounds::new(0.0, 0.0, 10.0, 10.0));
        let e = Element::new(BOX, Bounds::default());
        e.lifetime().dispose();
        space.add(&e);
        assert!(space.is_empty());
    }

    #[test]
    fn second_driver_rejected_until_first_stops() {
        let space = Space::new(Bounds::new(0.0, 0.0, 10.0, 10.0));
        let scheduler = TimeScheduler::new(SchedulerConfig::default());
        let first = space
            .start_driver(&scheduler, DefaultObstacleResolver::new(&space), SteppingHitPredictor)
            .unwrap();
        assert!(space.driver_running());
        assert_eq!(
            space
                .start_driver(
                    &scheduler,
                    DefaultObstacleResolver::new(&space),
                    SteppingHitPredictor,
                )
                .unwrap_err(),
            RuntimeError::DriverAlreadyRunning
        );
        first.dispose();
        assert!(!space.driver_running());
        assert!(
            space
                .start_driver(
                    &scheduler,
                    DefaultObstacleResolver::new(&space),
                    SteppingHitPredictor,
                )
                .is_ok()
        );
    }

    #[test]
    fn separate_spaces_get_separate_drivers() {
        let scheduler = TimeScheduler::new(SchedulerConfig::default());
        let a = Space::new(Bounds::new(0.0, 0.0, 10.0, 10.0));
        let b = Space::new(Bounds::new(0.0, 0.0, 10.0, 10.0));
        a.start_driver(&scheduler, DefaultObstacleResolver::new(&a), SteppingHitPredictor)
            .unwrap();
        b.start_driver(&scheduler, DefaultObstacleResolver::new(&b), SteppingHitPredictor)
            .unwrap();
        assert_eq!(scheduler.len(), 2);
    }
}
