#![forbid(unsafe_code)]

//! Velocity: speed, heading, collision preferences and movement events.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use ahash::AHashSet;
use ftick_core::Event;

use crate::collider::{HitKind, HitPrediction};
use crate::element::{Element, ElementId, ElementKind};
use crate::geometry::{Angle, Edge};

/// Delivered on [`Velocity::impact`].
#[derive(Debug, Clone, PartialEq)]
pub struct Impact {
    /// Heading at the moment of impact (already mirrored for the struck
    /// element).
    pub angle: Angle,
    /// Whether an element or a boundary was hit.
    pub kind: HitKind,
    /// Edge of the struck collider.
    pub edge: Option<Edge>,
    /// The other element involved, if any.
    pub other: Option<Element>,
}

type ExclusionFn = Rc<dyn Fn(&Element) -> bool>;

struct VelocityInner {
    speed: Cell<f32>,
    angle: Cell<Angle>,
    bounce: Cell<bool>,
    moved_since_last_hit: Cell<bool>,
    last_hit: RefCell<Option<HitPrediction>>,
    excluded_ids: RefCell<AHashSet<ElementId>>,
    excluded_kinds: RefCell<Vec<ElementKind>>,
    dynamic_exclusion: RefCell<Option<ExclusionFn>>,
    before_move: Event<()>,
    velocity_enforced: Event<()>,
    impact: Event<Impact>,
}

/// Shared velocity handle. Speed is in units per logical second.
#[derive(Clone)]
pub struct Velocity {
    inner: Rc<VelocityInner>,
}

impl fmt::Debug for Velocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Velocity")
            .field("speed", &self.speed())
            .field("angle", &self.angle())
            .field("bounce", &self.bounce())
            .finish()
    }
}

impl Velocity {
    /// A velocity of `speed` units per second along `angle`. Negative speeds clamp to zero.
    pub fn new(speed: f32, angle: Angle) -> Self {
        Self {
            inner: Rc::new(VelocityInner {
                speed: Cell::new(speed.max(0.0)),
                angle: Cell::new(angle),
                bounce: Cell::new(false),
                moved_since_last_hit: Cell::new(true),
                last_hit: RefCell::new(None),
                excluded_ids: RefCell::new(AHashSet::new()),
                excluded_kinds: RefCell::new(Vec::new()),
                dynamic_exclusion: RefCell::new(None),
                before_move: Event::new(),
                velocity_enforced: Event::new(),
                impact: Event::new(),
            }),
        }
    }

    /// Bounce off what it hits instead of stopping.
    #[must_use]
    pub fn with_bounce(self, bounce: bool) -> Self {
        self.set_bounce(bounce);
        self
    }

    /// Units per logical second.
    pub fn speed(&self) -> f32 {
        self.inner.speed.get()
    }

    /// Negative speeds clamp to zero.
    pub fn set_speed(&self, speed: f32) {
        self.inner.speed.set(speed.max(0.0));
    }

    /// Current heading.
    pub fn angle(&self) -> Angle {
        self.inner.angle.get()
    }

    /// Change the heading.
    pub fn set_angle(&self, angle: Angle) {
        self.inner.angle.set(angle);
    }

    /// Whether hits reflect the heading rather than zeroing the speed.
    pub fn bounce(&self) -> bool {
        self.inner.bounce.get()
    }

    /// See [`bounce`](Self::bounce).
    pub fn set_bounce(&self, bounce: bool) {
        self.inner.bounce.set(bounce);
    }

    /// Whether the element travelled freely since the last reported impact.
    pub fn moved_since_last_hit(&self) -> bool {
        self.inner.moved_since_last_hit.get()
    }

    pub(crate) fn set_moved_since_last_hit(&self, moved: bool) {
        self.inner.moved_since_last_hit.set(moved);
    }

    /// Most recent prediction made for this velocity.
    pub fn last_hit(&self) -> Option<HitPrediction> {
        self.inner.last_hit.borrow().clone()
    }

    pub(crate) fn set_last_hit(&self, prediction: HitPrediction) {
        *self.inner.last_hit.borrow_mut() = Some(prediction);
    }

    // ── Exclusions ───────────────────────────────────────────────────

    /// Pass through the element with `id`.
    pub fn exclude(&self, id: ElementId) {
        self.inner.excluded_ids.borrow_mut().insert(id);
    }

    /// Undo an earlier [`exclude`](Self::exclude).
    pub fn include(&self, id: ElementId) {
        self.inner.excluded_ids.borrow_mut().remove(&id);
    }

    /// Pass through every element of `kind`.
    pub fn exclude_kind(&self, kind: ElementKind) {
        let mut kinds = self.inner.excluded_kinds.borrow_mut();
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    /// Skip any element for which `filter` returns `true`.
    pub fn set_dynamic_exclusion(&self, filter: impl Fn(&Element) -> bool + 'static) {
        *self.inner.dynamic_exclusion.borrow_mut() = Some(Rc::new(filter));
    }

    /// Drop the filter set by [`set_dynamic_exclusion`](Self::set_dynamic_exclusion).
    pub fn clear_dynamic_exclusion(&self) {
        self.inner.dynamic_exclusion.borrow_mut().take();
    }

    /// Whether `candidate` is excluded by id, kind or the dynamic filter.
    pub fn excludes(&self, candidate: &Element) -> bool {
        if self.inner.excluded_ids.borrow().contains(&candidate.id()) {
            return true;
        }
        if self.inner.excluded_kinds.borrow().contains(&candidate.kind()) {
            return true;
        }
        let filter = self.inner.dynamic_exclusion.borrow().clone();
        filter.is_some_and(|f| f(candidate))
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Fires before the driver evaluates this velocity each tick.
    pub fn before_move(&self) -> &Event<()> {
        &self.inner.before_move
    }

    /// Fires after the driver applied this velocity each tick.
    pub fn velocity_enforced(&self) -> &Event<()> {
        &self.inner.velocity_enforced
    }

    /// Fires when the driver detects a hit, on both the mover and a struck element.
    pub fn impact(&self) -> &Event<Impact> {
        &self.inner.impact
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Bounds;

    const ROCK: ElementKind = ElementKind::new("rock");
    const GHOST: ElementKind = ElementKind::new("ghost");

    #[test]
    fn exclusion_rules() {
        let v = Velocity::new(1.0, Angle::RIGHT);
        let rock = Element::new(ROCK, Bounds::default());
        let ghost = Element::new(GHOST, Bounds::default());
        let tagged = Element::new(ROCK, Bounds::default()).with_z_index(7);

        assert!(!v.excludes(&rock));
        v.exclude(rock.id());
        assert!(v.excludes(&rock));
        v.include(rock.id());
        assert!(!v.excludes(&rock));

        v.exclude_kind(GHOST);
        assert!(v.excludes(&ghost));

        v.set_dynamic_exclusion(|e| e.z_index() == 7);
        assert!(v.excludes(&tagged));
        v.clear_dynamic_exclusion();
        assert!(!v.excludes(&tagged));
    }

    #[test]
    fn speed_clamps() {
        let v = Velocity::new(-3.0, Angle::UP);
        assert_eq!(v.speed(), 0.0);
        v.set_speed(4.0);
        assert_eq!(v.speed(), 4.0);
        assert!(v.moved_since_last_hit());
        assert!(v.last_hit().is_none());
    }
}
