#![forbid(unsafe_code)]

//! Obstacle resolution and hit prediction.
//!
//! The velocity driver asks an [`ObstacleResolver`] which colliders an
//! element may run into, then asks a [`HitPredictor`] whether its next move
//! hits one of them. Both are traits so hosts can plug in broad-phase
//! structures or exact sweeps; [`DefaultObstacleResolver`] and
//! [`SteppingHitPredictor`] are simple reference implementations.

use crate::element::Element;
use crate::geometry::{Angle, Bounds, Edge};
use crate::space::Space;

/// Something that can be hit: a space boundary or a tracked element.
#[derive(Debug, Clone, PartialEq)]
pub struct Collider {
    /// Area the collider occupies.
    pub bounds: Bounds,
    /// The element behind this collider, `None` for boundaries.
    pub element: Option<Element>,
}

impl Collider {
    /// A space-boundary collider.
    pub fn boundary(bounds: Bounds) -> Self {
        Self {
            bounds,
            element: None,
        }
    }

    /// A collider at `element`'s current bounds.
    pub fn element(element: &Element) -> Self {
        Self {
            bounds: element.bounds(),
            element: Some(element.clone()),
        }
    }

    /// Whether this collider is a space boundary.
    pub fn is_boundary(&self) -> bool {
        self.element.is_none()
    }
}

/// What a prediction found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind {
    /// Nothing within visibility.
    None,
    /// A tracked element.
    Obstacle,
    /// A space boundary.
    Boundary,
}

/// Input to [`HitPredictor::predict_hit`].
#[derive(Debug, Clone)]
pub struct HitRequest {
    /// Bounds of the moving element.
    pub moving: Bounds,
    /// Heading of the move.
    pub angle: Angle,
    /// Candidates to test against.
    pub obstacles: Vec<Collider>,
    /// How far ahead to look.
    pub visibility: f32,
    /// Step granularity for sampling predictors.
    pub precision: f32,
}

/// Result of [`HitPredictor::predict_hit`].
#[derive(Debug, Clone, PartialEq)]
pub struct HitPrediction {
    /// What was hit.
    pub kind: HitKind,
    /// The collider hit, if any.
    pub collider: Option<Collider>,
    /// Farthest distance along the heading known to be free.
    pub last_known_good_distance: f32,
    /// Edge of the collider that would be hit.
    pub edge: Option<Edge>,
}

impl HitPrediction {
    /// A clear path for `distance`.
    pub fn clear(distance: f32) -> Self {
        Self {
            kind: HitKind::None,
            collider: None,
            last_known_good_distance: distance,
            edge: None,
        }
    }

    /// Whether anything was hit.
    pub fn is_hit(&self) -> bool {
        self.kind != HitKind::None
    }
}

/// Supplies the colliders an element must consider.
pub trait ObstacleResolver {
    fn get_obstacles(&self, element: &Element, z: Option<i32>) -> Vec<Collider>;
}

/// Predicts the first hit along a heading. Must be pure and deterministic.
pub trait HitPredictor {
    fn predict_hit(&self, request: &HitRequest) -> HitPrediction;
}

/// Resolves every element of a [`Space`] except those excluded by the
/// moving element's velocity, plus four boundary colliders around the
/// space.
#[derive(Debug, Clone)]
pub struct DefaultObstacleResolver {
    space: Space,
}

impl DefaultObstacleResolver {
    /// Resolve obstacles from `space`.
    pub fn new(space: &Space) -> Self {
        Self {
            space: space.clone(),
        }
    }

    fn excluded(element: &Element, candidate: &Element, z: Option<i32>) -> bool {
        if candidate == element || candidate.lifetime().is_expired() {
            return true;
        }
        if z.is_some_and(|z| candidate.z_index() != z) {
            return true;
        }
        match element.velocity() {
            Some(velocity) => velocity.excludes(candidate),
            None => false,
        }
    }
}

impl ObstacleResolver for DefaultObstacleResolver {
    fn get_obstacles(&self, element: &Element, z: Option<i32>) -> Vec<Collider> {
        let mut colliders: Vec<Collider> = self
            .space
            .elements()
            .to_vec()
            .iter()
            .filter(|candidate| !Self::excluded(element, candidate, z))
            .map(Collider::element)
            .collect();
        colliders.extend(boundary_colliders(self.space.bounds()));
        colliders
    }
}

/// Four colliders hugging the outside of `bounds`, each as thick as the
/// larger side of `bounds`.
pub fn boundary_colliders(bounds: Bounds) -> [Collider; 4] {
    let t = bounds.w.max(bounds.h).max(1.0);
    [
        // top
        Collider::boundary(Bounds::new(bounds.x - t, bounds.y - t, bounds.w + 2.0 * t, t)),
        // bottom
        Collider::boundary(Bounds::new(bounds.x - t, bounds.bottom(), bounds.w + 2.0 * t, t)),
        // left
        Collider::boundary(Bounds::new(bounds.x - t, bounds.y, t, bounds.h)),
        // right
        Collider::boundary(Bounds::new(bounds.right(), bounds.y, t, bounds.h)),
    ]
}

/// Bisection rounds used to refine a sampled contact distance.
const REFINE_STEPS: u32 = 24;

/// Samples the path every `precision` units up to `visibility`.
///
/// Once a sample overlaps a collider, the contact distance is refined by
/// bisection between that sample and the previous free one, so the last
/// known good distance is exact to well below `precision`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SteppingHitPredictor;

impl SteppingHitPredictor {
    fn first_hit<'a>(request: &'a HitRequest, distance: f32) -> Option<&'a Collider> {
        let candidate = request.moving.offset(request.angle, distance);
        request
            .obstacles
            .iter()
            .find(|c| candidate.intersects(&c.bounds))
    }
}

impl HitPredictor for SteppingHitPredictor {
    fn predict_hit(&self, request: &HitRequest) -> HitPrediction {
        let step = if request.precision > 0.0 {
            request.precision
        } else {
            crate::driver::DEFAULT_PRECISION
        };
        let mut good = 0.0_f32;
        let mut i: u32 = 1;
        let (mut collider, mut blocked) = loop {
            let distance = (step * i as f32).min(request.visibility);
            if let Some(collider) = Self::first_hit(request, distance) {
                break (collider, distance);
            }
            if distance >= request.visibility {
                return HitPrediction::clear(distance);
            }
            good = distance;
            i += 1;
        };

        for _ in 0..REFINE_STEPS {
            let mid = good + (blocked - good) / 2.0;
            if mid <= good || mid >= blocked {
                break;
            }
            match Self::first_hit(request, mid) {
                Some(hit) => {
                    collider = hit;
                    blocked = mid;
                }
                None => good = mid,
            }
        }

        let last_free = request.moving.offset(request.angle, good);
        HitPrediction {
            kind: if collider.is_boundary() {
                HitKind::Boundary
            } else {
                HitKind::Obstacle
            },
            collider: Some(collider.clone()),
            last_known_good_distance: good,
            edge: Some(collider.bounds.entry_edge(&last_free)),
        }
    }
}
