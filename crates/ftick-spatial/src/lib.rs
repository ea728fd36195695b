#![forbid(unsafe_code)]

//! Spatial layer for FrankenTick: elements in a bounded space, moved by
//! velocities under a per-tick driver with pluggable obstacle resolution and
//! hit prediction.

/// Obstacle resolution and hit prediction.
pub mod collider;
/// The per-tick velocity driver.
pub mod driver;
/// Positioned elements.
pub mod element;
/// Bounds, headings and edges.
pub mod geometry;
/// Bounded element containers.
pub mod space;
/// Speed, heading and movement events.
pub mod velocity;

pub use collider::{
    Collider, DefaultObstacleResolver, HitKind, HitPrediction, HitPredictor, HitRequest,
    ObstacleResolver, SteppingHitPredictor,
};
pub use element::{Element, ElementId, ElementKind};
pub use geometry::{Angle, Bounds, Edge};
pub use space::Space;
pub use velocity::{Impact, Velocity};
