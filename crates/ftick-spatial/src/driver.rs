#![forbid(unsafe_code)]

//! The velocity driver: a time-function behavior that moves every element
//! with a velocity once per scheduler tick.
//!
//! Per element and tick:
//!
//! 1. fire `before_move`;
//! 2. `travel = speed × increment` (seconds); zero travel skips to step 6;
//! 3. predict a hit with visibility `2 × travel`;
//! 4. clear path (or hit beyond `travel`): move the full travel;
//! 5. otherwise stop short at `max(0, last_known_good − 0.5)`, report the
//!    impact if the element moved freely since the previous one, then bounce
//!    or zero the speed;
//! 6. fire `velocity_enforced`.

use ftick_runtime::{Behavior, RuntimeResult, TickContext, TickOutcome};
use tracing::trace;

use crate::collider::{HitPredictor, HitRequest, ObstacleResolver};
use crate::element::Element;
use crate::space::Space;
use crate::velocity::{Impact, Velocity};

/// Sampling step handed to predictors.
pub const DEFAULT_PRECISION: f32 = 0.5;

/// Gap kept between a stopped element and what it hit.
pub const STOP_MARGIN: f32 = 0.5;

pub(crate) struct VelocityDriver<R, P> {
    space: Space,
    resolver: R,
    predictor: P,
}

impl<R: ObstacleResolver, P: HitPredictor> VelocityDriver<R, P> {
    pub(crate) fn new(space: &Space, resolver: R, predictor: P) -> Self {
        Self {
            space: space.clone(),
            resolver,
            predictor,
        }
    }

    fn step(&self, element: &Element, velocity: &Velocity, seconds: f32) {
        velocity.before_move().fire(&());

        let travel = velocity.speed() * seconds;
        if travel <= 0.0 {
            velocity.velocity_enforced().fire(&());
            return;
        }

        let angle = velocity.angle();
        let obstacles = self
            .resolver
            .get_obstacles(element, Some(element.z_index()));
        let prediction = self.predictor.predict_hit(&HitRequest {
            moving: element.bounds(),
            angle,
            obstacles,
            visibility: 2.0 * travel,
            precision: DEFAULT_PRECISION,
        });
        velocity.set_last_hit(prediction.clone());

        if !prediction.is_hit() || prediction.last_known_good_distance > travel {
            element.move_along(angle, travel);
            velocity.set_moved_since_last_hit(true);
        } else {
            let advance = (prediction.last_known_good_distance - STOP_MARGIN).max(0.0);
            if advance > 0.0 {
                element.move_along(angle, advance);
            }

            if velocity.moved_since_last_hit() {
                velocity.set_moved_since_last_hit(false);
                let other = prediction.collider.as_ref().and_then(|c| c.element.clone());
                trace!(
                    element = %element.id(),
                    other = ?other.as_ref().map(Element::id),
                    kind = ?prediction.kind,
                    "impact"
                );
                velocity.impact().fire(&Impact {
                    angle,
                    kind: prediction.kind,
                    edge: prediction.edge,
                    other: other.clone(),
                });
                if let Some(struck) = other
                    && let Some(struck_velocity) = struck.velocity()
                {
                    struck_velocity.impact().fire(&Impact {
                        angle: angle.opposite(),
                        kind: prediction.kind,
                        edge: prediction.edge,
                        other: Some(element.clone()),
                    });
                }
            }

            match prediction.edge {
                Some(edge) if velocity.bounce() => velocity.set_angle(angle.bounce_off(edge)),
                _ => velocity.set_speed(0.0),
            }
        }

        velocity.velocity_enforced().fire(&());
    }
}

impl<R: ObstacleResolver, P: HitPredictor> Behavior for VelocityDriver<R, P> {
    fn tick(&mut self, ctx: &TickContext) -> RuntimeResult<TickOutcome> {
        let seconds = ctx.increment.as_secs_f32();
        for element in self.space.elements().to_vec() {
            if element.lifetime().is_expired() {
                continue;
            }
            if let Some(velocity) = element.velocity() {
                self.step(&element, &velocity, seconds);
            }
        }
        Ok(TickOutcome::Continue)
    }
}
