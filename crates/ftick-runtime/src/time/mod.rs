#![forbid(unsafe_code)]

//! Logical time: a scheduler ticking registered time functions once per
//! loop cycle, plus delays measured in logical time.
//!
//! # Invariants
//!
//! 1. Functions tick in registration order, after the cycle's work drain.
//! 2. `now` advances by exactly one increment per completed cycle.
//! 3. A function is registered exactly while its lifetime is active.
//! 4. Waits are re-checked once per cycle and resume on the scheduler's
//!    loop.

/// Delay futures and wait outcomes.
pub mod delay;
/// Time functions and their bodies.
pub mod function;
/// Per-interval rate limiting.
pub mod governor;
/// The time scheduler.
pub mod scheduler;

pub use delay::{Delay, DelayOptions, WaitOutcome};
pub use function::{Behavior, FunctionId, TickContext, TickOutcome, TimeFunction};
pub use governor::RateGovernor;
pub use scheduler::{DEFAULT_INCREMENT, SchedulerConfig, TimeScheduler};
