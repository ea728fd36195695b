#![forbid(unsafe_code)]

//! Runtime for FrankenTick.
//!
//! - [`event_loop`]: the cooperative, single-threaded cycle loop and its
//!   task executor.
//! - [`reactive`]: observable objects and collections.
//! - [`time`]: the logical-time scheduler, time functions and delays.
//! - [`error`]: the shared [`RuntimeError`] type.
//!
//! Everything here is `!Send` by construction except [`LoopRemote`] and task
//! wakers, which only post messages back to their loop.

/// Runtime error taxonomy.
pub mod error;
/// Cooperative single-threaded event loop.
pub mod event_loop;
/// Observable objects and collections.
pub mod reactive;
mod task;
/// Logical time, time functions and delays.
pub mod time;

pub use error::{RuntimeError, RuntimeResult};
pub use event_loop::{EventLoop, LoopConfig, LoopRemote, LoopState, YieldCycle, current_loop_id};
pub use reactive::{
    ANY_PROPERTY, CollectionChange, ObservableCollection, ObservableObject, PropertyChange,
};
pub use time::{
    Behavior, Delay, DelayOptions, FunctionId, RateGovernor, SchedulerConfig, TickContext,
    TickOutcome, TimeFunction, TimeScheduler, WaitOutcome,
};
