#![forbid(unsafe_code)]

//! FrankenTick public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use ftick_core::{Disposable, Event, Lifetime, LifetimeState, Subscription};
pub use ftick_runtime::{
    EventLoop, LoopConfig, ObservableCollection, ObservableObject, RuntimeError, RuntimeResult,
    SchedulerConfig, TimeFunction, TimeScheduler,
};

/// Everything most hosts need, in one import.
pub mod prelude {
    pub use ftick_core as core;
    pub use ftick_runtime as runtime;
    #[cfg(feature = "spatial")]
    pub use ftick_spatial as spatial;

    pub use ftick_core::{Event, Lifetime};
    pub use ftick_runtime::{
        DelayOptions, EventLoop, ObservableCollection, ObservableObject, RuntimeError,
        RuntimeResult, TickOutcome, TimeFunction, TimeScheduler, WaitOutcome,
    };
}
