#![forbid(unsafe_code)]

//! Runtime error taxonomy.
//!
//! - **Usage violations** (`NotOnLoopThread`, `LoopAlreadyActive`,
//!   `LoopStopped`, `ZeroDurationWait`, `IndexOutOfBounds`,
//!   `DriverAlreadyRunning`): returned immediately to the caller, never
//!   recovered internally.
//! - **Waits** (`Timeout`, `Cancelled`): produced by
//!   [`WaitOutcome::into_result`](crate::time::WaitOutcome::into_result).
//! - **Stale registrations** (`FunctionNotFound`, `DuplicateFunction`).
//! - **Application failures** (`Failed`): raised by work items, tasks or time
//!   functions; they stop the loop and surface from `run()`.

use web_time::Duration;

use crate::time::FunctionId;

/// Result alias used throughout the runtime.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors raised by the event loop, observables and time scheduler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Scheduler state was touched while another loop owns this thread.
    #[error("loop {loop_id} is not the loop executing on this thread")]
    NotOnLoopThread {
        /// The loop that was addressed.
        loop_id: u64,
    },
    /// A loop was started while another loop is running on this thread.
    #[error("loop {requested} cannot run: loop {active} is already active on this thread")]
    LoopAlreadyActive {
        /// The loop currently running.
        active: u64,
        /// The loop that tried to start.
        requested: u64,
    },
    /// Work was submitted to a loop that has stopped.
    #[error("loop {loop_id} has stopped")]
    LoopStopped {
        /// The stopped loop.
        loop_id: u64,
    },
    /// A blocking wait was requested with a zero duration.
    #[error("zero-duration waits would spin the loop; use yield_cycle() instead")]
    ZeroDurationWait,
    /// A condition wait elapsed before its predicate held.
    #[error("timed out after {waited:?} of logical time")]
    Timeout {
        /// Logical time spent waiting.
        waited: Duration,
    },
    /// A wait's anchor lifetime expired before the predicate held.
    #[error("wait cancelled")]
    Cancelled,
    /// No time function is registered under this id.
    #[error("time function {0:?} not found")]
    FunctionNotFound(FunctionId),
    /// A time function with this id is already registered.
    #[error("time function {0:?} is already registered")]
    DuplicateFunction(FunctionId),
    /// Collection index outside `0..len` (or `0..=len` for inserts).
    #[error("index {index} out of bounds (length {len})")]
    IndexOutOfBounds {
        /// Requested index.
        index: usize,
        /// Collection length at the time of the call.
        len: usize,
    },
    /// A velocity driver is already attached to this space.
    #[error("a velocity driver is already running for this space")]
    DriverAlreadyRunning,
    /// Application-level failure raised by work, a task or a time function.
    #[error("{0}")]
    Failed(String),
}

impl RuntimeError {
    /// Build an application failure from any displayable message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Whether this error reports API misuse rather than a runtime outcome.
    #[must_use]
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Self::NotOnLoopThread { .. }
                | Self::LoopAlreadyActive { .. }
                | Self::LoopStopped { .. }
                | Self::ZeroDurationWait
                | Self::IndexOutOfBounds { .. }
                | Self::DriverAlreadyRunning
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(
            RuntimeError::IndexOutOfBounds { index: 4, len: 2 }.to_string(),
            "index 4 out of bounds (length 2)"
        );
        assert_eq!(RuntimeError::Cancelled.to_string(), "wait cancelled");
        assert_eq!(RuntimeError::failed("boom").to_string(), "boom");
        assert_eq!(
            RuntimeError::FunctionNotFound(FunctionId::new("mover")).to_string(),
            "time function \"mover\" not found"
        );
    }

    #[test]
    fn usage_classification() {
        assert!(RuntimeError::ZeroDurationWait.is_usage_error());
        assert!(RuntimeError::LoopStopped { loop_id: 1 }.is_usage_error());
        assert!(!RuntimeError::Cancelled.is_usage_error());
        assert!(!RuntimeError::failed("x").is_usage_error());
    }
}
