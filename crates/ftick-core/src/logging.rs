#![forbid(unsafe_code)]

//! Logging shim.
//!
//! With the `tracing` feature enabled this module re-exports the `tracing`
//! macros. Without it, the crate-root `trace!`/`debug!`/`warn!` macros expand
//! to nothing so call sites compile unchanged and cost nothing.

#[cfg(feature = "tracing")]
pub use tracing::{debug, trace, warn};

/// No-op stand-in for `tracing::trace!`.
#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

/// No-op stand-in for `tracing::debug!`.
#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

/// No-op stand-in for `tracing::warn!`.
#[cfg(not(feature = "tracing"))]
#[doc(hidden)]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

/// Install a JSON `tracing` subscriber filtered by `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
#[cfg(feature = "tracing-json")]
pub fn init_json() -> bool {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}
