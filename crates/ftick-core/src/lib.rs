#![forbid(unsafe_code)]

//! Core: lifetime-scoped ownership and typed publish/subscribe events.
//!
//! Everything in this crate is single-threaded (`Rc` inside) and is meant to
//! be driven from one logical thread, usually the thread running an
//! `ftick_runtime::EventLoop`.

/// Typed multicast events.
pub mod event;
/// Scoped ownership and ordered teardown.
pub mod lifetime;
/// Tracing facade used by the rest of the crate.
pub mod logging;

pub use event::{Event, Subscription};
pub use lifetime::{Disposable, Lifetime, LifetimeState};
