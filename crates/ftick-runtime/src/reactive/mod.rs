#![forbid(unsafe_code)]

//! Observable state for FrankenTick.
//!
//! - [`ObservableObject`]: a property bag that notifies per-property and
//!   wildcard (`"*"`) subscribers when a value changes, and hands out
//!   *value lifetimes* that expire on the next change.
//! - [`ObservableCollection`]: an ordered list whose items each own a
//!   *membership lifetime*, with before/after hooks around every mutation.
//!
//! # Architecture
//!
//! Both types are `Rc`-backed handles (clones share state) built on
//! [`ftick_core::Event`]. Interior borrows are always released before any
//! event fires, so handlers may freely read or mutate the object that
//! notified them.
//!
//! # Invariants
//!
//! 1. With equal-suppression on, writing a value equal to the current one
//!    fires nothing and does not expire the value lifetime.
//! 2. A property-specific event fires before the wildcard event.
//! 3. Every collection mutation ends with exactly one `changed` signal.
//! 4. An item's membership lifetime is active exactly while the item is in
//!    the collection.
//!
//! # Failure Modes
//!
//! - Out-of-range collection indices return
//!   [`RuntimeError::IndexOutOfBounds`](crate::error::RuntimeError::IndexOutOfBounds).
//! - Handler panics propagate to the mutating caller.

/// Observable ordered collection.
pub mod collection;
/// Observable named-property object.
pub mod object;

pub use collection::{CollectionChange, ObservableCollection};
pub use object::{ANY_PROPERTY, ObservableObject, PropertyChange};
