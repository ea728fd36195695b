#![forbid(unsafe_code)]

//! Time functions: per-cycle units of work registered with a
//! [`TimeScheduler`].
//!
//! A function body is either a [`Behavior`] (an explicit state machine ticked
//! once per cycle) or an async task spawned on the scheduler's loop. Either
//! way the function owns a [`Lifetime`]; it stays registered exactly as long
//! as that lifetime is active.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use ftick_core::Lifetime;
use web_time::Duration;

use crate::error::RuntimeResult;
use crate::time::TimeScheduler;

/// Caller-assigned identifier of a time function.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(Arc<str>);

impl FunctionId {
    /// Create an id from `id`.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FunctionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FunctionId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

/// Result of one [`Behavior::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick again next cycle.
    Continue,
    /// Done; the function's lifetime is disposed.
    Finished,
}

/// Everything a behavior sees during a tick.
#[derive(Debug, Clone)]
pub struct TickContext {
    /// Logical time of this tick (before the cycle's increment is applied).
    pub now: Duration,
    /// Logical time added per cycle.
    pub increment: Duration,
    /// Loop cycle being ticked.
    pub cycle: u64,
    /// The ticking function's lifetime.
    pub lifetime: Lifetime,
    /// The owning scheduler.
    pub scheduler: TimeScheduler,
}

/// An explicit per-cycle state machine.
pub trait Behavior {
    /// Advance one cycle.
    fn tick(&mut self, ctx: &TickContext) -> RuntimeResult<TickOutcome>;
}

impl<F> Behavior for F
where
    F: FnMut(&TickContext) -> RuntimeResult<TickOutcome>,
{
    fn tick(&mut self, ctx: &TickContext) -> RuntimeResult<TickOutcome> {
        self(ctx)
    }
}

pub(crate) enum Body {
    Behavior(Box<dyn Behavior>),
    Task(Pin<Box<dyn Future<Output = RuntimeResult<()>>>>),
}

/// A unit of work to register with [`TimeScheduler::add`].
pub struct TimeFunction {
    pub(crate) id: FunctionId,
    pub(crate) anchor: Option<Lifetime>,
    pub(crate) interval: Option<Duration>,
    pub(crate) body: Body,
}

impl fmt::Debug for TimeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.body {
            Body::Behavior(_) => "behavior",
            Body::Task(_) => "task",
        };
        f.debug_struct("TimeFunction")
            .field("id", &self.id)
            .field("interval", &self.interval)
            .field("kind", &kind)
            .finish()
    }
}

impl TimeFunction {
    /// A function ticking `behavior` once per cycle.
    pub fn new(id: impl Into<FunctionId>, behavior: impl Behavior + 'static) -> Self {
        Self {
            id: id.into(),
            anchor: None,
            interval: None,
            body: Body::Behavior(Box::new(behavior)),
        }
    }

    /// A function ticking a closure once per cycle.
    pub fn from_fn(
        id: impl Into<FunctionId>,
        tick: impl FnMut(&TickContext) -> RuntimeResult<TickOutcome> + 'static,
    ) -> Self {
        Self::new(id, tick)
    }

    /// A function whose body is an async task on the scheduler's loop.
    ///
    /// The function deregisters when the task completes.
    pub fn task(
        id: impl Into<FunctionId>,
        future: impl Future<Output = RuntimeResult<()>> + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            anchor: None,
            interval: None,
            body: Body::Task(Box::pin(future)),
        }
    }

    /// Tie the function to `lifetime`: it is removed when `lifetime` expires.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime: &Lifetime) -> Self {
        self.anchor = Some(lifetime.clone());
        self
    }

    /// Tick at most once per `interval` of logical time. Ignored for tasks.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// The id the function registers under.
    #[must_use]
    pub fn id(&self) -> &FunctionId {
        &self.id
    }
}
