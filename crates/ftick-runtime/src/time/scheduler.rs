#![forbid(unsafe_code)]

//! Logical-time scheduler over a continuous [`EventLoop`].
//!
//! At the end of every cycle the scheduler ticks each live time function in
//! registration order, then advances `now` by the configured increment. Time
//! is purely logical: nothing here reads a wall clock.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use ftick_core::{Event, Lifetime};
use tracing::{debug, trace, warn};
use web_time::Duration;

use crate::error::{RuntimeError, RuntimeResult};
use crate::event_loop::{EventLoop, LoopConfig, LoopState, YieldCycle, current_loop_id};
use crate::time::function::{Behavior, Body};
use crate::time::{
    Delay, DelayOptions, FunctionId, RateGovernor, TickContext, TickOutcome, TimeFunction,
};

/// Default logical time added per cycle.
pub const DEFAULT_INCREMENT: Duration = Duration::from_millis(10);

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Logical time added after every cycle.
    pub increment: Duration,
    /// Configuration of the underlying loop. `continuous` is always forced on.
    pub loop_config: LoopConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            increment: DEFAULT_INCREMENT,
            loop_config: LoopConfig::default(),
        }
    }
}

impl SchedulerConfig {
    /// Logical time added after each cycle.
    #[must_use]
    pub fn with_increment(mut self, increment: Duration) -> Self {
        self.increment = increment;
        self
    }

    /// Configuration for the owned loop. Continuous mode is always forced on.
    #[must_use]
    pub fn with_loop_config(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = loop_config;
        self
    }
}

struct Ticker {
    behavior: Box<dyn Behavior>,
    governor: Option<RateGovernor>,
}

struct Registration {
    lifetime: Lifetime,
    /// `None` for task-bodied functions.
    ticker: Option<Rc<RefCell<Ticker>>>,
}

struct SchedulerInner {
    event_loop: EventLoop,
    increment: Duration,
    now: Cell<Duration>,
    registry: RefCell<AHashMap<FunctionId, Registration>>,
    order: RefCell<Vec<FunctionId>>,
    function_added: Event<FunctionId>,
    function_removed: Event<FunctionId>,
}

/// Handle to a time scheduler. Clones share the same scheduler.
#[derive(Clone)]
pub struct TimeScheduler {
    inner: Rc<SchedulerInner>,
}

impl fmt::Debug for TimeScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeScheduler")
            .field("loop_id", &self.inner.event_loop.id())
            .field("now", &self.inner.now.get())
            .field("increment", &self.inner.increment)
            .field("functions", &self.inner.order.borrow())
            .finish()
    }
}

impl Default for TimeScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl TimeScheduler {
    /// Create a scheduler with its own event loop.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let event_loop = EventLoop::with_config(config.loop_config.continuous(true));
        let inner = Rc::new(SchedulerInner {
            event_loop,
            increment: config.increment,
            now: Cell::new(Duration::ZERO),
            registry: RefCell::new(AHashMap::new()),
            order: RefCell::new(Vec::new()),
            function_added: Event::new(),
            function_removed: Event::new(),
        });

        let weak: Weak<SchedulerInner> = Rc::downgrade(&inner);
        inner
            .event_loop
            .end_of_cycle()
            .subscribe_for_lifetime(inner.event_loop.lifetime(), move |cycle| {
                if let Some(inner) = weak.upgrade() {
                    let scheduler = TimeScheduler { inner };
                    if let Err(e) = scheduler.tick(*cycle) {
                        scheduler.inner.event_loop.fail(e);
                    }
                }
            });

        let weak: Weak<SchedulerInner> = Rc::downgrade(&inner);
        inner.event_loop.lifetime().on_disposed(move || {
            if let Some(inner) = weak.upgrade() {
                let lifetimes: Vec<Lifetime> = inner
                    .registry
                    .borrow()
                    .values()
                    .map(|r| r.lifetime.clone())
                    .collect();
                for lifetime in lifetimes {
                    lifetime.try_dispose();
                }
            }
        });
        Self { inner }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Current logical time.
    #[inline]
    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.now.get()
    }

    /// Logical time added per cycle.
    #[inline]
    #[must_use]
    pub fn increment(&self) -> Duration {
        self.inner.increment
    }

    /// The loop driving this scheduler.
    #[must_use]
    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    /// Fired after a function is registered.
    #[must_use]
    pub fn function_added(&self) -> &Event<FunctionId> {
        &self.inner.function_added
    }

    /// Fired after a function is deregistered.
    #[must_use]
    pub fn function_removed(&self) -> &Event<FunctionId> {
        &self.inner.function_removed
    }

    /// Whether a function is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &FunctionId) -> bool {
        self.inner.registry.borrow().contains_key(id)
    }

    /// Number of registered functions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.order.borrow().len()
    }

    /// Whether no functions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered ids in tick order.
    #[must_use]
    pub fn function_ids(&self) -> Vec<FunctionId> {
        self.inner.order.borrow().clone()
    }

    /// Lifetime of the function registered under `id`.
    pub fn lifetime_of(&self, id: &FunctionId) -> RuntimeResult<Lifetime> {
        self.inner
            .registry
            .borrow()
            .get(id)
            .map(|r| r.lifetime.clone())
            .ok_or_else(|| RuntimeError::FunctionNotFound(id.clone()))
    }

    // ── Registry ─────────────────────────────────────────────────────

    fn check_access(&self) -> RuntimeResult<()> {
        let event_loop = &self.inner.event_loop;
        let loop_id = event_loop.id();
        if event_loop.state() == LoopState::Stopped {
            warn!(loop_id, "scheduler used after stop");
            return Err(RuntimeError::LoopStopped { loop_id });
        }
        let foreign = current_loop_id().is_some_and(|active| active != loop_id);
        let running_elsewhere =
            event_loop.state() == LoopState::Running && !event_loop.is_current();
        if foreign || running_elsewhere {
            warn!(loop_id, "scheduler touched from outside its loop");
            return Err(RuntimeError::NotOnLoopThread { loop_id });
        }
        Ok(())
    }

    /// Register `function`.
    ///
    /// Returns the function's lifetime; disposing it removes the function.
    /// A behavior returning [`TickOutcome::Finished`], or a task completing,
    /// disposes it too.
    pub fn add(&self, function: TimeFunction) -> RuntimeResult<Lifetime> {
        self.check_access()?;
        let TimeFunction {
            id,
            anchor,
            interval,
            body,
        } = function;
        if self.contains(&id) {
            warn!(function = %id, "duplicate time function id");
            return Err(RuntimeError::DuplicateFunction(id));
        }

        let lifetime = match &anchor {
            Some(anchor) => anchor.create_child(),
            None => Lifetime::new(),
        };
        if lifetime.is_expired() {
            return Ok(lifetime);
        }

        let (ticker, task) = match body {
            Body::Behavior(behavior) => (
                Some(Rc::new(RefCell::new(Ticker {
                    behavior,
                    governor: interval.map(RateGovernor::new),
                }))),
                None,
            ),
            Body::Task(future) => (None, Some(future)),
        };

        self.inner.registry.borrow_mut().insert(
            id.clone(),
            Registration {
                lifetime: lifetime.clone(),
                ticker,
            },
        );
        self.inner.order.borrow_mut().push(id.clone());

        let weak = Rc::downgrade(&self.inner);
        let registered = lifetime.clone();
        let removed_id = id.clone();
        lifetime.on_disposed(move || {
            if let Some(inner) = weak.upgrade() {
                TimeScheduler { inner }.deregister(&removed_id, &registered);
            }
        });

        if let Some(future) = task {
            self.inner.event_loop.spawn_for_lifetime(&lifetime, future)?;
        }

        debug!(function = %id, lifetime = lifetime.id(), "time function added");
        self.inner.function_added.fire(&id);
        Ok(lifetime)
    }

    /// Remove the function registered under `id` by disposing its lifetime.
    pub fn remove(&self, id: &FunctionId) -> RuntimeResult<()> {
        self.check_access()?;
        let lifetime = self.lifetime_of(id)?;
        lifetime.try_dispose();
        Ok(())
    }

    fn deregister(&self, id: &FunctionId, lifetime: &Lifetime) {
        let removed = {
            let mut registry = self.inner.registry.borrow_mut();
            match registry.get(id) {
                Some(r) if r.lifetime.ptr_eq(lifetime) => registry.remove(id),
                _ => None,
            }
        };
        if removed.is_none() {
            return;
        }
        self.inner.order.borrow_mut().retain(|other| other != id);
        drop(removed);
        debug!(function = %id, "time function removed");
        self.inner.function_removed.fire(id);
    }

    // ── Ticking ──────────────────────────────────────────────────────

    fn tick(&self, cycle: u64) -> RuntimeResult<()> {
        let now = self.now();
        let ids = self.function_ids();
        for id in ids {
            let entry = self
                .inner
                .registry
                .borrow()
                .get(&id)
                .map(|r| (r.lifetime.clone(), r.ticker.clone()));
            let Some((lifetime, Some(ticker))) = entry else {
                continue;
            };
            if lifetime.is_expired() {
                continue;
            }

            let ctx = TickContext {
                now,
                increment: self.inner.increment,
                cycle,
                lifetime: lifetime.clone(),
                scheduler: self.clone(),
            };
            let outcome = {
                let mut ticker = ticker.borrow_mut();
                if let Some(governor) = ticker.governor.as_mut()
                    && !governor.check(now)
                {
                    continue;
                }
                ticker.behavior.tick(&ctx)
            };

            match outcome {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::Finished) => {
                    trace!(function = %id, cycle, "time function finished");
                    lifetime.try_dispose();
                }
                Err(e) => {
                    warn!(function = %id, cycle, error = %e, "time function failed");
                    return Err(e);
                }
            }
        }
        self.inner.now.set(now + self.inner.increment);
        Ok(())
    }

    // ── Waits ────────────────────────────────────────────────────────

    /// Resolve once logical time has advanced by `duration`.
    pub fn delay_for(&self, duration: Duration) -> RuntimeResult<Delay> {
        if duration.is_zero() {
            return Err(RuntimeError::ZeroDurationWait);
        }
        Ok(Delay::elapsed(self.clone(), duration))
    }

    /// Resolve once `predicate` holds, subject to `options`.
    pub fn delay_until(
        &self,
        predicate: impl FnMut() -> bool + 'static,
        options: DelayOptions,
    ) -> RuntimeResult<Delay> {
        options.validate()?;
        Ok(Delay::predicate(self.clone(), Box::new(predicate), options))
    }

    /// Resolve at the start of the next cycle.
    pub fn yield_cycle(&self) -> YieldCycle {
        self.inner.event_loop.yield_cycle()
    }

    // ── Driving ──────────────────────────────────────────────────────

    /// Run until [`stop`](Self::stop) or a failure.
    pub fn run(&self) -> RuntimeResult<()> {
        self.inner.event_loop.run()
    }

    /// Run `cycles` cycles, then return.
    pub fn run_cycles(&self, cycles: u64) -> RuntimeResult<()> {
        self.inner.event_loop.run_cycles(cycles)
    }

    /// Stop after the current cycle. Registered functions are disposed when
    /// the loop finishes.
    pub fn stop(&self) {
        self.inner.event_loop.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::WaitOutcome;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn scheduler(increment_ms: u64) -> TimeScheduler {
        TimeScheduler::new(SchedulerConfig::default().with_increment(ms(increment_ms)))
    }

    #[test]
    fn time_advances_per_cycle() {
        let s = scheduler(50);
        s.run_cycles(3).unwrap();
        assert_eq!(s.now(), ms(150));
        assert_eq!(s.event_loop().cycle(), 3);
    }

    #[test]
    fn functions_tick_in_registration_order() {
        let s = scheduler(10);
        let log = Rc::new(RefCell::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let l = Rc::clone(&log);
            s.add(TimeFunction::from_fn(name, move |ctx| {
                l.borrow_mut().push(format!("{name}@{}", ctx.now.as_millis()));
                Ok(TickOutcome::Continue)
            }))
            .unwrap();
        }
        s.run_cycles(2).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["a@0", "b@0", "c@0", "a@10", "b@10", "c@10"]
        );
    }

    #[test]
    fn finished_disposes_and_deregisters() {
        let s = scheduler(10);
        let ticks = Rc::new(Cell::new(0));
        let t = Rc::clone(&ticks);
        let removed = Rc::new(RefCell::new(Vec::new()));
        let r = Rc::clone(&removed);
        s.function_removed()
            .subscribe_for_lifetime(&Lifetime::forever(), move |id| {
                r.borrow_mut().push(id.clone());
            });
        let lt = s
            .add(TimeFunction::from_fn("once-twice", move |_| {
                t.set(t.get() + 1);
                Ok(if t.get() == 2 {
                    TickOutcome::Finished
                } else {
                    TickOutcome::Continue
                })
            }))
            .unwrap();
        s.run_cycles(5).unwrap();
        assert_eq!(ticks.get(), 2);
        assert!(lt.is_expired());
        assert!(s.is_empty());
        assert_eq!(*removed.borrow(), vec![FunctionId::new("once-twice")]);
    }

    #[test]
    fn duplicate_and_missing_ids() {
        let s = scheduler(10);
        s.add(TimeFunction::from_fn("f", |_| Ok(TickOutcome::Continue)))
            .unwrap();
        assert_eq!(
            s.add(TimeFunction::from_fn("f", |_| Ok(TickOutcome::Continue)))
                .unwrap_err(),
            RuntimeError::DuplicateFunction(FunctionId::new("f"))
        );
        let missing = FunctionId::new("nope");
        assert_eq!(
            s.remove(&missing),
            Err(RuntimeError::FunctionNotFound(missing.clone()))
        );
        assert!(s.lifetime_of(&missing).is_err());
    }

    #[test]
    fn remove_then_readd() {
        let s = scheduler(10);
        let id = FunctionId::new("f");
        s.add(TimeFunction::from_fn("f", |_| Ok(TickOutcome::Continue)))
            .unwrap();
        s.remove(&id).unwrap();
        assert!(!s.contains(&id));
        let second = s
            .add(TimeFunction::from_fn("f", |_| Ok(TickOutcome::Continue)))
            .unwrap();
        assert!(s.contains(&id));
        assert!(s.lifetime_of(&id).unwrap().ptr_eq(&second));
    }

    #[test]
    fn anchor_lifetime_removes_function() {
        let s = scheduler(10);
        let anchor = Lifetime::new();
        s.add(TimeFunction::from_fn("f", |_| Ok(TickOutcome::Continue)).with_lifetime(&anchor))
            .unwrap();
        assert_eq!(s.len(), 1);
        anchor.dispose();
        assert!(s.is_empty());
    }

    #[test]
    fn forever_anchor_is_still_removable() {
        let s = scheduler(10);
        s.add(
            TimeFunction::from_fn("f", |_| Ok(TickOutcome::Continue))
                .with_lifetime(&Lifetime::forever()),
        )
        .unwrap();
        s.remove(&FunctionId::new("f")).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn interval_limits_ticks() {
        let s = scheduler(10);
        let at = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&at);
        s.add(
            TimeFunction::from_fn("slow", move |ctx| {
                a.borrow_mut().push(ctx.now.as_millis());
                Ok(TickOutcome::Continue)
            })
            .with_interval(ms(30)),
        )
        .unwrap();
        s.run_cycles(10).unwrap();
        assert_eq!(*at.borrow(), vec![0, 30, 60, 90]);
    }

    #[test]
    fn tick_error_stops_scheduler() {
        let s = scheduler(10);
        s.add(TimeFunction::from_fn("bad", |ctx| {
            if ctx.cycle == 2 {
                Err(RuntimeError::failed("bad tick"))
            } else {
                Ok(TickOutcome::Continue)
            }
        }))
        .unwrap();
        assert_eq!(s.run().unwrap_err(), RuntimeError::failed("bad tick"));
        assert_eq!(s.event_loop().state(), LoopState::Stopped);
        assert!(matches!(
            s.add(TimeFunction::from_fn("late", |_| Ok(TickOutcome::Continue))),
            Err(RuntimeError::LoopStopped { .. })
        ));
    }

    #[test]
    fn add_from_another_loop_is_rejected() {
        let s = scheduler(10);
        let other = EventLoop::new();
        let outcome = Rc::new(RefCell::new(None));
        let o = Rc::clone(&outcome);
        let target = s.clone();
        other
            .invoke(move || {
                *o.borrow_mut() = Some(
                    target.add(TimeFunction::from_fn("x", |_| Ok(TickOutcome::Continue))),
                );
                Ok(())
            })
            .unwrap();
        other.run_cycles(1).unwrap();
        assert!(matches!(
            outcome.borrow_mut().take(),
            Some(Err(RuntimeError::NotOnLoopThread { .. }))
        ));
    }

    #[test]
    fn behavior_can_add_from_inside_tick() {
        let s = scheduler(10);
        let spawned = Rc::new(Cell::new(false));
        let flag = Rc::clone(&spawned);
        s.add(TimeFunction::from_fn("parent", move |ctx| {
            if !flag.get() {
                flag.set(true);
                ctx.scheduler
                    .add(TimeFunction::from_fn("child", |_| Ok(TickOutcome::Finished)))?;
            }
            Ok(TickOutcome::Continue)
        }))
        .unwrap();
        s.run_cycles(1).unwrap();
        assert!(s.contains(&FunctionId::new("child")));
        s.run_cycles(1).unwrap();
        assert!(!s.contains(&FunctionId::new("child")));
    }

    #[test]
    fn task_function_deregisters_on_completion() {
        let s = scheduler(25);
        let handle = s.clone();
        let lt = s
            .add(TimeFunction::task("sleeper", async move {
                handle.delay_for(ms(100))?.await.into_result()
            }))
            .unwrap();
        s.run_cycles(3).unwrap();
        assert!(!lt.is_expired());
        s.run_cycles(3).unwrap();
        assert!(lt.is_expired());
        assert!(s.is_empty());
    }

    #[test]
    fn zero_delay_rejected() {
        let s = scheduler(10);
        assert!(matches!(
            s.delay_for(Duration::ZERO),
            Err(RuntimeError::ZeroDurationWait)
        ));
    }

    #[test]
    fn delay_until_times_out() {
        let s = scheduler(10);
        let outcome = Rc::new(Cell::new(None));
        let o = Rc::clone(&outcome);
        let handle = s.clone();
        s.event_loop()
            .spawn(async move {
                let options = DelayOptions::default().with_timeout(ms(30));
                let wait = handle.delay_until(|| false, options)?;
                o.set(Some(wait.await));
                handle.stop();
                Ok(())
            })
            .unwrap();
        s.run().unwrap();
        assert_eq!(outcome.get(), Some(WaitOutcome::TimedOut { waited: ms(30) }));
    }

    #[test]
    fn delay_until_cancelled_by_lifetime() {
        let s = scheduler(10);
        let anchor = Lifetime::new();
        let outcome = Rc::new(Cell::new(None));
        let o = Rc::clone(&outcome);
        let handle = s.clone();
        let opts = DelayOptions::default().with_lifetime(&anchor);
        s.event_loop()
            .spawn(async move {
                o.set(Some(handle.delay_until(|| false, opts)?.await));
                Ok(())
            })
            .unwrap();
        s.run_cycles(2).unwrap();
        assert_eq!(outcome.get(), None);
        anchor.dispose();
        s.run_cycles(1).unwrap();
        assert_eq!(outcome.get(), Some(WaitOutcome::Cancelled));
    }

    #[test]
    fn stop_disposes_registered_functions_with_loop() {
        let s = scheduler(10);
        let lt = s
            .add(TimeFunction::from_fn("f", |ctx| {
                ctx.scheduler.stop();
                Ok(TickOutcome::Continue)
            }))
            .unwrap();
        s.run().unwrap();
        assert_eq!(s.event_loop().state(), LoopState::Stopped);
        assert!(lt.is_expired());
        assert!(s.is_empty());
        assert!(s.event_loop().lifetime().is_expired());
    }
}
