#![forbid(unsafe_code)]

//! Single-threaded cooperative event loop.
//!
//! An [`EventLoop`] runs queued work in discrete **cycles**. Each cycle:
//!
//! 1. fires [`start_of_cycle`](EventLoop::start_of_cycle),
//! 2. promotes work deferred with [`invoke_next_cycle`](EventLoop::invoke_next_cycle)
//!    and wakes tasks parked with [`yield_cycle`](EventLoop::yield_cycle),
//! 3. drains the queue, including work enqueued by earlier items of the same
//!    drain and messages posted from other threads, up to
//!    [`LoopConfig::max_work_per_cycle`] items (leftovers carry over),
//! 4. fires [`end_of_cycle`](EventLoop::end_of_cycle),
//! 5. increments the cycle counter.
//!
//! # Threading
//!
//! `EventLoop` is `Rc`-based and therefore `!Send`: touching a loop from a
//! foreign thread does not compile. The two cross-thread entry points are
//! task wakers and [`LoopRemote`]; both only post messages on a channel the
//! loop drains on its own thread.
//!
//! While a loop runs, a thread-local guard records its id. Starting a second
//! loop on the same thread (or re-entering the same loop) fails with
//! [`RuntimeError::LoopAlreadyActive`].
//!
//! # Failure Modes
//!
//! - A work item or task returning `Err` stops the loop; the error is returned
//!   from [`run`](EventLoop::run) / [`run_cycles`](EventLoop::run_cycles).
//! - Panics unwind through `run()`; the thread-local guard is still released.
//! - Submitting work after the loop stopped returns
//!   [`RuntimeError::LoopStopped`].
//!
//! # Example
//!
//! ```
//! use ftick_runtime::event_loop::EventLoop;
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let el = EventLoop::new();
//! let hits = Rc::new(Cell::new(0));
//! let h = Rc::clone(&hits);
//! let handle = el.clone();
//! el.invoke(move || {
//!     h.set(h.get() + 1);
//!     handle.stop();
//!     Ok(())
//! })
//! .unwrap();
//! el.run().unwrap();
//! assert_eq!(hits.get(), 1);
//! ```

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::task::{Context, Poll, Waker};

use ahash::AHashMap;
use ftick_core::{Event, Lifetime};
use tracing::{debug, debug_span, trace, warn};
use web_time::{Duration, Instant};

use crate::error::{RuntimeError, RuntimeResult};
use crate::task::{LoopMsg, TaskId, TaskSlot, TaskWaker};

/// Default cap on work items drained per cycle.
pub const DEFAULT_MAX_WORK_PER_CYCLE: usize = 1024;

/// Default time an idle loop parks waiting for messages.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(10);

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

// ─── Current-loop guard ──────────────────────────────────────────────────────

thread_local! {
    static CURRENT_LOOP: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Id of the loop currently executing on this thread, if any.
#[must_use]
pub fn current_loop_id() -> Option<u64> {
    CURRENT_LOOP.with(Cell::get)
}

/// Marks a loop as the one executing on this thread for as long as it lives.
struct CurrentLoopGuard;

impl CurrentLoopGuard {
    fn enter(loop_id: u64) -> RuntimeResult<Self> {
        CURRENT_LOOP.with(|current| match current.get() {
            Some(active) => Err(RuntimeError::LoopAlreadyActive {
                active,
                requested: loop_id,
            }),
            None => {
                current.set(Some(loop_id));
                Ok(Self)
            }
        })
    }
}

impl Drop for CurrentLoopGuard {
    fn drop(&mut self) {
        CURRENT_LOOP.with(|current| current.set(None));
    }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Event loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Fairness bound: work items drained per cycle before the rest is
    /// carried into the next cycle. Always at least 1.
    pub max_work_per_cycle: usize,
    /// How long an idle loop parks on its message channel between cycles.
    pub idle_timeout: Duration,
    /// Run cycles back to back even when there is no work (simulations).
    pub continuous: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_work_per_cycle: DEFAULT_MAX_WORK_PER_CYCLE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            continuous: false,
        }
    }
}

impl LoopConfig {
    /// Set the per-cycle fairness bound.
    #[must_use]
    pub fn with_max_work_per_cycle(mut self, max: usize) -> Self {
        self.max_work_per_cycle = max.max(1);
        self
    }

    /// Set the idle park timeout.
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Run cycles back to back regardless of pending work.
    #[must_use]
    pub fn continuous(mut self, continuous: bool) -> Self {
        self.continuous = continuous;
        self
    }

    /// Defaults overridden by `FTICK_MAX_WORK_PER_CYCLE` and
    /// `FTICK_IDLE_TIMEOUT_MS`. Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max) = env_number("FTICK_MAX_WORK_PER_CYCLE") {
            config = config.with_max_work_per_cycle(max as usize);
        }
        if let Some(ms) = env_number("FTICK_IDLE_TIMEOUT_MS") {
            config = config.with_idle_timeout(Duration::from_millis(ms));
        }
        config
    }
}

fn env_number(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring invalid loop config override");
            None
        }
    }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// Lifecycle of an [`EventLoop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Constructed, or paused between [`EventLoop::run_cycles`] calls.
    Created,
    /// Executing cycles on this thread.
    Running,
    /// A stop was requested; the loop exits after the current cycle.
    Stopping,
    /// Terminal. No further work is accepted.
    Stopped,
}

enum WorkItem {
    Call(Box<dyn FnOnce() -> RuntimeResult<()>>),
    Poll(TaskId),
}

struct LoopInner {
    id: u64,
    config: LoopConfig,
    state: Cell<LoopState>,
    cycle: Cell<u64>,
    in_cycle: Cell<bool>,
    queue: RefCell<VecDeque<WorkItem>>,
    deferred: RefCell<VecDeque<WorkItem>>,
    next_cycle_wakers: RefCell<Vec<Waker>>,
    tasks: RefCell<AHashMap<TaskId, TaskSlot>>,
    next_task_id: Cell<TaskId>,
    tx: mpsc::Sender<LoopMsg>,
    rx: mpsc::Receiver<LoopMsg>,
    start_of_cycle: Event<u64>,
    end_of_cycle: Event<u64>,
    lifetime: Lifetime,
    failure: RefCell<Option<RuntimeError>>,
}

// ─── EventLoop ───────────────────────────────────────────────────────────────

/// Handle to a cooperative event loop. Clones share the same loop.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("id", &self.inner.id)
            .field("state", &self.inner.state.get())
            .field("cycle", &self.inner.cycle.get())
            .field("queued", &self.inner.queue.borrow().len())
            .field("tasks", &self.inner.tasks.borrow().len())
            .finish()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLoop {
    // ── Constructors ─────────────────────────────────────────────────

    /// Create a loop with [`LoopConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(LoopConfig::default())
    }

    /// Create a loop with an explicit configuration.
    #[must_use]
    pub fn with_config(config: LoopConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            inner: Rc::new(LoopInner {
                id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
                config,
                state: Cell::new(LoopState::Created),
                cycle: Cell::new(0),
                in_cycle: Cell::new(false),
                queue: RefCell::new(VecDeque::new()),
                deferred: RefCell::new(VecDeque::new()),
                next_cycle_wakers: RefCell::new(Vec::new()),
                tasks: RefCell::new(AHashMap::new()),
                next_task_id: Cell::new(0),
                tx,
                rx,
                start_of_cycle: Event::new(),
                end_of_cycle: Event::new(),
                lifetime: Lifetime::new(),
                failure: RefCell::new(None),
            }),
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Unique identifier for this loop (for tracing/logging).
    #[inline]
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LoopState {
        self.inner.state.get()
    }

    /// Number of completed cycles.
    #[inline]
    #[must_use]
    pub fn cycle(&self) -> u64 {
        self.inner.cycle.get()
    }

    /// Whether this loop is the one executing on the calling thread.
    #[must_use]
    pub fn is_current(&self) -> bool {
        current_loop_id() == Some(self.inner.id)
    }

    /// Whether a cycle is in progress.
    #[must_use]
    pub fn in_cycle(&self) -> bool {
        self.inner.in_cycle.get()
    }

    /// Fired at the start of every cycle with the cycle number.
    #[must_use]
    pub fn start_of_cycle(&self) -> &Event<u64> {
        &self.inner.start_of_cycle
    }

    /// Fired at the end of every cycle with the cycle number.
    #[must_use]
    pub fn end_of_cycle(&self) -> &Event<u64> {
        &self.inner.end_of_cycle
    }

    /// A lifetime that expires when the loop stops.
    #[must_use]
    pub fn lifetime(&self) -> &Lifetime {
        &self.inner.lifetime
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    /// A `Send` handle for posting work from other threads.
    #[must_use]
    pub fn remote(&self) -> LoopRemote {
        LoopRemote {
            loop_id: self.inner.id,
            tx: self.inner.tx.clone(),
        }
    }

    // ── Scheduling ───────────────────────────────────────────────────

    fn ensure_accepting(&self) -> RuntimeResult<()> {
        if self.state() == LoopState::Stopped {
            warn!(loop_id = self.inner.id, "work submitted to a stopped loop");
            return Err(RuntimeError::LoopStopped {
                loop_id: self.inner.id,
            });
        }
        Ok(())
    }

    /// Queue `work`. Inside a cycle it runs in the current drain; otherwise
    /// it runs in the next cycle.
    pub fn invoke(&self, work: impl FnOnce() -> RuntimeResult<()> + 'static) -> RuntimeResult<()> {
        self.ensure_accepting()?;
        self.inner
            .queue
            .borrow_mut()
            .push_back(WorkItem::Call(Box::new(work)));
        Ok(())
    }

    /// Queue `work` for the next cycle, even when called inside a cycle.
    pub fn invoke_next_cycle(
        &self,
        work: impl FnOnce() -> RuntimeResult<()> + 'static,
    ) -> RuntimeResult<()> {
        self.ensure_accepting()?;
        self.inner
            .deferred
            .borrow_mut()
            .push_back(WorkItem::Call(Box::new(work)));
        Ok(())
    }

    /// Run `future` as a task on this loop.
    ///
    /// The returned lifetime expires when the task completes. Disposing it
    /// earlier cancels the task (the future is dropped).
    pub fn spawn(
        &self,
        future: impl Future<Output = RuntimeResult<()>> + 'static,
    ) -> RuntimeResult<Lifetime> {
        let lifetime = Lifetime::new();
        self.spawn_for_lifetime(&lifetime, future)?;
        Ok(lifetime)
    }

    /// Run `future` as a task anchored to `lifetime`.
    ///
    /// The task is cancelled when `lifetime` expires and `lifetime` is
    /// disposed when the task completes. Does nothing if `lifetime` is
    /// already expired.
    pub fn spawn_for_lifetime(
        &self,
        lifetime: &Lifetime,
        future: impl Future<Output = RuntimeResult<()>> + 'static,
    ) -> RuntimeResult<()> {
        self.ensure_accepting()?;
        if lifetime.is_expired() {
            return Ok(());
        }

        let id = self.inner.next_task_id.get();
        self.inner.next_task_id.set(id + 1);
        let slot = TaskSlot {
            future: Some(Box::pin(future)),
            waker: TaskWaker::waker(id, self.inner.tx.clone()),
            lifetime: lifetime.clone(),
            queued: true,
        };
        self.inner.tasks.borrow_mut().insert(id, slot);
        self.inner.queue.borrow_mut().push_back(WorkItem::Poll(id));

        let weak: Weak<LoopInner> = Rc::downgrade(&self.inner);
        lifetime.on_disposed(move || {
            if let Some(inner) = weak.upgrade() {
                let removed = inner.tasks.borrow_mut().remove(&id);
                if removed.is_some() {
                    trace!(loop_id = inner.id, task_id = id, "task cancelled");
                }
            }
        });
        debug!(loop_id = self.inner.id, task_id = id, "task spawned");
        Ok(())
    }

    /// A future that completes at the start of the next cycle.
    #[must_use]
    pub fn yield_cycle(&self) -> YieldCycle {
        YieldCycle {
            event_loop: self.clone(),
            yielded: false,
        }
    }

    /// Wake `waker` at the start of the next cycle.
    pub fn wake_next_cycle(&self, waker: Waker) {
        self.inner.next_cycle_wakers.borrow_mut().push(waker);
    }

    /// Request a graceful stop after the current cycle.
    pub fn stop(&self) {
        match self.state() {
            LoopState::Created | LoopState::Running => {
                debug!(loop_id = self.inner.id, cycle = self.cycle(), "loop stop requested");
                self.inner.state.set(LoopState::Stopping);
            }
            LoopState::Stopping | LoopState::Stopped => {}
        }
    }

    /// Record a failure raised outside a work item (e.g. by an event
    /// handler). The current cycle aborts at the next check.
    pub(crate) fn fail(&self, error: RuntimeError) {
        let mut failure = self.inner.failure.borrow_mut();
        if failure.is_none() {
            *failure = Some(error);
        }
    }

    fn take_failure(&self) -> RuntimeResult<()> {
        match self.inner.failure.borrow_mut().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    // ── Driving ──────────────────────────────────────────────────────

    /// Run cycles until [`stop`](Self::stop) is called or a failure occurs.
    pub fn run(&self) -> RuntimeResult<()> {
        self.ensure_accepting()?;
        let _guard = CurrentLoopGuard::enter(self.inner.id)?;
        if self.state() == LoopState::Created {
            self.inner.state.set(LoopState::Running);
        }
        debug!(loop_id = self.inner.id, "loop running");

        let result = (|| {
            while self.state() == LoopState::Running {
                self.run_cycle()?;
                if !self.inner.config.continuous && self.is_idle() {
                    self.park(self.inner.config.idle_timeout);
                }
            }
            Ok(())
        })();
        self.finish(&result);
        result
    }

    /// Run exactly `cycles` cycles (fewer if the loop stops), then return.
    ///
    /// The loop stays usable afterwards unless it was stopped.
    pub fn run_cycles(&self, cycles: u64) -> RuntimeResult<()> {
        self.ensure_accepting()?;
        let _guard = CurrentLoopGuard::enter(self.inner.id)?;
        if self.state() == LoopState::Created {
            self.inner.state.set(LoopState::Running);
        }

        let result = (|| {
            for _ in 0..cycles {
                if self.state() != LoopState::Running {
                    break;
                }
                self.run_cycle()?;
            }
            Ok(())
        })();

        if result.is_err() || self.state() == LoopState::Stopping {
            self.finish(&result);
        } else {
            self.inner.state.set(LoopState::Created);
        }
        result
    }

    fn run_cycle(&self) -> RuntimeResult<()> {
        let cycle = self.inner.cycle.get();
        let span = debug_span!(
            "ftick.cycle",
            loop_id = self.inner.id,
            cycle,
            work = tracing::field::Empty,
            duration_us = tracing::field::Empty
        );
        let _enter = span.enter();
        let start = Instant::now();

        self.inner.in_cycle.set(true);
        let result = (|| {
            self.inner.start_of_cycle.fire(&cycle);
            self.take_failure()?;
            self.promote_deferred();
            let processed = self.drain()?;
            span.record("work", processed as u64);
            self.inner.end_of_cycle.fire(&cycle);
            self.take_failure()
        })();
        self.inner.in_cycle.set(false);
        result?;

        self.inner.cycle.set(cycle + 1);
        span.record("duration_us", start.elapsed().as_micros() as u64);
        Ok(())
    }

    fn promote_deferred(&self) {
        let deferred = std::mem::take(&mut *self.inner.deferred.borrow_mut());
        self.inner.queue.borrow_mut().extend(deferred);
        let wakers = std::mem::take(&mut *self.inner.next_cycle_wakers.borrow_mut());
        for waker in wakers {
            waker.wake();
        }
    }

    fn drain(&self) -> RuntimeResult<usize> {
        let budget = self.inner.config.max_work_per_cycle.max(1);
        let mut processed = 0;
        while processed < budget {
            self.pump_messages();
            let Some(item) = self.pop_work() else {
                break;
            };
            processed += 1;
            match item {
                WorkItem::Call(work) => work()?,
                WorkItem::Poll(id) => self.poll_task(id)?,
            }
            self.take_failure()?;
        }
        Ok(processed)
    }

    fn pop_work(&self) -> Option<WorkItem> {
        self.inner.queue.borrow_mut().pop_front()
    }

    fn pump_messages(&self) {
        while let Ok(msg) = self.inner.rx.try_recv() {
            self.handle_msg(msg);
        }
    }

    fn handle_msg(&self, msg: LoopMsg) {
        match msg {
            LoopMsg::Wake(id) => self.schedule_poll(id),
            LoopMsg::Invoke(work) => self.inner.queue.borrow_mut().push_back(WorkItem::Call(work)),
            LoopMsg::Stop => self.stop(),
        }
    }

    fn schedule_poll(&self, id: TaskId) {
        let mut tasks = self.inner.tasks.borrow_mut();
        if let Some(slot) = tasks.get_mut(&id)
            && !slot.queued
        {
            slot.queued = true;
            self.inner.queue.borrow_mut().push_back(WorkItem::Poll(id));
        }
    }

    fn poll_task(&self, id: TaskId) -> RuntimeResult<()> {
        let taken = {
            let mut tasks = self.inner.tasks.borrow_mut();
            tasks.get_mut(&id).and_then(|slot| {
                slot.queued = false;
                slot.future.take().map(|f| (f, slot.waker.clone()))
            })
        };
        let Some((mut future, waker)) = taken else {
            return Ok(());
        };

        let mut cx = Context::from_waker(&waker);
        match future.as_mut().poll(&mut cx) {
            Poll::Pending => {
                if let Some(slot) = self.inner.tasks.borrow_mut().get_mut(&id) {
                    slot.future = Some(future);
                    return Ok(());
                }
                // Cancelled while running; `future` drops here.
                Ok(())
            }
            Poll::Ready(result) => {
                let slot = self.inner.tasks.borrow_mut().remove(&id);
                drop(future);
                if let Some(slot) = slot {
                    slot.lifetime.try_dispose();
                }
                match &result {
                    Ok(()) => debug!(loop_id = self.inner.id, task_id = id, "task completed"),
                    Err(e) => {
                        warn!(loop_id = self.inner.id, task_id = id, error = %e, "task failed");
                    }
                }
                result
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.inner.queue.borrow().is_empty()
            && self.inner.deferred.borrow().is_empty()
            && self.inner.next_cycle_wakers.borrow().is_empty()
    }

    fn park(&self, timeout: Duration) {
        if let Ok(msg) = self.inner.rx.recv_timeout(timeout) {
            self.handle_msg(msg);
        }
    }

    fn finish(&self, result: &RuntimeResult<()>) {
        self.inner.state.set(LoopState::Stopped);
        if let Err(e) = result {
            warn!(
                loop_id = self.inner.id,
                cycle = self.cycle(),
                error = %e,
                "loop terminated by failure"
            );
        } else {
            debug!(loop_id = self.inner.id, cycle = self.cycle(), "loop stopped");
        }

        self.inner.queue.borrow_mut().clear();
        self.inner.deferred.borrow_mut().clear();
        self.inner.next_cycle_wakers.borrow_mut().clear();
        let tasks = std::mem::take(&mut *self.inner.tasks.borrow_mut());
        for (_, slot) in tasks {
            slot.lifetime.try_dispose();
        }
        self.inner.lifetime.try_dispose();
    }
}

// ─── YieldCycle ──────────────────────────────────────────────────────────────

/// Future returned by [`EventLoop::yield_cycle`].
#[derive(Debug)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldCycle {
    event_loop: EventLoop,
    yielded: bool,
}

impl Future for YieldCycle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        self.event_loop.wake_next_cycle(cx.waker().clone());
        Poll::Pending
    }
}

// ─── LoopRemote ──────────────────────────────────────────────────────────────

/// `Send + Clone` handle for reaching a loop from another thread.
///
/// Work posted through a remote runs on the loop's own thread during a drain.
#[derive(Clone)]
pub struct LoopRemote {
    loop_id: u64,
    tx: mpsc::Sender<LoopMsg>,
}

impl fmt::Debug for LoopRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopRemote")
            .field("loop_id", &self.loop_id)
            .finish()
    }
}

impl LoopRemote {
    /// Id of the target loop.
    #[must_use]
    pub fn loop_id(&self) -> u64 {
        self.loop_id
    }

    /// Post `work` to the loop.
    ///
    /// Fails with [`RuntimeError::LoopStopped`] once the loop has been
    /// dropped.
    pub fn invoke(
        &self,
        work: impl FnOnce() -> RuntimeResult<()> + Send + 'static,
    ) -> RuntimeResult<()> {
        self.tx
            .send(LoopMsg::Invoke(Box::new(work)))
            .map_err(|_| RuntimeError::LoopStopped {
                loop_id: self.loop_id,
            })
    }

    /// Ask the loop to stop after its current cycle.
    pub fn stop(&self) -> RuntimeResult<()> {
        self.tx
            .send(LoopMsg::Stop)
            .map_err(|_| RuntimeError::LoopStopped {
                loop_id: self.loop_id,
            })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn log() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn push(log: &Rc<RefCell<Vec<String>>>, entry: impl Into<String>) {
        log.borrow_mut().push(entry.into());
    }

    #[test]
    fn invoke_runs_in_first_cycle() {
        let el = EventLoop::new();
        let entries = log();
        let e = Rc::clone(&entries);
        el.invoke(move || {
            push(&e, "work");
            Ok(())
        })
        .unwrap();
        el.run_cycles(1).unwrap();
        assert_eq!(*entries.borrow(), vec!["work"]);
        assert_eq!(el.cycle(), 1);
        assert_eq!(el.state(), LoopState::Created);
    }

    #[test]
    fn cycle_events_bracket_the_drain() {
        let el = EventLoop::new();
        let entries = log();
        let lt = Lifetime::new();
        let e = Rc::clone(&entries);
        el.start_of_cycle()
            .subscribe_for_lifetime(&lt, move |c| push(&e, format!("start:{c}")));
        let e = Rc::clone(&entries);
        el.end_of_cycle()
            .subscribe_for_lifetime(&lt, move |c| push(&e, format!("end:{c}")));
        let e = Rc::clone(&entries);
        el.invoke(move || {
            push(&e, "work");
            Ok(())
        })
        .unwrap();

        el.run_cycles(2).unwrap();
        assert_eq!(
            *entries.borrow(),
            vec!["start:0", "work", "end:0", "start:1", "end:1"]
        );
    }

    #[test]
    fn in_cycle_invoke_runs_same_cycle_and_next_cycle_defers() {
        let el = EventLoop::new();
        let entries = log();
        let handle = el.clone();
        let e = Rc::clone(&entries);
        el.invoke(move || {
            let e1 = Rc::clone(&e);
            let h = handle.clone();
            handle.invoke(move || {
                push(&e1, format!("same:{}", h.cycle()));
                Ok(())
            })?;
            let e2 = Rc::clone(&e);
            let h = handle.clone();
            handle.invoke_next_cycle(move || {
                push(&e2, format!("next:{}", h.cycle()));
                Ok(())
            })
        })
        .unwrap();

        el.run_cycles(2).unwrap();
        assert_eq!(*entries.borrow(), vec!["same:0", "next:1"]);
    }

    #[test]
    fn fairness_bound_carries_work_over() {
        let el = EventLoop::with_config(LoopConfig::default().with_max_work_per_cycle(2));
        let seen = Rc::new(RefCell::new(Vec::new()));
        for i in 0..5 {
            let s = Rc::clone(&seen);
            let h = el.clone();
            el.invoke(move || {
                s.borrow_mut().push((i, h.cycle()));
                Ok(())
            })
            .unwrap();
        }
        el.run_cycles(3).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![(0, 0), (1, 0), (2, 1), (3, 1), (4, 2)]
        );
    }

    #[test]
    fn stop_finishes_current_cycle() {
        let el = EventLoop::new();
        let entries = log();
        let handle = el.clone();
        let e = Rc::clone(&entries);
        el.invoke(move || {
            handle.stop();
            Ok(())
        })
        .unwrap();
        let e2 = Rc::clone(&e);
        el.invoke(move || {
            push(&e2, "after-stop-same-cycle");
            Ok(())
        })
        .unwrap();

        el.run().unwrap();
        assert_eq!(*entries.borrow(), vec!["after-stop-same-cycle"]);
        assert_eq!(el.state(), LoopState::Stopped);
        assert_eq!(el.cycle(), 1);
        assert!(el.lifetime().is_expired());
    }

    #[test]
    fn failure_terminates_loop() {
        let el = EventLoop::new();
        el.invoke(|| Err(RuntimeError::failed("boom"))).unwrap();
        let err = el.run().unwrap_err();
        assert_eq!(err, RuntimeError::failed("boom"));
        assert_eq!(el.state(), LoopState::Stopped);
        assert!(matches!(
            el.invoke(|| Ok(())),
            Err(RuntimeError::LoopStopped { .. })
        ));
    }

    #[test]
    fn nested_run_is_rejected() {
        let el = EventLoop::new();
        let other = EventLoop::new();
        let handle = el.clone();
        let outcome = Rc::new(RefCell::new(None));
        let o = Rc::clone(&outcome);
        el.invoke(move || {
            *o.borrow_mut() = Some(other.run_cycles(1));
            handle.stop();
            Ok(())
        })
        .unwrap();
        el.run().unwrap();
        assert!(matches!(
            outcome.borrow_mut().take(),
            Some(Err(RuntimeError::LoopAlreadyActive { .. }))
        ));
        assert_eq!(current_loop_id(), None);
    }

    #[test]
    fn is_current_only_inside_cycles() {
        let el = EventLoop::new();
        assert!(!el.is_current());
        let handle = el.clone();
        let inside = Rc::new(Cell::new(false));
        let i = Rc::clone(&inside);
        el.invoke(move || {
            i.set(handle.is_current() && handle.in_cycle());
            Ok(())
        })
        .unwrap();
        el.run_cycles(1).unwrap();
        assert!(inside.get());
        assert!(!el.is_current());
    }

    #[test]
    fn yield_cycle_resumes_next_cycle() {
        let el = EventLoop::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        let h = el.clone();
        let task = el
            .spawn(async move {
                s.borrow_mut().push(h.cycle());
                h.yield_cycle().await;
                s.borrow_mut().push(h.cycle());
                h.yield_cycle().await;
                s.borrow_mut().push(h.cycle());
                Ok(())
            })
            .unwrap();
        el.run_cycles(5).unwrap();
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
        assert!(task.is_expired());
        assert_eq!(el.task_count(), 0);
    }

    #[test]
    fn disposing_task_lifetime_cancels_it() {
        let el = EventLoop::new();
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        let h = el.clone();
        let task = el
            .spawn(async move {
                loop {
                    c.set(c.get() + 1);
                    h.yield_cycle().await;
                }
            })
            .unwrap();
        el.run_cycles(3).unwrap();
        assert_eq!(count.get(), 3);
        task.dispose();
        assert_eq!(el.task_count(), 0);
        el.run_cycles(3).unwrap();
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn task_error_stops_loop() {
        let el = EventLoop::new();
        let h = el.clone();
        el.spawn(async move {
            h.yield_cycle().await;
            Err(RuntimeError::failed("task failed"))
        })
        .unwrap();
        assert_eq!(el.run().unwrap_err(), RuntimeError::failed("task failed"));
    }

    /// Completes on its second poll; the wake comes from a helper thread.
    struct ForeignWake {
        started: bool,
        done: Arc<Mutex<bool>>,
    }

    impl Future for ForeignWake {
        type Output = ();

        fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
            if *self.done.lock().unwrap() {
                return Poll::Ready(());
            }
            if !self.started {
                self.started = true;
                let waker = cx.waker().clone();
                let done = Arc::clone(&self.done);
                thread::spawn(move || {
                    thread::sleep(std::time::Duration::from_millis(5));
                    *done.lock().unwrap() = true;
                    waker.wake();
                });
            }
            Poll::Pending
        }
    }

    #[test]
    fn foreign_wake_resumes_on_loop_thread() {
        let el = EventLoop::new();
        let loop_thread = thread::current().id();
        let resumed_on = Rc::new(RefCell::new(None));
        let r = Rc::clone(&resumed_on);
        let h = el.clone();
        el.spawn(async move {
            ForeignWake {
                started: false,
                done: Arc::new(Mutex::new(false)),
            }
            .await;
            *r.borrow_mut() = Some(thread::current().id());
            h.stop();
            Ok(())
        })
        .unwrap();
        el.run().unwrap();
        assert_eq!(*resumed_on.borrow(), Some(loop_thread));
    }

    #[test]
    fn remote_invoke_runs_on_loop() {
        let el = EventLoop::new();
        let remote = el.remote();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let h = Arc::clone(&hits);
        let worker = thread::spawn(move || {
            remote
                .invoke(move || {
                    h.lock().unwrap().push(thread::current().name().map(str::to_owned));
                    Ok(())
                })
                .unwrap();
            remote.stop().unwrap();
        });
        worker.join().unwrap();
        el.run().unwrap();
        assert_eq!(hits.lock().unwrap().len(), 1);
        assert_eq!(el.state(), LoopState::Stopped);
    }

    #[test]
    fn stop_cancels_outstanding_tasks() {
        let el = EventLoop::new();
        let h = el.clone();
        let task = el
            .spawn(async move {
                loop {
                    h.yield_cycle().await;
                }
            })
            .unwrap();
        let h = el.clone();
        el.invoke_next_cycle(move || {
            h.stop();
            Ok(())
        })
        .unwrap();
        el.run().unwrap();
        assert!(task.is_expired());
        assert_eq!(el.task_count(), 0);
    }

    #[test]
    fn config_builder_clamps_fairness_bound() {
        let config = LoopConfig::default()
            .with_max_work_per_cycle(0)
            .with_idle_timeout(Duration::from_millis(1))
            .continuous(true);
        assert_eq!(config.max_work_per_cycle, 1);
        assert_eq!(config.idle_timeout, Duration::from_millis(1));
        assert!(config.continuous);
    }
}
