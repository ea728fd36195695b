#![forbid(unsafe_code)]

//! End-to-end scenarios for the time scheduler.
//!
//! Validates that:
//! 1. A counter function and a waiting task function cooperate on one loop:
//!    the wait resolves once the counter reaches 3, at logical time >= 150 ms
//!    with a 50 ms increment, on the scheduler's own thread, and the task
//!    function deregisters when it completes.
//! 2. Observables mutated by time functions notify subscribers within the
//!    same cycle.
//! 3. A wait driven by a foreign-thread remote resumes on the loop thread.
//! 4. A stop request from a task ends `run()` cleanly.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::thread;

use ftick_core::Lifetime;
use ftick_runtime::{
    DelayOptions, LoopConfig, ObservableCollection, ObservableObject, SchedulerConfig,
    TickOutcome, TimeFunction, TimeScheduler, WaitOutcome,
};
use web_time::Duration;

// ============================================================================
// Helpers
// ============================================================================

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn scheduler(increment: Duration) -> TimeScheduler {
    TimeScheduler::new(
        SchedulerConfig::default()
            .with_increment(increment)
            .with_loop_config(LoopConfig::default().with_max_work_per_cycle(64)),
    )
}

fn counter(s: &TimeScheduler, name: &str) -> Rc<Cell<u32>> {
    let count = Rc::new(Cell::new(0));
    let c = Rc::clone(&count);
    s.add(TimeFunction::from_fn(name, move |_| {
        c.set(c.get() + 1);
        Ok(TickOutcome::Continue)
    }))
    .unwrap();
    count
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn wait_resumes_after_counter_reaches_three() {
    let s = scheduler(ms(50));
    let count = counter(&s, "counter");
    let test_thread = thread::current().id();

    // The waiter deregisters when its task completes; stop once it has.
    let removed = Rc::new(RefCell::new(Vec::new()));
    let r = Rc::clone(&removed);
    let stopper = s.clone();
    s.function_removed()
        .subscribe_for_lifetime(&Lifetime::forever(), move |id| {
            r.borrow_mut().push(id.to_string());
            if id.as_str() == "waiter" {
                stopper.stop();
            }
        });

    let resumed = Rc::new(RefCell::new(None));
    let r = Rc::clone(&resumed);
    let handle = s.clone();
    let c = Rc::clone(&count);
    let waiter = s
        .add(TimeFunction::task("waiter", async move {
            let wait = handle.delay_until(move || c.get() >= 3, DelayOptions::default())?;
            wait.await.into_result()?;
            *r.borrow_mut() = Some((handle.now(), thread::current().id()));
            Ok(())
        }))
        .unwrap();
    assert!(s.contains(&"waiter".into()));

    s.run().unwrap();

    let (at, on) = resumed.borrow_mut().take().unwrap();
    assert!(at >= ms(150), "resumed at {at:?}");
    assert_eq!(on, test_thread);
    assert!(count.get() >= 3);
    assert!(waiter.is_expired());
    assert_eq!(removed.borrow().first().map(String::as_str), Some("waiter"));
    assert!(s.is_empty());
}

#[test]
fn delay_for_and_timeout_interleave() {
    let s = scheduler(ms(10));
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = Rc::clone(&log);
    let handle = s.clone();
    s.event_loop()
        .spawn(async move {
            handle.delay_for(ms(30))?.await.into_result()?;
            l.borrow_mut().push(format!("slept@{}", handle.now().as_millis()));
            let outcome = handle
                .delay_until(|| false, DelayOptions::default().with_timeout(ms(20)))?
                .await;
            l.borrow_mut().push(format!("{outcome:?}@{}", handle.now().as_millis()));
            handle.stop();
            Ok(())
        })
        .unwrap();

    s.run().unwrap();
    assert_eq!(
        *log.borrow(),
        vec!["slept@30", "TimedOut { waited: 20ms }@50"]
    );
}

#[test]
fn timeout_surfaces_as_error_through_into_result() {
    let s = scheduler(ms(10));
    let handle = s.clone();
    s.event_loop()
        .spawn(async move {
            handle
                .delay_until(|| false, DelayOptions::default().with_timeout(ms(10)))?
                .await
                .into_result()
        })
        .unwrap();
    let err = s.run().unwrap_err();
    assert!(matches!(err, ftick_runtime::RuntimeError::Timeout { .. }));
}

#[test]
fn time_function_drives_observables() {
    let s = scheduler(ms(20));
    let state: ObservableObject<u64> = ObservableObject::new();
    let trail: ObservableCollection<u64> = ObservableCollection::new();

    let lt = Lifetime::new();
    let t = trail.clone();
    state.subscribe_for_lifetime("elapsed", &lt, move |change| {
        t.add(change.value).unwrap();
    });

    let st = state.clone();
    s.add(TimeFunction::from_fn("clock", move |ctx| {
        st.set("elapsed", ctx.now.as_millis() as u64);
        Ok(if ctx.cycle == 3 {
            TickOutcome::Finished
        } else {
            TickOutcome::Continue
        })
    }))
    .unwrap();

    s.run_cycles(6).unwrap();
    assert_eq!(trail.to_vec(), vec![0, 20, 40, 60]);
    assert!(s.is_empty());
}

#[test]
fn remote_wakes_predicate_wait() {
    let s = scheduler(ms(10));
    let flag = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let remote = s.event_loop().remote();

    let f = std::sync::Arc::clone(&flag);
    let handle = s.clone();
    let resumed_on = Rc::new(RefCell::new(None));
    let r = Rc::clone(&resumed_on);
    s.event_loop()
        .spawn(async move {
            let wait = handle.delay_until(
                move || f.load(std::sync::atomic::Ordering::SeqCst),
                DelayOptions::default().with_poll_interval(ms(10)),
            )?;
            let outcome = wait.await;
            *r.borrow_mut() = Some((outcome, thread::current().id()));
            handle.stop();
            Ok(())
        })
        .unwrap();

    let f = std::sync::Arc::clone(&flag);
    let worker = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(5));
        remote
            .invoke(move || {
                f.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
    });

    s.run().unwrap();
    worker.join().unwrap();
    let (outcome, on) = resumed_on.borrow_mut().take().unwrap();
    assert_eq!(outcome, WaitOutcome::Satisfied);
    assert_eq!(on, thread::current().id());
}

#[test]
fn counters_tick_once_per_cycle() {
    let s = scheduler(ms(5));
    let a = counter(&s, "a");
    let b = counter(&s, "b");
    s.run_cycles(7).unwrap();
    assert_eq!((a.get(), b.get()), (7, 7));
    assert_eq!(s.now(), ms(35));
}
