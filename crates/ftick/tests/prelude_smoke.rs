#![forbid(unsafe_code)]

//! The prelude alone is enough to build a ticking simulation.

use std::cell::Cell;
use std::rc::Rc;

use ftick::prelude::*;
use web_time::Duration;

#[test]
fn scheduler_and_observables_through_prelude() {
    let scheduler = TimeScheduler::new(
        runtime::SchedulerConfig::default().with_increment(Duration::from_millis(25)),
    );
    let state: ObservableObject<u32> = ObservableObject::new();
    let st = state.clone();
    scheduler
        .add(TimeFunction::from_fn("count", move |ctx| {
            st.set("ticks", ctx.cycle as u32 + 1);
            Ok(TickOutcome::Continue)
        }))
        .unwrap();

    let lt = Lifetime::new();
    let changes = Rc::new(Cell::new(0));
    let c = Rc::clone(&changes);
    state.subscribe_for_lifetime("ticks", &lt, move |_| c.set(c.get() + 1));

    scheduler.run_cycles(4).unwrap();
    assert_eq!(state.get("ticks"), Some(4));
    assert_eq!(changes.get(), 4);
    assert_eq!(scheduler.now(), Duration::from_millis(100));
}

#[cfg(feature = "spatial")]
#[test]
fn spatial_is_reexported() {
    use spatial::{
        Angle, Bounds, DefaultObstacleResolver, Element, ElementKind, Space,
        SteppingHitPredictor, Velocity,
    };

    let scheduler = TimeScheduler::default();
    let space = Space::new(Bounds::new(0.0, 0.0, 100.0, 100.0));
    space
        .start_driver(&scheduler, DefaultObstacleResolver::new(&space), SteppingHitPredictor)
        .unwrap();
    let mover = Element::new(ElementKind::new("mover"), Bounds::new(10.0, 10.0, 1.0, 1.0))
        .with_velocity(Velocity::new(100.0, Angle::DOWN));
    space.add(&mover);

    scheduler.run_cycles(1).unwrap();
    assert!((mover.bounds().y - 11.0).abs() < 1e-4);
}
