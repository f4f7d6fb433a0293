//! # Concurrency Tests
//!
//! Time slicing, preemption and starvation, driven tick by tick with a
//! manual clock and a one-unit slice so every yield point is deterministic.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use canopy::{
    Clock, Component, Element, HostHandle, HostProps, Lane, ManualClock, Payload, Render, RootId,
    Runtime, RuntimeConfig, SchedulerConfig, Setter, TickOutcome,
};
use canopy_host::MemoryHost;
use parking_lot::Mutex;

type SetterCell = Arc<Mutex<Option<Setter<i64>>>>;

fn cell(tag: &'static str, setter: &SetterCell, renders: &Arc<AtomicUsize>) -> Component {
    let setter = Arc::clone(setter);
    let renders = Arc::clone(renders);
    Component::new(tag, move |hooks, _props| {
        renders.fetch_add(1, Ordering::SeqCst);
        let (value, set) = hooks.use_state(|| 0_i64)?;
        *setter.lock() = Some(set);
        Ok(Render::Ready(vec![Element::host(
            tag,
            HostProps::new(),
            vec![Element::text(value.to_string())],
        )]))
    })
}

struct Fixture {
    runtime: Runtime<MemoryHost>,
    container: HostHandle,
    root: RootId,
    clock: Arc<ManualClock>,
    slow: SetterCell,
    fast: SetterCell,
    slow_renders: Arc<AtomicUsize>,
}

impl Fixture {
    fn new(scheduler: SchedulerConfig) -> Self {
        let slow: SetterCell = Arc::new(Mutex::new(None));
        let fast: SetterCell = Arc::new(Mutex::new(None));
        let slow_renders = Arc::new(AtomicUsize::new(0));
        let fast_renders = Arc::new(AtomicUsize::new(0));
        let slow_cell = cell("slow", &slow, &slow_renders);
        let fast_cell = cell("fast", &fast, &fast_renders);

        let mut host = MemoryHost::new();
        let container = host.create_container();
        let clock = Arc::new(ManualClock::new());
        let config = RuntimeConfig {
            scheduler,
            ..RuntimeConfig::default()
        };
        let mut runtime = Runtime::with_clock(host, config, Arc::clone(&clock) as Arc<dyn Clock>).unwrap();
        let handle = runtime
            .mount(
                Element::host(
                    "app",
                    HostProps::new(),
                    vec![
                        Element::component(&slow_cell, ()),
                        Element::component(&fast_cell, ()),
                    ],
                ),
                container,
            )
            .unwrap();

        Self {
            runtime,
            container,
            root: handle.root,
            clock,
            slow,
            fast,
            slow_renders,
        }
    }

    fn slow(&self) -> Setter<i64> {
        self.slow.lock().clone().unwrap()
    }

    fn fast(&self) -> Setter<i64> {
        self.fast.lock().clone().unwrap()
    }

    fn rendered(&self) -> String {
        self.runtime.host().render_to_string(self.container)
    }
}

fn one_unit_slices() -> SchedulerConfig {
    SchedulerConfig {
        max_units_per_slice: Some(1),
        ..SchedulerConfig::default()
    }
}

#[test]
fn test_concurrent_pass_yields_between_units() {
    let mut fixture = Fixture::new(one_unit_slices());
    let set = fixture.slow();
    fixture.runtime.batched(Lane::Normal, || set.set(1)).unwrap();

    assert!(matches!(fixture.runtime.tick().unwrap(), TickOutcome::Yielded));
    // Nothing is visible until the pass commits.
    assert_eq!(fixture.rendered(), "<app><slow>0</slow><fast>0</fast></app>");

    let mut ticks = 1;
    loop {
        match fixture.runtime.tick().unwrap() {
            TickOutcome::Yielded => ticks += 1,
            TickOutcome::Committed(report) => {
                assert!(report.lanes.contains(Lane::Normal));
                assert!(report.units > 1);
                break;
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
    assert!(ticks > 1);
    assert!(fixture.runtime.stats().yields >= 1);
    assert_eq!(fixture.rendered(), "<app><slow>1</slow><fast>0</fast></app>");
}

#[test]
fn test_time_budget_yields_with_manual_clock() {
    let mut fixture = Fixture::new(SchedulerConfig::default());
    let set = fixture.slow();
    fixture.runtime.batched(Lane::Normal, || set.set(1)).unwrap();

    // A frozen clock never runs out of time: the whole pass fits one slice.
    assert!(matches!(
        fixture.runtime.tick().unwrap(),
        TickOutcome::Committed(_)
    ));
    assert_eq!(fixture.runtime.stats().yields, 0);

    fixture.clock.advance(Duration::from_millis(1));
    assert!(matches!(fixture.runtime.tick().unwrap(), TickOutcome::Idle));
}

#[test]
fn test_urgent_update_preempts_normal_pass() {
    let mut fixture = Fixture::new(one_unit_slices());
    let slow = fixture.slow();
    let fast = fixture.fast();

    fixture.runtime.batched(Lane::Normal, || slow.set(1)).unwrap();
    assert!(matches!(fixture.runtime.tick().unwrap(), TickOutcome::Yielded));

    // Sync lane: flushed before `batched` returns, discarding the Normal pass.
    fixture.runtime.batched(Lane::Immediate, || fast.set(10)).unwrap();

    let report = fixture.runtime.last_commit().unwrap().clone();
    assert!(report.lanes.contains(Lane::Immediate));
    assert!(!report.lanes.contains(Lane::Normal));
    assert_eq!(fixture.runtime.stats().preemptions, 1);
    assert_eq!(fixture.runtime.preemptions(fixture.root, Lane::Normal), 1);
    // The Normal update is still pending, never half-applied.
    assert_eq!(fixture.rendered(), "<app><slow>0</slow><fast>10</fast></app>");

    fixture.runtime.run_until_idle().unwrap();
    assert_eq!(fixture.rendered(), "<app><slow>1</slow><fast>10</fast></app>");
    assert_eq!(fixture.runtime.preemptions(fixture.root, Lane::Normal), 0);
}

#[test]
fn test_update_into_running_pass_restarts_it() {
    let mut fixture = Fixture::new(one_unit_slices());
    let slow = fixture.slow();

    fixture.runtime.batched(Lane::Normal, || slow.set(1)).unwrap();
    assert!(matches!(fixture.runtime.tick().unwrap(), TickOutcome::Yielded));
    let passes = fixture.runtime.stats().passes_started;

    slow.update(|v| v + 5);
    fixture.runtime.run_until_idle().unwrap();

    let stats = fixture.runtime.stats();
    assert_eq!(stats.preemptions, 1);
    assert!(stats.passes_started > passes);
    assert_eq!(fixture.rendered(), "<app><slow>6</slow><fast>0</fast></app>");
}

#[test]
fn test_starved_lane_expires_and_renders_sync() {
    let mut fixture = Fixture::new(SchedulerConfig {
        max_units_per_slice: Some(1),
        starvation_limit: 3,
        ..SchedulerConfig::default()
    });
    let slow = fixture.slow();
    let fast = fixture.fast();
    fixture.runtime.batched(Lane::Normal, || slow.set(1)).unwrap();

    for round in 1..=2_i64 {
        assert!(matches!(fixture.runtime.tick().unwrap(), TickOutcome::Yielded));
        fast.dispatch(Payload::value(round), Lane::Immediate);
        match fixture.runtime.tick().unwrap() {
            TickOutcome::Committed(report) => {
                assert!(report.lanes.contains(Lane::Immediate));
                assert!(!report.lanes.contains(Lane::Normal));
            }
            other => panic!("round {round}: unexpected outcome {other:?}"),
        }
    }
    assert_eq!(fixture.runtime.stats().expirations, 0);

    // Third preemption hits the limit: Normal is expired and wins.
    assert!(matches!(fixture.runtime.tick().unwrap(), TickOutcome::Yielded));
    fast.dispatch(Payload::value(3_i64), Lane::Immediate);
    match fixture.runtime.tick().unwrap() {
        TickOutcome::Committed(report) => {
            assert!(report.lanes.contains(Lane::Normal));
            assert!(report.lanes.contains(Lane::Immediate));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let stats = fixture.runtime.stats();
    assert_eq!(stats.expirations, 1);
    assert_eq!(stats.preemptions, 3);
    assert_eq!(fixture.runtime.preemptions(fixture.root, Lane::Normal), 0);
    assert_eq!(fixture.rendered(), "<app><slow>1</slow><fast>3</fast></app>");
    assert!(matches!(fixture.runtime.tick().unwrap(), TickOutcome::Idle));
}

#[test]
fn test_bailed_out_sibling_not_rerendered_by_urgent_pass() {
    let mut fixture = Fixture::new(one_unit_slices());
    let fast = fixture.fast();
    let before = fixture.slow_renders.load(Ordering::SeqCst);

    fixture.runtime.batched(Lane::Immediate, || fast.set(2)).unwrap();

    assert_eq!(fixture.slow_renders.load(Ordering::SeqCst), before);
    assert_eq!(fixture.rendered(), "<app><slow>0</slow><fast>2</fast></app>");
}
