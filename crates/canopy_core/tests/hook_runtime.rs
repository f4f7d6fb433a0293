//! # Hook Runtime Tests
//!
//! Drives [`Hooks`] directly, outside the reconciler: a harness plays the
//! role of one fiber whose renders always commit.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use canopy_core::error::RenderError;
use canopy_core::hooks::{cleanup, Deps, HookAddr, HookEnv, HookOutcome, HookSlot, Hooks};
use canopy_core::inbox::{Inbox, InboxReceiver, Signal};
use canopy_core::lane::{Lane, Lanes};
use canopy_core::store::StoreRead;
use canopy_core::update::{PendingUpdates, Update, UpdateId};
use canopy_core::{deps, InstanceId, UpdateError};

struct Harness {
    slots: Vec<HookSlot>,
    pending: PendingUpdates,
    consumed: HashSet<(HookAddr, UpdateId)>,
    reads: Vec<StoreRead>,
    inbox: Inbox,
    receiver: InboxReceiver,
    mounted: bool,
}

impl Harness {
    fn new() -> Self {
        let (inbox, receiver) = Inbox::channel();
        Self {
            slots: Vec::new(),
            pending: PendingUpdates::new(),
            consumed: HashSet::new(),
            reads: Vec::new(),
            inbox,
            receiver,
            mounted: false,
        }
    }

    /// Moves posted updates into the pending set, as the runtime does at an
    /// event boundary.
    fn deliver(&mut self) {
        for signal in self.receiver.drain() {
            if let Signal::Update { addr, payload, lane } = signal {
                self.pending
                    .push(addr, Update::new(lane.unwrap_or(Lane::Normal), payload));
            }
        }
    }

    fn render<R>(
        &mut self,
        lanes: Lanes,
        body: impl FnOnce(&mut Hooks<'_>) -> Result<R, RenderError>,
    ) -> Result<(R, HookOutcome), RenderError> {
        let rendered = self.render_uncommitted(lanes, body);
        self.pending.acknowledge(&self.consumed);
        self.consumed.clear();
        rendered
    }

    /// Renders without acknowledging merged updates, like a pass that has
    /// not committed yet.
    fn render_uncommitted<R>(
        &mut self,
        lanes: Lanes,
        body: impl FnOnce(&mut Hooks<'_>) -> Result<R, RenderError>,
    ) -> Result<(R, HookOutcome), RenderError> {
        let mounting = !self.mounted;
        let env = HookEnv {
            render_lanes: lanes,
            pending: &self.pending,
            consumed: &mut self.consumed,
            store_reads: &mut self.reads,
            inbox: &self.inbox,
        };
        let mut hooks = Hooks::new("Widget", InstanceId::new(1), &mut self.slots, mounting, env);
        let output = body(&mut hooks);
        let outcome = hooks.finish();
        self.mounted = true;
        Ok((output?, outcome?))
    }
}

fn normal() -> Lanes {
    Lanes::at_or_above(Lane::Normal)
}

#[test]
fn test_state_survives_renders_and_applies_in_order() {
    let mut harness = Harness::new();
    let (setter, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.1))
        .unwrap();

    setter.set(1);
    setter.update(|v| v + 1);
    setter.update(|v| v + 1);
    harness.deliver();

    let (value, outcome) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.0))
        .unwrap();
    assert_eq!(*value, 3);
    assert!(outcome.state_changed);
    assert!(outcome.remaining.is_empty());
}

#[test]
fn test_large_batch_is_merged_once() {
    let mut harness = Harness::new();
    let (setter, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.1))
        .unwrap();

    for _ in 0..10_000 {
        setter.update(|v| v + 1);
    }
    harness.deliver();

    let (value, _) = harness
        .render_uncommitted(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.0))
        .unwrap();
    assert_eq!(*value, 10_000);
    assert_eq!(harness.consumed.len(), 10_000);

    // Rendering again before commit does not merge the batch twice.
    let (value, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.0))
        .unwrap();
    assert_eq!(*value, 10_000);
    assert!(harness.consumed.is_empty());
}

#[test]
fn test_setter_identity_is_stable() {
    let mut harness = Harness::new();
    let (first, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_u8)?.1))
        .unwrap();
    let (second, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_u8)?.1))
        .unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_low_lane_update_is_kept_for_later() {
    let mut harness = Harness::new();
    let (setter, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.1))
        .unwrap();

    setter.dispatch(canopy_core::Payload::updater(|v: &i64| v + 10), Lane::Low);
    setter.update(|v| v + 1);
    harness.deliver();

    let (value, outcome) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.0))
        .unwrap();
    assert_eq!(*value, 1);
    assert_eq!(outcome.remaining, Lanes::single(Lane::Low));

    let (value, _) = harness
        .render(Lanes::at_or_above(Lane::Low), |hooks| {
            Ok(hooks.use_state(|| 0_i64)?.0)
        })
        .unwrap();
    assert_eq!(*value, 11);
}

#[test]
fn test_fewer_hooks_is_a_violation() {
    let mut harness = Harness::new();
    harness
        .render(normal(), |hooks| {
            hooks.use_state(|| 0_u8)?;
            hooks.use_state(|| 1_u8)?;
            Ok(())
        })
        .unwrap();

    let err = harness
        .render(normal(), |hooks| {
            hooks.use_state(|| 0_u8)?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.is_hook_order_violation());
}

#[test]
fn test_more_hooks_is_a_violation() {
    let mut harness = Harness::new();
    harness
        .render(normal(), |hooks| {
            hooks.use_state(|| 0_u8)?;
            Ok(())
        })
        .unwrap();

    let err = harness
        .render(normal(), |hooks| {
            hooks.use_state(|| 0_u8)?;
            hooks.use_memo(Deps::once(), || 5_u8)?;
            Ok(())
        })
        .unwrap_err();
    assert!(err.is_hook_order_violation());
    assert_eq!(err.component(), "Widget");
}

#[test]
fn test_kind_swap_is_a_violation_even_if_swallowed() {
    let mut harness = Harness::new();
    harness
        .render(normal(), |hooks| {
            hooks.use_state(|| 0_u8)?;
            Ok(())
        })
        .unwrap();

    let err = harness
        .render(normal(), |hooks| {
            let _ignored = hooks.use_ref(|| 0_u8);
            Ok(())
        })
        .unwrap_err();
    assert!(err.is_hook_order_violation());
}

#[test]
fn test_memo_recomputes_only_on_dep_change() {
    let mut harness = Harness::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let key = Arc::new(String::from("a"));

    for (page, expected_calls) in [(1_i64, 1), (1, 1), (2, 2)] {
        let counter = Arc::clone(&calls);
        let key = Arc::clone(&key);
        harness
            .render(normal(), move |hooks| {
                hooks.use_memo(deps![&key, page], || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    page * 10
                })
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls);
    }
}

#[test]
fn test_effect_scheduled_only_when_deps_change() {
    let mut harness = Harness::new();
    let render = |harness: &mut Harness, dep: i64| {
        harness
            .render(normal(), move |hooks| {
                hooks.use_effect(deps![dep], || cleanup(|| {}))?;
                Ok(())
            })
            .unwrap()
            .1
    };

    assert!(render(&mut harness, 1).passive);
    assert!(!render(&mut harness, 1).passive);
    assert!(render(&mut harness, 2).passive);
}

#[test]
fn test_reducer_keeps_mount_reducer() {
    let mut harness = Harness::new();
    let (dispatch, _) = harness
        .render(normal(), |hooks| {
            Ok(hooks.use_reducer(|state: &i64, delta: &i64| state + delta, || 0)?.1)
        })
        .unwrap();

    dispatch.dispatch(5);
    dispatch.dispatch(-2);
    harness.deliver();

    let (value, _) = harness
        .render(normal(), |hooks| {
            // A different reducer at a later render is ignored.
            Ok(hooks.use_reducer(|_: &i64, _: &i64| 0, || 0)?.0)
        })
        .unwrap();
    assert_eq!(*value, 3);
}

#[test]
fn test_ref_persists_without_rendering() {
    let mut harness = Harness::new();
    let (handle, _) = harness
        .render(normal(), |hooks| hooks.use_ref(|| 1_u32))
        .unwrap();
    handle.set(9);
    assert_eq!(harness.receiver.pending_count(), 0);

    let (again, _) = harness
        .render(normal(), |hooks| hooks.use_ref(|| 1_u32))
        .unwrap();
    assert_eq!(again.get(), 9);
}

#[test]
fn test_failing_updater_discards_entry() {
    let mut harness = Harness::new();
    let (setter, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.1))
        .unwrap();

    setter.update(|v| v + 1);
    setter.try_update(|_| Err(UpdateError::new("bad input")));
    setter.update(|v| v + 1);
    harness.deliver();

    let err = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.0))
        .unwrap_err();
    assert!(matches!(err, RenderError::Update { .. }));

    let (value, _) = harness
        .render(normal(), |hooks| Ok(hooks.use_state(|| 0_i64)?.0))
        .unwrap();
    assert_eq!(*value, 2);
}
