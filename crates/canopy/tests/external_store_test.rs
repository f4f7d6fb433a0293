//! # External Store Tests
//!
//! `use_sync_external_store` against [`canopy::SharedStore`]:
//! - store changes re-render subscribers
//! - a store mutated mid-pass forces a restart, never a torn commit
//! - subscribers that bail out are re-read, so no frame mixes snapshots
//! - stores that never settle crash the root after the retry budget
//! - subscriptions end with the component

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use canopy::{
    Component, Element, HostHandle, HostProps, Lane, ManualClock, Payload, Render, RootStatus,
    Runtime, RuntimeConfig, RuntimeError, Setter, SharedStore, TickOutcome,
};
use canopy_host::MemoryHost;
use parking_lot::Mutex;

fn runtime(config: RuntimeConfig) -> (Runtime<MemoryHost>, HostHandle) {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let runtime = Runtime::with_clock(host, config, Arc::new(ManualClock::new())).unwrap();
    (runtime, container)
}

fn reader(tag: &'static str, store: &Arc<SharedStore<i64>>, renders: &Arc<AtomicUsize>) -> Component {
    let store = Arc::clone(store);
    let renders = Arc::clone(renders);
    Component::new(tag, move |hooks, _props| {
        renders.fetch_add(1, Ordering::SeqCst);
        let value = hooks.use_sync_external_store(&store)?;
        Ok(Render::Ready(vec![Element::host(
            tag,
            HostProps::new(),
            vec![Element::text(value.to_string())],
        )]))
    })
}

/// Bumps the store during render while `armed` is set; stays armed if
/// `sticky`.
fn mutator(store: &Arc<SharedStore<i64>>, armed: &Arc<AtomicBool>, sticky: bool) -> Component {
    let store = Arc::clone(store);
    let armed = Arc::clone(armed);
    Component::new("Mutator", move |_hooks, props| {
        let _generation = props.downcast::<u32>()?;
        let fire = if sticky {
            armed.load(Ordering::SeqCst)
        } else {
            armed.swap(false, Ordering::SeqCst)
        };
        if fire {
            store.update(|value| value + 1);
        }
        Ok(Render::Ready(Vec::new()))
    })
}

#[test]
fn test_store_change_rerenders_subscriber() {
    let (mut runtime, container) = runtime(RuntimeConfig::default());
    let store = SharedStore::new(1_i64);
    let renders = Arc::new(AtomicUsize::new(0));
    let label = reader("label", &store, &renders);
    runtime
        .mount(Element::component(&label, ()), container)
        .unwrap();
    assert_eq!(store.listener_count(), 1);
    assert_eq!(runtime.host().text_content(container), "1");

    store.set(5);
    assert!(runtime.has_pending_work());
    assert_eq!(runtime.run_until_idle().unwrap(), 1);

    assert_eq!(runtime.host().text_content(container), "5");
    assert_eq!(renders.load(Ordering::SeqCst), 2);
}

#[test]
fn test_store_mutated_during_render_restarts_pass() {
    let (mut runtime, container) = runtime(RuntimeConfig::default());
    let store = SharedStore::new(0_i64);
    let armed = Arc::new(AtomicBool::new(false));
    let renders = Arc::new(AtomicUsize::new(0));
    let first = reader("a", &store, &renders);
    let second = reader("b", &store, &renders);
    let mutator = mutator(&store, &armed, false);
    let app = |generation: u32| {
        Element::host(
            "app",
            HostProps::new(),
            vec![
                Element::component(&first, ()),
                Element::component(&mutator, generation),
                Element::component(&second, ()),
            ],
        )
    };
    let handle = runtime.mount(app(0), container).unwrap();
    assert_eq!(
        runtime.host().render_to_string(container),
        "<app><a>0</a><b>0</b></app>"
    );

    // `a` reads 0, the mutator bumps the store, `b` would read 1.
    armed.store(true, Ordering::SeqCst);
    runtime.render(handle.root, app(1)).unwrap();
    runtime.run_until_idle().unwrap();

    assert_eq!(runtime.stats().tearing_restarts, 1);
    assert_eq!(
        runtime.host().render_to_string(container),
        "<app><a>1</a><b>1</b></app>"
    );
    assert_eq!(runtime.root_status(handle.root), Some(RootStatus::Active));
}

#[test]
fn test_bailed_out_subscriber_is_refreshed_before_commit() {
    let (mut runtime, container) = runtime(RuntimeConfig::default());
    let store = SharedStore::new(0_i64);
    let armed = Arc::new(AtomicBool::new(false));
    let setter: Arc<Mutex<Option<Setter<i64>>>> = Arc::new(Mutex::new(None));

    // `a` has its own state and bumps the store once, after reading it.
    let writer = {
        let store = Arc::clone(&store);
        let armed = Arc::clone(&armed);
        let setter = Arc::clone(&setter);
        Component::new("a", move |hooks, _props| {
            let (_clicks, set) = hooks.use_state(|| 0_i64)?;
            *setter.lock() = Some(set);
            let value = hooks.use_sync_external_store(&store)?;
            if armed.swap(false, Ordering::SeqCst) {
                store.update(|value| value + 1);
            }
            Ok(Render::Ready(vec![Element::host(
                "a",
                HostProps::new(),
                vec![Element::text(value.to_string())],
            )]))
        })
    };
    // `b` only reads the store and has no update of its own.
    let renders = Arc::new(AtomicUsize::new(0));
    let other = reader("b", &store, &renders);
    runtime
        .mount(
            Element::host(
                "app",
                HostProps::new(),
                vec![
                    Element::component(&writer, ()),
                    Element::component(&other, ()),
                ],
            ),
            container,
        )
        .unwrap();
    assert_eq!(
        runtime.host().render_to_string(container),
        "<app><a>0</a><b>0</b></app>"
    );

    armed.store(true, Ordering::SeqCst);
    let set = setter.lock().clone().unwrap();
    set.dispatch(Payload::value(1_i64), Lane::Immediate);
    loop {
        match runtime.tick().unwrap() {
            TickOutcome::Committed(_) => break,
            TickOutcome::Idle => panic!("update never committed"),
            TickOutcome::Yielded | TickOutcome::Suspended(_) => {}
        }
    }

    // The first committed frame already shows one snapshot everywhere.
    assert_eq!(
        runtime.host().render_to_string(container),
        "<app><a>1</a><b>1</b></app>"
    );
    assert_eq!(runtime.stats().tearing_restarts, 1);
    assert_eq!(renders.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unsettled_store_exhausts_retry_budget() {
    let config = RuntimeConfig {
        store_retry_budget: 3,
        ..RuntimeConfig::default()
    };
    let (mut runtime, container) = runtime(config);
    let store = SharedStore::new(0_i64);
    let armed = Arc::new(AtomicBool::new(true));
    let renders = Arc::new(AtomicUsize::new(0));
    let first = reader("a", &store, &renders);
    let mutator = mutator(&store, &armed, true);

    let error = runtime
        .mount(
            Element::host(
                "app",
                HostProps::new(),
                vec![
                    Element::component(&first, ()),
                    Element::component(&mutator, 0_u32),
                ],
            ),
            container,
        )
        .unwrap_err();

    match error {
        RuntimeError::StoreTearingRetryExhausted { root, attempts } => {
            assert_eq!(attempts, 3);
            assert_eq!(runtime.root_status(root), Some(RootStatus::Crashed));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runtime.stats().tearing_restarts, 3);
    assert!(runtime.host().children(container).is_empty());
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn test_unmount_unsubscribes_from_store() {
    let (mut runtime, container) = runtime(RuntimeConfig::default());
    let store = SharedStore::new(0_i64);
    let renders = Arc::new(AtomicUsize::new(0));
    let label = reader("label", &store, &renders);
    let handle = runtime
        .mount(Element::component(&label, ()), container)
        .unwrap();
    assert_eq!(store.listener_count(), 1);

    runtime.unmount(handle.root).unwrap();
    assert_eq!(store.listener_count(), 0);

    store.set(9);
    assert_eq!(runtime.run_until_idle().unwrap(), 0);
    assert_eq!(renders.load(Ordering::SeqCst), 1);
}
