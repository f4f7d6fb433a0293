//! # Reconciliation Tests
//!
//! Child matching, host mutations and effect ordering:
//! - keyed children are moved, never recreated (seeded random shuffles)
//! - type changes replace subtrees
//! - effect cleanups run before new effects, children before parents
//! - unmounting frees every fiber and runs every cleanup
//! - host failures during commit crash the root

#![allow(missing_docs)]

use std::collections::HashMap;
use std::sync::Arc;

use canopy::{
    cleanup, Component, Deps, Element, HostHandle, HostProps, ManualClock, Patch, PropValue,
    Render, RootStatus, Runtime, RuntimeConfig, RuntimeError, Setter,
};
use canopy_host::{MemoryHost, OpKind};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn runtime() -> (Runtime<MemoryHost>, HostHandle) {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let runtime =
        Runtime::with_clock(host, RuntimeConfig::default(), Arc::new(ManualClock::new())).unwrap();
    (runtime, container)
}

fn list_component() -> Component {
    Component::new("List", |_hooks, props| {
        let keys = props.downcast::<Vec<u32>>()?;
        let items = keys
            .iter()
            .map(|key| {
                Element::host(
                    "item",
                    HostProps::new().with("id", i64::from(*key)),
                    Vec::new(),
                )
                .with_key(key.to_string().as_str())
            })
            .collect();
        Ok(Render::Ready(vec![Element::host("list", HostProps::new(), items)]))
    })
}

/// Item ids in host order.
fn host_order(runtime: &Runtime<MemoryHost>, list: HostHandle) -> Vec<i64> {
    runtime
        .host()
        .children(list)
        .iter()
        .filter_map(|child| {
            let node = runtime.host().node(*child)?;
            match node.props.get("id")? {
                PropValue::Int(id) => Some(*id),
                _ => None,
            }
        })
        .collect()
}

#[test]
fn test_keyed_shuffles_move_nodes() {
    let (mut runtime, container) = runtime();
    let list = list_component();
    let keys: Vec<u32> = (0..24).collect();
    let handle = runtime
        .mount(Element::component(&list, keys.clone()), container)
        .unwrap();
    let list_node = runtime.host().children(container)[0];
    let by_id: HashMap<i64, HostHandle> = runtime
        .host()
        .children(list_node)
        .iter()
        .map(|child| {
            let id = match runtime.host().node(*child).unwrap().props.get("id") {
                Some(PropValue::Int(id)) => *id,
                other => panic!("missing id: {other:?}"),
            };
            (id, *child)
        })
        .collect();
    let nodes_after_mount = runtime.host().node_count();

    let mut rng = ChaCha8Rng::seed_from_u64(7);
    for round in 0..10 {
        runtime.host_mut().take_ops();
        let mut order = keys.clone();
        order.shuffle(&mut rng);

        runtime
            .render(handle.root, Element::component(&list, order.clone()))
            .unwrap();
        runtime.run_until_idle().unwrap();

        let expected: Vec<i64> = order.iter().map(|key| i64::from(*key)).collect();
        assert_eq!(host_order(&runtime, list_node), expected, "round {round}");
        assert_eq!(runtime.host().count_ops(OpKind::Create), 0, "round {round}");
        assert_eq!(runtime.host().count_ops(OpKind::Remove), 0, "round {round}");
        for key in &expected {
            assert!(runtime.host().children(list_node).contains(&by_id[key]));
        }
        let report = runtime.last_commit().unwrap();
        assert!(report
            .patches
            .iter()
            .all(|patch| matches!(patch, Patch::Move { .. })));
    }
    assert_eq!(runtime.host().node_count(), nodes_after_mount);
}

#[test]
fn test_keyed_insert_and_remove() {
    let (mut runtime, container) = runtime();
    let list = list_component();
    let handle = runtime
        .mount(Element::component(&list, vec![1_u32, 2, 3]), container)
        .unwrap();
    let list_node = runtime.host().children(container)[0];
    let kept = runtime.host().children(list_node)[2];

    runtime.host_mut().take_ops();
    runtime
        .render(handle.root, Element::component(&list, vec![3_u32, 4, 1]))
        .unwrap();
    runtime.run_until_idle().unwrap();

    assert_eq!(host_order(&runtime, list_node), vec![3, 4, 1]);
    assert_eq!(runtime.host().children(list_node)[0], kept);
    assert_eq!(runtime.host().count_ops(OpKind::Create), 1);
    assert_eq!(runtime.host().count_ops(OpKind::Remove), 1);
    let (inserts, _moves, _updates, deletes) = runtime.last_commit().unwrap().patch_counts();
    assert_eq!((inserts, deletes), (1, 1));
}

#[test]
fn test_type_change_replaces_subtree() {
    let (mut runtime, container) = runtime();
    let handle = runtime
        .mount(
            Element::host("p", HostProps::new(), vec![Element::text("a")]),
            container,
        )
        .unwrap();
    let before = runtime.host().children(container)[0];

    runtime
        .render(
            handle.root,
            Element::host("div", HostProps::new(), vec![Element::text("a")]),
        )
        .unwrap();
    runtime.run_until_idle().unwrap();

    assert_eq!(runtime.host().render_to_string(container), "<div>a</div>");
    assert_ne!(runtime.host().children(container)[0], before);
    assert!(runtime.host().node(before).is_none());
}

#[test]
fn test_prop_change_updates_in_place() {
    let (mut runtime, container) = runtime();
    let handle = runtime
        .mount(
            Element::host("p", HostProps::new().with("class", "a"), vec![Element::text("x")]),
            container,
        )
        .unwrap();
    let node = runtime.host().children(container)[0];

    runtime.host_mut().take_ops();
    runtime
        .render(
            handle.root,
            Element::host("p", HostProps::new().with("class", "b"), vec![Element::text("y")]),
        )
        .unwrap();
    runtime.run_until_idle().unwrap();

    assert_eq!(runtime.host().children(container)[0], node);
    assert_eq!(runtime.host().count_ops(OpKind::Create), 0);
    assert_eq!(runtime.host().count_ops(OpKind::UpdateProps), 2);
    assert_eq!(
        runtime.host().render_to_string(container),
        "<p class=\"b\">y</p>"
    );
}

type Log = Arc<Mutex<Vec<String>>>;

fn logged(name: &'static str, log: &Log, children: Vec<Component>) -> Component {
    let log = Arc::clone(log);
    Component::new(name, move |hooks, _props| {
        let log = Arc::clone(&log);
        hooks.use_effect(Deps::always(), move || {
            log.lock().push(format!("create {name}"));
            cleanup(move || log.lock().push(format!("cleanup {name}")))
        })?;
        Ok(Render::Ready(
            children
                .iter()
                .map(|child| Element::component(child, ()))
                .collect(),
        ))
    })
}

#[test]
fn test_effect_order_children_first_cleanups_before_creates() {
    let (mut runtime, container) = runtime();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let left = logged("left", &log, Vec::new());
    let right = logged("right", &log, Vec::new());
    let parent = logged("parent", &log, vec![left, right]);

    let handle = runtime
        .mount(Element::component(&parent, 0_u32), container)
        .unwrap();
    assert_eq!(
        std::mem::take(&mut *log.lock()),
        vec!["create left", "create right", "create parent"]
    );

    runtime
        .render(handle.root, Element::component(&parent, 1_u32))
        .unwrap();
    runtime.run_until_idle().unwrap();
    assert_eq!(
        std::mem::take(&mut *log.lock()),
        vec![
            "cleanup left",
            "cleanup right",
            "cleanup parent",
            "create left",
            "create right",
            "create parent",
        ]
    );
    let report = runtime.last_commit().unwrap();
    assert_eq!((report.cleanups_run, report.effects_run), (3, 3));

    runtime.unmount(handle.root).unwrap();
    assert_eq!(
        std::mem::take(&mut *log.lock()),
        vec!["cleanup left", "cleanup right", "cleanup parent"]
    );
}

#[test]
fn test_effect_with_unchanged_deps_does_not_rerun() {
    let (mut runtime, container) = runtime();
    let runs: Log = Arc::new(Mutex::new(Vec::new()));
    let setter: Arc<Mutex<Option<Setter<u32>>>> = Arc::new(Mutex::new(None));
    let component = {
        let runs = Arc::clone(&runs);
        let setter = Arc::clone(&setter);
        Component::new("Once", move |hooks, _props| {
            let (count, set) = hooks.use_state(|| 0_u32)?;
            *setter.lock() = Some(set);
            let runs = Arc::clone(&runs);
            hooks.use_effect(Deps::once(), move || {
                runs.lock().push(String::from("mounted"));
                None
            })?;
            Ok(Render::Ready(vec![Element::text(count.to_string())]))
        })
    };
    runtime
        .mount(Element::component(&component, ()), container)
        .unwrap();

    setter.lock().clone().unwrap().set(1);
    runtime.run_until_idle().unwrap();

    assert_eq!(runtime.host().text_content(container), "1");
    assert_eq!(runs.lock().len(), 1);
}

#[test]
fn test_unmount_frees_every_fiber() {
    let (mut runtime, container) = runtime();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let leaf = logged("leaf", &log, Vec::new());
    let list = list_component();
    let app = |keys: Vec<u32>| {
        Element::host(
            "app",
            HostProps::new(),
            vec![Element::component(&leaf, ()), Element::component(&list, keys)],
        )
    };
    let handle = runtime.mount(app(vec![1, 2, 3]), container).unwrap();
    runtime.render(handle.root, app(vec![3, 1])).unwrap();
    runtime.run_until_idle().unwrap();
    runtime.render(handle.root, app(vec![2, 3, 1])).unwrap();
    runtime.run_until_idle().unwrap();
    assert!(runtime.fiber_count() > 0);
    assert!(runtime.instance_count() > 0);

    runtime.unmount(handle.root).unwrap();

    assert_eq!(runtime.fiber_count(), 0);
    assert_eq!(runtime.instance_count(), 0);
    assert!(runtime.host().children(container).is_empty());
    assert_eq!(runtime.root_status(handle.root), Some(RootStatus::Unmounted));
    assert_eq!(log.lock().last().map(String::as_str), Some("cleanup leaf"));
    assert!(matches!(
        runtime.unmount(handle.root),
        Err(RuntimeError::UnknownRoot(_))
    ));
}

#[test]
fn test_host_failure_during_commit_crashes_root() {
    let (mut runtime, container) = runtime();
    let setter: Arc<Mutex<Option<Setter<u32>>>> = Arc::new(Mutex::new(None));
    let counter = {
        let setter = Arc::clone(&setter);
        Component::new("Counter", move |hooks, _props| {
            let (count, set) = hooks.use_state(|| 0_u32)?;
            *setter.lock() = Some(set);
            Ok(Render::Ready(vec![Element::text(count.to_string())]))
        })
    };
    let handle = runtime
        .mount(Element::component(&counter, ()), container)
        .unwrap();

    runtime.host_mut().fail_on(OpKind::UpdateProps, 0);
    setter.lock().clone().unwrap().set(1);
    let error = runtime.run_until_idle().unwrap_err();

    match error {
        RuntimeError::Commit { root, source } => {
            assert_eq!(root, handle.root);
            assert_eq!(source.operation, OpKind::UpdateProps.name());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runtime.root_status(handle.root), Some(RootStatus::Crashed));
    assert_eq!(runtime.fiber_count(), 0);
    assert!(matches!(
        runtime.unmount(handle.root),
        Err(RuntimeError::RootCrashed(_))
    ));
}

#[test]
fn test_two_roots_are_independent() {
    let mut host = MemoryHost::new();
    let left = host.create_container();
    let right = host.create_container();
    let mut runtime =
        Runtime::with_clock(host, RuntimeConfig::default(), Arc::new(ManualClock::new())).unwrap();

    let first = runtime.mount(Element::text("left"), left).unwrap();
    let second = runtime.mount(Element::text("right"), right).unwrap();
    assert_ne!(first.root, second.root);

    runtime.unmount(first.root).unwrap();
    assert!(runtime.host().children(left).is_empty());
    assert_eq!(runtime.host().text_content(right), "right");
    assert!(runtime.fiber_count() > 0);
}
