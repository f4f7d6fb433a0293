//! # Canopy Golden Path Demo
//!
//! Drives the runtime end to end against the in-memory host:
//! 1. Mount a counter next to a store-backed label
//! 2. One batch: `set(1)` then `update(v + 1)` → one pass, shows `2`
//! 3. Mutate the shared store → the label re-renders
//! 4. Reverse a keyed list → nodes are moved, never recreated
//!
//! Exits non-zero if any step misbehaves.

use std::sync::Arc;

use canopy::{
    Component, Element, HostProps, Lane, Render, Runtime, RuntimeConfig, RuntimeResult, Setter,
    SharedStore,
};
use canopy_host::{MemoryHost, OpKind};
use parking_lot::Mutex;

struct Step {
    name: &'static str,
    passed: bool,
    detail: String,
}

fn main() {
    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║              CANOPY - GOLDEN PATH DEMO                           ║");
    println!("╠══════════════════════════════════════════════════════════════════╣");
    println!("║  Flow: mount → batched updates → store change → keyed reorder    ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");

    let steps = match run() {
        Ok(steps) => steps,
        Err(error) => {
            println!("❌ runtime error: {error}");
            std::process::exit(1);
        }
    };

    let mut failed = 0;
    for step in &steps {
        let mark = if step.passed { "✅" } else { "❌" };
        println!("{mark} {:<28} {}", step.name, step.detail);
        if !step.passed {
            failed += 1;
        }
    }
    println!("──────────────────────────────────────────────────────────────────");
    println!("{} / {} steps passed", steps.len() - failed, steps.len());

    if failed > 0 {
        std::process::exit(1);
    }
}

fn run() -> RuntimeResult<Vec<Step>> {
    let mut steps = Vec::new();
    let setter: Arc<Mutex<Option<Setter<i64>>>> = Arc::new(Mutex::new(None));
    let store = SharedStore::new(String::from("idle"));

    let counter = {
        let setter = Arc::clone(&setter);
        Component::new("Counter", move |hooks, _props| {
            let (count, set) = hooks.use_state(|| 0_i64)?;
            *setter.lock() = Some(set);
            Ok(Render::Ready(vec![Element::host(
                "count",
                HostProps::new(),
                vec![Element::text(count.to_string())],
            )]))
        })
    };
    let label = {
        let store = Arc::clone(&store);
        Component::new("Label", move |hooks, _props| {
            let status = hooks.use_sync_external_store(&store)?;
            Ok(Render::Ready(vec![Element::host(
                "status",
                HostProps::new(),
                vec![Element::text(status.as_str())],
            )]))
        })
    };
    let list = Component::new("List", |_hooks, props| {
        let items = props.downcast::<Vec<&'static str>>()?;
        let children = items
            .iter()
            .map(|item| Element::host("item", HostProps::new(), vec![Element::text(*item)]).with_key(*item))
            .collect();
        Ok(Render::Ready(vec![Element::host("list", HostProps::new(), children)]))
    });
    let app = |items: Vec<&'static str>| {
        Element::host(
            "app",
            HostProps::new(),
            vec![
                Element::component(&counter, ()),
                Element::component(&label, ()),
                Element::component(&list, items),
            ],
        )
    };

    let mut host = MemoryHost::new();
    let container = host.create_container();
    let mut runtime = Runtime::new(host, RuntimeConfig::default())?;

    let handle = runtime.mount(app(vec!["a", "b", "c", "d"]), container)?;
    let mounted = runtime.host().render_to_string(container);
    steps.push(Step {
        name: "mount",
        passed: mounted.contains("<count>0</count>") && mounted.contains("<status>idle</status>"),
        detail: mounted,
    });

    let commits_before = runtime.stats().commits;
    let set = setter.lock().clone();
    if let Some(set) = set {
        runtime.batched(Lane::UserBlocking, || {
            set.set(1);
            set.update(|v| v + 1);
        })?;
    }
    runtime.run_until_idle()?;
    let text = runtime.host().text_content(container);
    let passes = runtime.stats().commits - commits_before;
    steps.push(Step {
        name: "batched set + update",
        passed: text.starts_with('2') && passes == 1,
        detail: format!("text={text:?} commits={passes}"),
    });

    store.set(String::from("busy"));
    runtime.run_until_idle()?;
    let rendered = runtime.host().render_to_string(container);
    steps.push(Step {
        name: "store change",
        passed: rendered.contains("<status>busy</status>"),
        detail: rendered,
    });

    runtime.host_mut().take_ops();
    runtime.render(handle.root, app(vec!["d", "c", "b", "a"]))?;
    runtime.run_until_idle()?;
    let created = runtime.host().count_ops(OpKind::Create);
    let moved = runtime.host().count_ops(OpKind::InsertBefore) + runtime.host().count_ops(OpKind::Append);
    let rendered = runtime.host().render_to_string(container);
    steps.push(Step {
        name: "keyed reorder",
        passed: created == 0 && rendered.contains("<list><item>d</item><item>c</item><item>b</item><item>a</item></list>"),
        detail: format!("creates={created} moves={moved}"),
    });

    runtime.unmount(handle.root)?;
    steps.push(Step {
        name: "unmount",
        passed: runtime.fiber_count() == 0 && runtime.host().children(container).is_empty(),
        detail: format!("fibers={} nodes={}", runtime.fiber_count(), runtime.host().node_count()),
    });

    Ok(steps)
}
