//! # Reconciliation Benchmark
//!
//! Mount, keyed reorder and state update of a 1,000 item list against the
//! in-memory host.
//!
//! Run with: `cargo bench --package canopy`

// Benchmarks don't need docs
#![allow(missing_docs)]

use std::sync::Arc;

use canopy::{Component, Element, HostProps, Render, Runtime, RuntimeConfig, Setter};
use canopy_host::MemoryHost;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const LIST_SIZES: [usize; 3] = [100, 1_000, 5_000];

fn list_component() -> Component {
    Component::new("List", |_hooks, props| {
        let keys = props.downcast::<Vec<u32>>()?;
        let items = keys
            .iter()
            .map(|key| {
                Element::host(
                    "item",
                    HostProps::new().with("id", i64::from(*key)),
                    vec![Element::text(key.to_string())],
                )
                .with_key(key.to_string().as_str())
            })
            .collect();
        Ok(Render::Ready(vec![Element::host("list", HostProps::new(), items)]))
    })
}

fn mounted(list: &Component, keys: Vec<u32>) -> (Runtime<MemoryHost>, canopy::RootId) {
    let mut host = MemoryHost::new();
    let container = host.create_container();
    let mut runtime = Runtime::new(host, RuntimeConfig::default()).expect("default config is valid");
    let handle = runtime
        .mount(Element::component(list, keys), container)
        .expect("mount succeeds");
    (runtime, handle.root)
}

/// Benchmark: initial mount.
fn bench_mount(c: &mut Criterion) {
    let mut group = c.benchmark_group("mount_list");
    let list = list_component();
    for size in LIST_SIZES {
        let keys: Vec<u32> = (0..size as u32).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            b.iter(|| black_box(mounted(&list, keys.clone()).0.fiber_count()));
        });
    }
    group.finish();
}

/// Benchmark: shuffled keyed reorder, render plus commit.
fn bench_keyed_reorder(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_reorder");
    let list = list_component();
    for size in LIST_SIZES {
        let keys: Vec<u32> = (0..size as u32).collect();
        let (mut runtime, root) = mounted(&list, keys.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        group.bench_with_input(BenchmarkId::from_parameter(size), &keys, |b, keys| {
            b.iter(|| {
                let mut order = keys.clone();
                order.shuffle(&mut rng);
                runtime
                    .render(root, Element::component(&list, order))
                    .expect("root is mounted");
                black_box(runtime.run_until_idle().expect("reorder commits"))
            });
        });
    }
    group.finish();
}

/// Benchmark: one state update deep in an unchanged tree (bailout path).
fn bench_leaf_update(c: &mut Criterion) {
    let setter: Arc<Mutex<Option<Setter<u64>>>> = Arc::new(Mutex::new(None));
    let leaf = {
        let setter = Arc::clone(&setter);
        Component::new("Leaf", move |hooks, _props| {
            let (value, set) = hooks.use_state(|| 0_u64)?;
            *setter.lock() = Some(set);
            Ok(Render::Ready(vec![Element::text(value.to_string())]))
        })
    };
    let siblings: Vec<Element> = (0..1_000)
        .map(|i| Element::host("cell", HostProps::new().with("i", i64::from(i)), Vec::new()))
        .chain(std::iter::once(Element::component(&leaf, ())))
        .collect();

    let mut host = MemoryHost::new();
    let container = host.create_container();
    let mut runtime = Runtime::new(host, RuntimeConfig::default()).expect("default config is valid");
    runtime
        .mount(Element::host("grid", HostProps::new(), siblings), container)
        .expect("mount succeeds");
    let set = setter.lock().clone().expect("leaf rendered");

    c.bench_function("leaf_update_1000_siblings", |b| {
        b.iter(|| {
            set.update(|v| v + 1);
            black_box(runtime.run_until_idle().expect("update commits"))
        });
    });
}

criterion_group!(benches, bench_mount, bench_keyed_reorder, bench_leaf_update);
criterion_main!(benches);
