use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use mproc_core::heap::{HeapOptions, PriorityHeap};
use mproc_core::shared::{AccessMode, SharedStore, Value};
use mproc_core::task::{Task, TaskPayload};

fn benchmark_heap_push_pop(c: &mut Criterion) {
    let tasks: Vec<(Task, i64)> = (0..1_000)
        .map(|n| (Task::new("bench").arg(n), (n * 7919) % 97))
        .collect();

    c.bench_function("heap_push_pop_1000", |b| {
        b.iter_batched(
            || PriorityHeap::new("bench-heap", HeapOptions::default()),
            |heap| {
                for (task, priority) in &tasks {
                    let fp = task.fingerprint();
                    heap.push(TaskPayload::Task(task.clone()), *priority, fp, true)
                        .ok();
                }
                while let Ok(Some(entry)) = heap.try_pop() {
                    black_box(entry.seq);
                }
            },
            BatchSize::SmallInput,
        )
    });
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let task = Task::new("resize")
        .arg("images/a.png")
        .kwarg("width", 640)
        .kwarg("height", 480);
    c.bench_function("task_fingerprint", |b| b.iter(|| black_box(task.fingerprint())));
}

fn benchmark_shared_dict(c: &mut Criterion) {
    let store = SharedStore::create("bench-store").expect("bench store");
    let root = store.root().expect("root");
    root.set("counters", Value::Map(Default::default())).expect("counters");
    let counters = root.dict("counters").expect("counters dict");

    c.bench_function("shared_dict_set_get", |b| {
        let mut n = 0_i64;
        b.iter(|| {
            n += 1;
            counters.set("hits", n).ok();
            black_box(counters.get("hits").ok());
        })
    });

    c.bench_function("shared_dict_increment", |b| {
        b.iter(|| black_box(counters.increment("calls", 1).ok()))
    });

    counters.set_access(AccessMode::Tightened).ok();
    c.bench_function("shared_dict_tightened_update", |b| {
        b.iter(|| black_box(counters.set("hits", 1).ok()))
    });

    store.unlink().ok();
}

criterion_group!(
    benches,
    benchmark_heap_push_pop,
    benchmark_fingerprint,
    benchmark_shared_dict
);
criterion_main!(benches);
