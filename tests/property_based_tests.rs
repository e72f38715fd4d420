mod common;

use common::strategies::*;
use common::{build_state, test_config, unique};
use mproc_core::heap::{HeapOptions, PriorityHeap};
use mproc_core::log_router::{LogLevel, LogRouter};
use mproc_core::orchestrator::ScriptedPrompt;
use mproc_core::shared::{AccessMode, SharedStore, Value};
use mproc_core::task::{Task, TaskPayload};
use mproc_core::trace::TraceContext;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn seeded_dict(seed: &[(String, i64)], mode: AccessMode) -> (SharedStore, mproc_core::shared::SharedDict) {
    let store = SharedStore::create(&unique("prop-store")).unwrap();
    let root = store.root().unwrap();
    let contents: BTreeMap<String, Value> = seed
        .iter()
        .map(|(k, v)| (k.clone(), Value::Int(*v)))
        .collect();
    root.set("d", Value::Map(contents)).unwrap();
    let dict = root.dict("d").unwrap();
    dict.set_access(mode).unwrap();
    (store, dict)
}

fn level_strategy() -> impl Strategy<Value = LogLevel> {
    prop::sample::select(LogLevel::ALL.to_vec())
}

proptest! {
    /// Property: pops come out ordered by (priority, seq), FIFO within a priority
    #[test]
    fn heap_pops_in_priority_then_submission_order(priorities in priorities_strategy()) {
        let heap = PriorityHeap::new("prop-heap", HeapOptions::default());
        for (n, priority) in priorities.iter().enumerate() {
            let task = Task::new("job").arg(n as i64);
            let fp = task.fingerprint();
            heap.push(TaskPayload::Task(task), *priority, fp, true).unwrap();
        }

        let mut popped = Vec::new();
        while let Some(entry) = heap.try_pop().unwrap() {
            popped.push(entry.key());
        }

        let mut expected: Vec<(i64, u64)> = priorities
            .iter()
            .enumerate()
            .map(|(n, p)| (*p, n as u64))
            .collect();
        expected.sort();
        prop_assert_eq!(popped, expected);
    }

    /// Property: identical tasks are queued once until popped
    #[test]
    fn heap_suppresses_duplicate_fingerprints(copies in 1usize..10, priority in priority_strategy()) {
        let heap = PriorityHeap::new("prop-dedup", HeapOptions::default());
        let task = Task::new("same").arg("payload");
        let queued = (0..copies)
            .filter_map(|_| {
                heap.push(TaskPayload::Task(task.clone()), priority, task.fingerprint(), true)
                    .unwrap()
                    .seq()
            })
            .count();
        prop_assert_eq!(queued, 1);
        prop_assert_eq!(heap.len(), 1);

        heap.try_pop().unwrap();
        let again = heap.push(TaskPayload::Task(task.clone()), priority, task.fingerprint(), true).unwrap();
        prop_assert_eq!(again.seq(), Some(1));
    }

    /// Property: nothing changes a locked dictionary
    #[test]
    fn locked_dict_is_invariant(seed in seed_strategy(), ops in dict_ops_strategy()) {
        let (store, dict) = seeded_dict(&seed, AccessMode::Locked);
        let before = dict.snapshot().unwrap();
        for op in &ops {
            op.apply(&dict);
        }
        prop_assert_eq!(dict.snapshot().unwrap(), before);
        store.unlink().unwrap();
    }

    /// Property: a tightened dictionary keeps its key set
    #[test]
    fn tightened_dict_keeps_key_set(seed in seed_strategy(), ops in dict_ops_strategy()) {
        let (store, dict) = seeded_dict(&seed, AccessMode::Tightened);
        let before: BTreeSet<String> = dict.keys().unwrap().into_iter().collect();
        for op in &ops {
            op.apply(&dict);
        }
        let after: BTreeSet<String> = dict.keys().unwrap().into_iter().collect();
        prop_assert_eq!(after, before);
        store.unlink().unwrap();
    }

    /// Property: an open dictionary behaves like a plain map for set/delete
    #[test]
    fn open_dict_tracks_plain_map(ops in prop::collection::vec((key_strategy(), prop::option::of(-50i64..50)), 0..30)) {
        let (store, dict) = seeded_dict(&[], AccessMode::Open);
        let mut model = BTreeMap::new();
        for (key, value) in &ops {
            match value {
                Some(n) => {
                    dict.set(key, *n).unwrap();
                    model.insert(key.clone(), Value::Int(*n));
                }
                None => {
                    let present = model.remove(key).is_some();
                    prop_assert_eq!(dict.delete(key).is_ok(), present);
                }
            }
        }
        prop_assert_eq!(dict.snapshot().unwrap(), Value::Map(model));
        store.unlink().unwrap();
    }

    /// Property: the message producer never runs for a level no sink takes
    #[test]
    fn suppressed_levels_never_build_messages(
        level in level_strategy(),
        no_log in prop::collection::btree_set(level_strategy(), 0..5),
        no_print in prop::collection::btree_set(level_strategy(), 0..5),
    ) {
        let mut config = test_config(1);
        config.no_log_levels = no_log.clone();
        config.no_print_levels = no_print.clone();
        let state = build_state(config);
        let router = LogRouter::new(state.clone(), Arc::new(ScriptedPrompt::default())).unwrap();
        let trace = TraceContext::root("prop", "log", 8);

        let called = AtomicBool::new(false);
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(router.log(&trace, level, || {
            called.store(true, Ordering::SeqCst);
            "property".to_string()
        })).unwrap();

        // No persistent sink is configured, so only the console can take it
        let taken = !no_print.contains(&level);
        prop_assert_eq!(called.load(Ordering::SeqCst), taken);
        state.store().unlink().unwrap();
    }
}
