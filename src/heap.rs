//! # Priority Heap
//!
//! Ordered queue keyed by `(priority, seq)`. Lower priority numbers are served
//! first; equal priorities are served in push order. `seq` is assigned under
//! the heap lock from a counter that only resets when the heap is closed.
//!
//! Heaps are registered by name so that a worker can attach to the run's heap
//! the same way it attaches to the shared store.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::{BinaryHeap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::constants::{run_keys, DEFAULT_PRIORITY, LOG_PRIORITY};
use crate::error::{OrchestraError, Result};
use crate::shared::SharedDict;
use crate::task::{Fingerprint, TaskPayload};

#[derive(Debug, Clone)]
pub struct HeapEntry {
    pub priority: i64,
    pub seq: u64,
    pub fingerprint: Fingerprint,
    pub payload: TaskPayload,
    pub is_process: bool,
}

impl HeapEntry {
    pub fn key(&self) -> (i64, u64) {
        (self.priority, self.seq)
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.key().cmp(&other.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued { seq: u64, priority: i64 },
    /// An entry with the same fingerprint is already queued; nothing inserted
    Duplicate,
}

impl PushOutcome {
    pub fn seq(&self) -> Option<u64> {
        match self {
            PushOutcome::Queued { seq, .. } => Some(*seq),
            PushOutcome::Duplicate => None,
        }
    }
}

/// Pause signal read from `run.mpy_interrupt`
#[derive(Debug, Clone)]
pub struct InterruptGate {
    run: SharedDict,
    backoff_min: Duration,
    backoff_max: Duration,
}

impl InterruptGate {
    pub fn new(run: SharedDict, backoff_min: Duration, backoff_max: Duration) -> Self {
        Self {
            run,
            backoff_min,
            backoff_max: backoff_max.max(backoff_min),
        }
    }

    /// A store that is gone cannot hold an interrupt
    pub fn is_set(&self) -> bool {
        self.run
            .get_opt(run_keys::INTERRUPT)
            .ok()
            .flatten()
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeapOptions {
    /// Normalize negative application priorities to 0
    pub autocorrect: bool,
}

impl Default for HeapOptions {
    fn default() -> Self {
        Self { autocorrect: true }
    }
}

#[derive(Default)]
struct HeapInner {
    entries: BinaryHeap<Reverse<HeapEntry>>,
    fingerprints: HashSet<Fingerprint>,
    next_seq: u64,
}

pub struct PriorityHeap {
    name: String,
    options: HeapOptions,
    inner: Mutex<HeapInner>,
    gate: OnceLock<InterruptGate>,
    closed: AtomicBool,
    pushed: Notify,
}

fn registry() -> &'static DashMap<String, Arc<PriorityHeap>> {
    static REGISTRY: OnceLock<DashMap<String, Arc<PriorityHeap>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

impl PriorityHeap {
    /// Standalone heap, not reachable by name
    pub fn new(name: &str, options: HeapOptions) -> Self {
        Self {
            name: name.to_string(),
            options,
            inner: Mutex::new(HeapInner::default()),
            gate: OnceLock::new(),
            closed: AtomicBool::new(false),
            pushed: Notify::new(),
        }
    }

    /// Register a heap under `name`
    pub fn create(name: &str, options: HeapOptions) -> Result<Arc<Self>> {
        let heap = Arc::new(Self::new(name, options));
        match registry().entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(OrchestraError::init(
                    "priority heap",
                    format!("a heap named '{name}' already exists"),
                ));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(heap.clone());
            }
        }
        info!(heap = %name, autocorrect = options.autocorrect, "📥 HEAP: Created priority heap");
        Ok(heap)
    }

    pub fn attach(name: &str) -> Result<Arc<Self>> {
        registry()
            .get(name)
            .map(|entry| entry.value().clone())
            .filter(|heap| heap.is_alive())
            .ok_or_else(|| OrchestraError::HeapClosed(name.to_string()))
    }

    /// Make `pop` honor the interrupt flag. Only the first gate installed is kept.
    pub fn install_gate(&self, gate: InterruptGate) {
        if self.gate.set(gate).is_err() {
            debug!(heap = %self.name, "HEAP: Interrupt gate already installed");
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Application push. Negative priorities are reserved for framework
    /// traffic and become 0 under autocorrect.
    pub fn push(
        &self,
        payload: TaskPayload,
        priority: i64,
        fingerprint: Fingerprint,
        is_process: bool,
    ) -> Result<PushOutcome> {
        let priority = if priority < 0 && self.options.autocorrect {
            debug!(heap = %self.name, requested = priority, "HEAP: Reserved priority autocorrected");
            DEFAULT_PRIORITY
        } else {
            priority
        };
        self.insert(payload, priority, fingerprint, is_process)
    }

    /// Framework push at the reserved log priority, drained by the orchestrator
    pub fn push_framework(&self, payload: TaskPayload, fingerprint: Fingerprint) -> Result<PushOutcome> {
        self.insert(payload, LOG_PRIORITY, fingerprint, false)
    }

    fn insert(
        &self,
        payload: TaskPayload,
        priority: i64,
        fingerprint: Fingerprint,
        is_process: bool,
    ) -> Result<PushOutcome> {
        let outcome = {
            let mut inner = self.inner.lock();
            if !self.is_alive() {
                return Err(OrchestraError::HeapClosed(self.name.clone()));
            }
            if !inner.fingerprints.insert(fingerprint.clone()) {
                PushOutcome::Duplicate
            } else {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner.entries.push(Reverse(HeapEntry {
                    priority,
                    seq,
                    fingerprint,
                    payload,
                    is_process,
                }));
                PushOutcome::Queued { seq, priority }
            }
        };

        if let PushOutcome::Queued { .. } = outcome {
            self.pushed.notify_one();
        }
        Ok(outcome)
    }

    /// Remove the head entry without consulting the interrupt gate
    pub fn try_pop(&self) -> Result<Option<HeapEntry>> {
        self.pop_if(|_| true)
    }

    /// Remove the head entry only when `accept` approves it
    pub fn pop_if(&self, accept: impl FnOnce(&HeapEntry) -> bool) -> Result<Option<HeapEntry>> {
        let mut inner = self.inner.lock();
        let accepted = inner
            .entries
            .peek()
            .map(|Reverse(head)| accept(head))
            .unwrap_or(false);
        if !accepted {
            return Ok(None);
        }
        let Some(Reverse(entry)) = inner.entries.pop() else {
            return Ok(None);
        };
        inner.fingerprints.remove(&entry.fingerprint);

        if let Some(Reverse(next)) = inner.entries.peek() {
            if next.key() < entry.key() {
                error!(
                    heap = %self.name,
                    popped = ?entry.key(),
                    next = ?next.key(),
                    "❌ HEAP: Ordering invariant broken"
                );
                return Err(OrchestraError::HeapCorruption(format!(
                    "popped {:?} while {:?} was still queued",
                    entry.key(),
                    next.key()
                )));
            }
        }
        Ok(Some(entry))
    }

    /// Whether the installed gate currently holds application work back.
    /// The orchestrator checks this every tick because framework entries must
    /// keep draining while paused.
    pub fn paused(&self) -> bool {
        self.gate.get().is_some_and(InterruptGate::is_set)
    }

    /// Gated pop for consumers that own their loop: idles with capped
    /// backoff while the interrupt flag is set, then behaves like
    /// [`try_pop`](Self::try_pop). Returns `None` on an empty heap.
    pub async fn pop(&self) -> Result<Option<HeapEntry>> {
        if let Some(gate) = self.gate.get() {
            let mut backoff = gate.backoff_min;
            while gate.is_set() && self.is_alive() {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(gate.backoff_max);
            }
        }
        self.try_pop()
    }

    pub fn peek(&self) -> Option<HeapEntry> {
        self.inner.lock().entries.peek().map(|Reverse(e)| e.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of queued application entries (priority >= 0)
    pub fn application_len(&self) -> usize {
        self.inner
            .lock()
            .entries
            .iter()
            .filter(|Reverse(e)| e.priority >= 0)
            .count()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.lock().fingerprints.contains(fingerprint)
    }

    /// Sequence number the next accepted push will receive
    pub fn next_seq(&self) -> u64 {
        self.inner.lock().next_seq
    }

    /// Drop every queued application entry and return them; framework
    /// entries stay queued
    pub fn discard_application(&self) -> Vec<HeapEntry> {
        let mut inner = self.inner.lock();
        let (keep, discard): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.entries)
            .into_vec()
            .into_iter()
            .partition(|Reverse(e)| e.priority < 0);
        for Reverse(entry) in &discard {
            inner.fingerprints.remove(&entry.fingerprint);
        }
        inner.entries = keep.into_iter().collect();
        discard.into_iter().map(|Reverse(e)| e).collect()
    }

    /// Wait until something is pushed
    pub async fn pushed(&self) {
        self.pushed.notified().await;
    }

    /// Close the heap: leftover entries are returned, the sequence counter
    /// resets and the name is released. Closing twice returns nothing.
    pub fn close(&self) -> Vec<HeapEntry> {
        let leftovers = {
            let mut inner = self.inner.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Vec::new();
            }
            let drained = std::mem::take(&mut inner.entries).into_sorted_vec();
            inner.fingerprints.clear();
            inner.next_seq = 0;
            drained
        };
        registry().remove(&self.name);
        self.pushed.notify_waiters();

        if !leftovers.is_empty() {
            warn!(heap = %self.name, leftover = leftovers.len(), "⚠️ HEAP: Closed with queued entries");
        } else {
            info!(heap = %self.name, "📥 HEAP: Closed");
        }
        // into_sorted_vec on Reverse yields descending keys
        leftovers.into_iter().rev().map(|Reverse(e)| e).collect()
    }
}

impl std::fmt::Debug for PriorityHeap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityHeap")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("alive", &self.is_alive())
            .finish()
    }
}
