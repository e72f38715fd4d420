//! Worker slots and their supervision.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable, Aborted};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::constants::proc_keys;
use crate::error::{OrchestraError, Result};
use crate::heap::HeapEntry;
use crate::registry::HandlerRegistry;
use crate::shared::Value;
use crate::state::GlobalState;
use crate::worker::{run_worker, Assignment, WorkerBoot, WorkerReport};

/// A task currently held by a slot
#[derive(Debug, Clone)]
pub(crate) struct InFlight {
    pub(crate) assignment: Assignment,
}

impl InFlight {
    pub(crate) fn from_entry(entry: HeapEntry) -> Option<Self> {
        match entry.payload {
            crate::task::TaskPayload::Task(task) => Some(Self {
                assignment: Assignment {
                    tid: entry.seq,
                    priority: entry.priority,
                    fingerprint: entry.fingerprint,
                    task,
                },
            }),
            crate::task::TaskPayload::Log(_) => None,
        }
    }
}

/// Slot record `(slot-id, pid, started-at, current task, liveness)`
pub(crate) struct WorkerSlot {
    pub(crate) slot: u32,
    pub(crate) pid: Option<u32>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) current: Option<InFlight>,
    pub(crate) alive: bool,
    inbox: Option<mpsc::Sender<Assignment>>,
    abort: AbortHandle,
    done: oneshot::Receiver<SlotExit>,
}

/// Why a slot stopped
#[derive(Debug)]
pub(crate) enum SlotExit {
    Returned,
    Failed(String),
    Panicked(String),
    Killed,
}

pub(crate) struct WorkerPool {
    store_name: String,
    registry: Arc<HandlerRegistry>,
    slots: BTreeMap<u32, WorkerSlot>,
    reports_tx: mpsc::UnboundedSender<WorkerReport>,
    reports_rx: mpsc::UnboundedReceiver<WorkerReport>,
    aborts: Arc<DashMap<u32, AbortHandle>>,
}

impl WorkerPool {
    pub(crate) fn new(store_name: &str, registry: Arc<HandlerRegistry>) -> Self {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        Self {
            store_name: store_name.to_string(),
            registry,
            slots: BTreeMap::new(),
            reports_tx,
            reports_rx,
            aborts: Arc::new(DashMap::new()),
        }
    }

    /// Abort handles by slot, usable while the pool itself is borrowed
    pub(crate) fn aborts(&self) -> Arc<DashMap<u32, AbortHandle>> {
        self.aborts.clone()
    }

    /// Start (or restart) the worker in `slot` on its own thread and runtime.
    /// A handler that blocks stalls only that thread.
    pub(crate) fn spawn(&mut self, slot: u32) -> Result<()> {
        let (inbox_tx, inbox_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = oneshot::channel();
        let (abort, registration) = AbortHandle::new_pair();
        let boot = WorkerBoot {
            store_name: self.store_name.clone(),
            slot,
            registry: self.registry.clone(),
            inbox: inbox_rx,
            reports: self.reports_tx.clone(),
        };
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| OrchestraError::init("worker runtime", e))?;
        std::thread::Builder::new()
            .name(format!("mproc-worker-{slot}"))
            .spawn(move || {
                let work = Abortable::new(run_worker(boot), registration);
                let joined = std::panic::catch_unwind(AssertUnwindSafe(|| runtime.block_on(work)));
                // The pool may already have given up on this slot
                let _ = done_tx.send(exit_of(joined));
            })
            .map_err(|e| OrchestraError::init("worker thread", e))?;
        self.aborts.insert(slot, abort.clone());
        debug!(slot, "POOL: Worker spawned");
        self.slots.insert(
            slot,
            WorkerSlot {
                slot,
                pid: None,
                started_at: Utc::now(),
                current: None,
                alive: true,
                inbox: Some(inbox_tx),
                abort,
                done: done_rx,
            },
        );
        Ok(())
    }

    pub(crate) fn alive(&self) -> usize {
        self.slots.values().filter(|s| s.alive).count()
    }

    pub(crate) fn idle_slots(&self) -> Vec<u32> {
        self.slots
            .values()
            .filter(|s| s.alive && s.current.is_none() && s.inbox.is_some())
            .map(|s| s.slot)
            .collect()
    }

    pub(crate) fn all_idle(&self) -> bool {
        self.slots.values().all(|s| s.current.is_none())
    }

    /// Hand `work` to an idle slot. Gives the work back when the slot cannot
    /// take it.
    pub(crate) fn assign(&mut self, slot: u32, work: InFlight) -> std::result::Result<(), InFlight> {
        let Some(record) = self.slots.get_mut(&slot) else {
            return Err(work);
        };
        let Some(inbox) = record.inbox.as_ref() else {
            return Err(work);
        };
        match inbox.try_send(work.assignment.clone()) {
            Ok(()) => {
                record.current = Some(work);
                Ok(())
            }
            Err(_) => Err(work),
        }
    }

    pub(crate) fn try_report(&mut self) -> Option<WorkerReport> {
        self.reports_rx.try_recv().ok()
    }

    pub(crate) async fn next_report(&mut self) -> Option<WorkerReport> {
        self.reports_rx.recv().await
    }

    pub(crate) fn slot_mut(&mut self, slot: u32) -> Option<&mut WorkerSlot> {
        self.slots.get_mut(&slot)
    }

    /// Slots whose worker has ended, with the reason. They are marked dead
    /// and stay in the table until [`spawn`](Self::spawn) replaces them.
    pub(crate) fn reap(&mut self) -> Vec<(u32, SlotExit)> {
        let mut dead = Vec::new();
        for record in self.slots.values_mut().filter(|s| s.alive) {
            let exit = match record.done.try_recv() {
                Ok(exit) => exit,
                Err(oneshot::error::TryRecvError::Empty) => continue,
                Err(oneshot::error::TryRecvError::Closed) => {
                    SlotExit::Panicked("worker thread vanished".to_string())
                }
            };
            record.alive = false;
            record.inbox = None;
            self.aborts.remove(&record.slot);
            warn!(slot = record.slot, exit = ?exit, "💀 POOL: Worker slot is dead");
            dead.push((record.slot, exit));
        }
        dead
    }

    /// Drop every inbox so workers leave their loop once idle
    pub(crate) fn close_inboxes(&mut self) {
        for record in self.slots.values_mut() {
            record.inbox = None;
        }
        self.aborts.clear();
    }

    /// Wait for every worker until `deadline` and return how many had to be
    /// aborted. An aborted worker is cancelled at its next `.await`; one stuck
    /// in blocking code cannot be stopped and is abandoned on its thread.
    /// Slots stay in the table so held tasks can be collected afterwards.
    pub(crate) async fn join_until(&mut self, deadline: tokio::time::Instant) -> usize {
        let mut stragglers = 0;
        for record in self.slots.values_mut().filter(|s| s.alive) {
            record.alive = false;
            match tokio::time::timeout_at(deadline, &mut record.done).await {
                Ok(Ok(exit)) => debug!(slot = record.slot, exit = ?exit, "POOL: Worker joined"),
                Ok(Err(_)) => warn!(slot = record.slot, "POOL: Worker thread vanished"),
                Err(_) => {
                    record.abort.abort();
                    warn!(slot = record.slot, "⏱️ POOL: Worker force-terminated after grace period");
                    stragglers += 1;
                }
            }
        }
        info!(stragglers, "POOL: Worker pool joined");
        stragglers
    }

    /// Take every task still held by a slot
    pub(crate) fn take_held(&mut self) -> Vec<(u32, InFlight)> {
        self.slots
            .values_mut()
            .filter_map(|record| record.current.take().map(|work| (record.slot, work)))
            .collect()
    }

    /// Mirror a slot into `proc.workers[slot]`
    pub(crate) fn publish(&self, state: &GlobalState, slot: u32) -> Result<()> {
        let workers = state.proc().dict(proc_keys::WORKERS)?;
        match self.slots.get(&slot) {
            Some(record) => {
                let row = BTreeMap::from([
                    ("pid".to_string(), Value::from(record.pid)),
                    ("started_at".to_string(), Value::from(record.started_at.to_rfc3339())),
                    (
                        "task_id".to_string(),
                        Value::from(record.current.as_ref().map(|c| c.assignment.tid)),
                    ),
                    ("alive".to_string(), Value::Bool(record.alive)),
                ]);
                workers.set(slot.to_string(), Value::Map(row))
            }
            None => {
                workers.pop(slot.to_string(), Some(Value::Null))?;
                Ok(())
            }
        }
    }
}

fn exit_of(joined: std::thread::Result<std::result::Result<Result<()>, Aborted>>) -> SlotExit {
    match joined {
        Ok(Ok(Ok(()))) => SlotExit::Returned,
        Ok(Ok(Err(err))) => SlotExit::Failed(err.to_string()),
        Ok(Err(Aborted)) => SlotExit::Killed,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "worker panicked".to_string());
            SlotExit::Panicked(message)
        }
    }
}
