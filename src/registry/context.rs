use std::sync::Arc;

use crate::error::Result;
use crate::heap::PushOutcome;
use crate::log_router::{LogLevel, LogOutcome, LogRouter};
use crate::orchestrator::Submitter;
use crate::state::GlobalState;
use crate::task::Task;
use crate::trace::TraceContext;

/// Everything a handler may touch while it runs
#[derive(Clone)]
pub struct TaskContext {
    trace: TraceContext,
    state: GlobalState,
    router: Arc<LogRouter>,
    submitter: Submitter,
}

impl TaskContext {
    pub(crate) fn new(
        trace: TraceContext,
        state: GlobalState,
        router: Arc<LogRouter>,
        submitter: Submitter,
    ) -> Self {
        Self {
            trace,
            state,
            router,
            submitter,
        }
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    /// Route a record; `producer` only runs when some sink will take it
    pub async fn log<F>(&self, level: LogLevel, producer: F) -> Result<LogOutcome>
    where
        F: FnOnce() -> String + Send,
    {
        self.router.log(&self.trace, level, producer).await
    }

    pub fn submit(&self, task: Task, priority: i64) -> Result<PushOutcome> {
        self.submitter.submit(task, priority, None)
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("chain", &self.trace.chain())
            .field("wid", &self.trace.wid())
            .field("tid", &self.trace.tid())
            .finish()
    }
}
