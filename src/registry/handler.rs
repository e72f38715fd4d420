use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;

use super::TaskContext;
use crate::shared::Value;
use crate::task::Task;

/// Return map of a task. Integer entries accumulate into `run.counters`.
pub type TaskOutput = BTreeMap<String, Value>;

/// Failure raised by handler code
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn call(&self, ctx: TaskContext, task: Task) -> Result<TaskOutput, TaskError>;
}

/// Adapter turning an async closure into a [`TaskHandler`]
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(TaskContext, Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(TaskContext, Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutput, TaskError>> + Send + 'static,
{
    async fn call(&self, ctx: TaskContext, task: Task) -> Result<TaskOutput, TaskError> {
        (self.f)(ctx, task).await
    }
}
