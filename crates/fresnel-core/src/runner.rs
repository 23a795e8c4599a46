use async_trait::async_trait;

use crate::TaskDefinition;

/// Result reported by the execution collaborator for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure(Option<String>),
}

/// The injected execution body: performs the class-specific work for one
/// dispatched task. The engine guarantees at-least-once invocation;
/// idempotency is the implementation's concern.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: TaskDefinition) -> TaskOutcome;
}

#[async_trait]
impl<F, Fut> TaskRunner for F
where
    F: Fn(TaskDefinition) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = TaskOutcome> + Send + 'static,
{
    async fn run(&self, task: TaskDefinition) -> TaskOutcome {
        self(task).await
    }
}
