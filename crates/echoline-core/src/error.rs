//! Error types for the task layer.

use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by a task's work function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A captured work-function fault, shared between every `get` caller.
pub type TaskFault = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Contract violation on [`Task::execute`](crate::Task::execute).
///
/// A task runs at most once; calling `execute` on a task that is not pending is
/// a programming error and is reported loudly instead of being ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TaskStateError {
    #[error("cannot execute task: the task is already running")]
    AlreadyRunning,
    #[error("cannot execute task: the task has already finished (a task can be executed only once)")]
    AlreadyFinished,
}

/// Terminal outcome reported by [`Task::get`](crate::Task::get) when the task
/// did not complete normally.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// The task was cancelled before a result was delivered.
    #[error("task was cancelled")]
    Cancelled,
    /// The work function failed; every waiter observes the same fault.
    #[error("task failed: {0}")]
    Failed(TaskFault),
}

/// The work function panicked; the payload is preserved as the task's fault.
#[derive(Debug, Error)]
#[error("task work panicked: {0}")]
pub struct WorkPanicked(pub String);

/// Failure to construct a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Error)]
pub enum DispatcherError {
    #[error("failed to start dispatcher: {0}")]
    Runtime(#[from] std::io::Error),
}
