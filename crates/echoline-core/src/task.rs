//! One-shot cancellable background tasks.
//!
//! A [`Task`] runs a single unit of blocking work on the dispatcher's worker
//! pool and reports exactly one terminal outcome: a result, a captured fault,
//! or cancellation. Lifecycle hooks ([`TaskObserver`]) and progress updates are
//! delivered on the dispatcher's completion context, never on a worker thread.
//!
//! The lifecycle is strictly `Pending -> Running -> Finished`. `execute` may be
//! called at most once; [`Task::get`] blocks until the outcome is decided and
//! returns the same answer to every caller. Cancellation is cooperative: the
//! work function checks [`TaskContext::is_cancelled`], and callers that need to
//! unblock in-flight I/O register an interrupt hook (typically "close the
//! connection") fired by `cancel(true)`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use tracing::debug;

use crate::dispatcher::DispatcherHandle;
use crate::error::{BoxError, TaskError, TaskFault, TaskStateError, WorkPanicked};

// ----------------------------------------------------------------------------
// Public Surface
// ----------------------------------------------------------------------------

/// Lifecycle states of a [`Task`]. Transitions are monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Finished,
}

/// Lifecycle hooks, all invoked on the completion context.
///
/// `on_cancelled` receives the work function's result when natural completion
/// lost the race against cancellation; it also fires (with no result) when the
/// work function faulted.
pub trait TaskObserver<T, P = ()>: Send + 'static {
    fn on_pre_execute(&mut self) {}
    fn on_post_execute(&mut self, _result: Option<&T>) {}
    fn on_progress(&mut self, _values: Vec<P>) {}
    fn on_cancelled(&mut self, _result: Option<&T>) {}
}

/// No-op observer for tasks whose outcome is consumed through [`Task::get`].
impl<T, P> TaskObserver<T, P> for () {}

/// Worker-side view of a running task.
pub struct TaskContext<T, P = ()> {
    shared: Arc<Shared<T, P>>,
}

/// A one-shot cancellable unit of background work.
///
/// Cloning yields another handle to the same task; all clones observe the same
/// status, outcome, and cancellation flag.
pub struct Task<T, P = ()> {
    shared: Arc<Shared<T, P>>,
}

impl<T, P> Clone for Task<T, P> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Internal State
// ----------------------------------------------------------------------------

type WorkFn<T, P> = Box<dyn FnOnce(&TaskContext<T, P>) -> Result<T, BoxError> + Send + 'static>;
type InterruptHook = Box<dyn FnOnce() + Send + 'static>;

enum TaskOutcome<T> {
    Completed(Arc<T>),
    Cancelled(Option<Arc<T>>),
    Failed(TaskFault),
}

/// What the worker produced, before the outcome is decided under the cell lock.
enum WorkResult<T> {
    Skipped,
    Value(Arc<T>),
    Fault(TaskFault),
}

struct Cell<T, P> {
    status: TaskStatus,
    work: Option<WorkFn<T, P>>,
    outcome: Option<TaskOutcome<T>>,
}

struct Shared<T, P> {
    cell: Mutex<Cell<T, P>>,
    completed: Condvar,
    cancelled: AtomicBool,
    interrupt: Mutex<Option<InterruptHook>>,
    // Locked only from the completion context, where callbacks are serialized.
    observer: Mutex<Box<dyn TaskObserver<T, P>>>,
    dispatcher: DispatcherHandle,
}

// ----------------------------------------------------------------------------
// Task
// ----------------------------------------------------------------------------

impl<T, P> Task<T, P>
where
    T: Send + Sync + 'static,
    P: Send + 'static,
{
    /// Create a pending task from a work function and an observer.
    pub fn new<F, O>(dispatcher: DispatcherHandle, work: F, observer: O) -> Self
    where
        F: FnOnce(&TaskContext<T, P>) -> Result<T, BoxError> + Send + 'static,
        O: TaskObserver<T, P>,
    {
        Self {
            shared: Arc::new(Shared {
                cell: Mutex::new(Cell {
                    status: TaskStatus::Pending,
                    work: Some(Box::new(work)),
                    outcome: None,
                }),
                completed: Condvar::new(),
                cancelled: AtomicBool::new(false),
                interrupt: Mutex::new(None),
                observer: Mutex::new(Box::new(observer)),
                dispatcher,
            }),
        }
    }

    /// Create a task and execute it immediately.
    pub fn spawn<F, O>(dispatcher: DispatcherHandle, work: F, observer: O) -> Self
    where
        F: FnOnce(&TaskContext<T, P>) -> Result<T, BoxError> + Send + 'static,
        O: TaskObserver<T, P>,
    {
        let task = Self::new(dispatcher, work, observer);
        task.execute().expect("freshly created task is pending");
        task
    }

    /// Begin execution: transition `Pending -> Running`, post the pre-execute
    /// hook to the completion context, and dispatch the work function onto the
    /// worker pool.
    ///
    /// Calling this on a task that is not pending is a contract violation and
    /// returns a [`TaskStateError`].
    pub fn execute(&self) -> Result<(), TaskStateError> {
        let work = {
            let mut cell = self.lock_cell();
            match cell.status {
                TaskStatus::Running => return Err(TaskStateError::AlreadyRunning),
                TaskStatus::Finished => return Err(TaskStateError::AlreadyFinished),
                TaskStatus::Pending => {}
            }
            cell.status = TaskStatus::Running;
            cell.work.take().expect("pending task holds its work function")
        };

        let shared = self.shared.clone();
        self.shared.dispatcher.post_completion(Box::new(move || {
            shared
                .observer
                .lock()
                .expect("task observer poisoned")
                .on_pre_execute();
        }));

        let shared = self.shared.clone();
        self.shared
            .dispatcher
            .spawn_worker(move || run_work(shared, work));
        Ok(())
    }

    /// Block until the task finishes, then return its outcome.
    ///
    /// Safe to call from any number of threads; all observe the identical
    /// result, fault, or cancellation.
    pub fn get(&self) -> Result<Arc<T>, TaskError> {
        let mut cell = self.lock_cell();
        loop {
            if let Some(outcome) = &cell.outcome {
                return match outcome {
                    TaskOutcome::Completed(value) => Ok(value.clone()),
                    TaskOutcome::Cancelled(_) => Err(TaskError::Cancelled),
                    TaskOutcome::Failed(fault) => Err(TaskError::Failed(fault.clone())),
                };
            }
            cell = self
                .shared
                .completed
                .wait(cell)
                .expect("task cell poisoned");
        }
    }

    /// Request cancellation.
    ///
    /// Returns whether cancellation was accepted; a task whose outcome is
    /// already decided reports `false` and is left untouched. With `interrupt`
    /// set, the registered interrupt hook fires (at most once) to unblock work
    /// parked in I/O.
    pub fn cancel(&self, interrupt: bool) -> bool {
        let accepted = {
            let cell = self.lock_cell();
            if cell.outcome.is_some() {
                false
            } else {
                self.shared.cancelled.store(true, Ordering::SeqCst);
                true
            }
        };
        if accepted {
            debug!(interrupt, "task cancelled");
            if interrupt {
                let hook = self
                    .shared
                    .interrupt
                    .lock()
                    .expect("interrupt hook poisoned")
                    .take();
                if let Some(hook) = hook {
                    hook();
                }
            }
        }
        accepted
    }

    /// Register the hook fired by `cancel(true)`. Replaces any previous hook.
    pub fn set_interrupt_hook<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self
            .shared
            .interrupt
            .lock()
            .expect("interrupt hook poisoned") = Some(Box::new(hook));
    }

    pub fn status(&self) -> TaskStatus {
        self.lock_cell().status
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    fn lock_cell(&self) -> MutexGuard<'_, Cell<T, P>> {
        self.shared.cell.lock().expect("task cell poisoned")
    }
}

impl<T, P> TaskContext<T, P>
where
    T: Send + Sync + 'static,
    P: Send + 'static,
{
    /// Whether cancellation has been requested. Cooperative work functions
    /// check this between blocking operations.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }

    /// Marshal progress values onto the completion context. No-op once the
    /// task is cancelled.
    pub fn publish_progress(&self, values: Vec<P>) {
        if self.is_cancelled() {
            return;
        }
        let shared = self.shared.clone();
        self.shared.dispatcher.post_completion(Box::new(move || {
            shared
                .observer
                .lock()
                .expect("task observer poisoned")
                .on_progress(values);
        }));
    }
}

// ----------------------------------------------------------------------------
// Worker Path
// ----------------------------------------------------------------------------

fn run_work<T, P>(shared: Arc<Shared<T, P>>, work: WorkFn<T, P>)
where
    T: Send + Sync + 'static,
    P: Send + 'static,
{
    let context = TaskContext {
        shared: shared.clone(),
    };
    let result = if shared.cancelled.load(Ordering::SeqCst) {
        WorkResult::Skipped
    } else {
        match panic::catch_unwind(AssertUnwindSafe(|| work(&context))) {
            Ok(Ok(value)) => WorkResult::Value(Arc::new(value)),
            Ok(Err(fault)) => WorkResult::Fault(Arc::from(fault)),
            Err(payload) => WorkResult::Fault(Arc::new(WorkPanicked(panic_message(&payload)))),
        }
    };
    finish(&shared, result);
}

/// Decide the single terminal outcome, wake `get` waiters, and post the
/// post-work hook. The cancel/complete race is resolved here, under the cell
/// lock: a cancel accepted before this point always yields a cancelled
/// outcome, never a normal completion.
fn finish<T, P>(shared: &Arc<Shared<T, P>>, result: WorkResult<T>)
where
    T: Send + Sync + 'static,
    P: Send + 'static,
{
    let (hook_result, cancelled_path) = {
        let mut cell = shared.cell.lock().expect("task cell poisoned");
        if matches!(result, WorkResult::Fault(_)) {
            // A fault also stops any further progress publication.
            shared.cancelled.store(true, Ordering::SeqCst);
        }
        let cancelled = shared.cancelled.load(Ordering::SeqCst);
        let outcome = match (result, cancelled) {
            (WorkResult::Fault(fault), _) => TaskOutcome::Failed(fault),
            (WorkResult::Value(value), true) => TaskOutcome::Cancelled(Some(value)),
            (WorkResult::Value(value), false) => TaskOutcome::Completed(value),
            (WorkResult::Skipped, _) => TaskOutcome::Cancelled(None),
        };
        let hook_result = match &outcome {
            TaskOutcome::Completed(value) => Some(value.clone()),
            TaskOutcome::Cancelled(value) => value.clone(),
            TaskOutcome::Failed(_) => None,
        };
        let cancelled_path = !matches!(outcome, TaskOutcome::Completed(_));
        cell.status = TaskStatus::Finished;
        cell.outcome = Some(outcome);
        shared.completed.notify_all();
        (hook_result, cancelled_path)
    };
    debug!(cancelled = cancelled_path, "task finished");

    let shared = shared.clone();
    let dispatcher = shared.dispatcher.clone();
    dispatcher.post_completion(Box::new(move || {
        let mut observer = shared.observer.lock().expect("task observer poisoned");
        if cancelled_path {
            observer.on_cancelled(hook_result.as_deref());
        } else {
            observer.on_post_execute(hook_result.as_deref());
        }
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
