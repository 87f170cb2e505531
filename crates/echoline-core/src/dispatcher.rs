//! Execution contexts for background work and completion delivery.
//!
//! A [`Dispatcher`] owns the two contexts every task runs across:
//!
//! - a worker pool (an explicitly owned tokio runtime) executing blocking work
//!   such as socket dials, reads, and writes; blocking threads are created on
//!   demand up to a ceiling and reclaimed after an idle keep-alive
//! - a completion context: one dedicated thread draining a queue of callbacks,
//!   so observer hooks and listener notifications never run concurrently and
//!   run in the order they were posted
//!
//! The pool is constructed and owned by the caller (there is no process-wide
//! shared instance); tasks hold cheap [`DispatcherHandle`] clones.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::error::DispatcherError;

/// A callback posted to the completion context.
pub type CompletionJob = Box<dyn FnOnce() + Send + 'static>;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Sizing and naming of the worker pool.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Always-available runtime threads.
    pub core_threads: usize,
    /// Ceiling for on-demand blocking worker threads; effectively unbounded
    /// for this workload.
    pub max_blocking_threads: usize,
    /// Idle blocking threads are reclaimed after this long.
    pub keep_alive: Duration,
    /// Prefix for worker thread names.
    pub thread_name_prefix: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            core_threads: 3,
            max_blocking_threads: 4096,
            keep_alive: Duration::from_secs(60),
            thread_name_prefix: "echoline-worker".to_string(),
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatcher
// ----------------------------------------------------------------------------

/// Owns the worker pool and the completion context.
pub struct Dispatcher {
    runtime: Option<Runtime>,
    completion_tx: Option<mpsc::UnboundedSender<CompletionJob>>,
    completion_thread: Option<thread::JoinHandle<()>>,
}

/// Cheap, cloneable access to a [`Dispatcher`]'s contexts.
#[derive(Clone)]
pub struct DispatcherHandle {
    runtime: tokio::runtime::Handle,
    completion_tx: mpsc::UnboundedSender<CompletionJob>,
}

impl Dispatcher {
    /// Build a dispatcher with the given pool configuration.
    pub fn new(config: DispatcherConfig) -> Result<Self, DispatcherError> {
        let prefix = config.thread_name_prefix.clone();
        let counter = AtomicUsize::new(0);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.core_threads)
            .max_blocking_threads(config.max_blocking_threads)
            .thread_keep_alive(config.keep_alive)
            .thread_name_fn(move || {
                let id = counter.fetch_add(1, Ordering::Relaxed);
                format!("{prefix}-{id}")
            })
            .enable_all()
            .build()?;

        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let completion_thread = thread::Builder::new()
            .name("echoline-completion".to_string())
            .spawn(move || run_completion_loop(completion_rx))
            .map_err(DispatcherError::Runtime)?;

        Ok(Self {
            runtime: Some(runtime),
            completion_tx: Some(completion_tx),
            completion_thread: Some(completion_thread),
        })
    }

    /// Build a dispatcher with default sizing.
    pub fn with_defaults() -> Result<Self, DispatcherError> {
        Self::new(DispatcherConfig::default())
    }

    /// Handle for scheduling work and posting completions.
    ///
    /// # Panics
    ///
    /// Panics if called mid-shutdown; the dispatcher outlives every handle in
    /// normal use.
    pub fn handle(&self) -> DispatcherHandle {
        DispatcherHandle {
            runtime: self
                .runtime
                .as_ref()
                .expect("dispatcher already shut down")
                .handle()
                .clone(),
            completion_tx: self
                .completion_tx
                .clone()
                .expect("dispatcher already shut down"),
        }
    }

    /// Shut the dispatcher down.
    ///
    /// Closes the completion queue, drains callbacks already posted, joins the
    /// completion thread, then gives worker threads `grace` to finish before
    /// abandoning them. Tasks blocked on I/O should be cancelled (closing their
    /// connections) before shutdown, or they are left to the grace period.
    pub fn shutdown(mut self, grace: Duration) {
        self.shutdown_completion();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(grace);
        }
        debug!("dispatcher shut down");
    }

    fn shutdown_completion(&mut self) {
        drop(self.completion_tx.take());
        if let Some(handle) = self.completion_thread.take() {
            if handle.join().is_err() {
                error!("completion thread terminated abnormally");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown_completion();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl DispatcherHandle {
    /// Run blocking work on the worker pool.
    pub fn spawn_worker<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.runtime.spawn_blocking(work);
    }

    /// Post a callback to the completion context.
    ///
    /// Callbacks run serially, in post order. Posting after shutdown drops the
    /// callback.
    pub fn post_completion(&self, job: CompletionJob) {
        if self.completion_tx.send(job).is_err() {
            debug!("completion context closed; callback dropped");
        }
    }
}

fn run_completion_loop(mut rx: mpsc::UnboundedReceiver<CompletionJob>) {
    while let Some(job) = rx.blocking_recv() {
        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!("completion callback panicked");
        }
    }
    debug!("completion context drained");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
