//! Echoline core: cancellable background tasks and their execution contexts.
//!
//! This crate provides the task abstraction the socket layer is built on:
//! a [`Dispatcher`] owning a worker pool and a serialized completion context,
//! and a generic one-shot [`Task`] with a three-state lifecycle, a blocking
//! result future, and cooperative cancellation. It knows nothing about
//! networking.

pub mod dispatcher;
pub mod error;
pub mod task;

pub use dispatcher::{CompletionJob, Dispatcher, DispatcherConfig, DispatcherHandle};
pub use error::{BoxError, DispatcherError, TaskError, TaskFault, TaskStateError};
pub use task::{Task, TaskContext, TaskObserver, TaskStatus};
