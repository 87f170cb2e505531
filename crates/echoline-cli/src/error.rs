//! Error handling for the echoline CLI

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("network error: {0}")]
    Net(#[from] echoline_net::NetError),

    #[error("task error: {0}")]
    Task(#[from] echoline_core::TaskError),

    #[error("task state error: {0}")]
    TaskState(#[from] echoline_core::TaskStateError),

    #[error("dispatcher error: {0}")]
    Dispatcher(#[from] echoline_core::DispatcherError),

    #[error("could not connect to {0}")]
    NotConnected(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
