//! Error types for the socket layer.

use thiserror::Error;

/// Socket-layer error taxonomy.
///
/// Dial failures (`Bind`, `Connect`) and established-stream failures (`Io`,
/// `ConnectionClosed`, `LineTooLong`) are distinct: the client converts the
/// former into a boolean connect outcome and the latter into terminating the
/// affected connection, so neither surfaces as a raised fault on the
/// completion context.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("dial to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection is closed")]
    ConnectionClosed,
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("invalid endpoint {0:?}: expected host:port")]
    InvalidEndpoint(String),
    #[error("invalid port in endpoint {0:?}")]
    InvalidPort(String),
}

/// Result type for socket operations.
pub type NetResult<T> = std::result::Result<T, NetError>;
