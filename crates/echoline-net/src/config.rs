//! Configuration for the socket client and server.

use serde::{Deserialize, Serialize};

use crate::error::{NetError, NetResult};

/// Default TCP port for the echo server and client.
pub const DEFAULT_PORT: u16 = 8080;

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// Target and behavior of a [`SocketClient`](crate::SocketClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote host to dial.
    pub host: String,
    /// Remote TCP port.
    pub port: u16,
    /// Fixed buffer size for the receive loop; each successful read is
    /// delivered as one inbound message.
    pub recv_buffer_size: usize,
    /// Append `'\n'` to outbound messages that lack one, so every send forms
    /// one complete line on the server's line-oriented read path.
    pub append_newline: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            recv_buffer_size: 1024,
            append_newline: true,
        }
    }
}

impl ClientConfig {
    /// Parse a `"host:port"` endpoint.
    pub fn from_endpoint(endpoint: &str) -> NetResult<Self> {
        let (host, port) = endpoint
            .split_once(':')
            .ok_or_else(|| NetError::InvalidEndpoint(endpoint.to_string()))?;
        if host.is_empty() {
            return Err(NetError::InvalidEndpoint(endpoint.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| NetError::InvalidPort(endpoint.to_string()))?;
        Ok(Self {
            host: host.to_string(),
            port,
            ..Self::default()
        })
    }

    /// The `host:port` form of the target.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// Bind address and per-connection limits of a
/// [`SocketServer`](crate::SocketServer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port to listen on; 0 picks an ephemeral port.
    pub port: u16,
    /// Upper bound on one line, including its terminator. An oversized line is
    /// an I/O fault for that connection only.
    pub max_line_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_line_bytes: 64 * 1024,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
