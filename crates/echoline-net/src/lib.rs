//! Echoline networking: a line-echo TCP server and a persistent socket client
//! built on the `echoline-core` task abstraction.
//!
//! The server accepts arbitrary peers and echoes each received line back with
//! a fixed prefix; the client connects, sends, and receives over one
//! long-lived socket with cooperative cancellation. The wire protocol is
//! plain newline-delimited UTF-8 over TCP, with no framing and no handshake.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod server;

pub use client::{SocketClient, SocketClientListener};
pub use config::{ClientConfig, ServerConfig, DEFAULT_PORT};
pub use connection::Connection;
pub use error::{NetError, NetResult};
pub use server::{ServerHandle, SocketServer, RESPONSE_PREFIX};
