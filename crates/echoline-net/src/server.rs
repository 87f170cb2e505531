//! Line-oriented echo server.
//!
//! [`SocketServer::start`] binds a TCP listener and runs an unbounded accept
//! loop on a worker; every accepted connection is served by its own
//! independent worker, so a slow client never blocks new accepts. There is no
//! connection cap and no per-connection timeout. A fault in one handler
//! closes only that connection.

use std::io::{BufRead, BufReader, Read};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use echoline_core::DispatcherHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::error::{NetError, NetResult};

/// Every echoed line is prefixed with this.
pub const RESPONSE_PREFIX: &str = "Server received: ";

// ----------------------------------------------------------------------------
// Server
// ----------------------------------------------------------------------------

/// Accepts connections and echoes back each received line.
pub struct SocketServer {
    config: ServerConfig,
    dispatcher: DispatcherHandle,
}

/// Control handle for a started server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    accepting: Arc<AtomicBool>,
}

impl SocketServer {
    pub fn new(config: ServerConfig, dispatcher: DispatcherHandle) -> Self {
        Self { config, dispatcher }
    }

    /// Bind the listening socket and start accepting.
    ///
    /// Bind failures (port in use, permission denied) are returned immediately
    /// and are not retried.
    pub fn start(&self) -> NetResult<ServerHandle> {
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port)).map_err(
            |source| NetError::Bind {
                port: self.config.port,
                source,
            },
        )?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "server listening");

        let accepting = Arc::new(AtomicBool::new(true));
        let loop_accepting = accepting.clone();
        let dispatcher = self.dispatcher.clone();
        let max_line_bytes = self.config.max_line_bytes;
        self.dispatcher.spawn_worker(move || {
            run_accept_loop(listener, loop_accepting, dispatcher, max_line_bytes);
        });

        Ok(ServerHandle {
            local_addr,
            accepting,
        })
    }
}

impl ServerHandle {
    /// Address the listener is bound to; useful with a port-0 bind.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Stop accepting new connections.
    ///
    /// Connections already being served are unaffected. The accept loop is
    /// woken with a loopback dial so it observes the flag and drops the
    /// listening socket.
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!(addr = %self.local_addr, "stopping accept loop");
            let _ = TcpStream::connect(self.wake_addr());
        }
    }

    fn wake_addr(&self) -> SocketAddr {
        let mut addr = self.local_addr;
        if addr.ip().is_unspecified() {
            match addr.ip() {
                IpAddr::V4(_) => addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
                IpAddr::V6(_) => addr.set_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            }
        }
        addr
    }
}

// ----------------------------------------------------------------------------
// Accept Loop and Handler
// ----------------------------------------------------------------------------

fn run_accept_loop(
    listener: TcpListener,
    accepting: Arc<AtomicBool>,
    dispatcher: DispatcherHandle,
    max_line_bytes: usize,
) {
    for stream in listener.incoming() {
        if !accepting.load(Ordering::SeqCst) {
            break;
        }
        match stream {
            Ok(stream) => match Connection::from_stream(stream) {
                Ok(conn) => {
                    info!(peer = %conn.peer_addr(), "client connected");
                    dispatcher.spawn_worker(move || handle_client(conn, max_line_bytes));
                }
                Err(error) => warn!(%error, "failed to adopt accepted stream"),
            },
            Err(error) => warn!(%error, "accept failed"),
        }
    }
    debug!("accept loop stopped");
}

/// Serve one connection: read a line, echo it back prefixed, repeat until
/// end-of-stream or a fault.
fn handle_client(conn: Connection, max_line_bytes: usize) {
    let peer = conn.peer_addr();
    let mut reader = BufReader::new(&conn);
    loop {
        match read_line_bounded(&mut reader, max_line_bytes) {
            Ok(Some(line)) => {
                debug!(%peer, %line, "received line");
                let response = format!("{RESPONSE_PREFIX}{line}\n");
                if let Err(error) = conn
                    .write_all(response.as_bytes())
                    .and_then(|()| conn.flush())
                {
                    warn!(%peer, %error, "write failed");
                    break;
                }
            }
            Ok(None) => {
                info!(%peer, "client disconnected");
                break;
            }
            Err(error) => {
                warn!(%peer, %error, "read failed");
                break;
            }
        }
    }
    conn.close();
}

/// Read one `'\n'`-terminated line of at most `limit` bytes (terminator
/// included), stripping the terminator. `Ok(None)` on end-of-stream.
fn read_line_bounded<R: BufRead>(reader: &mut R, limit: usize) -> NetResult<Option<String>> {
    let mut raw = Vec::new();
    let mut limited = reader.by_ref().take(limit as u64 + 1);
    let bytes = limited.read_until(b'\n', &mut raw)?;
    if bytes == 0 {
        return Ok(None);
    }
    if raw.len() > limit {
        return Err(NetError::LineTooLong { limit });
    }
    if raw.last() == Some(&b'\n') {
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
    }
    Ok(Some(String::from_utf8_lossy(&raw).into_owned()))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
