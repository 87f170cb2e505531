//! A live duplex TCP byte stream.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{NetError, NetResult};

/// One live TCP connection to a peer.
///
/// Reads and writes are blocking and are made from worker threads only. The
/// design assumes a single logical writer per connection; reads proceed
/// independently. [`Connection::close`] shuts the socket down, which both
/// fails subsequent operations with [`NetError::ConnectionClosed`] and
/// unblocks a read currently parked in the kernel, which is the mechanism
/// task cancellation relies on. A closed connection is never reused; dial a
/// new one to reconnect.
pub struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    open: AtomicBool,
}

impl Connection {
    /// Establish an outbound connection.
    pub fn dial(host: &str, port: u16) -> NetResult<Self> {
        let stream = TcpStream::connect((host, port)).map_err(|source| NetError::Connect {
            addr: format!("{host}:{port}"),
            source,
        })?;
        Self::from_stream(stream)
    }

    /// Wrap an accepted stream.
    pub fn from_stream(stream: TcpStream) -> NetResult<Self> {
        let peer_addr = stream.peer_addr()?;
        Ok(Self {
            stream,
            peer_addr,
            open: AtomicBool::new(true),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Blocking read into `buf`. `Ok(0)` means the peer shut the stream down
    /// cleanly; the connection is marked closed.
    pub fn read(&self, buf: &mut [u8]) -> NetResult<usize> {
        if !self.is_open() {
            return Err(NetError::ConnectionClosed);
        }
        let read = (&self.stream).read(buf)?;
        if read == 0 {
            self.open.store(false, Ordering::SeqCst);
        }
        Ok(read)
    }

    /// Blocking write of the whole buffer.
    pub fn write_all(&self, buf: &[u8]) -> NetResult<()> {
        if !self.is_open() {
            return Err(NetError::ConnectionClosed);
        }
        (&self.stream).write_all(buf)?;
        Ok(())
    }

    pub fn flush(&self) -> NetResult<()> {
        if !self.is_open() {
            return Err(NetError::ConnectionClosed);
        }
        (&self.stream).flush()?;
        Ok(())
    }

    /// Close both directions. Idempotent; any thread parked in [`read`] wakes
    /// with end-of-stream or an error.
    ///
    /// [`read`]: Connection::read
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            debug!(peer = %self.peer_addr, "closing connection");
            let _ = self.stream.shutdown(Shutdown::Both);
        }
    }
}

/// Buffered line reads on the server side go through this impl; end-of-stream
/// and the closed flag stay in agreement with [`Connection::read`].
impl Read for &Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection is closed",
            ));
        }
        let read = (&self.stream).read(buf)?;
        if read == 0 {
            self.open.store(false, Ordering::SeqCst);
        }
        Ok(read)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
