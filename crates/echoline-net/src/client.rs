//! Persistent socket client driven by a background receive task.
//!
//! A [`SocketClient`] owns at most one outbound [`Connection`] and a one-shot
//! receive [`Task`] that dials the target and then blocking-reads until
//! end-of-stream, fault, or cancellation. Inbound messages and send
//! confirmations reach the [`SocketClientListener`] on the dispatcher's
//! completion context only, so the owning shell never races with background
//! I/O. Teardown is [`SocketClient::shutdown`]: it cancels the receive task
//! with interrupt, which closes the connection and unblocks the parked read.

use std::sync::{Arc, Condvar, Mutex};

use echoline_core::{
    DispatcherHandle, Task, TaskContext, TaskError, TaskObserver, TaskStateError, TaskStatus,
};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::connection::Connection;

/// Capability interface the owning shell provides at construction.
///
/// Both callbacks are invoked on the completion context.
pub trait SocketClientListener: Send + Sync + 'static {
    fn on_message_sent(&self, message: &str);
    fn on_message_received(&self, message: &str);
}

// ----------------------------------------------------------------------------
// Client
// ----------------------------------------------------------------------------

/// TCP client with a cancellable background receive loop.
pub struct SocketClient {
    inner: Arc<ClientInner>,
    receive_task: Task<bool, String>,
}

struct ClientInner {
    config: ClientConfig,
    listener: Arc<dyn SocketClientListener>,
    dispatcher: DispatcherHandle,
    conn: Mutex<Option<Arc<Connection>>>,
    dial: Mutex<DialState>,
    dial_done: Condvar,
}

/// At most one dial may be in flight; later requests wait on the same attempt.
enum DialState {
    Idle,
    InFlight,
}

impl SocketClient {
    pub fn new(
        config: ClientConfig,
        listener: Arc<dyn SocketClientListener>,
        dispatcher: DispatcherHandle,
    ) -> Self {
        let inner = Arc::new(ClientInner {
            config,
            listener: listener.clone(),
            dispatcher: dispatcher.clone(),
            conn: Mutex::new(None),
            dial: Mutex::new(DialState::Idle),
            dial_done: Condvar::new(),
        });

        let work_inner = inner.clone();
        let receive_task = Task::new(
            dispatcher,
            move |cx| Ok(run_receive_loop(&work_inner, cx)),
            ReceiveObserver { listener },
        );
        let hook_inner = inner.clone();
        receive_task.set_interrupt_hook(move || {
            if let Some(conn) = current_open(&hook_inner) {
                conn.close();
            }
        });

        Self {
            inner,
            receive_task,
        }
    }

    /// Start the receive task: connect, then deliver inbound messages until
    /// disconnect or cancellation.
    ///
    /// A client runs its receive task at most once; a second `start` is a
    /// contract violation, as for any [`Task`].
    pub fn start(&self) -> Result<(), TaskStateError> {
        self.receive_task.execute()
    }

    /// Trigger a dial; idempotent.
    ///
    /// Resolves `true` immediately when a live connection exists, otherwise
    /// dials off the completion context and resolves `true` on success and
    /// `false` on any dial failure; a failure is logged and converted, never
    /// raised to the caller. Concurrent connect requests share one attempt.
    pub fn connect(&self) -> Task<bool> {
        let inner = self.inner.clone();
        Task::spawn(
            self.inner.dispatcher.clone(),
            move |_cx| Ok(ensure_connected(&inner)),
            (),
        )
    }

    /// Send a message on the worker pool.
    ///
    /// With no live connection, this triggers a dial instead and the message
    /// is deferred (dropped): sends only reach the wire after a previously
    /// completed connect. `on_message_sent` fires after the bytes are flushed.
    pub fn send(&self, message: impl Into<String>) {
        let inner = self.inner.clone();
        let message = message.into();
        self.inner
            .dispatcher
            .spawn_worker(move || send_job(&inner, message));
    }

    /// Teardown signal from the owning shell: cancel the receive task and
    /// close the connection so a parked read unblocks in bounded time.
    pub fn shutdown(&self) {
        info!("client shutting down");
        self.receive_task.cancel(true);
        if let Some(conn) = current_open(&self.inner) {
            conn.close();
        }
    }

    pub fn is_connected(&self) -> bool {
        current_open(&self.inner).is_some()
    }

    /// Status of the receive task.
    pub fn receive_status(&self) -> TaskStatus {
        self.receive_task.status()
    }

    /// Block until the receive task finishes. `Ok(false)` means the initial
    /// dial failed and the loop never ran.
    pub fn join(&self) -> Result<Arc<bool>, TaskError> {
        self.receive_task.get()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }
}

// ----------------------------------------------------------------------------
// Receive Path
// ----------------------------------------------------------------------------

struct ReceiveObserver {
    listener: Arc<dyn SocketClientListener>,
}

impl TaskObserver<bool, String> for ReceiveObserver {
    fn on_progress(&mut self, values: Vec<String>) {
        for message in values {
            self.listener.on_message_received(&message);
        }
    }

    fn on_post_execute(&mut self, result: Option<&bool>) {
        debug!(
            connected = result.copied().unwrap_or(false),
            "receive loop finished"
        );
    }

    fn on_cancelled(&mut self, _result: Option<&bool>) {
        debug!("receive loop cancelled");
    }
}

fn run_receive_loop(inner: &Arc<ClientInner>, cx: &TaskContext<bool, String>) -> bool {
    if !ensure_connected(inner) {
        return false;
    }
    let Some(conn) = current_open(inner) else {
        return false;
    };

    info!(peer = %conn.peer_addr(), "receive loop started");
    let mut buf = vec![0u8; inner.config.recv_buffer_size];
    while !cx.is_cancelled() && conn.is_open() {
        match conn.read(&mut buf) {
            Ok(0) => {
                debug!("peer closed the stream");
                break;
            }
            Ok(read) => {
                let message = String::from_utf8_lossy(&buf[..read]).into_owned();
                cx.publish_progress(vec![message]);
            }
            Err(error) => {
                if !cx.is_cancelled() {
                    warn!(%error, "receive failed");
                }
                break;
            }
        }
    }
    if cx.is_cancelled() {
        conn.close();
    }
    true
}

// ----------------------------------------------------------------------------
// Connection Management
// ----------------------------------------------------------------------------

fn current_open(inner: &ClientInner) -> Option<Arc<Connection>> {
    inner
        .conn
        .lock()
        .expect("connection slot poisoned")
        .as_ref()
        .filter(|conn| conn.is_open())
        .cloned()
}

/// Single-flight dial: the first caller performs the dial, concurrent callers
/// wait for that attempt and observe its outcome.
fn ensure_connected(inner: &ClientInner) -> bool {
    if current_open(inner).is_some() {
        return true;
    }

    let owns_dial = {
        let mut dial = inner.dial.lock().expect("dial state poisoned");
        match *dial {
            DialState::Idle => {
                *dial = DialState::InFlight;
                true
            }
            DialState::InFlight => false,
        }
    };

    if !owns_dial {
        let mut dial = inner.dial.lock().expect("dial state poisoned");
        while matches!(*dial, DialState::InFlight) {
            dial = inner.dial_done.wait(dial).expect("dial state poisoned");
        }
        return current_open(inner).is_some();
    }

    debug!(endpoint = %inner.config.endpoint(), "dialing");
    let connected = match Connection::dial(&inner.config.host, inner.config.port) {
        Ok(conn) => {
            info!(peer = %conn.peer_addr(), "connected");
            *inner.conn.lock().expect("connection slot poisoned") = Some(Arc::new(conn));
            true
        }
        Err(error) => {
            warn!(%error, "dial failed");
            false
        }
    };

    let mut dial = inner.dial.lock().expect("dial state poisoned");
    *dial = DialState::Idle;
    inner.dial_done.notify_all();
    connected
}

// ----------------------------------------------------------------------------
// Send Path
// ----------------------------------------------------------------------------

fn send_job(inner: &Arc<ClientInner>, message: String) {
    let Some(conn) = current_open(inner) else {
        debug!("no connection; dialing first (message deferred)");
        ensure_connected(inner);
        return;
    };

    let mut payload = message.clone();
    if inner.config.append_newline && !payload.ends_with('\n') {
        payload.push('\n');
    }

    match conn
        .write_all(payload.as_bytes())
        .and_then(|()| conn.flush())
    {
        Ok(()) => {
            info!(%message, "message sent");
            let listener = inner.listener.clone();
            inner
                .dispatcher
                .post_completion(Box::new(move || listener.on_message_sent(&message)));
        }
        Err(error) => {
            // A write fault invalidates the connection rather than leaving it
            // half-open; the receive loop unblocks via the close.
            warn!(%error, "send failed; invalidating connection");
            conn.close();
            let mut slot = inner.conn.lock().expect("connection slot poisoned");
            if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, &conn)) {
                *slot = None;
            }
        }
    }
}
