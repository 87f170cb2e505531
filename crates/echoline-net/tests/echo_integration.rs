//! End-to-end tests for the echo server and socket client.
//!
//! Each test owns its dispatcher and binds the server to an ephemeral port on
//! loopback, so tests are independent and can run concurrently. Waits are
//! bounded; nothing here sleeps for synchronization on the happy path.

use std::net::{TcpListener, TcpStream};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use echoline_core::{Dispatcher, TaskError, TaskStateError, TaskStatus};
use echoline_net::{
    ClientConfig, ServerConfig, ServerHandle, SocketClient, SocketClientListener, SocketServer,
};

const WAIT: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum ClientEvent {
    Sent(String),
    Received(String),
}

/// Listener forwarding callbacks into a channel the test can wait on.
struct ChannelListener {
    tx: Mutex<mpsc::Sender<ClientEvent>>,
}

impl SocketClientListener for ChannelListener {
    fn on_message_sent(&self, message: &str) {
        let _ = self
            .tx
            .lock()
            .unwrap()
            .send(ClientEvent::Sent(message.to_string()));
    }

    fn on_message_received(&self, message: &str) {
        let _ = self
            .tx
            .lock()
            .unwrap()
            .send(ClientEvent::Received(message.to_string()));
    }
}

fn channel_listener() -> (Arc<ChannelListener>, mpsc::Receiver<ClientEvent>) {
    let (tx, rx) = mpsc::channel();
    (Arc::new(ChannelListener { tx: Mutex::new(tx) }), rx)
}

fn loopback_server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        ..ServerConfig::default()
    }
}

fn start_server(dispatcher: &Dispatcher, config: ServerConfig) -> (ServerHandle, ClientConfig) {
    let server = SocketServer::new(config, dispatcher.handle());
    let handle = server.start().expect("server should bind an ephemeral port");
    let addr = handle.local_addr();
    let client_config = ClientConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..ClientConfig::default()
    };
    (handle, client_config)
}

fn expect_sent(events: &mpsc::Receiver<ClientEvent>) -> String {
    loop {
        match events.recv_timeout(WAIT) {
            Ok(ClientEvent::Sent(message)) => return message,
            Ok(ClientEvent::Received(_)) => continue,
            Err(_) => panic!("timed out waiting for a sent notification"),
        }
    }
}

fn expect_received(events: &mpsc::Receiver<ClientEvent>) -> String {
    loop {
        match events.recv_timeout(WAIT) {
            Ok(ClientEvent::Received(message)) => return message,
            Ok(ClientEvent::Sent(_)) => continue,
            Err(_) => panic!("timed out waiting for a received message"),
        }
    }
}

fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// ----------------------------------------------------------------------------
// Echo Round Trips
// ----------------------------------------------------------------------------

#[test]
fn end_to_end_echo() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let (_server, config) = start_server(&dispatcher, loopback_server_config());
    let (listener, events) = channel_listener();
    let client = SocketClient::new(config, listener, dispatcher.handle());

    client.start().unwrap();
    assert!(*client.connect().get().unwrap());

    client.send("ping");
    assert_eq!(expect_sent(&events), "ping");
    assert_eq!(expect_received(&events), "Server received: ping\n");
}

#[test]
fn concurrent_clients_never_see_each_others_echoes() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let (_server, config) = start_server(&dispatcher, loopback_server_config());

    let (listener_a, events_a) = channel_listener();
    let (listener_b, events_b) = channel_listener();
    let client_a = SocketClient::new(config.clone(), listener_a, dispatcher.handle());
    let client_b = SocketClient::new(config, listener_b, dispatcher.handle());

    client_a.start().unwrap();
    client_b.start().unwrap();
    assert!(*client_a.connect().get().unwrap());
    assert!(*client_b.connect().get().unwrap());

    client_a.send("alpha");
    client_b.send("beta");

    assert_eq!(expect_received(&events_a), "Server received: alpha\n");
    assert_eq!(expect_received(&events_b), "Server received: beta\n");
    assert!(events_a.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(events_b.recv_timeout(Duration::from_millis(200)).is_err());
}

// ----------------------------------------------------------------------------
// Connect Semantics
// ----------------------------------------------------------------------------

#[test]
fn connect_is_idempotent_once_live() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let (_server, config) = start_server(&dispatcher, loopback_server_config());
    let (listener, _events) = channel_listener();
    let client = SocketClient::new(config, listener, dispatcher.handle());

    assert!(*client.connect().get().unwrap());
    assert!(*client.connect().get().unwrap());
    assert!(client.is_connected());
}

#[test]
fn dial_to_a_dead_port_yields_false_not_a_fault() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    // Grab an ephemeral port, then free it so nothing is listening there.
    let reserved = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = reserved.local_addr().unwrap().port();
    drop(reserved);

    let (listener, events) = channel_listener();
    let config = ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        ..ClientConfig::default()
    };
    let client = SocketClient::new(config, listener, dispatcher.handle());

    client.start().unwrap();
    assert!(!*client.join().unwrap());
    assert_eq!(client.receive_status(), TaskStatus::Finished);
    assert!(events.recv_timeout(Duration::from_millis(200)).is_err());
}

#[test]
fn a_client_runs_its_receive_task_at_most_once() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let (_server, config) = start_server(&dispatcher, loopback_server_config());
    let (listener, _events) = channel_listener();
    let client = SocketClient::new(config, listener, dispatcher.handle());

    client.start().unwrap();
    assert_eq!(client.start(), Err(TaskStateError::AlreadyRunning));
}

#[test]
fn send_without_a_connection_dials_and_defers() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let (_server, config) = start_server(&dispatcher, loopback_server_config());
    let (listener, events) = channel_listener();
    let client = SocketClient::new(config, listener, dispatcher.handle());

    // The first send finds no connection: it triggers the dial and drops the
    // message instead of sending it.
    client.send("early");
    assert!(wait_until(WAIT, || client.is_connected()));

    client.start().unwrap();
    client.send("second");
    assert_eq!(expect_sent(&events), "second");
    assert_eq!(expect_received(&events), "Server received: second\n");
}

// ----------------------------------------------------------------------------
// Cancellation and Shutdown
// ----------------------------------------------------------------------------

#[test]
fn shutdown_unblocks_a_parked_read_in_bounded_time() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let (_server, config) = start_server(&dispatcher, loopback_server_config());
    let (listener, _events) = channel_listener();
    let client = Arc::new(SocketClient::new(config, listener, dispatcher.handle()));

    client.start().unwrap();
    assert!(*client.connect().get().unwrap());

    let (done_tx, done_rx) = mpsc::channel();
    let joiner = client.clone();
    thread::spawn(move || {
        let _ = done_tx.send(joiner.join());
    });

    client.shutdown();
    let outcome = done_rx
        .recv_timeout(WAIT)
        .expect("receive task should finish promptly after shutdown");
    assert!(matches!(outcome, Err(TaskError::Cancelled)));
    assert!(!client.is_connected());
}

#[test]
fn stopping_the_server_keeps_live_connections_working() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let (server, config) = start_server(&dispatcher, loopback_server_config());
    let (listener, events) = channel_listener();
    let client = SocketClient::new(config, listener, dispatcher.handle());

    client.start().unwrap();
    assert!(*client.connect().get().unwrap());
    client.send("before");
    assert_eq!(expect_received(&events), "Server received: before\n");

    server.shutdown();
    assert!(!server.is_accepting());

    // New dials are refused once the listening socket is gone.
    let addr = server.local_addr();
    assert!(wait_until(WAIT, || TcpStream::connect(addr).is_err()));

    // The already-accepted connection keeps echoing.
    client.send("after");
    assert_eq!(expect_received(&events), "Server received: after\n");
}

// ----------------------------------------------------------------------------
// Server Hardening
// ----------------------------------------------------------------------------

#[test]
fn an_oversized_line_closes_only_that_connection() {
    let dispatcher = Dispatcher::with_defaults().unwrap();
    let config = ServerConfig {
        max_line_bytes: 64,
        ..loopback_server_config()
    };
    let (server, client_config) = start_server(&dispatcher, config);

    // A peer that floods one unterminated oversized line gets disconnected.
    let mut flooder = TcpStream::connect(server.local_addr()).unwrap();
    flooder.set_read_timeout(Some(WAIT)).unwrap();
    std::io::Write::write_all(&mut flooder, &[b'x'; 200]).unwrap();
    let mut buf = [0u8; 16];
    match std::io::Read::read(&mut flooder, &mut buf) {
        Ok(0) => {}
        Err(error)
            if error.kind() != std::io::ErrorKind::WouldBlock
                && error.kind() != std::io::ErrorKind::TimedOut => {}
        other => panic!("server should have closed the connection, got {other:?}"),
    }

    // Other connections are untouched.
    let (listener, events) = channel_listener();
    let client = SocketClient::new(client_config, listener, dispatcher.handle());
    client.start().unwrap();
    assert!(*client.connect().get().unwrap());
    client.send("small");
    assert_eq!(expect_received(&events), "Server received: small\n");
}
