//! Application wiring: the stdout listener and the subcommand runners.

use std::io::{self, BufRead, Write};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use echoline_core::Dispatcher;
use echoline_net::{ClientConfig, ServerConfig, SocketClient, SocketClientListener, SocketServer};
use tracing::warn;

use crate::error::{CliError, Result};

/// Grace period for worker threads on dispatcher shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// How long `send` waits for the server's echo before giving up.
const ECHO_WAIT: Duration = Duration::from_secs(2);

// ----------------------------------------------------------------------------
// Listener
// ----------------------------------------------------------------------------

/// Prints callbacks to stdout; optionally forwards received messages into a
/// channel so a one-shot command can wait for the echo.
struct ConsoleListener {
    forward: Option<Mutex<mpsc::Sender<String>>>,
}

impl ConsoleListener {
    fn new() -> Self {
        Self { forward: None }
    }

    fn with_forward(tx: mpsc::Sender<String>) -> Self {
        Self {
            forward: Some(Mutex::new(tx)),
        }
    }
}

impl SocketClientListener for ConsoleListener {
    fn on_message_sent(&self, message: &str) {
        println!("[sent] {message}");
    }

    fn on_message_received(&self, message: &str) {
        print!("{message}");
        let _ = io::stdout().flush();
        if let Some(forward) = &self.forward {
            let _ = forward.lock().unwrap().send(message.to_string());
        }
    }
}

// ----------------------------------------------------------------------------
// Subcommand Runners
// ----------------------------------------------------------------------------

/// Run the echo server until stdin reaches end-of-file.
pub fn run_serve(config: ServerConfig) -> Result<()> {
    let dispatcher = Dispatcher::with_defaults()?;
    let server = SocketServer::new(config, dispatcher.handle());
    let handle = server.start()?;
    println!("Listening on {} (Ctrl-D to stop)", handle.local_addr());

    drain_stdin()?;

    handle.shutdown();
    dispatcher.shutdown(SHUTDOWN_GRACE);
    Ok(())
}

/// Interactive mode: every stdin line is sent; received text is printed.
/// End-of-file is the teardown signal.
pub fn run_chat(client_config: ClientConfig, listen: Option<ServerConfig>) -> Result<()> {
    let dispatcher = Dispatcher::with_defaults()?;

    let server_handle = match listen {
        Some(server_config) => {
            let handle = SocketServer::new(server_config, dispatcher.handle()).start()?;
            println!("Listening on {}", handle.local_addr());
            Some(handle)
        }
        None => None,
    };

    let endpoint = client_config.endpoint();
    let client = SocketClient::new(
        client_config,
        Arc::new(ConsoleListener::new()),
        dispatcher.handle(),
    );
    client.start()?;
    if !*client.connect().get()? {
        return Err(CliError::NotConnected(endpoint));
    }
    println!("Connected to {endpoint} (Ctrl-D to quit)");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        client.send(line);
    }

    client.shutdown();
    if let Some(handle) = server_handle {
        handle.shutdown();
    }
    dispatcher.shutdown(SHUTDOWN_GRACE);
    Ok(())
}

/// One-shot mode: connect, send, wait briefly for the echo, tear down.
pub fn run_send(client_config: ClientConfig, message: String) -> Result<()> {
    let dispatcher = Dispatcher::with_defaults()?;
    let (echo_tx, echo_rx) = mpsc::channel();

    let endpoint = client_config.endpoint();
    let client = SocketClient::new(
        client_config,
        Arc::new(ConsoleListener::with_forward(echo_tx)),
        dispatcher.handle(),
    );
    client.start()?;
    if !*client.connect().get()? {
        return Err(CliError::NotConnected(endpoint));
    }

    client.send(message);
    if echo_rx.recv_timeout(ECHO_WAIT).is_err() {
        warn!("no echo before timeout");
    }

    client.shutdown();
    dispatcher.shutdown(SHUTDOWN_GRACE);
    Ok(())
}

fn drain_stdin() -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        line?;
    }
    Ok(())
}
