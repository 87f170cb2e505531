//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the echo server until stdin reaches end-of-file
    Serve {
        /// Port to listen on (0 picks an ephemeral port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Connect to a server and chat interactively; stdin lines are sent,
    /// received text is printed
    Chat {
        /// Target endpoint as host:port
        #[arg(short, long)]
        target: Option<String>,
        /// Also run a local echo server on this port
        #[arg(short, long)]
        listen: Option<u16>,
    },
    /// Send a single message, wait briefly for the echo, and exit
    Send {
        /// Target endpoint as host:port
        #[arg(short, long)]
        target: Option<String>,
        /// Message content
        message: String,
    },
}
