//! Echoline CLI - entry point

use clap::Parser;
use tracing::info;

use echoline_cli::{
    app,
    cli::{Cli, Commands},
    config::AppConfig,
    error::Result,
};
use echoline_net::ClientConfig;

fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_configuration(&cli)?;

    match cli.command {
        Commands::Serve { port } => {
            let mut server_config = config.server;
            if let Some(port) = port {
                server_config.port = port;
            }
            app::run_serve(server_config)
        }
        Commands::Chat { target, listen } => {
            let client_config = resolve_target(&config, target.as_deref())?;
            let listen = listen.map(|port| {
                let mut server_config = config.server.clone();
                server_config.port = port;
                server_config
            });
            app::run_chat(client_config, listen)
        }
        Commands::Send { target, message } => {
            let client_config = resolve_target(&config, target.as_deref())?;
            app::run_send(client_config, message)
        }
    }
}

/// Setup logging based on verbosity level
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from file or use defaults
fn load_configuration(cli: &Cli) -> Result<AppConfig> {
    if let Some(config_path) = &cli.config {
        info!("loading configuration from {config_path}");
        AppConfig::load_from_file(config_path)
    } else {
        Ok(AppConfig::default())
    }
}

/// A `--target host:port` argument overrides the configured client endpoint.
fn resolve_target(config: &AppConfig, target: Option<&str>) -> Result<ClientConfig> {
    match target {
        Some(endpoint) => {
            let parsed = ClientConfig::from_endpoint(endpoint)?;
            Ok(ClientConfig {
                host: parsed.host,
                port: parsed.port,
                ..config.client.clone()
            })
        }
        None => Ok(config.client.clone()),
    }
}
