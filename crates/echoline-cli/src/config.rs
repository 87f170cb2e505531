//! Configuration loading for the echoline CLI.
//!
//! Defaults are layered under an optional TOML file; command-line arguments
//! override both.

use serde::{Deserialize, Serialize};

use echoline_net::{ClientConfig, ServerConfig};

use crate::error::Result;

/// Complete configuration for the CLI application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Client target and receive-loop settings.
    pub client: ClientConfig,
    /// Server bind address and per-connection limits.
    pub server: ServerConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
