use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{RelayError, Result};
use crate::history::DEFAULT_CAPACITY;
use crate::protocol::DEFAULT_MAX_LINE_LENGTH;

// =============================================================================
// File config (figment-deserialized from defaults / chat_relay.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   chat_relay.toml:  [server]
//                     listen_port = 9000
//
//   env var:          CHAT_RELAY_SERVER__LISTEN_PORT=9000   (double underscore = nesting)
//
//   CLI flag:         chat-relay serve --port 9000

/// Env var prefix for configuration overrides.
pub const ENV_PREFIX: &str = "CHAT_RELAY_";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub chat: ChatFileConfig,
}

/// Listener settings (lives under `[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// How long shutdown waits for open sessions to close.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            listen_port: default_listen_port(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

/// Chat behaviour (lives under `[chat]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatFileConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for ChatFileConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            max_line_length: default_max_line_length(),
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1".to_string()
}
fn default_listen_port() -> u16 {
    8888
}
fn default_shutdown_grace_secs() -> u64 {
    5
}
fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}
fn default_max_line_length() -> usize {
    DEFAULT_MAX_LINE_LENGTH
}

/// Build a figment that layers: defaults → TOML file → CHAT_RELAY_* env vars.
///
/// A missing TOML file is not an error; its layer is simply empty.
///
/// Env vars use double-underscore for nesting into sections:
///   `CHAT_RELAY_SERVER__LISTEN_ADDRESS=0.0.0.0`  →  `server.listen_address`
///   `CHAT_RELAY_CHAT__HISTORY_CAPACITY=50`       →  `chat.history_capacity`
pub fn load_config(config_path: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Command-line values that take priority over every figment layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

// =============================================================================
// Runtime config (derived from FileConfig, used throughout the relay)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub history_capacity: usize,
    pub max_line_length: usize,
    pub shutdown_grace: Duration,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            listen_address: fc.server.listen_address.clone(),
            listen_port: fc.server.listen_port,
            history_capacity: fc.chat.history_capacity,
            max_line_length: fc.chat.max_line_length,
            shutdown_grace: Duration::from_secs(fc.server.shutdown_grace_secs),
        }
    }

    /// Resolve the full layered configuration, CLI values last.
    pub fn load(config_path: &Path, overrides: &CliOverrides) -> Result<Self> {
        let fc: FileConfig = load_config(config_path)
            .extract()
            .map_err(|e| RelayError::Config(Box::new(e)))?;
        Ok(Self::from_file(&fc).with_overrides(overrides))
    }

    pub fn with_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(host) = &overrides.host {
            self.listen_address = host.clone();
        }
        if let Some(port) = overrides.port {
            self.listen_port = port;
        }
        self
    }

    /// `host:port` string handed to the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_address, self.listen_port)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_file(&FileConfig::default())
    }
}
