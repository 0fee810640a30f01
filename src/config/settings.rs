use crate::error::{LedgerError, Result};
use log::{info, warn};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

pub const LOCALHOST: &str = "127.0.0.1";
pub const DEFAULT_DIFFICULTY: u32 = 21;
pub const BLOCK_GENERATION_INTERVAL: i64 = 10_000; // ms
pub const DIFF_ADJUST_INTERVAL: usize = 10; // blocks
pub const MAX_CHAIN_LENGTH: usize = 2000;
pub const TIMESTAMP_SLACK: i64 = 60_000; // ms
pub const LEDGER_UPDATE_TIME: u64 = 200; // ms
pub const CONNECT_TIMEOUT: u64 = 5000; // ms
pub const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

// Upper bounds that keep the adjustment window arithmetic far from overflow
const MAX_DURATION_MS: i64 = 86_400_000; // one day
const MAX_DIFF_ADJUST_INTERVAL: usize = 10_000; // blocks

const NODE_HOST_KEY: &str = "NODE_HOST";
const NODE_PORT_KEY: &str = "NODE_PORT";
const PEER_HOST_KEY: &str = "PEER_HOST";
const DEFAULT_DIFFICULTY_KEY: &str = "DEFAULT_DIFFICULTY";
const MAX_CHAIN_LENGTH_KEY: &str = "MAX_CHAIN_LENGTH";

/// Process-wide constants and addresses.
///
/// Every field has a default, so a TOML file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Host the server binds to
    pub node_host: String,
    /// Port the server binds to, 0 picks an ephemeral port
    pub node_port: u16,
    /// Host dialed by `connect_to_peer`
    pub peer_host: String,
    /// Difficulty of the genesis block and of chains with no history
    pub default_difficulty: u32,
    /// Target time between blocks, in milliseconds
    pub block_generation_interval_ms: i64,
    /// Number of blocks between the tip and the adjustment reference block
    pub diff_adjust_interval: usize,
    /// Safety cap on the number of blocks a single mining run produces
    pub max_chain_length: usize,
    /// Tolerated clock skew for block timestamps, in milliseconds
    pub timestamp_slack_ms: i64,
    /// Period of the ledger broadcast to inbound peers, in milliseconds
    pub ledger_update_ms: u64,
    /// Outbound connect timeout, in milliseconds
    pub connect_timeout_ms: u64,
    /// Largest accepted frame on the wire
    pub max_message_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            node_host: LOCALHOST.to_string(),
            node_port: 0,
            peer_host: LOCALHOST.to_string(),
            default_difficulty: DEFAULT_DIFFICULTY,
            block_generation_interval_ms: BLOCK_GENERATION_INTERVAL,
            diff_adjust_interval: DIFF_ADJUST_INTERVAL,
            max_chain_length: MAX_CHAIN_LENGTH,
            timestamp_slack_ms: TIMESTAMP_SLACK,
            ledger_update_ms: LEDGER_UPDATE_TIME,
            connect_timeout_ms: CONNECT_TIMEOUT,
            max_message_bytes: MAX_MESSAGE_BYTES,
        }
    }
}

impl Settings {
    /// Expected duration of one adjustment window
    pub fn expected_window_ms(&self) -> i64 {
        self.block_generation_interval_ms
            .saturating_mul(self.diff_adjust_interval as i64)
    }

    pub fn from_toml_str(text: &str) -> Result<Settings> {
        let settings: Settings = toml::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let text = fs::read_to_string(path).map_err(|e| {
            LedgerError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Apply `NODE_HOST`, `NODE_PORT`, `PEER_HOST`, `DEFAULT_DIFFICULTY` and
    /// `MAX_CHAIN_LENGTH` from the environment. Unparsable values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(host) = env::var(NODE_HOST_KEY) {
            self.node_host = host;
        }
        if let Ok(host) = env::var(PEER_HOST_KEY) {
            self.peer_host = host;
        }
        if let Some(port) = parse_env::<u16>(NODE_PORT_KEY) {
            self.node_port = port;
        }
        if let Some(difficulty) = parse_env::<u32>(DEFAULT_DIFFICULTY_KEY) {
            self.default_difficulty = difficulty;
        }
        if let Some(cap) = parse_env::<usize>(MAX_CHAIN_LENGTH_KEY) {
            self.max_chain_length = cap;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.diff_adjust_interval == 0 || self.diff_adjust_interval > MAX_DIFF_ADJUST_INTERVAL {
            return Err(LedgerError::Config(format!(
                "diff_adjust_interval must be between 1 and {MAX_DIFF_ADJUST_INTERVAL}"
            )));
        }
        if !(1..=MAX_DURATION_MS).contains(&self.block_generation_interval_ms) {
            return Err(LedgerError::Config(format!(
                "block_generation_interval_ms must be between 1 and {MAX_DURATION_MS}"
            )));
        }
        if !(1..=MAX_DURATION_MS).contains(&self.timestamp_slack_ms) {
            return Err(LedgerError::Config(format!(
                "timestamp_slack_ms must be between 1 and {MAX_DURATION_MS}"
            )));
        }
        if self.default_difficulty > 256 {
            return Err(LedgerError::Config(format!(
                "default_difficulty {} exceeds the 256-bit digest length",
                self.default_difficulty
            )));
        }
        if self.ledger_update_ms == 0 {
            return Err(LedgerError::Config(
                "ledger_update_ms must be positive".to_string(),
            ));
        }
        if self.max_message_bytes == 0 {
            return Err(LedgerError::Config(
                "max_message_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.node_host, self.node_port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring unparsable {key}={raw}");
            None
        }
    }
}

/// Shared holder for the settings of the running process
pub struct Config {
    inner: RwLock<Settings>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut settings = Settings::default();
        settings.apply_env();
        Config {
            inner: RwLock::new(settings),
        }
    }

    pub fn get_settings(&self) -> Settings {
        match self.inner.read() {
            Ok(settings) => settings.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set_settings(&self, settings: Settings) {
        let mut inner = match self.inner.write() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };
        *inner = settings;
    }

    /// Load a TOML file, then re-apply environment overrides on top of it
    pub fn load_file(&self, path: &Path) -> Result<Settings> {
        let mut settings = Settings::from_file(path)?;
        settings.apply_env();
        settings.validate()?;
        info!("Loaded configuration from {}", path.display());
        self.set_settings(settings.clone());
        Ok(settings)
    }

    pub fn set_node_port(&self, port: u16) {
        let mut settings = self.get_settings();
        settings.node_port = port;
        self.set_settings(settings);
    }
}
