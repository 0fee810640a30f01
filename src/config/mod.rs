//! Configuration management
//!
//! Protocol constants and network addresses for a ledger node. Defaults are
//! built in, a TOML file can override them, and environment variables win
//! over both.

pub mod settings;

pub use settings::{
    Config, Settings, BLOCK_GENERATION_INTERVAL, CONNECT_TIMEOUT, DEFAULT_DIFFICULTY,
    DIFF_ADJUST_INTERVAL, GLOBAL_CONFIG, LEDGER_UPDATE_TIME, LOCALHOST, MAX_CHAIN_LENGTH,
    MAX_MESSAGE_BYTES, TIMESTAMP_SLACK,
};
