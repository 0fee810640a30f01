//! Error handling for the ledger engine
//!
//! Every fallible engine operation returns [`Result`]. Nothing in the engine
//! turns one of these into a process abort: callers either drop the failed
//! input or surface a message and stop the one operation that failed.

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Error types for ledger operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Bind, accept, connect and stream errors
    Network(String),
    /// Exchange-format encoding errors
    Serialization(String),
    /// A peer payload that could not be decoded into a contiguous chain
    MalformedPayload(String),
    /// A single block failed structural or cryptographic validation
    InvalidBlock(String),
    /// A candidate chain failed validation
    InvalidChain(String),
    /// The ledger was replaced while a block was being mined on the old tip
    StaleTip { expected: u64, actual: u64 },
    /// Mining errors
    Mining(String),
    /// Configuration errors
    Config(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Network(msg) => write!(f, "Network error: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::MalformedPayload(msg) => write!(f, "Malformed payload: {msg}"),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            LedgerError::InvalidChain(msg) => write!(f, "Invalid chain: {msg}"),
            LedgerError::StaleTip { expected, actual } => write!(
                f,
                "Stale tip: block was mined at ledger generation {expected}, ledger is at {actual}"
            ),
            LedgerError::Mining(msg) => write!(f, "Mining error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::MalformedPayload(err.to_string())
    }
}

impl From<data_encoding::DecodeError> for LedgerError {
    fn from(err: data_encoding::DecodeError) -> Self {
        LedgerError::MalformedPayload(format!("invalid base64: {err}"))
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for LedgerError {
    fn from(err: toml::ser::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}
