//! Utility functions and helpers
//!
//! Hashing, clock access and the text encodings used by the exchange format.

pub mod crypto;
pub mod encoding;

pub use crypto::{current_timestamp, sha256_digest};
pub use encoding::{base64_decode, base64_encode, hex_encode};
