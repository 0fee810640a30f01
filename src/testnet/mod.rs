//! Test helpers
//!
//! Builders for mined blocks and chains at trivial difficulties, and an
//! event sink that records what the engine emitted.

pub mod test_utils;

pub use test_utils::*;
