//! # PoW Ledger - My Proof-of-Work Ledger Node
//!
//! This is a single-chain proof-of-work ledger that I run as a set of peer
//! nodes on one machine. When I come back to this code, here's what I need
//! to remember:
//!
//! ## What I Built
//! - **Miner**: Nonce search with a difficulty that adjusts itself toward a
//!   target block time
//! - **Validator**: Hash, link, index and timestamp checks for blocks and
//!   whole chains
//! - **Fork Choice**: A received chain wins only with strictly more
//!   cumulative work (sum of 2^difficulty)
//! - **P2P Transport**: TCP, length-prefixed JSON ledgers, periodic broadcast
//!
//! ## How I Organized My Code
//! - `core/`: Blocks, proof-of-work, difficulty rule, validation, the shared
//!   ledger and the mining driver
//! - `network/`: Exchange format, fork choice, peers and the TCP transport
//! - `node`: One node wired together (ledger + miner + transport)
//! - `events`: What the engine tells whoever is presenting it
//! - `config/`: Settings with TOML and environment overrides
//! - `utils/`: Hashing, clock and encoding helpers
//! - `cli/`: Command-line interface
//!
//! ## Key Design Decisions I Made
//! - The ledger lives in memory only; a restarted node syncs from its peers
//! - A generation counter tells the miner when the ledger was replaced, so a
//!   block built on a replaced tip is never appended
//! - The engine never talks to a UI directly, it emits `NodeEvent`s
//!
//! ## When I Need to Understand Something
//! 1. Start with `main.rs` to see the CLI commands
//! 2. Look at `core/miner.rs` and `core/proof_of_work.rs` for mining
//! 3. Check `network/sync.rs` for how a peer ledger gets adopted
//! 4. Review `network/server.rs` for P2P communication

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod network;
pub mod node;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, Settings, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, DifficultyAdjustment, LedgerValidator, Miner, ProofOfWork, HASH_BITS,
};
pub use error::{LedgerError, Result};
pub use events::{BlockAnnotation, ChannelSink, EventSink, LogSink, NodeEvent, Severity};
pub use network::{decode_ledger, encode_ledger, Server, SyncEngine, SyncOutcome};
pub use node::LedgerNode;
pub use utils::{current_timestamp, sha256_digest};
