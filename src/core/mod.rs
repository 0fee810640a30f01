//! Core ledger functionality
//!
//! Blocks, proof-of-work, the difficulty rule, validation, the shared
//! in-memory ledger and the mining driver that ties them together.

pub mod block;
pub mod blockchain;
pub mod difficulty;
pub mod miner;
pub mod proof_of_work;
pub mod validation;

pub use block::{Block, HASH_BITS};
pub use blockchain::Blockchain;
pub use difficulty::{Adjustment, DifficultyAdjustment};
pub use miner::Miner;
pub use proof_of_work::{Probe, ProofOfWork};
pub use validation::LedgerValidator;
