//! Peer-to-peer ledger exchange
//!
//! This module moves whole ledgers between nodes over TCP: the exchange
//! format and framing, the fork-choice rule applied to what arrives, the set
//! of connected peers, and the server/client transport itself.

pub mod message;
pub mod peers;
pub mod server;
pub mod sync;

pub use message::{decode_ledger, encode_ledger, read_frame, write_frame, BlockRecord};
pub use peers::PeerSet;
pub use server::Server;
pub use sync::{SyncEngine, SyncOutcome};
