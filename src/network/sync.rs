//! Fork choice for ledgers received from peers.
//!
//! A received ledger replaces ours only when it decodes, validates, and
//! carries strictly more cumulative work. Rejections are never reported back
//! to the peer.

use crate::core::{Blockchain, DifficultyAdjustment, LedgerValidator};
use crate::error::Result;
use crate::network::message::{decode_ledger, encode_ledger};
use crate::utils::current_timestamp;
use log::{debug, info};

/// What happened to one received payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The local ledger was replaced by the received one
    Replaced { blocks: usize },
    /// Received ledger was valid but not heavier than ours
    Kept,
    /// Payload could not be decoded
    Malformed(String),
    /// Payload decoded but the chain failed validation
    Invalid(String),
}

#[derive(Clone)]
pub struct SyncEngine {
    blockchain: Blockchain,
    validator: LedgerValidator,
}

impl SyncEngine {
    pub fn new(blockchain: Blockchain) -> Self {
        let validator = blockchain.validator();
        Self {
            blockchain,
            validator,
        }
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    /// Ingest a payload, judging timestamps against the wall clock
    pub fn ingest(&self, payload: &[u8]) -> SyncOutcome {
        match current_timestamp() {
            Ok(now) => self.ingest_at(payload, now),
            Err(e) => SyncOutcome::Invalid(e.to_string()),
        }
    }

    pub fn ingest_at(&self, payload: &[u8], now: i64) -> SyncOutcome {
        let candidate = match decode_ledger(payload) {
            Ok(blocks) => blocks,
            Err(e) => {
                debug!("Dropping malformed ledger payload: {e}");
                return SyncOutcome::Malformed(e.to_string());
            }
        };

        if let Err(e) = self.validator.validate_chain(&candidate, now) {
            debug!("Dropping invalid ledger of {} blocks: {e}", candidate.len());
            return SyncOutcome::Invalid(e.to_string());
        }

        let blocks = candidate.len();
        let incoming = DifficultyAdjustment::cumulative_difficulty(&candidate);
        if self.blockchain.replace_if_heavier(candidate) {
            info!("Adopted peer ledger of {blocks} blocks (work {incoming})");
            SyncOutcome::Replaced { blocks }
        } else {
            debug!("Keeping local ledger, peer work {incoming} is not greater");
            SyncOutcome::Kept
        }
    }

    /// The local ledger in exchange format
    pub fn current_payload(&self) -> Result<Vec<u8>> {
        encode_ledger(&self.blockchain.snapshot())
    }
}
