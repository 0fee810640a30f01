//! Structural and cryptographic validation of blocks and candidate chains.
//!
//! Validation never re-runs the difficulty adjustment: a block is judged by
//! its own fields, its predecessor, and the clock.

use crate::config::Settings;
use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::utils::hex_encode;

#[derive(Debug, Clone, Copy)]
pub struct LedgerValidator {
    timestamp_slack_ms: i64,
}

impl LedgerValidator {
    pub fn new(timestamp_slack_ms: i64) -> Self {
        Self { timestamp_slack_ms }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.timestamp_slack_ms)
    }

    /// Validate a block that is about to extend a ledger whose last block is `tip`.
    pub fn validate_block(&self, block: &Block, tip: Option<&Block>, now: i64) -> Result<()> {
        self.check_hash(block)?;
        self.check_time_range(block, now)?;

        match tip {
            Some(tip) => {
                self.check_link(tip, block)?;
                self.check_not_too_old(tip, block)
            }
            None if !block.is_genesis() => Err(LedgerError::InvalidBlock(format!(
                "block {} has no predecessor in the ledger",
                block.get_index()
            ))),
            None => Ok(()),
        }
    }

    /// Validate `next` as the direct successor of `prev` inside a candidate chain.
    pub fn validate_transition(&self, prev: &Block, next: &Block, now: i64) -> Result<()> {
        self.check_link(prev, next)?;
        self.check_hash(next)?;
        self.check_time_range(next, now)?;
        self.check_not_too_old(prev, next)?;
        Ok(())
    }

    /// Validate a whole candidate chain, typically one received from a peer.
    pub fn validate_chain(&self, blocks: &[Block], now: i64) -> Result<()> {
        let first = blocks
            .first()
            .ok_or_else(|| LedgerError::InvalidChain("chain is empty".to_string()))?;
        if !first.is_genesis() {
            return Err(LedgerError::InvalidChain(format!(
                "chain starts at index {} instead of 0",
                first.get_index()
            )));
        }

        self.validate_block(first, None, now)
            .map_err(|e| LedgerError::InvalidChain(format!("block 0: {e}")))?;

        for pair in blocks.windows(2) {
            self.validate_transition(&pair[0], &pair[1], now).map_err(|e| {
                LedgerError::InvalidChain(format!("block {}: {e}", pair[1].get_index()))
            })?;
        }
        Ok(())
    }

    fn check_hash(&self, block: &Block) -> Result<()> {
        let recomputed = block.calculate_hash();
        if recomputed != block.get_hash() {
            return Err(LedgerError::InvalidBlock(format!(
                "stored hash {} does not match recomputed {}",
                block.get_hash_hex(),
                hex_encode(&recomputed)
            )));
        }
        if !block.meets_difficulty() {
            return Err(LedgerError::InvalidBlock(format!(
                "hash has {} leading zero bits, difficulty requires {}",
                Block::hash_difficulty(block.get_hash()),
                block.get_difficulty()
            )));
        }
        Ok(())
    }

    // Timestamps are ms since the Unix epoch, never earlier
    fn check_time_range(&self, block: &Block, now: i64) -> Result<()> {
        if block.get_timestamp() < 0 {
            return Err(LedgerError::InvalidBlock(format!(
                "timestamp {} is before the Unix epoch",
                block.get_timestamp()
            )));
        }
        if block.get_timestamp() > now.saturating_add(self.timestamp_slack_ms) {
            return Err(LedgerError::InvalidBlock(format!(
                "timestamp {} is too far in the future (now {now})",
                block.get_timestamp()
            )));
        }
        Ok(())
    }

    fn check_not_too_old(&self, prev: &Block, block: &Block) -> Result<()> {
        if block.get_timestamp() < prev.get_timestamp().saturating_sub(self.timestamp_slack_ms) {
            return Err(LedgerError::InvalidBlock(format!(
                "timestamp {} is too far behind predecessor {}",
                block.get_timestamp(),
                prev.get_timestamp()
            )));
        }
        Ok(())
    }

    fn check_link(&self, prev: &Block, block: &Block) -> Result<()> {
        if block.get_prev_hash() != prev.get_hash() {
            return Err(LedgerError::InvalidBlock(format!(
                "prev hash {} does not match predecessor hash {}",
                hex_encode(block.get_prev_hash()),
                prev.get_hash_hex()
            )));
        }
        if block.get_index() != prev.get_index() + 1 {
            return Err(LedgerError::InvalidBlock(format!(
                "index {} does not follow predecessor index {}",
                block.get_index(),
                prev.get_index()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{build_chain, seal_block};

    const NOW: i64 = 1_700_000_000_000;

    fn validator() -> LedgerValidator {
        LedgerValidator::new(60_000)
    }

    #[test]
    fn test_accepts_single_block_chain() {
        let chain = build_chain(1, 2, NOW);
        assert!(validator().validate_chain(&chain, NOW).is_ok());
    }

    #[test]
    fn test_accepts_long_chain() {
        let chain = build_chain(6, 2, NOW);
        assert!(validator().validate_chain(&chain, NOW).is_ok());
    }

    #[test]
    fn test_rejects_empty_chain() {
        assert!(matches!(
            validator().validate_chain(&[], NOW),
            Err(LedgerError::InvalidChain(_))
        ));
    }

    #[test]
    fn test_rejects_hash_mismatch() {
        let mut chain = build_chain(3, 1, NOW);
        let b = &chain[2];
        chain[2] = Block::from_parts(
            b.get_index(),
            b.get_timestamp(),
            b"tampered".to_vec(),
            b.get_hash().to_vec(),
            b.get_prev_hash().to_vec(),
            b.get_nonce(),
            b.get_difficulty(),
        );
        assert!(validator().validate_chain(&chain, NOW).is_err());
    }

    #[test]
    fn test_rejects_broken_link() {
        let mut chain = build_chain(3, 1, NOW);
        let b = &chain[2];
        chain[2] = seal_block(b.get_index(), b.get_timestamp(), vec![9u8; 32], 1);
        assert!(validator().validate_chain(&chain, NOW).is_err());
    }

    #[test]
    fn test_rejects_index_gap() {
        let chain = build_chain(3, 1, NOW);
        let prev = &chain[1];
        let skipped = seal_block(3, NOW, prev.get_hash().to_vec(), 1);
        let gapped = vec![chain[0].clone(), chain[1].clone(), skipped];
        assert!(validator().validate_chain(&gapped, NOW).is_err());

        let not_from_zero = vec![chain[1].clone(), chain[2].clone()];
        assert!(validator().validate_chain(&not_from_zero, NOW).is_err());
    }

    #[test]
    fn test_rejects_timestamp_outside_tolerance() {
        // Too far in the future
        let future = build_chain(2, 1, NOW + 60_001);
        assert!(validator().validate_chain(&future, NOW).is_err());

        // Exactly at the edge is fine
        let edge = build_chain(2, 1, NOW + 60_000);
        assert!(validator().validate_chain(&edge, NOW).is_ok());

        // Too far behind the predecessor
        let chain = build_chain(1, 1, NOW);
        let stale = seal_block(1, NOW - 60_001, chain[0].get_hash().to_vec(), 1);
        assert!(validator()
            .validate_transition(&chain[0], &stale, NOW)
            .is_err());

        let tolerated = seal_block(1, NOW - 60_000, chain[0].get_hash().to_vec(), 1);
        assert!(validator()
            .validate_transition(&chain[0], &tolerated, NOW)
            .is_ok());
    }

    #[test]
    fn test_rejects_pre_epoch_timestamps() {
        let ancient = build_chain(2, 0, i64::MIN);
        assert!(matches!(
            validator().validate_chain(&ancient, NOW),
            Err(LedgerError::InvalidChain(_))
        ));
        assert!(validator().validate_block(&ancient[0], None, NOW).is_err());

        let genesis = build_chain(1, 0, 0);
        assert!(validator().validate_chain(&genesis, NOW).is_ok());
        let before_epoch = seal_block(1, -1, genesis[0].get_hash().to_vec(), 0);
        assert!(validator()
            .validate_transition(&genesis[0], &before_epoch, NOW)
            .is_err());
    }

    #[test]
    fn test_rejects_unmet_difficulty() {
        // Consistent hash, but it claims the full 256 bits of work
        let mut block = Block::new(0, b"First block".to_vec(), Vec::new(), 256);
        block.set_timestamp(NOW);
        let hash = block.next_hash();
        block.set_hash(hash);
        assert_eq!(block.calculate_hash(), block.get_hash());
        assert!(matches!(
            validator().validate_block(&block, None, NOW),
            Err(LedgerError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_validate_block_against_tip() {
        let chain = build_chain(2, 1, NOW);
        let v = validator();
        assert!(v.validate_block(&chain[0], None, NOW).is_ok());
        assert!(v.validate_block(&chain[1], Some(&chain[0]), NOW).is_ok());
        // Non-genesis block without a tip
        assert!(v.validate_block(&chain[1], None, NOW).is_err());
        // Wrong tip
        assert!(v.validate_block(&chain[1], Some(&chain[1]), NOW).is_err());
        // A second genesis cannot extend a non-empty ledger
        assert!(v.validate_block(&chain[0], Some(&chain[1]), NOW).is_err());
    }
}
