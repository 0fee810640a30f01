// This is the in-memory ledger that the miner and the sync path share.
// The chain lives behind an Arc so readers take a cheap snapshot, and a
// replacement swaps the whole Arc in one step under the write lock.

use crate::config::Settings;
use crate::core::{Block, DifficultyAdjustment, LedgerValidator};
use crate::error::{LedgerError, Result};
use log::info;
use num_bigint::BigUint;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Number of trailing blocks the short-window average covers
const RECENT_WINDOW: usize = 10;

struct LedgerState {
    blocks: Arc<Vec<Block>>,
    // Bumped on every wholesale replacement, never on appends
    generation: u64,
}

#[derive(Clone)]
pub struct Blockchain {
    state: Arc<RwLock<LedgerState>>,
    // Mirror of `LedgerState::generation` so the miner can poll it without locking
    generation: Arc<AtomicU64>,
    validator: LedgerValidator,
}

impl Blockchain {
    // I start every node with an empty ledger; the first block is mined or synced
    pub fn new(settings: &Settings) -> Blockchain {
        Blockchain {
            state: Arc::new(RwLock::new(LedgerState {
                blocks: Arc::new(Vec::new()),
                generation: 0,
            })),
            generation: Arc::new(AtomicU64::new(0)),
            validator: LedgerValidator::from_settings(settings),
        }
    }

    // When I already have a chain (tests, tooling) I still validate it first
    pub fn from_chain(settings: &Settings, blocks: Vec<Block>, now: i64) -> Result<Blockchain> {
        let blockchain = Self::new(settings);
        if !blocks.is_empty() {
            blockchain.validator.validate_chain(&blocks, now)?;
            blockchain.write_state().blocks = Arc::new(blocks);
        }
        Ok(blockchain)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LedgerState> {
        match self.state.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, LedgerState> {
        match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn validator(&self) -> LedgerValidator {
        self.validator
    }

    /// Consistent view of the chain; later appends or replacements never
    /// change a snapshot already handed out.
    pub fn snapshot(&self) -> Arc<Vec<Block>> {
        Arc::clone(&self.read_state().blocks)
    }

    /// Snapshot together with the generation it belongs to
    pub fn snapshot_with_generation(&self) -> (Arc<Vec<Block>>, u64) {
        let state = self.read_state();
        (Arc::clone(&state.blocks), state.generation)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.read_state().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().blocks.is_empty()
    }

    pub fn tip(&self) -> Option<Block> {
        self.read_state().blocks.last().cloned()
    }

    pub fn current_difficulty(&self, settings: &Settings) -> u32 {
        DifficultyAdjustment::current_difficulty(&self.read_state().blocks, settings)
    }

    pub fn cumulative_difficulty(&self) -> BigUint {
        DifficultyAdjustment::cumulative_difficulty(&self.read_state().blocks)
    }

    /// Append a freshly mined block.
    ///
    /// `expected_generation` is the generation the miner read before it
    /// started; if a replacement happened since, the block was built on a
    /// stale tip and is refused.
    pub fn append_block(&self, block: Block, expected_generation: u64, now: i64) -> Result<()> {
        let mut state = self.write_state();
        if state.generation != expected_generation {
            return Err(LedgerError::StaleTip {
                expected: expected_generation,
                actual: state.generation,
            });
        }

        self.validator
            .validate_block(&block, state.blocks.last(), now)?;

        Arc::make_mut(&mut state.blocks).push(block);
        Ok(())
    }

    /// Fork choice: swap in `candidate` iff its cumulative difficulty is
    /// strictly greater than ours. The candidate must already be validated.
    pub fn replace_if_heavier(&self, candidate: Vec<Block>) -> bool {
        let incoming = DifficultyAdjustment::cumulative_difficulty(&candidate);

        let mut state = self.write_state();
        let local = DifficultyAdjustment::cumulative_difficulty(&state.blocks);
        if incoming <= local {
            return false;
        }

        info!(
            "Replacing ledger: {} blocks (work {local}) -> {} blocks (work {incoming})",
            state.blocks.len(),
            candidate.len()
        );
        state.blocks = Arc::new(candidate);
        state.generation += 1;
        self.generation.store(state.generation, Ordering::Release);
        true
    }

    /// Average time per block since the genesis block and over the last
    /// ten blocks, measured up to `now`.
    pub fn block_time_stats(&self, now: i64) -> Option<(i64, i64)> {
        let state = self.read_state();
        let blocks = &state.blocks;
        let first = blocks.first()?;
        let len = blocks.len();

        let average = now.saturating_sub(first.get_timestamp()) / len as i64;

        let recent_start = len.saturating_sub(RECENT_WINDOW);
        let recent_average =
            now.saturating_sub(blocks[recent_start].get_timestamp()) / (len - recent_start) as i64;

        Some((average, recent_average))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{build_chain, mine_on};

    const NOW: i64 = 1_700_000_000_000;

    fn settings() -> Settings {
        Settings {
            default_difficulty: 1,
            ..Settings::default()
        }
    }

    #[test]
    fn test_new_ledger_is_empty() {
        let blockchain = Blockchain::new(&settings());
        assert!(blockchain.is_empty());
        assert_eq!(blockchain.len(), 0);
        assert!(blockchain.tip().is_none());
        assert_eq!(blockchain.generation(), 0);
        assert_eq!(blockchain.current_difficulty(&settings()), 1);
        assert_eq!(blockchain.cumulative_difficulty(), BigUint::from(0u32));
        assert!(blockchain.block_time_stats(NOW).is_none());
    }

    #[test]
    fn test_append_extends_tip() {
        let blockchain = Blockchain::new(&settings());
        let genesis = mine_on(None, NOW, 1);
        blockchain.append_block(genesis.clone(), 0, NOW).unwrap();
        let next = mine_on(Some(&genesis), NOW + 1, 1);
        blockchain.append_block(next.clone(), 0, NOW + 1).unwrap();

        assert_eq!(blockchain.len(), 2);
        assert_eq!(blockchain.tip().unwrap(), next);
        // Appends do not count as replacements
        assert_eq!(blockchain.generation(), 0);
    }

    #[test]
    fn test_append_rejects_invalid_block() {
        let blockchain = Blockchain::new(&settings());
        let genesis = mine_on(None, NOW, 1);
        let orphan = mine_on(Some(&genesis), NOW, 1);
        assert!(matches!(
            blockchain.append_block(orphan, 0, NOW),
            Err(LedgerError::InvalidBlock(_))
        ));
        assert!(blockchain.is_empty());
    }

    #[test]
    fn test_append_after_replacement_is_stale() {
        let blockchain = Blockchain::new(&settings());
        let (_, generation) = blockchain.snapshot_with_generation();

        assert!(blockchain.replace_if_heavier(build_chain(2, 1, NOW)));
        assert_eq!(blockchain.generation(), generation + 1);

        let stale = mine_on(None, NOW, 1);
        assert!(matches!(
            blockchain.append_block(stale, generation, NOW),
            Err(LedgerError::StaleTip { .. })
        ));
        assert_eq!(blockchain.len(), 2);
    }

    #[test]
    fn test_fork_choice_requires_strictly_more_work() {
        let blockchain = Blockchain::from_chain(&settings(), build_chain(3, 2, NOW), NOW).unwrap();

        // Equal work: 3 * 2^2 == 3 * 2^2
        assert!(!blockchain.replace_if_heavier(build_chain(3, 2, NOW + 5)));
        // Less work
        assert!(!blockchain.replace_if_heavier(build_chain(2, 2, NOW)));
        // One heavier block beats three lighter ones: 2^4 > 3 * 2^2
        assert!(blockchain.replace_if_heavier(build_chain(1, 4, NOW)));
        assert_eq!(blockchain.len(), 1);
        assert_eq!(blockchain.generation(), 1);
    }

    #[test]
    fn test_snapshot_is_stable_across_replacement() {
        let blockchain = Blockchain::from_chain(&settings(), build_chain(2, 1, NOW), NOW).unwrap();
        let before = blockchain.snapshot();
        assert!(blockchain.replace_if_heavier(build_chain(4, 1, NOW)));
        assert_eq!(before.len(), 2);
        assert_eq!(blockchain.snapshot().len(), 4);
    }

    #[test]
    fn test_from_chain_rejects_invalid() {
        let mut chain = build_chain(3, 1, NOW);
        chain.remove(1);
        assert!(Blockchain::from_chain(&settings(), chain, NOW).is_err());
    }

    #[test]
    fn test_block_time_stats() {
        let mut chain = Vec::new();
        let mut prev: Option<Block> = None;
        for i in 0..12 {
            let block = mine_on(prev.as_ref(), NOW + i * 1_000, 1);
            chain.push(block.clone());
            prev = Some(block);
        }
        let blockchain = Blockchain::from_chain(&settings(), chain, NOW + 20_000).unwrap();

        let (average, recent) = blockchain.block_time_stats(NOW + 12_000).unwrap();
        // 12 blocks since NOW
        assert_eq!(average, 12_000 / 12);
        // Last 10 blocks start at NOW + 2_000
        assert_eq!(recent, 10_000 / 10);
    }

    #[test]
    fn test_block_time_stats_saturate_on_extreme_timestamps() {
        // replace_if_heavier trusts its caller, so nothing stops this ledger here
        let blockchain = Blockchain::new(&settings());
        assert!(blockchain.replace_if_heavier(build_chain(2, 0, i64::MIN)));
        let (average, recent) = blockchain.block_time_stats(NOW).unwrap();
        assert_eq!(average, i64::MAX / 2);
        assert_eq!(recent, i64::MAX / 2);
    }
}
