use crate::config::Settings;
use crate::core::difficulty::{Adjustment, DifficultyAdjustment};
use crate::core::Block;
use log::debug;

/// Result of trying a single nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// The hash produced by this nonce meets the candidate's difficulty
    pub solved: bool,
    /// Set when the difficulty adjustment fired on this probe
    pub difficulty_changed: Option<u32>,
}

/// Nonce search for one candidate block.
///
/// The candidate timestamp is fixed when the search is created, so every
/// probe sees the same adjustment window.
pub struct ProofOfWork {
    block: Block,
    reference_timestamp: Option<i64>,
    expected_window_ms: i64,
}

impl ProofOfWork {
    /// Build the candidate that extends `prev` (or the genesis block when
    /// `prev` is `None`). `reference` is the block the adjustment window
    /// starts from, if the ledger is long enough to have one.
    pub fn new_proof_of_work(
        prev: Option<&Block>,
        reference: Option<&Block>,
        timestamp: i64,
        settings: &Settings,
    ) -> ProofOfWork {
        let mut block = match prev {
            Some(prev) => {
                let index = prev.get_index() + 1;
                Block::new(
                    index,
                    format!("Block {index}").into_bytes(),
                    prev.get_hash().to_vec(),
                    prev.get_difficulty(),
                )
            }
            None => Block::new(
                0,
                b"First block".to_vec(),
                Vec::new(),
                settings.default_difficulty,
            ),
        };
        block.set_timestamp(timestamp);

        ProofOfWork {
            block,
            reference_timestamp: reference.map(|b| b.get_timestamp()),
            expected_window_ms: settings.expected_window_ms(),
        }
    }

    pub fn candidate(&self) -> &Block {
        &self.block
    }

    pub fn difficulty(&self) -> u32 {
        self.block.get_difficulty()
    }

    /// Try the next nonce. The adjustment is applied before hashing so the
    /// hash always commits to the difficulty it is checked against.
    pub fn probe(&mut self) -> Probe {
        let difficulty_changed = self.adjust_difficulty();

        let hash = self.block.next_hash();
        let solved = Block::hash_difficulty(&hash) >= self.block.get_difficulty();
        if solved {
            self.block.set_hash(hash);
        }

        Probe {
            solved,
            difficulty_changed,
        }
    }

    /// Fires at most once per search: the reference is consumed when the
    /// window is outside the tolerated range.
    fn adjust_difficulty(&mut self) -> Option<u32> {
        let reference_timestamp = self.reference_timestamp?;
        let elapsed = self.block.get_timestamp().saturating_sub(reference_timestamp);
        let adjustment = DifficultyAdjustment::classify(elapsed, self.expected_window_ms);
        if adjustment == Adjustment::Keep {
            return None;
        }

        let from = self.block.get_difficulty();
        let to = DifficultyAdjustment::apply(from, adjustment);
        self.block.set_difficulty(to);
        self.reference_timestamp = None;
        DifficultyAdjustment::log_adjustment(
            self.block.get_index(),
            from,
            to,
            elapsed,
            self.expected_window_ms,
        );
        Some(to)
    }

    /// Search until a nonce satisfies the difficulty, or until `cancelled`
    /// returns true. `cancelled` is polled before every probe.
    pub fn run(
        mut self,
        cancelled: &dyn Fn() -> bool,
        on_difficulty_change: &mut dyn FnMut(u32),
    ) -> Option<Block> {
        loop {
            if cancelled() {
                debug!(
                    "Abandoning block {} after nonce {}",
                    self.block.get_index(),
                    self.block.get_nonce()
                );
                return None;
            }
            let probe = self.probe();
            if let Some(difficulty) = probe.difficulty_changed {
                on_difficulty_change(difficulty);
            }
            if probe.solved {
                return Some(self.block);
            }
        }
    }

    /// Check that a block's hash recomputes and carries the work it claims
    pub fn validate(block: &Block) -> bool {
        block.calculate_hash() == block.get_hash() && block.meets_difficulty()
    }
}
