use crate::config::Settings;
use crate::core::Block;
use log::info;
use num_bigint::BigUint;

/// Outcome of comparing one adjustment window against the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Increase,
    Decrease,
    Keep,
}

/// Difficulty rules: window adjustment, current difficulty and the
/// cumulative-difficulty fork-choice metric.
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Compare the elapsed time of a window with the expected one.
    ///
    /// Faster than half the target raises difficulty, slower than twice the
    /// target lowers it.
    pub fn classify(elapsed_ms: i64, expected_ms: i64) -> Adjustment {
        if elapsed_ms < expected_ms / 2 {
            Adjustment::Increase
        } else if elapsed_ms > expected_ms.saturating_mul(2) {
            Adjustment::Decrease
        } else {
            Adjustment::Keep
        }
    }

    pub fn apply(current: u32, adjustment: Adjustment) -> u32 {
        match adjustment {
            Adjustment::Increase => current.saturating_add(1),
            Adjustment::Decrease => current.saturating_sub(1),
            Adjustment::Keep => current,
        }
    }

    /// The block the adjustment window is measured from: `interval` positions
    /// behind the end of the ledger, once the ledger is long enough.
    pub fn reference_block<'a>(ledger: &'a [Block], settings: &Settings) -> Option<&'a Block> {
        let interval = settings.diff_adjust_interval;
        if interval == 0 || ledger.len() < interval {
            return None;
        }
        ledger.get(ledger.len() - interval)
    }

    /// Difficulty of the last block, or the configured default for an empty ledger
    pub fn current_difficulty(ledger: &[Block], settings: &Settings) -> u32 {
        ledger
            .last()
            .map(|block| block.get_difficulty())
            .unwrap_or(settings.default_difficulty)
    }

    /// Σ 2^difficulty over every block
    pub fn cumulative_difficulty(blocks: &[Block]) -> BigUint {
        let mut total = BigUint::from(0u32);
        for block in blocks {
            total += BigUint::from(1u32) << block.get_difficulty();
        }
        total
    }

    pub(crate) fn log_adjustment(index: u64, from: u32, to: u32, elapsed_ms: i64, expected_ms: i64) {
        info!("Difficulty adjustment for block {index}: {from} -> {to} (window: {elapsed_ms}ms, target: {expected_ms}ms)");
    }
}
