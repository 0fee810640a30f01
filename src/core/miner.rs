//! The mining driver.
//!
//! Runs on its own thread, mines one block at a time on top of whatever the
//! ledger tip is, and starts over whenever the sync path replaces the ledger.

use crate::config::Settings;
use crate::core::{Block, Blockchain, DifficultyAdjustment, ProofOfWork};
use crate::error::{LedgerError, Result};
use crate::events::{BlockAnnotation, EventSink, NodeEvent, Severity};
use crate::utils::current_timestamp;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

// Clears the running flag however the mining loop ends, unwinding included
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Miner {
    blockchain: Blockchain,
    settings: Settings,
    events: Arc<dyn EventSink>,
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl Miner {
    pub fn new(blockchain: Blockchain, settings: Settings, events: Arc<dyn EventSink>) -> Self {
        Self {
            blockchain,
            settings,
            events,
            stop: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ask the mining loop to finish after the current nonce probe
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawn the mining loop. The handle yields the number of blocks mined.
    pub fn start_mining(&self) -> Result<JoinHandle<usize>> {
        let miner = self.clone();
        self.running.store(true, Ordering::Release);
        thread::Builder::new()
            .name("miner".to_string())
            .spawn(move || miner.run())
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                LedgerError::Mining(format!("Failed to spawn miner thread: {e}"))
            })
    }

    /// Mine until the safety cap is reached or a stop is requested.
    pub fn run(&self) -> usize {
        self.running.store(true, Ordering::Release);
        let _running = RunningGuard(&self.running);
        self.emit_message("Ledger started!", Severity::Success);

        let mut last_generation = self.blockchain.generation();
        let mut produced = 0;

        while produced < self.settings.max_chain_length && !self.is_stopped() {
            let (snapshot, generation) = self.blockchain.snapshot_with_generation();
            let annotation = if generation != last_generation {
                BlockAnnotation::AfterSync
            } else {
                BlockAnnotation::Extended
            };
            last_generation = generation;

            if snapshot.is_empty() {
                self.events
                    .emit(NodeEvent::DifficultyChanged(self.settings.default_difficulty));
            }

            let Some(block) = self.mine(&snapshot, generation) else {
                continue;
            };
            if self.commit(block, generation, annotation) {
                produced += 1;
            }
        }

        if produced >= self.settings.max_chain_length {
            self.emit_message(
                format!("Mined the maximum of {produced} blocks"),
                Severity::Info,
            );
        }
        self.emit_message("Stopped the ledger!", Severity::Warning);
        produced
    }

    /// Mine one block on top of `ledger`. Returns `None` when the ledger
    /// generation moves away from `generation` or a stop is requested.
    pub fn mine(&self, ledger: &[Block], generation: u64) -> Option<Block> {
        let timestamp = match current_timestamp() {
            Ok(timestamp) => timestamp,
            Err(e) => {
                self.emit_message(e.to_string(), Severity::Error);
                self.stop();
                return None;
            }
        };

        let reference = DifficultyAdjustment::reference_block(ledger, &self.settings);
        let pow = ProofOfWork::new_proof_of_work(ledger.last(), reference, timestamp, &self.settings);
        debug!(
            "Mining block {} at difficulty {}",
            pow.candidate().get_index(),
            pow.difficulty()
        );

        let cancelled = || self.blockchain.generation() != generation || self.is_stopped();
        let events = &self.events;
        pow.run(&cancelled, &mut |difficulty| {
            events.emit(NodeEvent::DifficultyChanged(difficulty))
        })
    }

    /// Append a mined block. Returns false only when the block was built on
    /// a tip that has since been replaced; such an attempt does not count
    /// toward the mining cap.
    fn commit(&self, block: Block, generation: u64, annotation: BlockAnnotation) -> bool {
        let now = match current_timestamp() {
            Ok(now) => now,
            Err(e) => {
                self.emit_message(e.to_string(), Severity::Error);
                return true;
            }
        };

        match self.blockchain.append_block(block.clone(), generation, now) {
            Ok(()) => {
                info!(
                    "Mined block {} ({}, difficulty {})",
                    block.get_index(),
                    block.get_hash_hex(),
                    block.get_difficulty()
                );
                self.events.emit(NodeEvent::BlockMined { block, annotation });
                if let Some((average, recent)) = self.blockchain.block_time_stats(now) {
                    self.events.emit(NodeEvent::AverageBlockTime(average));
                    self.events.emit(NodeEvent::Average10BlockTime(recent));
                }
                true
            }
            Err(LedgerError::StaleTip { .. }) => {
                debug!("Discarding block {} mined on a replaced tip", block.get_index());
                false
            }
            Err(e) => {
                warn!("Locally mined block rejected: {e}");
                self.emit_message(format!("Invalid block:\n{block}"), Severity::Error);
                true
            }
        }
    }

    fn emit_message(&self, text: impl Into<String>, severity: Severity) {
        self.events.emit(NodeEvent::message(text, severity));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::{build_chain, RecordingSink};

    fn easy_settings(cap: usize) -> Settings {
        Settings {
            default_difficulty: 1,
            max_chain_length: cap,
            ..Settings::default()
        }
    }

    #[test]
    fn test_run_stops_at_cap() {
        let settings = easy_settings(3);
        let blockchain = Blockchain::new(&settings);
        let sink = Arc::new(RecordingSink::default());
        let miner = Miner::new(blockchain.clone(), settings, sink.clone());

        assert_eq!(miner.run(), 3);
        assert_eq!(blockchain.len(), 3);
        assert!(!miner.is_running());

        let chain = blockchain.snapshot();
        assert_eq!(chain[0].get_index(), 0);
        assert!(chain[0].get_prev_hash().is_empty());
        assert_eq!(chain[2].get_prev_hash(), chain[1].get_hash());

        let events = sink.events();
        let mined = events
            .iter()
            .filter(|e| matches!(e, NodeEvent::BlockMined { .. }))
            .count();
        assert_eq!(mined, 3);
        assert!(events.contains(&NodeEvent::DifficultyChanged(1)));
        assert!(events
            .iter()
            .any(|e| matches!(e, NodeEvent::AverageBlockTime(_))));
        assert!(matches!(
            events.last(),
            Some(NodeEvent::Message {
                severity: Severity::Warning,
                ..
            })
        ));
    }

    #[test]
    fn test_mine_abandons_on_replacement() {
        let settings = Settings {
            default_difficulty: 256,
            ..easy_settings(1)
        };
        let blockchain = Blockchain::new(&settings);
        let miner = Miner::new(
            blockchain.clone(),
            settings,
            Arc::new(RecordingSink::default()),
        );

        let (snapshot, generation) = blockchain.snapshot_with_generation();
        let worker = {
            let miner = miner.clone();
            thread::spawn(move || miner.mine(&snapshot, generation))
        };

        assert!(blockchain.replace_if_heavier(build_chain(1, 1, current_timestamp().unwrap())));
        assert!(worker.join().unwrap().is_none());
    }

    #[test]
    fn test_stop_ends_run() {
        let settings = Settings {
            default_difficulty: 256,
            ..easy_settings(5)
        };
        let blockchain = Blockchain::new(&settings);
        let miner = Miner::new(blockchain.clone(), settings, Arc::new(RecordingSink::default()));
        let handle = miner.start_mining().unwrap();
        miner.stop();
        assert_eq!(handle.join().unwrap(), 0);
        assert!(blockchain.is_empty());
    }

    #[test]
    fn test_mines_on_top_of_ledger_with_extreme_timestamps() {
        let settings = easy_settings(1);
        let blockchain = Blockchain::new(&settings);
        // Stored without validation; the miner must still cope with it
        assert!(blockchain.replace_if_heavier(build_chain(1, 0, i64::MIN)));
        let sink = Arc::new(RecordingSink::default());
        let miner = Miner::new(blockchain.clone(), settings, sink.clone());

        assert_eq!(miner.run(), 1);
        assert_eq!(blockchain.len(), 2);
        assert!(sink
            .events()
            .contains(&NodeEvent::AverageBlockTime(i64::MAX / 2)));
    }

    #[test]
    fn test_running_flag_clears_when_run_panics() {
        let settings = easy_settings(1);
        let blockchain = Blockchain::new(&settings);
        let sink = |event: NodeEvent| {
            if matches!(event, NodeEvent::DifficultyChanged(_)) {
                panic!("sink failure");
            }
        };
        let miner = Miner::new(blockchain, settings, Arc::new(sink));

        let handle = miner.start_mining().unwrap();
        assert!(handle.join().is_err());
        assert!(!miner.is_running());
    }

    #[test]
    fn test_first_block_after_sync_is_annotated() {
        let settings = easy_settings(1);
        let blockchain = Blockchain::new(&settings);
        let recorded = Arc::new(RecordingSink::default());
        let replaced = Arc::new(AtomicBool::new(false));

        // The miner announces the default difficulty before mining on an empty
        // ledger; a peer chain arrives right at that moment.
        let sink = {
            let blockchain = blockchain.clone();
            let recorded = Arc::clone(&recorded);
            let replaced = Arc::clone(&replaced);
            move |event: NodeEvent| {
                if matches!(event, NodeEvent::DifficultyChanged(_))
                    && !replaced.swap(true, Ordering::SeqCst)
                {
                    let peer_chain = build_chain(2, 1, current_timestamp().unwrap());
                    assert!(blockchain.replace_if_heavier(peer_chain));
                }
                recorded.emit(event);
            }
        };
        let miner = Miner::new(blockchain.clone(), settings, Arc::new(sink));

        assert_eq!(miner.run(), 1);
        assert_eq!(blockchain.len(), 3);

        let mined: Vec<(u64, BlockAnnotation)> = recorded
            .events()
            .into_iter()
            .filter_map(|e| match e {
                NodeEvent::BlockMined { block, annotation } => Some((block.get_index(), annotation)),
                _ => None,
            })
            .collect();
        assert_eq!(mined, vec![(2, BlockAnnotation::AfterSync)]);
    }
}
