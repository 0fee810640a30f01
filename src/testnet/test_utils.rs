//! Test utilities for ledger testing

use crate::core::Block;
use crate::events::{EventSink, NodeEvent};
use std::sync::Mutex;

/// Mine a block with an explicit timestamp and predecessor hash.
///
/// Data follows the miner's convention so blocks look like mined ones.
pub fn seal_block(index: u64, timestamp: i64, prev_hash: Vec<u8>, difficulty: u32) -> Block {
    let data = if index == 0 {
        b"First block".to_vec()
    } else {
        format!("Block {index}").into_bytes()
    };
    let mut block = Block::new(index, data, prev_hash, difficulty);
    block.set_timestamp(timestamp);
    loop {
        let hash = block.next_hash();
        if Block::hash_difficulty(&hash) >= difficulty {
            block.set_hash(hash);
            return block;
        }
    }
}

/// Mine the successor of `prev`, or a genesis block
pub fn mine_on(prev: Option<&Block>, timestamp: i64, difficulty: u32) -> Block {
    match prev {
        Some(prev) => seal_block(
            prev.get_index() + 1,
            timestamp,
            prev.get_hash().to_vec(),
            difficulty,
        ),
        None => seal_block(0, timestamp, Vec::new(), difficulty),
    }
}

/// A valid chain of `len` blocks, all at `difficulty` and stamped `timestamp`
pub fn build_chain(len: usize, difficulty: u32, timestamp: i64) -> Vec<Block> {
    let mut chain: Vec<Block> = Vec::with_capacity(len);
    for _ in 0..len {
        let block = mine_on(chain.last(), timestamp, difficulty);
        chain.push(block);
    }
    chain
}

/// Event sink that keeps everything it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<NodeEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<NodeEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: NodeEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProofOfWork;

    #[test]
    fn test_build_chain_links_blocks() {
        let chain = build_chain(4, 2, 1_000);
        assert_eq!(chain.len(), 4);
        for (position, block) in chain.iter().enumerate() {
            assert_eq!(block.get_index(), position as u64);
            assert!(ProofOfWork::validate(block));
        }
        for pair in chain.windows(2) {
            assert_eq!(pair[1].get_prev_hash(), pair[0].get_hash());
        }
        assert!(chain[0].get_prev_hash().is_empty());
    }
}
