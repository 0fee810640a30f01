use crate::utils::{hex_encode, sha256_digest};
use std::fmt;

/// Bit length of a SHA-256 digest, the largest meaningful difficulty
pub const HASH_BITS: u32 = 256;

/// One entry of the ledger.
///
/// A block is a scratch object while the miner owns it; once it has been
/// accepted into a ledger it is never mutated again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: u64,
    timestamp: i64,
    data: Vec<u8>,
    hash: Vec<u8>,
    prev_hash: Vec<u8>,
    nonce: i64,
    difficulty: u32,
}

impl Block {
    /// Candidate block about to be mined. The miner assigns the timestamp,
    /// and the first probed nonce is 0.
    pub fn new(index: u64, data: Vec<u8>, prev_hash: Vec<u8>, difficulty: u32) -> Block {
        Block {
            index,
            timestamp: 0,
            data,
            hash: Vec::new(),
            prev_hash,
            nonce: -1,
            difficulty,
        }
    }

    /// Fully populated block, as received from a peer
    pub fn from_parts(
        index: u64,
        timestamp: i64,
        data: Vec<u8>,
        hash: Vec<u8>,
        prev_hash: Vec<u8>,
        nonce: i64,
        difficulty: u32,
    ) -> Block {
        Block {
            index,
            timestamp,
            data,
            hash,
            prev_hash,
            nonce,
            difficulty,
        }
    }

    /// SHA-256 over `index ‖ timestamp ‖ data ‖ prev_hash ‖ difficulty ‖ nonce`,
    /// integers rendered as ASCII decimal.
    pub fn calculate_hash(&self) -> Vec<u8> {
        let mut preimage = Vec::with_capacity(self.data.len() + self.prev_hash.len() + 64);
        preimage.extend(self.index.to_string().as_bytes());
        preimage.extend(self.timestamp.to_string().as_bytes());
        preimage.extend(&self.data);
        preimage.extend(&self.prev_hash);
        preimage.extend(self.difficulty.to_string().as_bytes());
        preimage.extend(self.nonce.to_string().as_bytes());
        sha256_digest(&preimage)
    }

    /// Number of leading zero bits of `hash`, scanning from the most
    /// significant bit of the first byte. An all-zero digest yields its full
    /// bit length.
    pub fn hash_difficulty(hash: &[u8]) -> u32 {
        let mut count = 0;
        for byte in hash {
            if *byte == 0 {
                count += 8;
            } else {
                count += byte.leading_zeros();
                break;
            }
        }
        count
    }

    /// True when the stored hash has at least `difficulty` leading zero bits
    pub fn meets_difficulty(&self) -> bool {
        Self::hash_difficulty(&self.hash) >= self.difficulty
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_data(&self) -> &[u8] {
        &self.data
    }

    pub fn get_hash(&self) -> &[u8] {
        &self.hash
    }

    pub fn get_hash_hex(&self) -> String {
        hex_encode(&self.hash)
    }

    pub fn get_prev_hash(&self) -> &[u8] {
        &self.prev_hash
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub(crate) fn set_difficulty(&mut self, difficulty: u32) {
        self.difficulty = difficulty;
    }

    /// Advance to the next nonce and return the resulting hash without
    /// storing it.
    pub(crate) fn next_hash(&mut self) -> Vec<u8> {
        self.nonce += 1;
        self.calculate_hash()
    }

    pub(crate) fn set_hash(&mut self, hash: Vec<u8>) {
        self.hash = hash;
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index: {}", self.index)?;
        writeln!(f, "Timestamp: {}", self.timestamp)?;
        writeln!(f, "Data: {}", String::from_utf8_lossy(&self.data))?;
        writeln!(f, "Prev hash: {}", hex_encode(&self.prev_hash))?;
        writeln!(f, "Hash: {}", hex_encode(&self.hash))?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        write!(f, "Difficulty: {}", self.difficulty)
    }
}
