//! Ledger exchange format and stream framing.
//!
//! A ledger travels as one JSON object keyed by the zero-padded block index.
//! Each record carries the block fields with binary values in standard
//! base64. On the wire every payload is prefixed with its length as a 4-byte
//! big-endian integer.

use crate::core::{Block, HASH_BITS};
use crate::error::{LedgerError, Result};
use crate::utils::{base64_decode, base64_encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{ErrorKind, Read, Write};

/// Width of the zero-padded index keys
const INDEX_KEY_WIDTH: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRecord {
    pub index: u64,
    pub timestamp: i64,
    pub data: String,
    pub hash: String,
    #[serde(rename = "prevHash")]
    pub prev_hash: String,
    pub nonce: i64,
    pub difficulty: u32,
}

impl From<&Block> for BlockRecord {
    fn from(block: &Block) -> Self {
        BlockRecord {
            index: block.get_index(),
            timestamp: block.get_timestamp(),
            data: base64_encode(block.get_data()),
            hash: base64_encode(block.get_hash()),
            prev_hash: base64_encode(block.get_prev_hash()),
            nonce: block.get_nonce(),
            difficulty: block.get_difficulty(),
        }
    }
}

impl TryFrom<BlockRecord> for Block {
    type Error = LedgerError;

    fn try_from(record: BlockRecord) -> Result<Block> {
        if record.difficulty > HASH_BITS {
            return Err(LedgerError::MalformedPayload(format!(
                "block {} declares difficulty {} above {HASH_BITS}",
                record.index, record.difficulty
            )));
        }
        Ok(Block::from_parts(
            record.index,
            record.timestamp,
            base64_decode(&record.data)?,
            base64_decode(&record.hash)?,
            base64_decode(&record.prev_hash)?,
            record.nonce,
            record.difficulty,
        ))
    }
}

fn index_key(index: u64) -> String {
    format!("{index:0width$}", width = INDEX_KEY_WIDTH)
}

/// Serialize a ledger into the exchange format
pub fn encode_ledger(blocks: &[Block]) -> Result<Vec<u8>> {
    let records: BTreeMap<String, BlockRecord> = blocks
        .iter()
        .map(|block| (index_key(block.get_index()), BlockRecord::from(block)))
        .collect();
    serde_json::to_vec(&records).map_err(|e| LedgerError::Serialization(e.to_string()))
}

/// Parse a peer payload back into blocks.
///
/// Keys are walked in sorted order and the indices must run 0, 1, 2, ...
/// without gaps. Anything else is a malformed payload; whether the blocks
/// actually chain together is left to the validator.
pub fn decode_ledger(payload: &[u8]) -> Result<Vec<Block>> {
    if payload.is_empty() {
        return Err(LedgerError::MalformedPayload("empty payload".to_string()));
    }

    let records: BTreeMap<String, BlockRecord> = serde_json::from_slice(payload)?;
    if records.is_empty() {
        return Err(LedgerError::MalformedPayload(
            "payload holds no blocks".to_string(),
        ));
    }

    let mut blocks = Vec::with_capacity(records.len());
    for (position, (key, record)) in records.into_iter().enumerate() {
        let expected = position as u64;
        if record.index != expected || key.parse::<u64>().ok() != Some(expected) {
            return Err(LedgerError::MalformedPayload(format!(
                "entry {key:?} with index {} where index {expected} was expected",
                record.index
            )));
        }
        blocks.push(Block::try_from(record)?);
    }
    Ok(blocks)
}

/// Write one length-prefixed frame
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| {
        LedgerError::Serialization(format!("payload of {} bytes is too large", payload.len()))
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// Returns `Ok(None)` when the stream ends cleanly before a new frame.
/// Zero-length and oversize frames are errors; the caller closes the
/// connection.
pub fn read_frame<R: Read>(reader: &mut R, max_message_bytes: usize) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(LedgerError::Network(format!("Failed to read frame: {e}"))),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > max_message_bytes {
        return Err(LedgerError::Network(format!(
            "Refusing frame of {len} bytes (limit {max_message_bytes})"
        )));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .map_err(|e| LedgerError::Network(format!("Truncated frame: {e}")))?;
    Ok(Some(payload))
}
