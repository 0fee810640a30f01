//! Events the engine publishes to whatever presents it.
//!
//! The engine only knows the [`EventSink`] trait. The CLI uses [`LogSink`];
//! tests and embedders usually take a [`ChannelSink`] and read the receiver.

use crate::core::Block;
use log::{error, info, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;

/// How prominently a message should be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// Context attached to a freshly mined block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockAnnotation {
    /// Mined on top of our own previous block
    Extended,
    /// First block mined after the ledger was replaced by a peer's chain
    AfterSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    BlockMined {
        block: Block,
        annotation: BlockAnnotation,
    },
    Message {
        text: String,
        severity: Severity,
    },
    /// Average time per block over the whole ledger, in milliseconds
    AverageBlockTime(i64),
    /// Average time per block over the last 10 blocks, in milliseconds
    Average10BlockTime(i64),
    DifficultyChanged(u32),
}

impl NodeEvent {
    pub fn message(text: impl Into<String>, severity: Severity) -> Self {
        NodeEvent::Message {
            text: text.into(),
            severity,
        }
    }
}

/// Receiver of engine events. Implementations must not block for long:
/// the miner emits from its own thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: NodeEvent);
}

impl<F> EventSink for F
where
    F: Fn(NodeEvent) + Send + Sync,
{
    fn emit(&self, event: NodeEvent) {
        self(event)
    }
}

/// Writes every event to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: NodeEvent) {
        match event {
            NodeEvent::BlockMined { block, annotation } => match annotation {
                BlockAnnotation::Extended => info!("Block mined:\n{block}"),
                BlockAnnotation::AfterSync => info!("Block mined after ledger sync:\n{block}"),
            },
            NodeEvent::Message { text, severity } => match severity {
                Severity::Info | Severity::Success => info!("{text}"),
                Severity::Warning => warn!("{text}"),
                Severity::Error => error!("{text}"),
            },
            NodeEvent::AverageBlockTime(ms) => info!("Average block time: {ms} ms"),
            NodeEvent::Average10BlockTime(ms) => info!("Average block time (last 10): {ms} ms"),
            NodeEvent::DifficultyChanged(difficulty) => info!("Difficulty: {difficulty}"),
        }
    }
}

/// Forwards events into an mpsc channel. Events emitted after the receiver
/// is dropped are discarded.
pub struct ChannelSink {
    sender: Mutex<Sender<NodeEvent>>,
}

impl ChannelSink {
    pub fn new() -> (ChannelSink, Receiver<NodeEvent>) {
        let (sender, receiver) = mpsc::channel();
        (
            ChannelSink {
                sender: Mutex::new(sender),
            },
            receiver,
        )
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: NodeEvent) {
        let sender = match self.sender.lock() {
            Ok(sender) => sender,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = sender.send(event);
    }
}
