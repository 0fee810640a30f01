//! One ledger node: a ledger, a miner and a transport wired together.
//!
//! Several nodes can live in one process; each takes its own [`Settings`]
//! and its own event sink.

use crate::config::Settings;
use crate::core::{Block, Blockchain, Miner};
use crate::error::{LedgerError, Result};
use crate::events::{EventSink, NodeEvent, Severity};
use crate::network::{Server, SyncEngine, SyncOutcome};
use log::info;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

pub struct LedgerNode {
    settings: Settings,
    blockchain: Blockchain,
    sync: SyncEngine,
    server: Server,
    events: Arc<dyn EventSink>,
    miner: Mutex<Option<Miner>>,
}

impl LedgerNode {
    pub fn new(settings: Settings, events: Arc<dyn EventSink>) -> Result<LedgerNode> {
        settings.validate()?;
        let blockchain = Blockchain::new(&settings);
        let sync = SyncEngine::new(blockchain.clone());
        let server = Server::new(settings.clone(), sync.clone(), Arc::clone(&events));
        Ok(LedgerNode {
            settings,
            blockchain,
            sync,
            server,
            events,
            miner: Mutex::new(None),
        })
    }

    fn lock_miner(&self) -> MutexGuard<'_, Option<Miner>> {
        match self.miner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn snapshot(&self) -> Arc<Vec<Block>> {
        self.blockchain.snapshot()
    }

    /// Feed a payload straight into the fork-choice engine
    pub fn ingest(&self, payload: &[u8]) -> SyncOutcome {
        self.sync.ingest(payload)
    }

    pub fn start_server(&self) -> Result<u16> {
        self.server.start_server()
    }

    pub fn connect_to_peer(&self, port: u16) -> Result<()> {
        self.server.connect_to_peer(port)
    }

    pub fn is_mining(&self) -> bool {
        self.lock_miner()
            .as_ref()
            .map(Miner::is_running)
            .unwrap_or(false)
    }

    /// Start a mining run on its own thread. The handle yields the number of
    /// blocks the run produced.
    pub fn start_mining(&self) -> Result<JoinHandle<usize>> {
        let mut current = self.lock_miner();
        if current.as_ref().is_some_and(Miner::is_running) {
            self.events.emit(NodeEvent::message(
                "Ledger is already being mined!",
                Severity::Warning,
            ));
            return Err(LedgerError::Mining("Mining is already running".to_string()));
        }

        let miner = Miner::new(
            self.blockchain.clone(),
            self.settings.clone(),
            Arc::clone(&self.events),
        );
        let handle = miner.start_mining()?;
        *current = Some(miner);
        Ok(handle)
    }

    pub fn stop_mining(&self) {
        if let Some(miner) = self.lock_miner().as_ref() {
            miner.stop();
        }
    }

    /// Stop mining and close every connection
    pub fn stop(&self) {
        self.stop_mining();
        self.server.stop();
        info!("Node stopped");
    }
}
