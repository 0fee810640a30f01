use crate::error::{LedgerError, Result};
use crate::network::message::write_frame;
use log::{debug, info};
use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Inbound peers that receive the periodic ledger broadcast.
///
/// Each entry owns the write half of the peer's stream; the reader thread
/// for that peer works on its own clone of the socket.
pub struct PeerSet {
    inner: RwLock<HashMap<SocketAddr, TcpStream>>,
    write_timeout: Duration,
}

impl PeerSet {
    pub fn new(write_timeout: Duration) -> PeerSet {
        PeerSet {
            inner: RwLock::new(HashMap::new()),
            write_timeout,
        }
    }

    fn read_inner(&self) -> RwLockReadGuard<'_, HashMap<SocketAddr, TcpStream>> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, HashMap<SocketAddr, TcpStream>> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Track a peer. Returns false if the address is already known.
    pub fn add(&self, addr: SocketAddr, stream: &TcpStream) -> Result<bool> {
        let writer = stream
            .try_clone()
            .map_err(|e| LedgerError::Network(format!("Failed to clone stream for {addr}: {e}")))?;
        writer
            .set_write_timeout(Some(self.write_timeout))
            .map_err(|e| LedgerError::Network(format!("Failed to set write timeout: {e}")))?;

        let mut inner = self.write_inner();
        if inner.contains_key(&addr) {
            return Ok(false);
        }
        inner.insert(addr, writer);
        info!("Connected to peer: {addr}");
        Ok(true)
    }

    pub fn remove(&self, addr: &SocketAddr) -> bool {
        let removed = self.write_inner().remove(addr);
        if let Some(stream) = removed {
            let _ = stream.shutdown(Shutdown::Both);
            info!("Disconnected from peer: {addr}");
            return true;
        }
        false
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.read_inner().contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.read_inner().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_inner().is_empty()
    }

    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.read_inner().keys().copied().collect()
    }

    /// Write `payload` as one frame to every peer. Peers whose write fails
    /// are dropped and returned.
    pub fn broadcast(&self, payload: &[u8]) -> Vec<SocketAddr> {
        let mut inner = self.write_inner();
        let failed: Vec<SocketAddr> = inner
            .iter_mut()
            .filter_map(|(addr, stream)| match write_frame(stream, payload) {
                Ok(()) => None,
                Err(e) => {
                    debug!("Broadcast to {addr} failed: {e}");
                    Some(*addr)
                }
            })
            .collect();

        for addr in &failed {
            if let Some(stream) = inner.remove(addr) {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
        failed
    }

    /// Close every tracked stream
    pub fn shutdown_all(&self) {
        for (addr, stream) in self.write_inner().drain() {
            let _ = stream.shutdown(Shutdown::Both);
            debug!("Closed connection to {addr}");
        }
    }
}
