use crate::config::Settings;
use crate::error::{LedgerError, Result};
use crate::events::{EventSink, NodeEvent, Severity};
use crate::network::message::{read_frame, write_frame};
use crate::network::peers::PeerSet;
use crate::network::sync::{SyncEngine, SyncOutcome};
use log::{debug, error, info, warn};
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: u64 = 50; // ms

/// TCP transport for ledger exchange.
///
/// The server side accepts any number of inbound peers, ingests what they
/// send without replying, and pushes the local ledger to all of them on a
/// timer. The client side dials a single peer and answers every frame it
/// receives with the local ledger.
pub struct Server {
    settings: Settings,
    sync: SyncEngine,
    events: Arc<dyn EventSink>,
    peers: Arc<PeerSet>,
    shutdown: Arc<AtomicBool>,
    local_addr: Mutex<Option<SocketAddr>>,
    // Write half of the outbound connection, if any
    outbound: Arc<Mutex<Option<TcpStream>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn emit(events: &Arc<dyn EventSink>, text: impl Into<String>, severity: Severity) {
    events.emit(NodeEvent::message(text, severity));
}

impl Server {
    pub fn new(settings: Settings, sync: SyncEngine, events: Arc<dyn EventSink>) -> Self {
        let write_timeout = Duration::from_millis(settings.connect_timeout_ms);
        Self {
            settings,
            sync,
            events,
            peers: Arc::new(PeerSet::new(write_timeout)),
            shutdown: Arc::new(AtomicBool::new(false)),
            local_addr: Mutex::new(None),
            outbound: Arc::new(Mutex::new(None)),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        *lock(&self.local_addr)
    }

    pub fn peers(&self) -> &PeerSet {
        &self.peers
    }

    pub fn is_connected_to_peer(&self) -> bool {
        lock(&self.outbound).is_some()
    }

    /// Bind the listener and start the accept and broadcast threads.
    /// Returns the bound port. A stopped server can be started again.
    pub fn start_server(&self) -> Result<u16> {
        let mut local_addr = lock(&self.local_addr);
        if let Some(addr) = *local_addr {
            emit(&self.events, "Server already running!", Severity::Warning);
            return Ok(addr.port());
        }

        // Threads of an earlier run were joined by `stop`, which holds this lock
        self.shutdown.store(false, Ordering::Release);
        let addr = match self.launch() {
            Ok(addr) => addr,
            Err(e) => {
                error!("{e}");
                emit(&self.events, "Server could not start!", Severity::Error);
                return Err(e);
            }
        };

        info!("Server listening on {addr}");
        emit(
            &self.events,
            format!("Server started on port {}", addr.port()),
            Severity::Success,
        );
        *local_addr = Some(addr);
        Ok(addr.port())
    }

    fn launch(&self) -> Result<SocketAddr> {
        let bind_addr = self.settings.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .map_err(|e| LedgerError::Network(format!("Failed to bind to {bind_addr}: {e}")))?;
        // The accept loop polls so it can notice a shutdown
        listener
            .set_nonblocking(true)
            .map_err(|e| LedgerError::Network(format!("Failed to configure listener: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| LedgerError::Network(format!("Failed to read bound address: {e}")))?;

        let accept = self.spawn_accept_loop(listener)?;
        match self.spawn_broadcast_loop() {
            Ok(broadcast) => {
                lock(&self.handles).extend([accept, broadcast]);
                Ok(addr)
            }
            Err(e) => {
                self.shutdown.store(true, Ordering::Release);
                if accept.join().is_err() {
                    warn!("Accept thread panicked");
                }
                Err(e)
            }
        }
    }

    fn spawn_accept_loop(&self, listener: TcpListener) -> Result<JoinHandle<()>> {
        let sync = self.sync.clone();
        let events = Arc::clone(&self.events);
        let peers = Arc::clone(&self.peers);
        let shutdown = Arc::clone(&self.shutdown);
        let max_message_bytes = self.settings.max_message_bytes;

        thread::Builder::new()
            .name("accept".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Acquire) {
                    match listener.accept() {
                        Ok((stream, peer_addr)) => {
                            if let Err(e) = Self::register_inbound(
                                stream,
                                peer_addr,
                                &sync,
                                &events,
                                &peers,
                                &shutdown,
                                max_message_bytes,
                            ) {
                                warn!("Dropping connection from {peer_addr}: {e}");
                            }
                        }
                        Err(e) if e.kind() == ErrorKind::WouldBlock => {
                            thread::sleep(Duration::from_millis(ACCEPT_POLL_INTERVAL));
                        }
                        Err(e) => {
                            error!("Error accepting connection: {e}");
                            thread::sleep(Duration::from_millis(ACCEPT_POLL_INTERVAL));
                        }
                    }
                }
                debug!("Accept loop finished");
            })
            .map_err(|e| LedgerError::Network(format!("Failed to spawn accept thread: {e}")))
    }

    fn register_inbound(
        stream: TcpStream,
        peer_addr: SocketAddr,
        sync: &SyncEngine,
        events: &Arc<dyn EventSink>,
        peers: &Arc<PeerSet>,
        shutdown: &Arc<AtomicBool>,
        max_message_bytes: usize,
    ) -> Result<()> {
        // Accepted sockets may inherit the listener's non-blocking mode
        stream
            .set_nonblocking(false)
            .map_err(|e| LedgerError::Network(format!("Failed to configure stream: {e}")))?;
        peers.add(peer_addr, &stream)?;
        emit(
            events,
            format!("(S) Client connected: {peer_addr}"),
            Severity::Success,
        );

        let sync = sync.clone();
        let events = Arc::clone(events);
        let peers = Arc::clone(peers);
        let shutdown = Arc::clone(shutdown);
        thread::Builder::new()
            .name(format!("peer-{peer_addr}"))
            .spawn(move || {
                let mut reader = stream;
                loop {
                    match read_frame(&mut reader, max_message_bytes) {
                        Ok(Some(payload)) => {
                            let outcome = sync.ingest(&payload);
                            debug!("Frame from {peer_addr}: {outcome:?}");
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!("Closing connection to {peer_addr}: {e}");
                            break;
                        }
                    }
                }
                if peers.remove(&peer_addr) && !shutdown.load(Ordering::Acquire) {
                    emit(
                        &events,
                        format!("Client {peer_addr} has disconnected!"),
                        Severity::Error,
                    );
                }
            })
            .map_err(|e| {
                LedgerError::Network(format!("Failed to spawn reader for {peer_addr}: {e}"))
            })?;
        Ok(())
    }

    fn spawn_broadcast_loop(&self) -> Result<JoinHandle<()>> {
        let sync = self.sync.clone();
        let events = Arc::clone(&self.events);
        let peers = Arc::clone(&self.peers);
        let shutdown = Arc::clone(&self.shutdown);
        let period = Duration::from_millis(self.settings.ledger_update_ms);

        thread::Builder::new()
            .name("broadcast".to_string())
            .spawn(move || {
                while !shutdown.load(Ordering::Acquire) {
                    thread::sleep(period);
                    // An empty ledger has nothing a peer could adopt
                    if peers.is_empty() || sync.blockchain().is_empty() {
                        continue;
                    }
                    let payload = match sync.current_payload() {
                        Ok(payload) => payload,
                        Err(e) => {
                            error!("Failed to encode ledger: {e}");
                            continue;
                        }
                    };
                    for addr in peers.broadcast(&payload) {
                        emit(
                            &events,
                            format!("Client {addr} has disconnected!"),
                            Severity::Error,
                        );
                    }
                }
                debug!("Broadcast loop finished");
            })
            .map_err(|e| LedgerError::Network(format!("Failed to spawn broadcast thread: {e}")))
    }

    /// Dial `peer_host:port`. Every frame the peer sends is ingested and
    /// answered with the local ledger.
    pub fn connect_to_peer(&self, port: u16) -> Result<()> {
        let mut outbound = lock(&self.outbound);
        if outbound.is_some() {
            emit(&self.events, "Already connected!", Severity::Warning);
            return Err(LedgerError::Network(
                "Already connected to a peer".to_string(),
            ));
        }

        let writer = match self.dial(port) {
            Ok(writer) => writer,
            Err(e) => {
                warn!("{e}");
                emit(&self.events, "Socket could not connect!", Severity::Error);
                return Err(e);
            }
        };
        emit(
            &self.events,
            format!("Socket connected to: {port}"),
            Severity::Success,
        );
        *outbound = Some(writer);
        Ok(())
    }

    // Connects and starts the client thread; returns the write half
    fn dial(&self, port: u16) -> Result<TcpStream> {
        let target = format!("{}:{port}", self.settings.peer_host);
        let addr = target
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| LedgerError::Network(format!("Cannot resolve peer address {target}")))?;

        let timeout = Duration::from_millis(self.settings.connect_timeout_ms);
        let stream = TcpStream::connect_timeout(&addr, timeout)
            .map_err(|e| LedgerError::Network(format!("Failed to connect to {addr}: {e}")))?;
        stream
            .set_write_timeout(Some(timeout))
            .map_err(|e| LedgerError::Network(format!("Failed to set write timeout: {e}")))?;
        let writer = stream
            .try_clone()
            .map_err(|e| LedgerError::Network(format!("Failed to clone stream: {e}")))?;

        let handle = self.spawn_client_loop(stream, addr)?;
        lock(&self.handles).push(handle);
        Ok(writer)
    }

    fn spawn_client_loop(&self, stream: TcpStream, addr: SocketAddr) -> Result<JoinHandle<()>> {
        let sync = self.sync.clone();
        let events = Arc::clone(&self.events);
        let outbound = Arc::clone(&self.outbound);
        let shutdown = Arc::clone(&self.shutdown);
        let max_message_bytes = self.settings.max_message_bytes;

        thread::Builder::new()
            .name("client".to_string())
            .spawn(move || {
                let mut stream = stream;
                loop {
                    let payload = match read_frame(&mut stream, max_message_bytes) {
                        Ok(Some(payload)) => payload,
                        Ok(None) => break,
                        Err(e) => {
                            debug!("Closing connection to {addr}: {e}");
                            break;
                        }
                    };

                    if let SyncOutcome::Replaced { blocks } = sync.ingest(&payload) {
                        debug!("Ledger from {addr} adopted ({blocks} blocks)");
                    }

                    let reply = match sync.current_payload() {
                        Ok(reply) => reply,
                        Err(e) => {
                            error!("Failed to encode ledger: {e}");
                            continue;
                        }
                    };
                    if let Err(e) = write_frame(&mut stream, &reply) {
                        debug!("Reply to {addr} failed: {e}");
                        break;
                    }
                }

                let _ = stream.shutdown(Shutdown::Both);
                lock(&outbound).take();
                if !shutdown.load(Ordering::Acquire) {
                    emit(&events, format!("{addr} has disconnected!"), Severity::Error);
                }
            })
            .map_err(|e| LedgerError::Network(format!("Failed to spawn client thread: {e}")))
    }

    /// Close every connection and wait for the transport threads to finish
    pub fn stop(&self) {
        // Held throughout so a concurrent start waits for the old threads
        let mut local_addr = lock(&self.local_addr);
        self.shutdown.store(true, Ordering::Release);
        self.peers.shutdown_all();
        if let Some(stream) = lock(&self.outbound).take() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        let handles: Vec<JoinHandle<()>> = lock(&self.handles).drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("A transport thread panicked");
            }
        }
        local_addr.take();
        info!("Server stopped");
    }
}
