//! Threaded connection with a reader and a writer worker.
//!
//! An open [`Transport`] owns two OS threads. The reader pulls chunks of at
//! most [`PACKET_SIZE`] bytes off the socket into the inbound queue, the
//! writer drains the outbound queue onto the socket. Callers only touch the
//! queues, so `read` and `write` never wait on the network.
//!
//! The socket is replaced or torn down only while both direction guards are
//! held, always locked read guard first. A peer epoch counter lets the writer
//! detect that the peer it failed on has already been replaced, and tags every
//! received [`Chunk`] so callers can tell one peer's bytes from the next.

use crate::error::{TransportError, TransportResult};
use crate::link::{AfterLoss, Attach, ClientLink, Link, Role, ServerLink};
use bytes::Bytes;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, info_span, trace, warn, Span};

/// Largest chunk moved through the socket at once.
pub const PACKET_SIZE: usize = 1024;

/// Bound on every blocking socket operation and queue wait in the workers.
pub const SOCKET_TIMEOUT: Duration = Duration::from_secs(1);

/// Host used until `set_address` is called.
pub const DEFAULT_HOST: &str = "localhost";

/// Port used until `set_address` is called.
pub const DEFAULT_PORT: u16 = 10204;

/// Pause of the reader while the transport has no socket.
const IDLE_INTERVAL: Duration = Duration::from_millis(50);

/// Metric names recorded by the workers.
pub mod metric_names {
    /// Bytes received from the peer.
    pub const RX_BYTES: &str = "vortex.transport.rx_bytes";
    /// Bytes sent to the peer.
    pub const TX_BYTES: &str = "vortex.transport.tx_bytes";
    /// Number of times the peer was lost.
    pub const PEER_LOST: &str = "vortex.transport.peer_lost";
}

/// Register descriptions of the transport metrics with the installed recorder.
pub fn describe_metrics() {
    metrics::describe_counter!(
        metric_names::RX_BYTES,
        metrics::Unit::Bytes,
        "Bytes received from the peer"
    );
    metrics::describe_counter!(
        metric_names::TX_BYTES,
        metrics::Unit::Bytes,
        "Bytes sent to the peer"
    );
    metrics::describe_counter!(
        metric_names::PEER_LOST,
        metrics::Unit::Count,
        "Connections lost to a closed, reset or failing peer"
    );
}

/// Server-role transport: listens and serves one peer at a time.
pub type TcpServer = Transport<ServerLink>;

/// Client-role transport: connects to a listening peer.
pub type TcpClient = Transport<ClientLink>;

/// Bytes received from one peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    /// Peer generation the bytes came from, see [`Transport::peer_generation`].
    pub generation: u64,
    /// Received bytes, empty when the read timed out.
    pub data: Bytes,
}

/// Why a worker gave up on the current peer.
#[derive(Debug)]
enum PeerLoss {
    /// Orderly shutdown, zero bytes received or written.
    Closed,
    /// Reset or any other OS error.
    Failed(io::Error),
}

impl fmt::Display for PeerLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerLoss::Closed => f.write_str("peer closed the connection"),
            PeerLoss::Failed(e) => write!(f, "connection failed: {}", e),
        }
    }
}

/// State shared by the owning transport and its two workers.
struct Shared<L> {
    stop: AtomicBool,
    opened: AtomicBool,
    peer_epoch: AtomicU64,
    read_guard: Mutex<()>,
    write_guard: Mutex<()>,
    link: RwLock<Option<L>>,
}

impl<L: Link> Shared<L> {
    fn new() -> Self {
        Shared {
            stop: AtomicBool::new(false),
            opened: AtomicBool::new(false),
            peer_epoch: AtomicU64::new(0),
            read_guard: Mutex::new(()),
            write_guard: Mutex::new(()),
            link: RwLock::new(None),
        }
    }

    fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Drop the current peer. Both direction guards must be held.
    fn lose_peer(&self, reason: &PeerLoss) {
        let mut slot = self.link.write();
        let after = match slot.as_ref() {
            Some(link) => link.drop_peer(),
            None => return,
        };
        self.peer_epoch.fetch_add(1, Ordering::AcqRel);
        metrics::counter!(metric_names::PEER_LOST, "role" => L::ROLE.as_str()).increment(1);

        match after {
            AfterLoss::Listening => info!("{}, waiting for a new peer", reason),
            AfterLoss::Finished => {
                if let Some(link) = slot.take() {
                    link.shutdown();
                }
                self.opened.store(false, Ordering::Release);
                info!("{}, connection closed", reason);
            }
        }
    }

    /// Drop the peer the writer failed on, unless it was already replaced.
    fn lose_peer_from_writer(&self, epoch: u64, reason: &PeerLoss) {
        let _read = self.read_guard.lock();
        let _write = self.write_guard.lock();
        if self.peer_epoch.load(Ordering::Acquire) == epoch {
            self.lose_peer(reason);
        } else {
            debug!("writer failure on a peer that is already gone: {}", reason);
        }
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
    )
}

/// Threaded TCP connection, generic over the socket role.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use vortex_transport::TcpClient;
///
/// let mut client = TcpClient::new();
/// client.set_address("localhost", 10204)?;
/// client.open()?;
/// client.write(b"VX?UVER\n")?;
/// let reply = client.read(Duration::from_secs(5))?;
/// println!("{:?}", reply);
/// client.close();
/// # Ok::<(), vortex_transport::TransportError>(())
/// ```
pub struct Transport<L: Link> {
    host: String,
    port: u16,
    shared: Arc<Shared<L>>,
    inbound_tx: Sender<Chunk>,
    inbound_rx: Receiver<Chunk>,
    outbound_tx: Sender<Bytes>,
    outbound_rx: Receiver<Bytes>,
    workers: Vec<JoinHandle<()>>,
}

impl<L: Link> Transport<L> {
    /// Create a closed transport for the default endpoint.
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
        Transport {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            shared: Arc::new(Shared::new()),
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx,
            workers: Vec::new(),
        }
    }

    /// Role of this transport.
    pub fn role(&self) -> Role {
        L::ROLE
    }

    /// Host the next `open` will use.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the next `open` will use.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Set the endpoint for the next `open`.
    pub fn set_address(&mut self, host: impl Into<String>, port: u16) -> TransportResult<()> {
        if self.is_opened() {
            return Err(TransportError::AlreadyOpen);
        }
        self.host = host.into();
        self.port = port;
        Ok(())
    }

    /// Check if the transport is open.
    ///
    /// A client transport reports closed as soon as its peer is lost.
    pub fn is_opened(&self) -> bool {
        self.shared.opened.load(Ordering::Acquire)
    }

    /// Allocate the socket and start both workers.
    pub fn open(&mut self) -> TransportResult<()> {
        if self.is_opened() {
            return Err(TransportError::AlreadyOpen);
        }
        // A client that lost its peer still has idle workers around.
        self.stop_workers();

        while self.inbound_rx.try_recv().is_ok() {}
        while self.outbound_rx.try_recv().is_ok() {}

        let addr = self.resolve()?;
        let link = L::open(addr, SOCKET_TIMEOUT)?;
        let local = link.local_addr()?;

        self.shared.stop.store(false, Ordering::Release);
        *self.shared.link.write() = Some(link);
        self.shared.opened.store(true, Ordering::Release);

        let span = info_span!("transport", role = %L::ROLE, addr = %addr);
        if let Err(e) = self.spawn_workers(&span) {
            self.close();
            return Err(e.into());
        }

        span.in_scope(|| info!(local = %local, "connection opened"));
        Ok(())
    }

    fn resolve(&self) -> TransportResult<SocketAddr> {
        let unresolved = || TransportError::AddressResolution {
            host: self.host.clone(),
            port: self.port,
        };
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|_| unresolved())?
            .next()
            .ok_or_else(unresolved)
    }

    fn spawn_workers(&mut self, span: &Span) -> io::Result<()> {
        let shared = Arc::clone(&self.shared);
        let inbound = self.inbound_tx.clone();
        let reader_span = span.clone();
        let reader = thread::Builder::new()
            .name(format!("vortex-{}-reader", L::ROLE))
            .spawn(move || {
                let _entered = reader_span.enter();
                reader_loop(&shared, &inbound);
            })?;
        self.workers.push(reader);

        let shared = Arc::clone(&self.shared);
        let outbound = self.outbound_rx.clone();
        let writer_span = span.clone();
        let writer = thread::Builder::new()
            .name(format!("vortex-{}-writer", L::ROLE))
            .spawn(move || {
                let _entered = writer_span.enter();
                writer_loop(&shared, &outbound);
            })?;
        self.workers.push(writer);
        Ok(())
    }

    /// Queue `data` for sending, split into chunks of at most [`PACKET_SIZE`].
    pub fn write(&self, data: &[u8]) -> TransportResult<()> {
        if !self.is_opened() {
            return Err(TransportError::Closed);
        }
        for chunk in data.chunks(PACKET_SIZE) {
            self.outbound_tx
                .send(Bytes::copy_from_slice(chunk))
                .map_err(|_| TransportError::Closed)?;
        }
        Ok(())
    }

    /// Counter bumped every time a peer is attached or lost.
    pub fn peer_generation(&self) -> u64 {
        self.shared.peer_epoch.load(Ordering::Acquire)
    }

    /// Take the next received chunk, waiting up to `timeout`.
    ///
    /// A zero timeout polls. Returns an empty chunk when nothing arrived.
    pub fn read(&self, timeout: Duration) -> TransportResult<Bytes> {
        self.read_chunk(timeout).map(|chunk| chunk.data)
    }

    /// Like [`read`](Self::read), keeping the generation of the sending peer.
    ///
    /// A timed-out read carries the current generation.
    pub fn read_chunk(&self, timeout: Duration) -> TransportResult<Chunk> {
        if !self.is_opened() {
            return Err(TransportError::Closed);
        }
        let received = if timeout.is_zero() {
            match self.inbound_rx.try_recv() {
                Ok(chunk) => Some(chunk),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return Err(TransportError::Closed),
            }
        } else {
            match self.inbound_rx.recv_timeout(timeout) {
                Ok(chunk) => Some(chunk),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            }
        };
        Ok(received.unwrap_or_else(|| Chunk {
            generation: self.peer_generation(),
            data: Bytes::new(),
        }))
    }

    /// Shut the socket down and join both workers. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        {
            let _read = self.shared.read_guard.lock();
            let _write = self.shared.write_guard.lock();
            if let Some(link) = self.shared.link.write().take() {
                link.shutdown();
                info!(role = %L::ROLE, host = %self.host, port = self.port, "connection closed");
            }
            self.shared.opened.store(false, Ordering::Release);
        }
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!(role = %L::ROLE, "transport worker panicked");
            }
        }
    }
}

impl Transport<ServerLink> {
    /// Check if a peer is currently connected.
    pub fn has_connection(&self) -> bool {
        self.shared.link.read().as_ref().is_some_and(|link| link.has_peer())
    }

    /// Address the server is listening on, once open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared
            .link
            .read()
            .as_ref()
            .and_then(|link| link.local_addr().ok())
    }
}

impl<L: Link> Default for Transport<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Link> Drop for Transport<L> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<L: Link> fmt::Debug for Transport<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("role", &L::ROLE)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("opened", &self.is_opened())
            .finish()
    }
}

/// What one reader cycle produced.
enum ReadCycle {
    Idle,
    Nothing,
    Received { len: usize, generation: u64 },
    Lost(PeerLoss),
}

fn read_cycle<L: Link>(shared: &Shared<L>, buf: &mut [u8]) -> ReadCycle {
    let slot = shared.link.read();
    let Some(link) = slot.as_ref() else {
        return ReadCycle::Idle;
    };

    match link.accept_if_needed() {
        Ok(Attach::Ready) => {}
        Ok(Attach::Accepted(remote)) => {
            shared.peer_epoch.fetch_add(1, Ordering::AcqRel);
            info!(peer = %remote, "peer connected");
            return ReadCycle::Nothing;
        }
        Ok(Attach::Waiting) => return ReadCycle::Nothing,
        Err(e) => {
            warn!("accept failed: {}", e);
            return ReadCycle::Nothing;
        }
    }

    match link.receive(buf) {
        Ok(0) => ReadCycle::Lost(PeerLoss::Closed),
        Ok(len) => ReadCycle::Received {
            len,
            generation: shared.peer_epoch.load(Ordering::Acquire),
        },
        Err(e) if is_timeout(&e) => ReadCycle::Nothing,
        Err(e) => ReadCycle::Lost(PeerLoss::Failed(e)),
    }
}

fn reader_loop<L: Link>(shared: &Shared<L>, inbound: &Sender<Chunk>) {
    let mut buf = vec![0u8; PACKET_SIZE];
    debug!("reader started");

    while !shared.should_stop() {
        let read_guard = shared.read_guard.lock();
        match read_cycle(shared, &mut buf) {
            ReadCycle::Idle => {
                drop(read_guard);
                thread::sleep(IDLE_INTERVAL);
            }
            ReadCycle::Nothing => {}
            ReadCycle::Received { len, generation } => {
                drop(read_guard);
                trace!(len, generation, "received chunk");
                metrics::counter!(metric_names::RX_BYTES, "role" => L::ROLE.as_str()).increment(len as u64);
                let chunk = Chunk {
                    generation,
                    data: Bytes::copy_from_slice(&buf[..len]),
                };
                if inbound.send(chunk).is_err() {
                    break;
                }
            }
            ReadCycle::Lost(reason) => {
                let _write_guard = shared.write_guard.lock();
                shared.lose_peer(&reason);
            }
        }
    }

    debug!("reader stopped");
}

/// Send all of `chunk`, retrying the unsent remainder after timeouts.
fn flush<L: Link>(link: &L, chunk: &[u8], stop: &AtomicBool) -> Option<PeerLoss> {
    let mut sent = 0;
    while sent < chunk.len() {
        match link.send(&chunk[sent..]) {
            Ok(0) => return Some(PeerLoss::Closed),
            Ok(n) => sent += n,
            Err(e) if is_timeout(&e) => {
                if stop.load(Ordering::Acquire) {
                    debug!(unsent = chunk.len() - sent, "dropping chunk on shutdown");
                    return None;
                }
            }
            Err(e) => return Some(PeerLoss::Failed(e)),
        }
    }
    None
}

fn writer_loop<L: Link>(shared: &Shared<L>, outbound: &Receiver<Bytes>) {
    debug!("writer started");

    while !shared.should_stop() {
        let chunk = match outbound.recv_timeout(SOCKET_TIMEOUT) {
            Ok(chunk) => chunk,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let write_guard = shared.write_guard.lock();
        let epoch = shared.peer_epoch.load(Ordering::Acquire);
        let failure = {
            let slot = shared.link.read();
            match slot.as_ref() {
                Some(link) => flush(link, &chunk, &shared.stop),
                None => {
                    debug!(len = chunk.len(), "no socket, dropping chunk");
                    None
                }
            }
        };
        drop(write_guard);

        match failure {
            Some(reason) => shared.lose_peer_from_writer(epoch, &reason),
            None => {
                trace!(len = chunk.len(), "sent chunk");
                metrics::counter!(metric_names::TX_BYTES, "role" => L::ROLE.as_str())
                    .increment(chunk.len() as u64);
            }
        }
    }

    debug!("writer stopped");
}
