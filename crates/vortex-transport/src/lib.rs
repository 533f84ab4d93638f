//! Threaded TCP transport for the Vortex control link.
//!
//! A transport is either a [`TcpServer`] that serves one peer at a time or a
//! [`TcpClient`] that connects to one. Both run a reader and a writer thread
//! behind unbounded queues:
//!
//! - [`Transport::write`] splits bytes into chunks of at most [`PACKET_SIZE`]
//!   and queues them without waiting on the network.
//! - [`Transport::read`] hands out received chunks in arrival order;
//!   [`Transport::read_chunk`] also tells which peer generation sent them.
//!
//! Losing the peer is handled by the workers: a server goes back to listening,
//! a client closes for good and reports [`TransportError::Closed`] afterwards.

mod error;
mod link;
mod transport;

pub use error::{TransportError, TransportResult};
pub use link::{AfterLoss, Attach, ClientLink, Link, Role, ServerLink};
pub use transport::{
    describe_metrics, metric_names, Chunk, TcpClient, TcpServer, Transport, DEFAULT_HOST, DEFAULT_PORT,
    PACKET_SIZE, SOCKET_TIMEOUT,
};
