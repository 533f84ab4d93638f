//! Error types for the transport.

use std::io;
use thiserror::Error;

/// Errors returned by [`Transport`](crate::Transport) operations.
///
/// Socket timeouts inside the workers never surface here; they are retried on
/// the next cycle. A lost peer is handled by the workers as well and shows up
/// as [`TransportError::Closed`] once a client transport has torn down.
#[derive(Debug, Error)]
pub enum TransportError {
    /// `open` or `set_address` called on an open transport.
    #[error("connection is already opened")]
    AlreadyOpen,

    /// `read` or `write` called on a closed transport.
    #[error("connection is closed")]
    Closed,

    /// The configured host did not resolve to any socket address.
    #[error("can not resolve address {host}:{port}")]
    AddressResolution {
        /// Configured host.
        host: String,
        /// Configured port.
        port: u16,
    },

    /// I/O error while allocating the socket or spawning a worker.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
