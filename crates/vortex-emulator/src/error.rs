//! Error types for the emulator.

use std::io;
use thiserror::Error;
use vortex_transport::TransportError;

/// Errors returned when starting or stopping the emulator.
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// `open` called while the service thread is running.
    #[error("emulator is already running")]
    AlreadyRunning,

    /// The listening transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The service thread could not be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for emulator operations.
pub type EmulatorResult<T> = Result<T, EmulatorError>;
