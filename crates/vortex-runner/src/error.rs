//! Error types for the runner.

use thiserror::Error;
use vortex_connector::ConnectorError;
use vortex_emulator::EmulatorError;

/// Errors that end a `vortex` invocation.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Connector(#[from] ConnectorError),

    #[error("emulator error: {0}")]
    Emulator(#[from] EmulatorError),

    #[error("invalid assignment {0:?}, expected key=value")]
    InvalidAssignment(String),

    #[error("invalid watch interval {0} s")]
    InvalidInterval(f64),

    #[error("can not install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
