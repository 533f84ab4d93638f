//! Error types for the connector.

use thiserror::Error;
use vortex_protocol::{Parameter, ProtocolError};
use vortex_transport::TransportError;

/// Errors returned by [`Connector`](crate::Connector) operations.
///
/// The display strings are the messages shown to the operator.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The transport could not be opened or was lost.
    #[error("can not connect to upper layer: {0}")]
    Transport(#[from] TransportError),

    /// No response arrived within the response timeout.
    #[error("can not connect to upper layer: no response for command {request}")]
    Timeout {
        /// The command that went unanswered.
        request: String,
    },

    /// The response did not match the request.
    #[error("can not connect to upper layer: unexpected response {received:?} for command {request}")]
    ProtocolViolation {
        /// The command that was sent.
        request: String,
        /// The frame that came back.
        received: String,
    },

    /// The operation needs an established session.
    #[error("not connected to upper layer")]
    NotConnected,

    /// A parameter key that the device does not know.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    /// A parameter value the device would reject.
    #[error("invalid value {value:?} for parameter {parameter}")]
    InvalidValue {
        /// The parameter being set.
        parameter: Parameter,
        /// The rejected value.
        value: String,
    },

    /// A frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
