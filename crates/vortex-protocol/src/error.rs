//! Error types for the Vortex protocol grammar.

use thiserror::Error;

/// Errors that can occur when parsing commands and responses.
///
/// The framer never returns these: malformed framing input is recovered by
/// resynchronizing the stream. They come from [`Command::parse`] and
/// [`Response::parse`] once a complete frame is in hand.
///
/// [`Command::parse`]: crate::Command::parse
/// [`Response::parse`]: crate::Response::parse
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame does not start with a known tag.
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// The frame is not terminated by the delimiter byte.
    #[error("frame is not newline terminated")]
    Unterminated,

    /// A required argument is missing.
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),

    /// An argument could not be interpreted.
    #[error("invalid argument for {tag}: {value}")]
    InvalidArgument {
        /// Tag of the command or response.
        tag: &'static str,
        /// The offending text.
        value: String,
    },

    /// The length field of a variable command is not a decimal number.
    #[error("malformed length field in {0}")]
    MalformedLength(&'static str),

    /// The declared length disagrees with the bytes present in the frame.
    #[error("length mismatch in {tag}: declared {declared}, got {actual}")]
    LengthMismatch {
        /// Tag of the variable command.
        tag: &'static str,
        /// Length announced in the header.
        declared: usize,
        /// Number of body bytes actually present.
        actual: usize,
    },

    /// A text field is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
