//! Command framing for the Vortex byte stream.
//!
//! The stream mixes two framing disciplines:
//!
//! - **Fixed commands** are text terminated by `\n`.
//! - **Variable commands** (`VX!DATA`, `VX!STAT`, `VX!IMBL`) carry a binary body
//!   that may itself contain `\n`, so the body length is declared up front:
//!
//! ```text
//! +-----+---+--------------+---+------------------+----+
//! | TAG | ' ' | decimal len | ' ' | body[0..len]   | \n |
//! +-----+---+--------------+---+------------------+----+
//! ```
//!
//! The variable prefixes are checked before falling back to delimiter scanning.

use crate::error::{ProtocolError, ProtocolResult};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::ops::Deref;

/// Delimiter terminating every command.
pub const DELIMITER: u8 = b'\n';

/// Tags of commands whose body length is declared in a header field.
pub const VARIABLE_PREFIXES: [&[u8]; 3] = [b"VX!DATA", b"VX!STAT", b"VX!IMBL"];

/// Initial capacity of the accumulation buffer.
const INITIAL_CAPACITY: usize = 4096;

/// One complete command carved out of the stream, delimiter included.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Frame(Bytes);

impl Frame {
    /// Wrap bytes that are already known to form a single command.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Frame(bytes.into())
    }

    /// The raw bytes of the frame.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the frame and return its bytes.
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PartialEq<[u8]> for Frame {
    fn eq(&self, other: &[u8]) -> bool {
        self.0 == other
    }
}

impl PartialEq<&[u8]> for Frame {
    fn eq(&self, other: &&[u8]) -> bool {
        self.0 == *other
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bodies are often binary; escape them so logs stay on one line.
        write!(f, "Frame(\"{}\")", self.0.escape_ascii())
    }
}

/// Outcome of inspecting a variable-command header.
enum Header {
    /// Fewer than two spaces buffered so far.
    Incomplete,
    /// Total frame length: header, body and delimiter.
    Length(usize),
    /// Non-numeric length field; drop this many bytes to resynchronize.
    Malformed(usize),
}

/// Stateful accumulator that turns arbitrary chunks into complete frames.
///
/// A frame is never emitted before all of its bytes are buffered, so chunk
/// boundaries may fall anywhere, including inside a header or a binary body.
#[derive(Debug)]
pub struct CommandFramer {
    /// Bytes received but not yet carved into frames.
    buffer: BytesMut,
    /// Total length of the variable frame in progress, 0 when none.
    pending: usize,
}

impl Default for CommandFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        CommandFramer {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            pending: 0,
        }
    }

    /// Append `chunk` and return every frame that is now complete, in order.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            if self.pending > 0 {
                if self.buffer.len() < self.pending {
                    break;
                }
                let frame = self.buffer.split_to(self.pending).freeze();
                self.pending = 0;
                if frame.last() != Some(&DELIMITER) {
                    log::debug!("variable frame does not end with a delimiter: {:?}", Frame(frame.clone()));
                }
                frames.push(Frame(frame));
                continue;
            }

            if let Some(prefix) = self.variable_prefix() {
                match self.parse_header() {
                    Header::Incomplete => break,
                    Header::Length(total) => {
                        log::trace!(
                            "{} header announces a {} byte frame",
                            String::from_utf8_lossy(prefix),
                            total
                        );
                        self.pending = total;
                    }
                    Header::Malformed(skip) => {
                        log::warn!(
                            "dropping malformed {} header: {:?}",
                            String::from_utf8_lossy(prefix),
                            self.buffer[..skip].escape_ascii().to_string()
                        );
                        self.buffer.advance(skip);
                    }
                }
                continue;
            }

            match self.buffer.iter().position(|&b| b == DELIMITER) {
                Some(end) => {
                    let frame = self.buffer.split_to(end + 1).freeze();
                    frames.push(Frame(frame));
                }
                None => break,
            }
        }

        frames
    }

    /// The variable prefix the buffer starts with, if any.
    fn variable_prefix(&self) -> Option<&'static [u8]> {
        VARIABLE_PREFIXES
            .iter()
            .copied()
            .find(|p| self.buffer.starts_with(p))
    }

    /// Inspect `TAG SP len SP` at the head of the buffer.
    fn parse_header(&self) -> Header {
        let Some(first) = self.buffer.iter().position(|&b| b == b' ') else {
            return Header::Incomplete;
        };
        let Some(second) = self.buffer[first + 1..]
            .iter()
            .position(|&b| b == b' ')
            .map(|offset| first + 1 + offset)
        else {
            return Header::Incomplete;
        };

        let declared = std::str::from_utf8(&self.buffer[first + 1..second])
            .ok()
            .and_then(|field| field.parse::<usize>().ok());

        // Body, header through the second space, and the trailing delimiter.
        match declared.and_then(|len| len.checked_add(second + 2)) {
            Some(total) => Header::Length(total),
            None => Header::Malformed(second + 1),
        }
    }

    /// Whether a variable frame has been announced but not fully received.
    pub fn is_pending(&self) -> bool {
        self.pending > 0
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes and any frame in progress.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.pending = 0;
    }
}

/// Encode a variable command: `TAG SP len SP body LF`.
pub fn encode_variable(tag: &str, body: &[u8]) -> Vec<u8> {
    let header = format!("{} {} ", tag, body.len());
    let mut buf = Vec::with_capacity(header.len() + body.len() + 1);
    buf.extend_from_slice(header.as_bytes());
    buf.extend_from_slice(body);
    buf.push(DELIMITER);
    buf
}

/// Extract the body of a complete variable frame tagged `tag`.
pub fn variable_body<'a>(frame: &'a [u8], tag: &'static str) -> ProtocolResult<&'a [u8]> {
    let rest = frame
        .strip_prefix(tag.as_bytes())
        .and_then(|r| r.strip_prefix(b" "))
        .ok_or(ProtocolError::MissingArgument(tag))?;
    let space = rest
        .iter()
        .position(|&b| b == b' ')
        .ok_or(ProtocolError::MalformedLength(tag))?;
    let declared: usize = std::str::from_utf8(&rest[..space])
        .ok()
        .and_then(|field| field.parse().ok())
        .ok_or(ProtocolError::MalformedLength(tag))?;

    let body = &rest[space + 1..];
    match body.split_last() {
        Some((&DELIMITER, body)) if body.len() == declared => Ok(body),
        Some((&DELIMITER, body)) => Err(ProtocolError::LengthMismatch {
            tag,
            declared,
            actual: body.len(),
        }),
        _ => Err(ProtocolError::Unterminated),
    }
}
