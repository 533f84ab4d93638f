//! Commands sent from the controller to the upper layer.
//!
//! Commands fall into a few groups:
//! - Version, info and status queries (`VX?...`)
//! - Parameter set commands (`VX!<PARAM> <value>`)
//! - Transfer control (`VX!START`, `VX!STOP`)
//! - Bulk data (`VX!DATA <len> <bytes>`)

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framer::{encode_variable, variable_body, DELIMITER};
use bytes::Bytes;
use std::fmt;

/// Modem parameters that can be written with a set command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parameter {
    /// Modem identifier (`VX!ID`), decimal.
    Id,
    /// Modem name (`VX!NAME`), one word.
    Name,
    /// Operating mode (`VX!MODE`), e.g. `Auto` or `Manual`.
    Mode,
    /// Robustness class (`VX!ROB`), a single letter.
    Robustness,
    /// Modulation (`VX!MDL`), e.g. `QPSK` or `QAM16`.
    Modulation,
    /// Code rate (`VX!RATE`), e.g. `1/2`.
    Rate,
    /// Block size (`VX!BLOCKSIZE`), decimal.
    BlockSize,
    /// Transaction size (`VX!TRANSSIZE`), decimal.
    TransSize,
    /// Transmit power level (`VX!POWERLEVEL`), decimal.
    PowerLevel,
}

impl Parameter {
    /// Every parameter, in the order a full resynchronization sends them.
    pub const ALL: [Parameter; 9] = [
        Parameter::Id,
        Parameter::Name,
        Parameter::Mode,
        Parameter::Robustness,
        Parameter::Modulation,
        Parameter::Rate,
        Parameter::BlockSize,
        Parameter::TransSize,
        Parameter::PowerLevel,
    ];

    /// Get the wire tag of the set command.
    pub fn tag(&self) -> &'static str {
        match self {
            Parameter::Id => TAG_ID,
            Parameter::Name => TAG_NAME,
            Parameter::Mode => TAG_MODE,
            Parameter::Robustness => TAG_ROB,
            Parameter::Modulation => TAG_MDL,
            Parameter::Rate => TAG_RATE,
            Parameter::BlockSize => TAG_BLOCK_SIZE,
            Parameter::TransSize => TAG_TRANS_SIZE,
            Parameter::PowerLevel => TAG_POWER_LEVEL,
        }
    }

    /// Get the key the controller uses for this parameter.
    pub fn key(&self) -> &'static str {
        match self {
            Parameter::Id => "id",
            Parameter::Name => "name",
            Parameter::Mode => "mode",
            Parameter::Robustness => "rob",
            Parameter::Modulation => "mdl",
            Parameter::Rate => "rate",
            Parameter::BlockSize => "blockSize",
            Parameter::TransSize => "transSize",
            Parameter::PowerLevel => "powerLevel",
        }
    }

    /// Parse a parameter from its controller key.
    pub fn from_key(key: &str) -> Option<Parameter> {
        Parameter::ALL.into_iter().find(|p| p.key() == key)
    }

    /// Parse a parameter from its wire tag.
    pub fn from_tag(tag: &str) -> Option<Parameter> {
        Parameter::ALL.into_iter().find(|p| p.tag() == tag)
    }

    /// Check that `value` fits the syntax the device accepts for this parameter.
    pub fn accepts(&self, value: &str) -> bool {
        let word = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_');
        let number = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
        match self {
            Parameter::Id | Parameter::BlockSize | Parameter::TransSize | Parameter::PowerLevel => {
                number(value)
            }
            Parameter::Name | Parameter::Mode | Parameter::Modulation => word(value),
            Parameter::Robustness => value.chars().count() == 1 && word(value),
            Parameter::Rate => !value.is_empty() && value.chars().all(|c| c.is_ascii_digit() || c == '/'),
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Commands that can be sent to the upper layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ========== Queries ==========
    /// Read the upper layer version.
    QueryUpperVersion,

    /// Read the lower layer version.
    QueryLowerVersion,

    /// Read transfer progress and link quality.
    QueryInfo,

    /// Read the statistics table.
    QueryStat,

    /// Read the image balance bitmap.
    QueryImageBalance,

    // ========== Parameters ==========
    /// Set a modem parameter.
    Set {
        /// The parameter to write.
        parameter: Parameter,
        /// The value, sent upper-cased.
        value: String,
    },

    // ========== Transfer ==========
    /// Start transmitting the uploaded data.
    Start,

    /// Stop the transfer.
    Stop,

    /// One chunk of bulk data.
    Data(Bytes),
}

impl Command {
    /// Build a set command from any displayable value.
    pub fn set(parameter: Parameter, value: impl fmt::Display) -> Command {
        Command::Set {
            parameter,
            value: value.to_string(),
        }
    }

    /// Get the wire tag of this command.
    pub fn tag(&self) -> &'static str {
        match self {
            Command::QueryUpperVersion => QUERY_UPPER_VERSION,
            Command::QueryLowerVersion => QUERY_LOWER_VERSION,
            Command::QueryInfo => QUERY_INFO,
            Command::QueryStat => QUERY_STAT,
            Command::QueryImageBalance => QUERY_IMAGE_BALANCE,
            Command::Set { parameter, .. } => parameter.tag(),
            Command::Start => TAG_START,
            Command::Stop => TAG_STOP,
            Command::Data(_) => TAG_DATA,
        }
    }

    /// Encode the command, including the trailing delimiter.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Command::Set { parameter, value } => {
                format!("{} {}\n", parameter.tag(), value.to_uppercase()).into_bytes()
            }
            Command::Data(body) => encode_variable(TAG_DATA, body),
            other => format!("{}\n", other.tag()).into_bytes(),
        }
    }

    /// Parse one complete frame into a command.
    ///
    /// Exactly one variant is produced per frame; the caller dispatches once.
    pub fn parse(frame: &[u8]) -> ProtocolResult<Command> {
        if frame.starts_with(TAG_DATA.as_bytes()) {
            let body = variable_body(frame, TAG_DATA)?;
            return Ok(Command::Data(Bytes::copy_from_slice(body)));
        }

        let line = frame
            .strip_suffix(&[DELIMITER])
            .ok_or(ProtocolError::Unterminated)?;
        let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8("command"))?;
        let (tag, arg) = match line.split_once(' ') {
            Some((tag, arg)) => (tag, Some(arg)),
            None => (line, None),
        };

        let bare = |command: Command| match arg {
            None => Ok(command),
            Some(extra) => Err(ProtocolError::InvalidArgument {
                tag: command.tag(),
                value: extra.to_string(),
            }),
        };

        match tag {
            QUERY_UPPER_VERSION => bare(Command::QueryUpperVersion),
            QUERY_LOWER_VERSION => bare(Command::QueryLowerVersion),
            QUERY_INFO => bare(Command::QueryInfo),
            QUERY_STAT => bare(Command::QueryStat),
            QUERY_IMAGE_BALANCE => bare(Command::QueryImageBalance),
            TAG_START => bare(Command::Start),
            TAG_STOP => bare(Command::Stop),
            _ => {
                let parameter =
                    Parameter::from_tag(tag).ok_or_else(|| ProtocolError::UnknownTag(tag.to_string()))?;
                let value = arg.ok_or(ProtocolError::MissingArgument(parameter.tag()))?;
                if !parameter.accepts(value) {
                    return Err(ProtocolError::InvalidArgument {
                        tag: parameter.tag(),
                        value: value.to_string(),
                    });
                }
                Ok(Command::Set {
                    parameter,
                    value: value.to_string(),
                })
            }
        }
    }
}
