//! Responses sent from the upper layer back to the controller.
//!
//! Responses are either:
//! - The acknowledgment `VX!OK` for set and control commands
//! - Version strings: `VX!UVER <ver>`, `VX!LVER <ver>`
//! - The info line: `VX!INFO <progress> <datarate> <ber> <bler>`
//! - Length-prefixed blobs: `VX!STAT <len> <text>`, `VX!IMBL <len> <bitmap>`

use crate::constants::*;
use crate::error::{ProtocolError, ProtocolResult};
use crate::framer::{encode_variable, variable_body, DELIMITER};
use bytes::Bytes;

/// Progress and link quality reported by `VX!INFO`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InfoReport {
    /// Transfer progress in percent (0-100).
    pub progress: u8,
    /// Data rate in bit/s.
    pub datarate: f64,
    /// Bit error rate.
    pub ber: f64,
    /// Block error rate.
    pub bler: f64,
}

impl InfoReport {
    /// Parse the four whitespace-separated fields of an info line.
    ///
    /// Format: "progress datarate ber bler" (e.g., "42 1200.5 2.30e-04 1.10e-02")
    pub fn parse(fields: &str) -> ProtocolResult<InfoReport> {
        let parts: Vec<&str> = fields.split(' ').collect();
        if parts.len() != 4 {
            return Err(ProtocolError::InvalidArgument {
                tag: TAG_INFO,
                value: fields.to_string(),
            });
        }

        let invalid = |value: &str| ProtocolError::InvalidArgument {
            tag: TAG_INFO,
            value: value.to_string(),
        };

        let progress: u8 = parts[0].parse().map_err(|_| invalid(parts[0]))?;
        if progress > 100 {
            return Err(invalid(parts[0]));
        }
        let datarate: f64 = parts[1].parse().map_err(|_| invalid(parts[1]))?;
        let ber: f64 = parts[2].parse().map_err(|_| invalid(parts[2]))?;
        let bler: f64 = parts[3].parse().map_err(|_| invalid(parts[3]))?;

        Ok(InfoReport {
            progress,
            datarate,
            ber,
            bler,
        })
    }

    /// Format the fields the way the device prints them.
    pub fn to_fields(&self) -> String {
        format!(
            "{} {:.1} {:.2e} {:.2e}",
            self.progress, self.datarate, self.ber, self.bler
        )
    }
}

/// Parsed response from the upper layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Acknowledgment of a set or control command.
    Ok,

    /// Upper layer version string.
    UpperVersion(String),

    /// Lower layer version string.
    LowerVersion(String),

    /// Progress and link quality.
    Info(InfoReport),

    /// Statistics table text.
    Stat(String),

    /// Image balance bitmap, one byte per block.
    ImageBalance(Bytes),
}

impl Response {
    /// Get the wire tag of this response.
    pub fn tag(&self) -> &'static str {
        match self {
            Response::Ok => TAG_OK,
            Response::UpperVersion(_) => TAG_UPPER_VERSION,
            Response::LowerVersion(_) => TAG_LOWER_VERSION,
            Response::Info(_) => TAG_INFO,
            Response::Stat(_) => TAG_STAT,
            Response::ImageBalance(_) => TAG_IMAGE_BALANCE,
        }
    }

    /// Encode the response, including the trailing delimiter.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Response::Ok => ACK_FRAME.to_vec(),
            Response::UpperVersion(v) | Response::LowerVersion(v) => {
                format!("{} {}\n", self.tag(), v).into_bytes()
            }
            Response::Info(report) => format!("{} {}\n", TAG_INFO, report.to_fields()).into_bytes(),
            Response::Stat(text) => encode_variable(TAG_STAT, text.as_bytes()),
            Response::ImageBalance(bitmap) => encode_variable(TAG_IMAGE_BALANCE, bitmap),
        }
    }

    /// Parse one complete frame into a response.
    pub fn parse(frame: &[u8]) -> ProtocolResult<Response> {
        if frame.starts_with(TAG_STAT.as_bytes()) {
            let body = variable_body(frame, TAG_STAT)?;
            let text = std::str::from_utf8(body).map_err(|_| ProtocolError::InvalidUtf8(TAG_STAT))?;
            return Ok(Response::Stat(text.to_string()));
        }
        if frame.starts_with(TAG_IMAGE_BALANCE.as_bytes()) {
            let body = variable_body(frame, TAG_IMAGE_BALANCE)?;
            return Ok(Response::ImageBalance(Bytes::copy_from_slice(body)));
        }

        let line = frame
            .strip_suffix(&[DELIMITER])
            .ok_or(ProtocolError::Unterminated)?;
        let line = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8("response"))?;
        let (tag, arg) = match line.split_once(' ') {
            Some((tag, arg)) => (tag, Some(arg)),
            None => (line, None),
        };

        match (tag, arg) {
            (TAG_OK, None) => Ok(Response::Ok),
            (TAG_UPPER_VERSION, Some(v)) => Ok(Response::UpperVersion(v.to_string())),
            (TAG_LOWER_VERSION, Some(v)) => Ok(Response::LowerVersion(v.to_string())),
            (TAG_INFO, Some(fields)) => Ok(Response::Info(InfoReport::parse(fields)?)),
            (TAG_UPPER_VERSION, None) => Err(ProtocolError::MissingArgument(TAG_UPPER_VERSION)),
            (TAG_LOWER_VERSION, None) => Err(ProtocolError::MissingArgument(TAG_LOWER_VERSION)),
            (TAG_INFO, None) => Err(ProtocolError::MissingArgument(TAG_INFO)),
            (TAG_OK, Some(extra)) => Err(ProtocolError::InvalidArgument {
                tag: TAG_OK,
                value: extra.to_string(),
            }),
            _ => Err(ProtocolError::UnknownTag(tag.to_string())),
        }
    }
}
