//! Device-side state and command dispatch.

use crate::config::EmulatorConfig;
use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};
use vortex_protocol::{Command, InfoReport, Parameter, Response};

/// Everything the emulated device remembers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModemState {
    /// Modem identifier.
    pub id: Option<u32>,
    /// Modem name.
    pub name: Option<String>,
    /// Operating mode, capitalized (`Auto`, `Manual`).
    pub mode: Option<String>,
    /// Robustness class.
    pub rob: Option<String>,
    /// Modulation.
    pub mdl: Option<String>,
    /// Code rate.
    pub rate: Option<String>,
    /// Block size.
    pub block_size: Option<u32>,
    /// Transaction size.
    pub trans_size: Option<u32>,
    /// Transmit power level.
    pub power_level: Option<u32>,
    /// Uploaded data, in arrival order.
    #[serde(skip)]
    pub image: Vec<u8>,
    /// Set by `VX!START`, cleared by `VX!STOP`.
    pub transferring: bool,
    /// Progress reported by the next `VX?INFO`.
    pub progress: u8,
    /// Frames answered.
    pub commands_handled: u64,
    /// Frames that did not parse.
    pub frames_ignored: u64,
}

/// Capitalize the first letter, lower-case the rest.
fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

fn parse_number(parameter: Parameter, value: &str) -> Option<u32> {
    match value.parse() {
        Ok(number) => Some(number),
        Err(_) => {
            warn!(%parameter, value, "value out of range, ignored");
            None
        }
    }
}

impl ModemState {
    /// Store a parameter value sent by the controller.
    pub fn apply(&mut self, parameter: Parameter, value: &str) {
        match parameter {
            Parameter::Id => self.id = parse_number(parameter, value).or(self.id),
            Parameter::Name => self.name = Some(value.to_string()),
            Parameter::Mode => self.mode = Some(capitalize(value)),
            Parameter::Robustness => self.rob = Some(value.to_string()),
            Parameter::Modulation => self.mdl = Some(value.to_string()),
            Parameter::Rate => self.rate = Some(value.to_string()),
            Parameter::BlockSize => self.block_size = parse_number(parameter, value).or(self.block_size),
            Parameter::TransSize => self.trans_size = parse_number(parameter, value).or(self.trans_size),
            Parameter::PowerLevel => {
                self.power_level = parse_number(parameter, value).or(self.power_level)
            }
        }
    }

    /// One byte per block of the uploaded image: 1 once the block went out.
    ///
    /// Blocks count as sent in proportion to the reported progress.
    pub fn image_balance(&self, default_block_size: u32) -> Bytes {
        let block_size = self.block_size.unwrap_or(default_block_size).max(1) as usize;
        let blocks = self.image.len().div_ceil(block_size);
        let sent = blocks * usize::from(self.progress) / 100;
        (0..blocks).map(|block| u8::from(block < sent)).collect()
    }
}

/// Answer one command, updating `state`.
///
/// Every command gets exactly one response.
pub fn respond(state: &mut ModemState, config: &EmulatorConfig, command: Command) -> Response {
    state.commands_handled += 1;
    match command {
        Command::QueryUpperVersion => Response::UpperVersion(config.upper_version.clone()),
        Command::QueryLowerVersion => Response::LowerVersion(config.lower_version.clone()),
        Command::Set { parameter, value } => {
            state.apply(parameter, &value);
            info!(%parameter, value = %value, "parameter set");
            Response::Ok
        }
        Command::Data(body) => {
            state.image.extend_from_slice(&body);
            debug!(len = body.len(), total = state.image.len(), "data received");
            Response::Ok
        }
        Command::Start => {
            state.transferring = true;
            state.progress = 0;
            info!(bytes = state.image.len(), "transfer started");
            Response::Ok
        }
        Command::Stop => {
            state.transferring = false;
            info!("transfer stopped");
            Response::Ok
        }
        Command::QueryInfo => {
            let report = InfoReport {
                progress: state.progress,
                datarate: config.datarate,
                ber: config.ber,
                bler: config.bler,
            };
            if state.progress < 100 {
                state.progress += 1;
            }
            Response::Info(report)
        }
        Command::QueryStat => Response::Stat(config.stat_text.clone()),
        Command::QueryImageBalance => Response::ImageBalance(state.image_balance(config.default_block_size)),
    }
}
