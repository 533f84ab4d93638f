//! YAML configuration of the runner.
//!
//! Every section is optional; missing fields keep their defaults:
//!
//! ```yaml
//! connector:
//!   host: 192.168.1.20
//!   port: 10204
//!   response_timeout_ms: 3000
//! emulator:
//!   port: 10204
//!   upper_version: 0.41 emu
//! parameters:
//!   id: 2
//!   mode: Manual
//!   rob: C
//! ```

use crate::error::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use vortex_connector::{ConnectorConfig, ModemParameters};
use vortex_emulator::EmulatorConfig;

/// Root of a runner configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Session settings for the controller commands.
    pub connector: ConnectorConfig,
    /// Settings of `vortex emulate`.
    pub emulator: EmulatorConfig,
    /// Profile pushed when the device asks for a parameter resync.
    pub parameters: Option<ModemParameters>,
}

impl RunnerConfig {
    /// Parse a configuration from YAML text.
    pub fn from_yaml(text: &str) -> RunnerResult<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> RunnerResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Override the endpoint of both the connector and the emulator.
    pub fn override_endpoint(&mut self, host: Option<&str>, port: Option<u16>) {
        if let Some(host) = host {
            self.connector.host = host.to_string();
            self.emulator.host = host.to_string();
        }
        if let Some(port) = port {
            self.connector.port = port;
            self.emulator.port = port;
        }
    }
}

/// Split a `key=value` command-line assignment.
pub fn parse_assignment(text: &str) -> RunnerResult<(String, String)> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(RunnerError::InvalidAssignment(text.to_string())),
    }
}
