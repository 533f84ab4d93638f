//! Emulator settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use vortex_transport::{DEFAULT_HOST, DEFAULT_PORT};

/// Header line of the statistics table.
pub const DEFAULT_STAT_TEXT: &str =
    "        Pack N|     TX, bytes|    ACK, bytes|         Total|   Rate, bit\\s|";

/// Settings of an [`Emulator`](crate::Emulator).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Host to listen on.
    pub host: String,
    /// Port to listen on (0 picks a free port).
    pub port: u16,
    /// Reported upper layer version.
    pub upper_version: String,
    /// Reported lower layer version.
    pub lower_version: String,
    /// Reported data rate in bit/s.
    pub datarate: f64,
    /// Reported bit error rate.
    pub ber: f64,
    /// Reported block error rate.
    pub bler: f64,
    /// Statistics table returned for `VX?STAT`.
    pub stat_text: String,
    /// Block size used for the image balance until the controller sets one.
    pub default_block_size: u32,
    /// Bound on each wait of the service thread (milliseconds).
    pub poll_interval_ms: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        EmulatorConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upper_version: "0.41 emu".to_string(),
            lower_version: "0.39 emu".to_string(),
            datarate: 1345.2,
            ber: 2.35e-3,
            bler: 1.34e-2,
            stat_text: DEFAULT_STAT_TEXT.to_string(),
            default_block_size: 40,
            poll_interval_ms: 1000,
        }
    }
}

impl EmulatorConfig {
    /// Set the listening endpoint.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the reported versions.
    pub fn with_versions(mut self, upper: impl Into<String>, lower: impl Into<String>) -> Self {
        self.upper_version = upper.into();
        self.lower_version = lower.into();
        self
    }

    /// Set the reported link quality.
    pub fn with_link_quality(mut self, datarate: f64, ber: f64, bler: f64) -> Self {
        self.datarate = datarate;
        self.ber = ber;
        self.bler = bler;
        self
    }

    /// Set the service thread poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Get the service thread poll interval.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
