//! Connector settings and the modem parameter profile.

use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vortex_protocol::Parameter;
use vortex_transport::{DEFAULT_HOST, DEFAULT_PORT};

/// Settings of a [`Connector`](crate::Connector) session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Host of the upper layer.
    pub host: String,

    /// Port of the upper layer.
    pub port: u16,

    /// How long to wait for each response (milliseconds).
    pub response_timeout_ms: u64,

    /// Size of each `VX!DATA` chunk in a bulk transfer (bytes).
    pub bulk_chunk_size: usize,

    /// Fetch the statistics table along with each info report.
    pub fetch_stat: bool,

    /// Fetch the image balance bitmap along with each info report.
    pub fetch_image_balance: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        ConnectorConfig {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            response_timeout_ms: 5000,
            bulk_chunk_size: 8192,
            fetch_stat: true,
            fetch_image_balance: true,
        }
    }
}

impl ConnectorConfig {
    /// Set the upper layer endpoint.
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the response timeout.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout_ms = timeout.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    /// Set the bulk transfer chunk size.
    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size;
        self
    }

    /// Enable or disable the statistics fetch.
    pub fn with_fetch_stat(mut self, enabled: bool) -> Self {
        self.fetch_stat = enabled;
        self
    }

    /// Enable or disable the image balance fetch.
    pub fn with_fetch_image_balance(mut self, enabled: bool) -> Self {
        self.fetch_image_balance = enabled;
        self
    }

    /// Get the response timeout.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Operating modes offered by the device.
pub const MODES: [&str; 2] = ["Auto", "Manual"];
/// Robustness classes offered by the device.
pub const ROBUSTNESS_CLASSES: [&str; 3] = ["D", "C", "B"];
/// Modulations offered by the device.
pub const MODULATIONS: [&str; 2] = ["QPSK", "QAM16"];
/// Code rates offered by the device.
pub const CODE_RATES: [&str; 3] = ["1/3", "1/2", "2/3"];

/// Range of valid block sizes.
pub const BLOCK_SIZE_RANGE: std::ops::RangeInclusive<u32> = 10..=400;
/// Range of valid transaction sizes.
pub const TRANS_SIZE_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

/// Complete set of modem parameters, pushed when the device asks for a resync.
///
/// Keys match the controller keys (`blockSize`, `transSize`, ...), so a
/// profile can be loaded straight from YAML:
///
/// ```yaml
/// id: 3
/// name: B
/// mode: Manual
/// rob: C
/// mdl: QAM16
/// rate: 2/3
/// blockSize: 80
/// transSize: 20
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModemParameters {
    /// Modem identifier.
    pub id: u8,
    /// Modem name, one word.
    pub name: String,
    /// Operating mode, one of [`MODES`].
    pub mode: String,
    /// Robustness class, one of [`ROBUSTNESS_CLASSES`].
    pub rob: String,
    /// Modulation, one of [`MODULATIONS`].
    pub mdl: String,
    /// Code rate, one of [`CODE_RATES`].
    pub rate: String,
    /// Block size, within [`BLOCK_SIZE_RANGE`].
    pub block_size: u32,
    /// Transaction size, within [`TRANS_SIZE_RANGE`].
    pub trans_size: u32,
    /// Transmit power level, left to the device when absent.
    pub power_level: Option<u32>,
}

impl Default for ModemParameters {
    fn default() -> Self {
        ModemParameters {
            id: 0,
            name: "A".to_string(),
            mode: MODES[0].to_string(),
            rob: ROBUSTNESS_CLASSES[0].to_string(),
            mdl: MODULATIONS[0].to_string(),
            rate: CODE_RATES[0].to_string(),
            block_size: 40,
            trans_size: 10,
            power_level: None,
        }
    }
}

impl ModemParameters {
    /// List the parameters in the order they are sent to the device.
    pub fn entries(&self) -> Vec<(Parameter, String)> {
        let mut entries = vec![
            (Parameter::Id, self.id.to_string()),
            (Parameter::Name, self.name.clone()),
            (Parameter::Mode, self.mode.clone()),
            (Parameter::Robustness, self.rob.clone()),
            (Parameter::Modulation, self.mdl.clone()),
            (Parameter::Rate, self.rate.clone()),
            (Parameter::BlockSize, self.block_size.to_string()),
            (Parameter::TransSize, self.trans_size.to_string()),
        ];
        if let Some(level) = self.power_level {
            entries.push((Parameter::PowerLevel, level.to_string()));
        }
        entries
    }

    /// Check every value against the choices the device offers.
    pub fn validate(&self) -> ConnectorResult<()> {
        let invalid = |parameter: Parameter, value: &str| ConnectorError::InvalidValue {
            parameter,
            value: value.to_string(),
        };
        let choice = |parameter: Parameter, value: &str, choices: &[&str]| {
            if choices.iter().any(|c| c.eq_ignore_ascii_case(value)) {
                Ok(())
            } else {
                Err(invalid(parameter, value))
            }
        };

        if !Parameter::Name.accepts(&self.name) {
            return Err(invalid(Parameter::Name, &self.name));
        }
        choice(Parameter::Mode, &self.mode, &MODES)?;
        choice(Parameter::Robustness, &self.rob, &ROBUSTNESS_CLASSES)?;
        choice(Parameter::Modulation, &self.mdl, &MODULATIONS)?;
        choice(Parameter::Rate, &self.rate, &CODE_RATES)?;
        if !BLOCK_SIZE_RANGE.contains(&self.block_size) {
            return Err(invalid(Parameter::BlockSize, &self.block_size.to_string()));
        }
        if !TRANS_SIZE_RANGE.contains(&self.trans_size) {
            return Err(invalid(Parameter::TransSize, &self.trans_size.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builders() {
        let config = ConnectorConfig::default()
            .with_address("10.0.0.2", 2000)
            .with_response_timeout(Duration::from_millis(250))
            .with_bulk_chunk_size(16)
            .with_fetch_stat(false);
        assert_eq!(config.host, "10.0.0.2");
        assert_eq!(config.port, 2000);
        assert_eq!(config.response_timeout(), Duration::from_millis(250));
        assert_eq!(config.bulk_chunk_size, 16);
        assert!(!config.fetch_stat);
        assert!(config.fetch_image_balance);
    }

    #[test]
    fn test_config_from_partial_yaml() {
        let config: ConnectorConfig = serde_yaml::from_str("port: 7000\nfetch_stat: false\n").unwrap();
        assert_eq!(config.port, 7000);
        assert!(!config.fetch_stat);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.response_timeout_ms, 5000);
    }

    #[test]
    fn test_default_profile_entries() {
        let profile = ModemParameters::default();
        profile.validate().unwrap();
        let entries = profile.entries();
        assert_eq!(entries.len(), 8);
        assert_eq!(entries[0], (Parameter::Id, "0".to_string()));
        assert_eq!(entries[6], (Parameter::BlockSize, "40".to_string()));
    }

    #[test]
    fn test_profile_from_yaml() {
        let profile: ModemParameters =
            serde_yaml::from_str("id: 3\nmode: Manual\nblockSize: 80\npowerLevel: 2\n").unwrap();
        assert_eq!(profile.id, 3);
        assert_eq!(profile.mode, "Manual");
        assert_eq!(profile.block_size, 80);
        assert_eq!(profile.trans_size, 10);
        assert_eq!(profile.entries().last(), Some(&(Parameter::PowerLevel, "2".to_string())));
    }

    #[test]
    fn test_profile_validation() {
        let profile = ModemParameters {
            rate: "3/4".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            profile.validate(),
            Err(ConnectorError::InvalidValue { parameter: Parameter::Rate, .. })
        ));

        let profile = ModemParameters {
            block_size: 5,
            ..Default::default()
        };
        assert!(profile.validate().is_err());

        let profile = ModemParameters {
            mode: "manual".to_string(),
            ..Default::default()
        };
        assert!(profile.validate().is_ok());
    }
}
