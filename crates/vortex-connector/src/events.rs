//! Session events published to the controller.

use serde::Serialize;
use vortex_protocol::InfoReport;

/// Version text published while no session is established.
pub const NOT_CONNECTED: &str = "not connected";

/// Firmware versions of both device layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Versions {
    /// Upper layer version.
    pub upper: String,
    /// Lower layer version.
    pub lower: String,
}

impl Versions {
    /// Versions shown while disconnected.
    pub fn not_connected() -> Self {
        Versions {
            upper: NOT_CONNECTED.to_string(),
            lower: NOT_CONNECTED.to_string(),
        }
    }
}

/// Result of one info request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoSnapshot {
    /// Transfer progress in percent.
    pub progress: u8,
    /// Data rate in bit/s.
    pub datarate: f64,
    /// Bit error rate.
    pub ber: f64,
    /// Block error rate.
    pub bler: f64,
    /// Statistics table, when fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stat: Option<String>,
    /// Image balance bitmap, when fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_balance: Option<Vec<u8>>,
}

impl InfoSnapshot {
    /// Snapshot holding only the info line.
    pub fn from_report(report: InfoReport) -> Self {
        InfoSnapshot {
            progress: report.progress,
            datarate: report.datarate,
            ber: report.ber,
            bler: report.bler,
            stat: None,
            image_balance: None,
        }
    }

    /// Get the info line part of the snapshot.
    pub fn report(&self) -> InfoReport {
        InfoReport {
            progress: self.progress,
            datarate: self.datarate,
            ber: self.ber,
            bler: self.bler,
        }
    }
}

/// Notifications emitted by a [`Connector`](crate::Connector).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The session was established (`true`) or ended (`false`).
    StatusChanged(bool),
    /// Layer versions changed, after connecting or disconnecting.
    VersionsUpdated {
        /// Upper layer version.
        upper: String,
        /// Lower layer version.
        lower: String,
    },
    /// A request failed; the message is meant for the operator.
    Error(String),
    /// The device expects the full parameter set to be pushed.
    ParametersRequested,
    /// A new info snapshot arrived.
    Info(InfoSnapshot),
}

impl From<Versions> for SessionEvent {
    fn from(versions: Versions) -> Self {
        SessionEvent::VersionsUpdated {
            upper: versions.upper,
            lower: versions.lower,
        }
    }
}
