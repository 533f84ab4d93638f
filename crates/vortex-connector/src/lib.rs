//! Protocol client for the Vortex upper layer.
//!
//! A [`Connector`] owns one [`TcpClient`](vortex_transport::TcpClient) and a
//! [`CommandFramer`](vortex_protocol::CommandFramer). It runs a session:
//!
//! 1. [`Connector::connect`] reads both layer versions
//! 2. parameters are written with acknowledgment
//! 3. data is uploaded chunk by chunk, then started or stopped
//! 4. info snapshots are polled
//!
//! Progress and failures are published as [`SessionEvent`]s on the channel
//! handed to [`Connector::new`].

mod config;
mod connector;
mod error;
mod events;

pub use config::{
    ConnectorConfig, ModemParameters, BLOCK_SIZE_RANGE, CODE_RATES, MODES, MODULATIONS,
    ROBUSTNESS_CLASSES, TRANS_SIZE_RANGE,
};
pub use connector::{Connector, SessionState};
pub use error::{ConnectorError, ConnectorResult};
pub use events::{InfoSnapshot, SessionEvent, Versions, NOT_CONNECTED};
