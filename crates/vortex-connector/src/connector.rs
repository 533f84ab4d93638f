//! Synchronous request/response client for the upper layer.
//!
//! The connector keeps at most one request outstanding: it writes a command,
//! then waits for the next complete frame. Frames that arrive while no request
//! is pending are stale (late answers to a timed-out request) and are dropped
//! before the next command goes out.
//!
//! Any mismatch or timeout on a mandatory exchange ends the session: the
//! transport is closed, the state returns to [`SessionState::Disconnected`]
//! and an error event is published.

use crate::config::{ConnectorConfig, ModemParameters};
use crate::error::{ConnectorError, ConnectorResult};
use crate::events::{InfoSnapshot, SessionEvent, Versions};
use bytes::Bytes;
use crossbeam_channel::Sender;
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use vortex_protocol::{Command, CommandFramer, Frame, Parameter, Response, ACK_FRAME, TAG_DATA};
use vortex_transport::{TcpClient, TransportError};

// ============================================================================
// Session State
// ============================================================================

/// State of the connector session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport open.
    Disconnected,
    /// Transport open, reading the layer versions.
    Connecting,
    /// Versions read, commands accepted.
    Connected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Short text naming a command in logs and error messages.
fn describe(command: &Command) -> String {
    match command {
        Command::Data(body) => format!("{} {} ...", TAG_DATA, body.len()),
        other => {
            let encoded = other.encode();
            String::from_utf8_lossy(encoded.trim_ascii_end()).into_owned()
        }
    }
}

fn frame_text(frame: &Frame) -> String {
    format!("{:?}", frame)
}

// ============================================================================
// Connector
// ============================================================================

/// Protocol client driving one upper layer over a [`TcpClient`].
pub struct Connector {
    config: ConnectorConfig,
    transport: TcpClient,
    framer: CommandFramer,
    frames: VecDeque<Frame>,
    state: SessionState,
    events: Sender<SessionEvent>,
}

impl Connector {
    /// Create a disconnected connector publishing to `events`.
    pub fn new(config: ConnectorConfig, events: Sender<SessionEvent>) -> Self {
        Connector {
            config,
            transport: TcpClient::new(),
            framer: CommandFramer::new(),
            frames: VecDeque::new(),
            state: SessionState::Disconnected,
            events,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Get the current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if commands can be sent.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    fn publish(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            trace!("no listener for session events");
        }
    }

    fn reset_buffers(&mut self) {
        self.framer.clear();
        self.frames.clear();
    }

    /// End the session after a failed exchange and hand the error back.
    fn fail(&mut self, error: ConnectorError) -> ConnectorError {
        warn!(state = %self.state, "session failed: {}", error);
        self.transport.close();
        self.reset_buffers();
        self.state = SessionState::Disconnected;
        self.publish(SessionEvent::Error(error.to_string()));
        self.publish(SessionEvent::StatusChanged(false));
        error
    }

    // ========================================================================
    // Session Lifecycle
    // ========================================================================

    /// Connect to the configured endpoint.
    pub fn connect_default(&mut self) -> ConnectorResult<Versions> {
        let host = self.config.host.clone();
        let port = self.config.port;
        self.connect(&host, port)
    }

    /// Open the transport and read both layer versions.
    ///
    /// On success the versions, the status change and a parameter resync
    /// request are published, in that order.
    pub fn connect(&mut self, host: &str, port: u16) -> ConnectorResult<Versions> {
        if self.state != SessionState::Disconnected {
            debug!("reconnecting, closing the previous session");
            self.transport.close();
        }
        self.reset_buffers();
        self.state = SessionState::Connecting;
        info!(host, port, "connecting to upper layer");

        let opened = self
            .transport
            .set_address(host, port)
            .and_then(|()| self.transport.open());
        if let Err(e) = opened {
            return Err(self.fail(e.into()));
        }

        let timeout = self.config.response_timeout();
        let upper = self.request_parameter(
            &Command::QueryUpperVersion,
            |response| match response {
                Response::UpperVersion(version) => Some(version),
                _ => None,
            },
            timeout,
        )?;
        let lower = self.request_parameter(
            &Command::QueryLowerVersion,
            |response| match response {
                Response::LowerVersion(version) => Some(version),
                _ => None,
            },
            timeout,
        )?;

        let versions = Versions { upper, lower };
        self.state = SessionState::Connected;
        info!(upper = %versions.upper, lower = %versions.lower, "connected to upper layer");
        self.publish(versions.clone().into());
        self.publish(SessionEvent::StatusChanged(true));
        self.publish(SessionEvent::ParametersRequested);
        Ok(versions)
    }

    /// Close the session.
    pub fn disconnect(&mut self) {
        self.transport.close();
        self.reset_buffers();
        if self.state != SessionState::Disconnected {
            info!("disconnected from upper layer");
        }
        self.state = SessionState::Disconnected;
        self.publish(Versions::not_connected().into());
        self.publish(SessionEvent::StatusChanged(false));
    }

    // ========================================================================
    // Exchange Helpers
    // ========================================================================

    /// Wait up to `timeout` for the next complete frame.
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<Frame>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(frame) = self.frames.pop_front() {
                return Ok(Some(frame));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            let chunk = self.transport.read(remaining)?;
            if !chunk.is_empty() {
                self.frames.extend(self.framer.process(&chunk));
            }
        }
    }

    /// Drop frames nobody is waiting for.
    fn discard_stale(&mut self) -> Result<(), TransportError> {
        loop {
            let chunk = self.transport.read(Duration::ZERO)?;
            if chunk.is_empty() {
                break;
            }
            self.frames.extend(self.framer.process(&chunk));
        }
        for frame in self.frames.drain(..) {
            warn!("dropping stale frame {:?}", frame);
        }
        Ok(())
    }

    /// Send `command` and wait for one frame in reply.
    ///
    /// Returns `Ok(None)` on timeout; errors are transport failures.
    fn round_trip(&mut self, command: &Command, timeout: Duration) -> ConnectorResult<Option<Frame>> {
        if self.state == SessionState::Disconnected {
            return Err(ConnectorError::NotConnected);
        }
        let sent = self
            .discard_stale()
            .and_then(|()| self.transport.write(&command.encode()))
            .and_then(|()| self.next_frame(timeout));
        match sent {
            Ok(frame) => {
                trace!(request = %describe(command), response = ?frame, "exchange");
                Ok(frame)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Send a query and extract the expected value from the response.
    ///
    /// A timeout, an unparseable frame or a response `extract` rejects ends
    /// the session.
    pub fn request_parameter<T>(
        &mut self,
        query: &Command,
        extract: impl FnOnce(Response) -> Option<T>,
        timeout: Duration,
    ) -> ConnectorResult<T> {
        let request = describe(query);
        let Some(frame) = self.round_trip(query, timeout)? else {
            return Err(self.fail(ConnectorError::Timeout { request }));
        };
        match Response::parse(&frame).ok().and_then(extract) {
            Some(value) => Ok(value),
            None => Err(self.fail(ConnectorError::ProtocolViolation {
                request,
                received: frame_text(&frame),
            })),
        }
    }

    /// Like [`request_parameter`](Self::request_parameter), but a timeout or
    /// mismatch only yields `None` and keeps the session.
    fn try_request<T>(
        &mut self,
        query: &Command,
        extract: impl FnOnce(Response) -> Option<T>,
    ) -> ConnectorResult<Option<T>> {
        let request = describe(query);
        let Some(frame) = self.round_trip(query, self.config.response_timeout())? else {
            warn!(request = %request, "no response, skipping");
            return Ok(None);
        };
        let value = Response::parse(&frame).ok().and_then(extract);
        if value.is_none() {
            warn!(request = %request, "unexpected response {:?}, skipping", frame);
        }
        Ok(value)
    }

    /// Send a command and require the `VX!OK` acknowledgment.
    pub fn send_command(&mut self, command: &Command) -> ConnectorResult<()> {
        let request = describe(command);
        debug!(request = %request, "sending command");
        match self.round_trip(command, self.config.response_timeout())? {
            Some(frame) if frame == ACK_FRAME => Ok(()),
            Some(frame) => Err(self.fail(ConnectorError::ProtocolViolation {
                request,
                received: frame_text(&frame),
            })),
            None => Err(self.fail(ConnectorError::Timeout { request })),
        }
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Write one parameter and wait for the acknowledgment.
    ///
    /// Values the device would reject are refused without touching the
    /// session.
    pub fn set_parameter(&mut self, parameter: Parameter, value: impl fmt::Display) -> ConnectorResult<()> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        let value = value.to_string();
        if !parameter.accepts(&value.to_uppercase()) {
            return Err(ConnectorError::InvalidValue { parameter, value });
        }
        self.send_command(&Command::set(parameter, value))
    }

    /// Apply controller key/value pairs in order.
    ///
    /// Every key is checked before the first one is sent.
    pub fn change_parameters<K, V>(&mut self, changes: &[(K, V)]) -> ConnectorResult<()>
    where
        K: AsRef<str>,
        V: fmt::Display,
    {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        let resolved = changes
            .iter()
            .map(|(key, value)| {
                let key = key.as_ref();
                Parameter::from_key(key)
                    .map(|parameter| (parameter, value.to_string()))
                    .ok_or_else(|| ConnectorError::UnknownParameter(key.to_string()))
            })
            .collect::<ConnectorResult<Vec<_>>>()?;

        for (parameter, value) in resolved {
            self.set_parameter(parameter, value)?;
        }
        Ok(())
    }

    /// Send every parameter of a profile.
    pub fn push_parameters(&mut self, parameters: &ModemParameters) -> ConnectorResult<()> {
        parameters.validate()?;
        info!("pushing parameter profile");
        for (parameter, value) in parameters.entries() {
            self.set_parameter(parameter, value)?;
        }
        Ok(())
    }

    // ========================================================================
    // Transfer
    // ========================================================================

    /// Upload `payload` as a sequence of `VX!DATA` frames.
    ///
    /// Each chunk waits for its acknowledgment before the next one is sent.
    /// Returns the number of chunks sent.
    pub fn transfer_bulk(&mut self, payload: &[u8]) -> ConnectorResult<usize> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        let chunk_size = self.config.bulk_chunk_size.max(1);
        let total = payload.len().div_ceil(chunk_size);
        info!(bytes = payload.len(), chunks = total, "uploading data");

        for (index, chunk) in payload.chunks(chunk_size).enumerate() {
            trace!(chunk = index + 1, total, "sending data chunk");
            self.send_command(&Command::Data(Bytes::copy_from_slice(chunk)))?;
        }
        Ok(total)
    }

    /// Upload `payload` and start transmitting it.
    pub fn start_transfer(&mut self, payload: &[u8]) -> ConnectorResult<()> {
        self.transfer_bulk(payload)?;
        self.send_command(&Command::Start)?;
        info!("transfer started");
        Ok(())
    }

    /// Stop the running transfer.
    pub fn stop_transfer(&mut self) -> ConnectorResult<()> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        self.send_command(&Command::Stop)?;
        info!("transfer stopped");
        Ok(())
    }

    // ========================================================================
    // Info
    // ========================================================================

    /// Read progress and link quality, plus the optional extras.
    ///
    /// The info line is mandatory. The statistics table and the image balance
    /// are fetched when enabled and left out of the snapshot when the device
    /// does not deliver them.
    pub fn request_info(&mut self) -> ConnectorResult<InfoSnapshot> {
        if !self.is_connected() {
            return Err(ConnectorError::NotConnected);
        }
        let report = self.request_parameter(
            &Command::QueryInfo,
            |response| match response {
                Response::Info(report) => Some(report),
                _ => None,
            },
            self.config.response_timeout(),
        )?;
        let mut snapshot = InfoSnapshot::from_report(report);

        if self.config.fetch_stat {
            snapshot.stat = self.try_request(&Command::QueryStat, |response| match response {
                Response::Stat(text) => Some(text),
                _ => None,
            })?;
        }
        if self.config.fetch_image_balance {
            snapshot.image_balance = self.try_request(&Command::QueryImageBalance, |response| match response {
                Response::ImageBalance(bitmap) => Some(bitmap.to_vec()),
                _ => None,
            })?;
        }

        debug!(progress = snapshot.progress, "info received");
        self.publish(SessionEvent::Info(snapshot.clone()));
        Ok(snapshot)
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("state", &self.state)
            .field("transport", &self.transport)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> (Connector, crossbeam_channel::Receiver<SessionEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Connector::new(ConnectorConfig::default(), tx), rx)
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(&Command::QueryUpperVersion), "VX?UVER");
        assert_eq!(describe(&Command::set(Parameter::Mode, "Auto")), "VX!MODE AUTO");
        assert_eq!(describe(&Command::Data(Bytes::from_static(&[0; 10]))), "VX!DATA 10 ...");
    }

    #[test]
    fn test_operations_need_a_session() {
        let (mut connector, events) = connector();
        assert_eq!(connector.state(), SessionState::Disconnected);
        assert!(matches!(
            connector.set_parameter(Parameter::Id, 7),
            Err(ConnectorError::NotConnected)
        ));
        assert!(matches!(connector.request_info(), Err(ConnectorError::NotConnected)));
        assert!(matches!(connector.transfer_bulk(b"abc"), Err(ConnectorError::NotConnected)));
        assert!(matches!(connector.stop_transfer(), Err(ConnectorError::NotConnected)));
        assert!(matches!(
            connector.request_parameter(&Command::QueryInfo, Some, Duration::ZERO),
            Err(ConnectorError::NotConnected)
        ));
        // Refusals do not touch the session.
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_publishes_placeholder_versions() {
        let (mut connector, events) = connector();
        connector.disconnect();
        assert_eq!(events.try_recv().unwrap(), Versions::not_connected().into());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::StatusChanged(false));
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Connecting.to_string(), "connecting");
    }
}
