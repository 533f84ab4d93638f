//! Connector sessions against a scripted device on the loopback interface.

use approx::assert_relative_eq;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use vortex_connector::{
    Connector, ConnectorConfig, ConnectorError, ModemParameters, SessionEvent, SessionState,
};
use vortex_protocol::{CommandFramer, Parameter};
use vortex_transport::TcpServer;

/// Device stand-in answering each received frame through a script.
struct ScriptedPeer {
    port: u16,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ScriptedPeer {
    fn spawn(mut script: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        let mut server = TcpServer::new();
        server.set_address("127.0.0.1", 0).unwrap();
        server.open().unwrap();
        let port = server.local_addr().unwrap().port();

        let received = Arc::new(Mutex::new(Vec::new()));
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let received = Arc::clone(&received);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut framer = CommandFramer::new();
                while !stop.load(Ordering::Relaxed) {
                    let chunk = server.read(Duration::from_millis(20)).unwrap();
                    for frame in framer.process(&chunk) {
                        received.lock().unwrap().push(frame.to_vec());
                        let reply = script(&frame);
                        if !reply.is_empty() {
                            server.write(&reply).unwrap();
                        }
                    }
                }
                server.close();
            })
        };

        ScriptedPeer {
            port,
            received,
            stop,
            handle: Some(handle),
        }
    }

    /// Peer answering versions and acknowledging everything else.
    fn device() -> Self {
        ScriptedPeer::spawn(versions_then(|_| b"VX!OK\n".to_vec()))
    }

    fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().unwrap().clone()
    }
}

impl Drop for ScriptedPeer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Answer the version queries, hand every other frame to `rest`.
fn versions_then(mut rest: impl FnMut(&[u8]) -> Vec<u8> + Send) -> impl FnMut(&[u8]) -> Vec<u8> + Send {
    move |frame| match frame {
        b"VX?UVER\n" => b"VX!UVER 0.41 test\n".to_vec(),
        b"VX?LVER\n" => b"VX!LVER 0.39 test\n".to_vec(),
        other => rest(other),
    }
}

fn config() -> ConnectorConfig {
    ConnectorConfig::default().with_response_timeout(Duration::from_millis(500))
}

fn connected(peer: &ScriptedPeer, config: ConnectorConfig) -> (Connector, Receiver<SessionEvent>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    let mut connector = Connector::new(config, tx);
    connector.connect("127.0.0.1", peer.port).unwrap();
    // Skip the connect notifications.
    for _ in 0..3 {
        rx.try_recv().unwrap();
    }
    (connector, rx)
}

#[test]
fn test_connect_reads_versions_and_requests_parameters() {
    let peer = ScriptedPeer::device();
    let (tx, events) = crossbeam_channel::unbounded();
    let mut connector = Connector::new(config(), tx);

    let versions = connector.connect("127.0.0.1", peer.port).unwrap();
    assert_eq!(versions.upper, "0.41 test");
    assert_eq!(versions.lower, "0.39 test");
    assert_eq!(connector.state(), SessionState::Connected);

    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::VersionsUpdated {
            upper: "0.41 test".to_string(),
            lower: "0.39 test".to_string(),
        }
    );
    assert_eq!(events.try_recv().unwrap(), SessionEvent::StatusChanged(true));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::ParametersRequested);
    assert_eq!(peer.received(), vec![b"VX?UVER\n".to_vec(), b"VX?LVER\n".to_vec()]);
}

#[test]
fn test_connect_without_answer_reports_missing_version() {
    let peer = ScriptedPeer::spawn(|_| Vec::new());
    let (tx, events) = crossbeam_channel::unbounded();
    let mut connector = Connector::new(config(), tx);

    let err = connector.connect("127.0.0.1", peer.port).unwrap_err();
    assert!(matches!(&err, ConnectorError::Timeout { request } if request == "VX?UVER"));
    assert_eq!(
        err.to_string(),
        "can not connect to upper layer: no response for command VX?UVER"
    );
    assert_eq!(connector.state(), SessionState::Disconnected);
    assert!(matches!(events.try_recv().unwrap(), SessionEvent::Error(_)));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::StatusChanged(false));
    // No second query after the first one failed.
    assert_eq!(peer.received(), vec![b"VX?UVER\n".to_vec()]);
}

#[test]
fn test_connect_with_wrong_lower_version_reply() {
    let peer = ScriptedPeer::spawn(|frame| match frame {
        b"VX?UVER\n" => b"VX!UVER 1.0\n".to_vec(),
        _ => b"VX!UVER 1.0\n".to_vec(),
    });
    let (tx, _events) = crossbeam_channel::unbounded();
    let mut connector = Connector::new(config(), tx);

    let err = connector.connect("127.0.0.1", peer.port).unwrap_err();
    assert!(matches!(err, ConnectorError::ProtocolViolation { ref request, .. } if request == "VX?LVER"));
    assert_eq!(connector.state(), SessionState::Disconnected);
}

#[test]
fn test_connect_refused() {
    let port = ScriptedPeer::spawn(|_| Vec::new()).port;
    let (tx, events) = crossbeam_channel::unbounded();
    let mut connector = Connector::new(config(), tx);

    assert!(matches!(
        connector.connect("127.0.0.1", port),
        Err(ConnectorError::Transport(_))
    ));
    assert_eq!(connector.state(), SessionState::Disconnected);
    assert!(matches!(events.try_recv().unwrap(), SessionEvent::Error(_)));
}

#[test]
fn test_set_parameter_acknowledged() {
    let peer = ScriptedPeer::device();
    let (mut connector, _events) = connected(&peer, config());

    connector.set_parameter(Parameter::Id, 7).unwrap();
    connector.set_parameter(Parameter::Mode, "Manual").unwrap();
    assert!(connector.is_connected());

    let received = peer.received();
    assert_eq!(received[2], b"VX!ID 7\n");
    assert_eq!(received[3], b"VX!MODE MANUAL\n");
}

#[test]
fn test_set_parameter_rejected_closes_session() {
    let peer = ScriptedPeer::spawn(versions_then(|_| b"VX!ERR\n".to_vec()));
    let (mut connector, events) = connected(&peer, config());

    let err = connector.set_parameter(Parameter::Id, 7).unwrap_err();
    assert!(matches!(err, ConnectorError::ProtocolViolation { ref request, .. } if request == "VX!ID 7"));
    assert_eq!(connector.state(), SessionState::Disconnected);
    assert!(matches!(events.try_recv().unwrap(), SessionEvent::Error(_)));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::StatusChanged(false));

    assert!(matches!(
        connector.set_parameter(Parameter::Id, 8),
        Err(ConnectorError::NotConnected)
    ));
}

#[test]
fn test_set_parameter_timeout_closes_session() {
    let peer = ScriptedPeer::spawn(versions_then(|_| Vec::new()));
    let (mut connector, _events) = connected(&peer, config());

    let err = connector.set_parameter(Parameter::BlockSize, 40).unwrap_err();
    assert!(matches!(err, ConnectorError::Timeout { ref request } if request == "VX!BLOCKSIZE 40"));
    assert!(!connector.is_connected());
}

#[test]
fn test_invalid_value_keeps_session() {
    let peer = ScriptedPeer::device();
    let (mut connector, events) = connected(&peer, config());

    assert!(matches!(
        connector.set_parameter(Parameter::BlockSize, "forty"),
        Err(ConnectorError::InvalidValue { parameter: Parameter::BlockSize, .. })
    ));
    assert!(connector.is_connected());
    assert!(events.try_recv().is_err());
    assert_eq!(peer.received().len(), 2);
}

#[test]
fn test_change_parameters_by_key() {
    let peer = ScriptedPeer::device();
    let (mut connector, _events) = connected(&peer, config());

    connector
        .change_parameters(&[("rob", "c"), ("rate", "2/3"), ("transSize", "20")])
        .unwrap();
    let received = peer.received();
    assert_eq!(&received[2..], &[
        b"VX!ROB C\n".to_vec(),
        b"VX!RATE 2/3\n".to_vec(),
        b"VX!TRANSSIZE 20\n".to_vec(),
    ]);

    assert!(matches!(
        connector.change_parameters(&[("id", "1"), ("speed", "3")]),
        Err(ConnectorError::UnknownParameter(ref key)) if key == "speed"
    ));
    // Nothing of the rejected batch went out.
    assert_eq!(peer.received().len(), 5);
}

#[test]
fn test_push_parameters_sends_full_profile() {
    let peer = ScriptedPeer::device();
    let (mut connector, _events) = connected(&peer, config());

    let profile = ModemParameters {
        power_level: Some(3),
        ..Default::default()
    };
    connector.push_parameters(&profile).unwrap();

    let received = peer.received();
    assert_eq!(received.len(), 2 + 9);
    assert_eq!(received[2], b"VX!ID 0\n");
    assert_eq!(received[3], b"VX!NAME A\n");
    assert_eq!(received[4], b"VX!MODE AUTO\n");
    assert_eq!(received[10], b"VX!POWERLEVEL 3\n");
}

#[test]
fn test_bulk_transfer_chunks_and_starts() {
    let peer = ScriptedPeer::device();
    let (mut connector, _events) = connected(&peer, config().with_bulk_chunk_size(4));

    let payload: Vec<u8> = (0u8..10).collect();
    connector.start_transfer(&payload).unwrap();

    let received = peer.received();
    assert_eq!(&received[2..], &[
        b"VX!DATA 4 \x00\x01\x02\x03\n".to_vec(),
        b"VX!DATA 4 \x04\x05\x06\x07\n".to_vec(),
        b"VX!DATA 2 \x08\x09\n".to_vec(),
        b"VX!START\n".to_vec(),
    ]);

    connector.stop_transfer().unwrap();
    assert_eq!(peer.received().last().unwrap(), b"VX!STOP\n");
}

#[test]
fn test_bulk_transfer_waits_for_each_ack() {
    let mut acked = false;
    let peer = ScriptedPeer::spawn(versions_then(move |_| {
        if acked {
            Vec::new()
        } else {
            acked = true;
            b"VX!OK\n".to_vec()
        }
    }));
    let (mut connector, _events) = connected(&peer, config().with_bulk_chunk_size(2));

    let err = connector.transfer_bulk(b"abcdefgh").unwrap_err();
    assert!(matches!(err, ConnectorError::Timeout { ref request } if request == "VX!DATA 2 ..."));
    // The third chunk was never sent because the second was not acknowledged.
    let data: Vec<_> = peer
        .received()
        .into_iter()
        .filter(|frame| frame.starts_with(b"VX!DATA"))
        .collect();
    assert_eq!(data, vec![b"VX!DATA 2 ab\n".to_vec(), b"VX!DATA 2 cd\n".to_vec()]);
}

#[test]
fn test_request_info_with_extras() {
    let peer = ScriptedPeer::spawn(versions_then(|frame| match frame {
        b"VX?INFO\n" => b"VX!INFO 42 1200.5 2.30e-04 1.10e-02\n".to_vec(),
        b"VX?STAT\n" => b"VX!STAT 13 Pack N|\nTX  |\n".to_vec(),
        b"VX?IMBL\n" => b"VX!IMBL 3 \x01\n\x00\n".to_vec(),
        _ => Vec::new(),
    }));
    let (mut connector, events) = connected(&peer, config());

    let snapshot = connector.request_info().unwrap();
    assert_eq!(snapshot.progress, 42);
    assert_relative_eq!(snapshot.datarate, 1200.5);
    assert_relative_eq!(snapshot.ber, 2.3e-4);
    assert_relative_eq!(snapshot.bler, 1.1e-2);
    assert_eq!(snapshot.stat.as_deref(), Some("Pack N|\nTX  |"));
    assert_eq!(snapshot.image_balance, Some(vec![1, b'\n', 0]));
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Info(snapshot));
}

#[test]
fn test_request_info_skips_missing_extras() {
    let peer = ScriptedPeer::spawn(versions_then(|frame| match frame {
        b"VX?INFO\n" => b"VX!INFO 7 900.0 1.00e-03 2.00e-02\n".to_vec(),
        b"VX?IMBL\n" => b"VX!IMBL 2 \x01\x01\n".to_vec(),
        _ => Vec::new(),
    }));
    let (mut connector, _events) = connected(&peer, config());

    let snapshot = connector.request_info().unwrap();
    assert_eq!(snapshot.progress, 7);
    assert_eq!(snapshot.stat, None);
    assert_eq!(snapshot.image_balance, Some(vec![1, 1]));
    assert!(connector.is_connected());
}

#[test]
fn test_request_info_without_extras_when_disabled() {
    let peer = ScriptedPeer::spawn(versions_then(|frame| match frame {
        b"VX?INFO\n" => b"VX!INFO 100 1345.2 2.35e-3 1.34e-2\n".to_vec(),
        _ => Vec::new(),
    }));
    let config = config().with_fetch_stat(false).with_fetch_image_balance(false);
    let (mut connector, _events) = connected(&peer, config);

    let snapshot = connector.request_info().unwrap();
    assert_eq!(snapshot.progress, 100);
    assert_eq!(peer.received().len(), 3);
}

#[test]
fn test_stale_frames_are_dropped() {
    // The info reply carries an extra acknowledgment nobody asked for.
    let peer = ScriptedPeer::spawn(versions_then(|frame| match frame {
        b"VX?INFO\n" => b"VX!INFO 1 10.0 0.0 0.0\nVX!OK\n".to_vec(),
        _ => Vec::new(),
    }));
    let config = config().with_fetch_stat(false).with_fetch_image_balance(false);
    let (mut connector, _events) = connected(&peer, config);

    connector.request_info().unwrap();
    // The stray acknowledgment must not answer this command.
    assert!(matches!(
        connector.set_parameter(Parameter::Id, 1),
        Err(ConnectorError::Timeout { .. })
    ));
}

#[test]
fn test_disconnect_and_reconnect() {
    let peer = ScriptedPeer::device();
    let (mut connector, events) = connected(&peer, config());

    connector.disconnect();
    assert_eq!(connector.state(), SessionState::Disconnected);
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::VersionsUpdated {
            upper: "not connected".to_string(),
            lower: "not connected".to_string(),
        }
    );
    assert_eq!(events.try_recv().unwrap(), SessionEvent::StatusChanged(false));

    connector.connect("127.0.0.1", peer.port).unwrap();
    connector.set_parameter(Parameter::Name, "B").unwrap();
}
