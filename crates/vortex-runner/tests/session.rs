//! Runner subcommands against an emulator on the loopback interface.

use std::sync::atomic::AtomicBool;
use std::time::Duration;
use vortex_connector::{ConnectorError, ModemParameters};
use vortex_emulator::{Emulator, EmulatorConfig};
use vortex_runner::{run_emulate, run_info, run_send, run_set, with_session, RunnerConfig, RunnerError};

fn start_emulator() -> Emulator {
    let config = EmulatorConfig::default()
        .with_address("127.0.0.1", 0)
        .with_poll_interval(Duration::from_millis(50));
    let mut emulator = Emulator::new(config);
    emulator.open().unwrap();
    emulator
}

fn runner_config(emulator: &Emulator) -> RunnerConfig {
    let mut config = RunnerConfig::default();
    config.override_endpoint(Some("127.0.0.1"), Some(emulator.local_addr().unwrap().port()));
    config
}

#[test]
fn test_session_pushes_profile() {
    let emulator = start_emulator();
    let mut config = runner_config(&emulator);
    config.parameters = Some(ModemParameters {
        id: 9,
        rob: "B".to_string(),
        ..Default::default()
    });

    with_session(&config, |_| Ok(())).unwrap();
    let state = emulator.state();
    assert_eq!(state.id, Some(9));
    assert_eq!(state.rob.as_deref(), Some("B"));
    assert_eq!(state.block_size, Some(40));
}

#[test]
fn test_info_as_json() {
    let emulator = start_emulator();
    let config = runner_config(&emulator);
    let stop = AtomicBool::new(false);
    let mut out = Vec::new();
    let path = std::env::temp_dir().join(format!("vortex-info-{}.bin", std::process::id()));
    std::fs::write(&path, vec![0x55; 100]).unwrap();

    with_session(&config, |connector| {
        run_send(connector, &path)?;
        let printed = run_info(connector, None, true, &mut out, &stop)?;
        assert_eq!(printed, 1);
        Ok(())
    })
    .unwrap();
    std::fs::remove_file(&path).unwrap();

    let line = String::from_utf8(out).unwrap();
    let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(value["progress"], 0);
    assert_eq!(value["datarate"], 1345.2);
    assert!(value["stat"].is_string());
    assert_eq!(value["image_balance"].as_array().map(Vec::len), Some(3));
}

#[test]
fn test_info_watch_stops_on_flag() {
    let emulator = start_emulator();
    let config = runner_config(&emulator);
    let stop = AtomicBool::new(true);
    let mut out = Vec::new();

    with_session(&config, |connector| {
        run_info(connector, Some(Duration::from_secs(30)), false, &mut out, &stop)?;
        Ok(())
    })
    .unwrap();
    assert_eq!(String::from_utf8(out).unwrap().lines().next().map(|l| l.starts_with("progress")), Some(true));
}

#[test]
fn test_set_assignments() {
    let emulator = start_emulator();
    let config = runner_config(&emulator);

    let assignments = vec!["mode=Manual".to_string(), "transSize=25".to_string()];
    with_session(&config, |connector| run_set(connector, &assignments)).unwrap();
    let state = emulator.state();
    assert_eq!(state.mode.as_deref(), Some("Manual"));
    assert_eq!(state.trans_size, Some(25));

    let bad = vec!["colour=blue".to_string()];
    let err = with_session(&config, |connector| run_set(connector, &bad)).unwrap_err();
    assert!(matches!(err, RunnerError::Connector(ConnectorError::UnknownParameter(_))));

    let malformed = vec!["mode".to_string()];
    let err = with_session(&config, |connector| run_set(connector, &malformed)).unwrap_err();
    assert!(matches!(err, RunnerError::InvalidAssignment(_)));
}

#[test]
fn test_send_file() {
    let emulator = start_emulator();
    let config = runner_config(&emulator);

    let path = std::env::temp_dir().join(format!("vortex-send-{}.bin", std::process::id()));
    let payload: Vec<u8> = (0..20_000u32).map(|i| (i * 7 % 256) as u8).collect();
    std::fs::write(&path, &payload).unwrap();

    with_session(&config, |connector| run_send(connector, &path).map(|_| ())).unwrap();
    std::fs::remove_file(&path).unwrap();

    let state = emulator.state();
    assert_eq!(state.image, payload);
    assert!(state.transferring);
}

#[test]
fn test_send_missing_file() {
    let emulator = start_emulator();
    let config = runner_config(&emulator);
    let path = std::env::temp_dir().join("vortex-does-not-exist.bin");

    let err = with_session(&config, |connector| run_send(connector, &path).map(|_| ())).unwrap_err();
    assert!(matches!(err, RunnerError::Io(_)));
}

#[test]
fn test_connect_failure_is_reported() {
    let port = start_emulator().local_addr().unwrap().port();
    let mut config = RunnerConfig::default();
    config.override_endpoint(Some("127.0.0.1"), Some(port));

    let err = with_session(&config, |_| Ok(())).unwrap_err();
    assert!(matches!(err, RunnerError::Connector(ConnectorError::Transport(_))));
}

#[test]
fn test_emulate_returns_when_stopped() {
    let mut config = EmulatorConfig::default()
        .with_address("127.0.0.1", 0)
        .with_poll_interval(Duration::from_millis(50));
    config.stat_text = "custom".to_string();
    let stop = AtomicBool::new(true);
    run_emulate(config, &stop).unwrap();
}
