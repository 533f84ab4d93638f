//! Implementations of the `vortex` subcommands.

use crate::config::{parse_assignment, RunnerConfig};
use crate::error::{RunnerError, RunnerResult};
use crossbeam_channel::{Receiver, Sender};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use vortex_connector::{Connector, InfoSnapshot, SessionEvent};
use vortex_emulator::{Emulator, EmulatorConfig};

/// Granularity of the waits that watch for Ctrl-C.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Shortest refresh period of `vortex info --watch`.
const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Convert a `--watch` value in seconds into a refresh period.
///
/// Negative, NaN and out-of-range values are rejected; tiny ones are raised to
/// the minimum period.
pub fn watch_interval(secs: f64) -> RunnerResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map(|interval| interval.max(MIN_WATCH_INTERVAL))
        .map_err(|_| RunnerError::InvalidInterval(secs))
}

/// Sleep for `duration`, returning early once `stop` is set.
fn sleep_unless_stopped(duration: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !stop.load(Ordering::Relaxed) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(STOP_CHECK_INTERVAL));
    }
}

/// Log session events as they arrive, until every sender is gone.
pub fn spawn_event_logger(events: Receiver<SessionEvent>) -> RunnerResult<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("vortex-events".to_string())
        .spawn(move || {
            for event in events {
                match event {
                    SessionEvent::StatusChanged(true) => info!("session established"),
                    SessionEvent::StatusChanged(false) => info!("session closed"),
                    SessionEvent::VersionsUpdated { upper, lower } => {
                        info!(upper = %upper, lower = %lower, "layer versions")
                    }
                    SessionEvent::Error(message) => error!("{}", message),
                    SessionEvent::ParametersRequested => info!("device requests parameters"),
                    SessionEvent::Info(snapshot) => info!(progress = snapshot.progress, "info"),
                }
            }
        })?;
    Ok(handle)
}

/// Connect and answer the resync request with the configured profile.
pub fn open_session(config: &RunnerConfig, events: Sender<SessionEvent>) -> RunnerResult<Connector> {
    let mut connector = Connector::new(config.connector.clone(), events);
    connector.connect_default()?;
    match &config.parameters {
        Some(profile) => connector.push_parameters(profile)?,
        None => warn!("no parameter profile configured, device keeps its settings"),
    }
    Ok(connector)
}

/// Run `action` on an open session, logging its events, then disconnect.
pub fn with_session<F>(config: &RunnerConfig, action: F) -> RunnerResult<()>
where
    F: FnOnce(&mut Connector) -> RunnerResult<()>,
{
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let logger = spawn_event_logger(events_rx)?;

    let result = open_session(config, events_tx).and_then(|mut connector| {
        let result = action(&mut connector);
        connector.disconnect();
        result
    });

    // The connector owned the only sender, so the logger drains and exits.
    if logger.join().is_err() {
        warn!("event logger panicked");
    }
    result
}

/// Render a snapshot for the terminal.
pub fn format_snapshot(snapshot: &InfoSnapshot) -> String {
    let mut text = format!(
        "progress {:>3}%  datarate {:.1} bit/s  ber {:.2e}  bler {:.2e}",
        snapshot.progress, snapshot.datarate, snapshot.ber, snapshot.bler
    );
    if let Some(bitmap) = &snapshot.image_balance {
        let sent = bitmap.iter().filter(|&&block| block != 0).count();
        text.push_str(&format!("  blocks {}/{}", sent, bitmap.len()));
    }
    if let Some(stat) = &snapshot.stat {
        text.push('\n');
        text.push_str(stat);
    }
    text
}

/// Print info snapshots, once or every `watch` until `stop` is set.
pub fn run_info(
    connector: &mut Connector,
    watch: Option<Duration>,
    json: bool,
    out: &mut impl Write,
    stop: &AtomicBool,
) -> RunnerResult<usize> {
    let mut printed = 0;
    loop {
        let snapshot = connector.request_info()?;
        if json {
            writeln!(out, "{}", serde_json::to_string(&snapshot)?)?;
        } else {
            writeln!(out, "{}", format_snapshot(&snapshot))?;
        }
        printed += 1;

        let Some(interval) = watch else { break };
        sleep_unless_stopped(interval, stop);
        if stop.load(Ordering::Relaxed) {
            break;
        }
    }
    Ok(printed)
}

/// Apply `key=value` assignments in order.
pub fn run_set(connector: &mut Connector, assignments: &[String]) -> RunnerResult<()> {
    let changes = assignments
        .iter()
        .map(|text| parse_assignment(text))
        .collect::<RunnerResult<Vec<_>>>()?;
    connector.change_parameters(&changes)?;
    info!(count = changes.len(), "parameters applied");
    Ok(())
}

/// Upload a file and start transmitting it.
pub fn run_send(connector: &mut Connector, path: &Path) -> RunnerResult<usize> {
    let payload = std::fs::read(path)?;
    info!(path = %path.display(), bytes = payload.len(), "sending file");
    connector.start_transfer(&payload)?;
    Ok(payload.len())
}

/// Serve as the emulated device until `stop` is set.
pub fn run_emulate(config: EmulatorConfig, stop: &AtomicBool) -> RunnerResult<()> {
    let mut emulator = Emulator::new(config);
    let addr = emulator.open()?;
    info!(addr = %addr, "emulating upper layer, press Ctrl-C to stop");

    while !stop.load(Ordering::Relaxed) && emulator.is_running() {
        thread::sleep(STOP_CHECK_INTERVAL);
    }
    emulator.close();

    let state = emulator.state();
    info!(
        commands = state.commands_handled,
        ignored = state.frames_ignored,
        image_bytes = state.image.len(),
        "emulator finished"
    );
    Ok(())
}
