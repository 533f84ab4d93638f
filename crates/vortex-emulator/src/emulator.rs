//! Service thread answering a controller over a [`TcpServer`].

use crate::config::EmulatorConfig;
use crate::device::{respond, ModemState};
use crate::error::{EmulatorError, EmulatorResult};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, info_span, warn};
use vortex_protocol::{Command, CommandFramer};
use vortex_transport::{TcpServer, TransportError};

/// Emulated upper layer.
///
/// ```no_run
/// use vortex_emulator::{Emulator, EmulatorConfig};
///
/// let mut emulator = Emulator::new(EmulatorConfig::default().with_address("127.0.0.1", 0));
/// let addr = emulator.open()?;
/// println!("listening on {}", addr);
/// emulator.close();
/// # Ok::<(), vortex_emulator::EmulatorError>(())
/// ```
pub struct Emulator {
    config: Arc<EmulatorConfig>,
    state: Arc<Mutex<ModemState>>,
    stop_flag: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl Emulator {
    /// Create a stopped emulator.
    pub fn new(config: EmulatorConfig) -> Self {
        Emulator {
            config: Arc::new(config),
            state: Arc::new(Mutex::new(ModemState::default())),
            stop_flag: Arc::new(AtomicBool::new(false)),
            thread_handle: None,
            local_addr: None,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    /// Check if the service thread is running.
    pub fn is_running(&self) -> bool {
        self.thread_handle.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// Address the emulator listens on, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Copy of the current device state.
    pub fn state(&self) -> ModemState {
        self.state.lock().clone()
    }

    /// Start listening and serving, returning the bound address.
    pub fn open(&mut self) -> EmulatorResult<SocketAddr> {
        if self.thread_handle.is_some() {
            return Err(EmulatorError::AlreadyRunning);
        }

        let mut server = TcpServer::new();
        server.set_address(self.config.host.clone(), self.config.port)?;
        server.open()?;
        let addr = server.local_addr().ok_or(TransportError::Closed)?;

        self.stop_flag.store(false, Ordering::Release);
        let config = Arc::clone(&self.config);
        let state = Arc::clone(&self.state);
        let stop_flag = Arc::clone(&self.stop_flag);
        let span = info_span!("emulator", addr = %addr);

        let handle = thread::Builder::new()
            .name("vortex-emulator".to_string())
            .spawn(move || {
                let _entered = span.enter();
                serve(server, &config, &state, &stop_flag);
            })?;

        info!(addr = %addr, "emulator listening");
        self.thread_handle = Some(handle);
        self.local_addr = Some(addr);
        Ok(addr)
    }

    /// Stop the service thread and close the listening socket.
    pub fn close(&mut self) {
        self.stop_flag.store(true, Ordering::Release);
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("emulator thread panicked");
            }
            info!("emulator stopped");
        }
        self.local_addr = None;
    }
}

impl Drop for Emulator {
    fn drop(&mut self) {
        self.close();
    }
}

/// Main loop of the service thread.
///
/// Each frame is parsed once and answered once; frames that do not parse are
/// logged and counted. A partial frame never outlives the peer that sent it.
fn serve(
    mut server: TcpServer,
    config: &EmulatorConfig,
    state: &Mutex<ModemState>,
    stop_flag: &AtomicBool,
) {
    let mut framer = CommandFramer::new();
    let mut generation = server.peer_generation();
    let poll_interval = config.poll_interval();

    while !stop_flag.load(Ordering::Acquire) {
        let chunk = match server.read_chunk(poll_interval) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("transport failed: {}", e);
                break;
            }
        };

        if chunk.generation != generation {
            if framer.buffered_len() > 0 {
                debug!(len = framer.buffered_len(), "peer changed, dropping partial frame");
            }
            framer.clear();
            generation = chunk.generation;
        }

        for frame in framer.process(&chunk.data) {
            let command = match Command::parse(&frame) {
                Ok(command) => command,
                Err(e) => {
                    warn!("ignoring frame {:?}: {}", frame, e);
                    state.lock().frames_ignored += 1;
                    continue;
                }
            };
            debug!(tag = command.tag(), "command received");

            let response = respond(&mut state.lock(), config, command);
            if let Err(e) = server.write(&response.encode()) {
                warn!("reply dropped: {}", e);
            }
        }
    }

    server.close();
}
