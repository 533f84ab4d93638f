//! Reference upper layer for the Vortex control protocol.
//!
//! The [`Emulator`] listens with a [`TcpServer`](vortex_transport::TcpServer)
//! and answers every tag the device understands, so a controller can be
//! developed and tested without hardware. The device state it builds up is
//! available through [`Emulator::state`].

mod config;
mod device;
mod emulator;
mod error;

pub use config::{EmulatorConfig, DEFAULT_STAT_TEXT};
pub use device::{respond, ModemState};
pub use emulator::Emulator;
pub use error::{EmulatorError, EmulatorResult};
