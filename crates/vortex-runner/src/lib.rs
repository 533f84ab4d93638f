//! Command-line front end of the Vortex control link.
//!
//! The `vortex` binary wraps the pieces of this library:
//!
//! - [`RunnerConfig`] loads the YAML configuration
//! - [`open_session`] connects a controller and pushes the parameter profile
//! - `run_*` functions implement the subcommands

mod commands;
mod config;
mod error;

pub use commands::{
    format_snapshot, open_session, run_emulate, run_info, run_send, run_set, spawn_event_logger,
    watch_interval, with_session,
};
pub use config::{parse_assignment, RunnerConfig};
pub use error::{RunnerError, RunnerResult};
