//! Vortex Upper Layer Protocol
//!
//! This crate provides the wire grammar spoken between a controller and the
//! upper layer of a Vortex underwater modem over a TCP stream.
//!
//! # Protocol Overview
//!
//! The protocol is line oriented ASCII with a few binary exceptions:
//!
//! - **Queries** (controller → device): `VX?<TAG>\n`
//! - **Commands** (controller → device): `VX!<TAG> [value]\n`, acknowledged with `VX!OK\n`
//! - **Responses** (device → controller): `VX!<TAG> <fields>\n`
//! - **Variable commands**: `VX!DATA`, `VX!STAT` and `VX!IMBL` declare a body
//!   length so the body may hold arbitrary bytes, newlines included
//!
//! The byte stream arrives in chunks that have nothing to do with command
//! boundaries; [`CommandFramer`] reassembles complete frames.
//!
//! # Example
//!
//! ```rust
//! use vortex_protocol::{Command, CommandFramer, Parameter, Response};
//!
//! let line = Command::set(Parameter::Rate, "1/2").encode();
//! assert_eq!(line, b"VX!RATE 1/2\n");
//!
//! let mut framer = CommandFramer::new();
//! assert!(framer.process(b"VX!O").is_empty());
//! let frames = framer.process(b"K\n");
//! assert_eq!(Response::parse(&frames[0]), Ok(Response::Ok));
//! ```

mod commands;
mod constants;
mod error;
mod framer;
mod responses;

pub use commands::*;
pub use constants::*;
pub use error::*;
pub use framer::*;
pub use responses::*;
