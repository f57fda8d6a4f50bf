//! # cellup-core
//!
//! Brings a cellular modem online over its AT command port.
//!
//! The modem is walked through a fixed sequence of AT commands, each with a
//! response deadline, and the run fails fast on the first rejected or
//! unanswered stage. Device and operator console input are multiplexed by
//! a single-threaded event loop.
//!
//! ## Crate structure
//!
//! - [`framer`]: Splits raw reads into line records
//! - [`state`]: Bring-up states and the per-state table
//! - [`session`]: Current state, pending command, remaining budget
//! - [`dispatch`]: Inbound record interpretation and transitions
//! - [`event_loop`]: Act / wait / dispatch loop
//! - [`source`]: Reader threads feeding the loop
//! - [`log`]: Timestamped traffic transcript
//! - [`config`]: TOML configuration
//! - [`error`]: Fatal error taxonomy and exit codes

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event_loop;
pub mod framer;
pub mod log;
pub mod session;
pub mod source;
pub mod state;

pub use config::{BringUpConfig, Mode};
pub use error::{Error, Result};
pub use event_loop::{EventLoop, Exit};
pub use state::ModemState;
