use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::state::ModemState;

// ── Exit codes ──────────────────────────────────────────────────────

pub const EXIT_OK: u8 = 0;
pub const EXIT_INTERRUPTED: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_TRANSPORT_OPEN: u8 = 3;
pub const EXIT_TRANSPORT_CONFIGURE: u8 = 4;
pub const EXIT_SOURCE: u8 = 5;
pub const EXIT_NOT_RESPONDING: u8 = 6;
pub const EXIT_STATE_TIMEOUT: u8 = 7;
pub const EXIT_HARD_FAILURE: u8 = 8;
pub const EXIT_CORRUPT_STATE: u8 = 0xff;

/// Which input stream an I/O failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Device,
    Console,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Device => f.write_str("device"),
            Source::Console => f.write_str("console"),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────

/// Fatal outcomes of a bring-up run. Nothing here is retried.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("cannot open {}: {source}", .path.display())]
    TransportOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot configure {}: {reason}", .path.display())]
    TransportConfigure { path: PathBuf, reason: String },

    #[error("{source_kind} stream failed: {error}")]
    Source {
        source_kind: Source,
        #[source]
        error: io::Error,
    },

    #[error("device not responding to {command:?} in state {state}")]
    NotResponding { state: ModemState, command: String },

    #[error("timed out in state {state}")]
    StateTimeout { state: ModemState },

    #[error("modem reported failure in state {state}: {line}")]
    HardFailure { state: ModemState, line: String },

    #[error("state table corrupt: {0}")]
    CorruptTable(String),
}

impl Error {
    /// A failed read, write or wait on one of the two streams.
    pub fn stream(source_kind: Source, error: io::Error) -> Self {
        Error::Source { source_kind, error }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config(_) => EXIT_CONFIG,
            Error::TransportOpen { .. } => EXIT_TRANSPORT_OPEN,
            Error::TransportConfigure { .. } => EXIT_TRANSPORT_CONFIGURE,
            Error::Source { .. } => EXIT_SOURCE,
            Error::NotResponding { .. } => EXIT_NOT_RESPONDING,
            Error::StateTimeout { .. } => EXIT_STATE_TIMEOUT,
            Error::HardFailure { .. } => EXIT_HARD_FAILURE,
            Error::CorruptTable(_) => EXIT_CORRUPT_STATE,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
