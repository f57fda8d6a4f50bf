//! # Traffic Log
//!
//! Append-only record of every command written to the modem and every
//! record read back, one `timestamp<TAB>text` line per entry. This is the
//! protocol transcript; diagnostics go through `tracing`.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

/// Local-time rendering used for every timestamp in the log.
const TIMESTAMP_FORMAT: &str = "%c";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub direction: Direction,
    pub text: String,
}

impl LogEntry {
    pub fn now(direction: Direction, text: impl Into<String>) -> Self {
        LogEntry {
            at: Local::now(),
            direction,
            text: text.into(),
        }
    }
}

/// Destination for [`LogEntry`] values.
pub trait LogSink {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
}

/// Tab-separated transcript over any writer.
pub struct TabLog<W: Write> {
    out: W,
}

impl<W: Write> TabLog<W> {
    pub fn new(out: W) -> Self {
        TabLog { out }
    }

    /// Writes the `>>Log started at` header line.
    pub fn start(mut out: W) -> io::Result<Self> {
        writeln!(out, ">>Log started at {}", Local::now().format(TIMESTAMP_FORMAT))?;
        Ok(TabLog { out })
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write> LogSink for TabLog<W> {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        writeln!(
            self.out,
            "{}\t{}",
            entry.at.format(TIMESTAMP_FORMAT),
            entry.text
        )
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Lets the interrupt handler flush the same sink the event loop writes to.
impl<S: LogSink> LogSink for Arc<Mutex<S>> {
    fn write(&mut self, entry: &LogEntry) -> io::Result<()> {
        self.lock().unwrap_or_else(|e| e.into_inner()).write(entry)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock().unwrap_or_else(|e| e.into_inner()).flush()
    }
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullLog;

impl LogSink for NullLog {
    fn write(&mut self, _entry: &LogEntry) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
