//! # Event Loop
//!
//! Drives the bring-up sequence. Each iteration:
//!
//! 1. performs the current state's entry action once (send a command,
//!    re-check an entry condition, or nothing) and arms its budget,
//! 2. waits on the device and console receivers for at most the remaining
//!    budget, charging the measured wait against it,
//! 3. fails the run if a bounded budget ran out,
//! 4. frames and dispatches device input, then console input.
//!
//! The remaining budget is decremented, never re-armed, while a state is
//! active: console traffic cannot push back an ack deadline.

use std::io::{self, Write};

use crossbeam_channel::{Receiver, Select, TryRecvError};
use quanta::Instant;

use crate::config::{BringUpConfig, Mode};
use crate::dispatch::{self, Outcome};
use crate::error::{Error, Result, Source};
use crate::framer;
use crate::log::{Direction, LogEntry, LogSink};
use crate::session::Session;
use crate::source::Input;
use crate::state::{Action, ModemState, StateTable, SOFT_RESET_COMMAND};

/// Console line that ends the run.
pub const EXIT_COMMAND: &str = "EXIT";

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The operator typed `EXIT`.
    Operator,
    /// `Connected` was reached and the loop was told to stop there.
    Connected,
}

/// Result of one multiplexed wait.
enum Wakeup {
    TimedOut,
    Ready {
        device: Option<Input>,
        console: Option<Input>,
    },
}

pub struct EventLoop<W: Write, L: LogSink> {
    table: StateTable,
    session: Session,
    mode: Mode,
    exit_on_connect: bool,
    device: W,
    device_rx: Receiver<Input>,
    console_rx: Option<Receiver<Input>>,
    display: Box<dyn Write>,
    log: L,
}

impl<W: Write, L: LogSink> EventLoop<W, L> {
    /// Builds a loop with no console attached.
    pub fn new(config: &BringUpConfig, device: W, device_rx: Receiver<Input>, log: L) -> Result<Self> {
        Ok(EventLoop {
            table: StateTable::new(config)?,
            session: Session::new(),
            mode: config.mode,
            exit_on_connect: config.exit_on_connect,
            device,
            device_rx,
            console_rx: None,
            display: Box::new(io::sink()),
            log,
        })
    }

    /// Attaches operator input and the writer device records are echoed to
    /// in interactive mode.
    pub fn with_console(mut self, console_rx: Receiver<Input>, display: impl Write + 'static) -> Self {
        self.console_rx = Some(console_rx);
        self.display = Box::new(display);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn device(&self) -> &W {
        &self.device
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Runs until `EXIT`, `Connected` (when configured to stop there), or
    /// the first fatal error.
    pub fn run(&mut self) -> Result<Exit> {
        tracing::info!(mode = ?self.mode, "bring-up started");
        let result = loop {
            match self.step() {
                Ok(Some(exit)) => break Ok(exit),
                Ok(None) => {}
                Err(e) => break Err(e),
            }
        };
        self.flush_log();
        result
    }

    /// Writes the soft reset command. Not part of the bring-up sequence.
    pub fn soft_reset(&mut self) -> Result<()> {
        tracing::info!("sending soft reset");
        self.write_command(SOFT_RESET_COMMAND)?;
        self.flush_log();
        Ok(())
    }

    /// One loop iteration.
    pub fn step(&mut self) -> Result<Option<Exit>> {
        // ── Act ──
        if self.session.needs_action() {
            let state = self.session.state();
            let entry = self.table.lookup(state).clone();
            self.session.arm(entry.timeout);
            match entry.action {
                Action::Send(command) => {
                    self.write_command(&command)?;
                    self.session.command_sent();
                }
                Action::Reevaluate => {
                    if dispatch::reevaluate(&mut self.session, self.mode).is_some() {
                        return Ok(None);
                    }
                }
                Action::Wait => {}
            }
        }

        // ── Wait ──
        let (device, console) = match self.wait() {
            Wakeup::TimedOut if self.session.expired() => return Err(self.timed_out()),
            Wakeup::TimedOut => return Ok(None),
            Wakeup::Ready { device, console } => (device, console),
        };

        // Device first: its errors win over anything the console delivered.
        if let Some(input) = device {
            if let Some(exit) = self.on_device(input)? {
                return Ok(Some(exit));
            }
        }
        if let Some(input) = console {
            return self.on_console(input);
        }
        Ok(None)
    }

    fn wait(&mut self) -> Wakeup {
        let budget = self.session.remaining();
        let started = Instant::now();
        let ready = {
            let mut select = Select::new();
            select.recv(&self.device_rx);
            if let Some(console) = &self.console_rx {
                select.recv(console);
            }
            match budget {
                Some(timeout) => select.ready_timeout(timeout).is_ok(),
                None => {
                    select.ready();
                    true
                }
            }
        };
        self.session.consume(started.elapsed());

        if !ready {
            return Wakeup::TimedOut;
        }
        Wakeup::Ready {
            device: take(&self.device_rx),
            console: self.console_rx.as_ref().and_then(take),
        }
    }

    fn timed_out(&self) -> Error {
        let state = self.session.state();
        if self.session.command_pending() {
            let command = match &self.table.lookup(state).action {
                Action::Send(command) => command.clone(),
                Action::Wait | Action::Reevaluate => String::new(),
            };
            Error::NotResponding { state, command }
        } else {
            Error::StateTimeout { state }
        }
    }

    fn on_device(&mut self, input: Input) -> Result<Option<Exit>> {
        let bytes = match input {
            Input::Data(bytes) => bytes,
            Input::Closed => {
                return Err(Error::stream(
                    Source::Device,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "device closed"),
                ))
            }
            Input::Failed(e) => return Err(Error::stream(Source::Device, e)),
        };

        for record in framer::records(&bytes) {
            let record = match record {
                Ok(raw) => String::from_utf8_lossy(raw).into_owned(),
                Err(e) => {
                    tracing::warn!(error = %e, "device framing error, dropping rest of read");
                    break;
                }
            };
            self.record(Direction::Received, &record);

            if self.mode == Mode::Interactive {
                writeln!(self.display, "{record}")
                    .and_then(|_| self.display.flush())
                    .map_err(|e| Error::stream(Source::Console, e))?;
                continue;
            }

            match dispatch::dispatch(&mut self.session, &record) {
                Outcome::Failed { state } => {
                    tracing::error!(%state, line = %record, "modem rejected bring-up stage");
                    return Err(Error::HardFailure { state, line: record });
                }
                Outcome::Advanced {
                    to: ModemState::Connected,
                    ..
                } => {
                    tracing::info!("modem connected");
                    if self.exit_on_connect {
                        return Ok(Some(Exit::Connected));
                    }
                }
                Outcome::Advanced { .. } => {}
                Outcome::Ignored => {
                    tracing::debug!(state = %self.session.state(), %record, "record ignored");
                }
            }
        }
        Ok(None)
    }

    fn on_console(&mut self, input: Input) -> Result<Option<Exit>> {
        let bytes = match input {
            Input::Data(bytes) => bytes,
            Input::Closed => {
                tracing::info!("console closed, no longer watching it");
                self.console_rx = None;
                return Ok(None);
            }
            Input::Failed(e) => return Err(Error::stream(Source::Console, e)),
        };

        for record in framer::records(&bytes) {
            let line = match record {
                Ok(raw) => String::from_utf8_lossy(raw).into_owned(),
                Err(e) => {
                    tracing::warn!(error = %e, "console framing error, dropping rest of read");
                    break;
                }
            };
            if line == EXIT_COMMAND {
                tracing::info!("exit requested from console");
                return Ok(Some(Exit::Operator));
            }
            match self.mode {
                Mode::Interactive => self.write_command(&line)?,
                Mode::Automatic => {
                    tracing::info!(%line, "console input ignored during automatic bring-up");
                }
            }
        }
        Ok(None)
    }

    fn write_command(&mut self, command: &str) -> Result<()> {
        self.record(Direction::Sent, command);
        self.device
            .write_all(format!("{command}\r\n").as_bytes())
            .and_then(|_| self.device.flush())
            .map_err(|e| Error::stream(Source::Device, e))
    }

    fn record(&mut self, direction: Direction, text: &str) {
        tracing::debug!(?direction, text, "traffic");
        if let Err(e) = self.log.write(&LogEntry::now(direction, text)) {
            tracing::warn!(error = %e, "traffic log write failed");
        }
    }

    fn flush_log(&mut self) {
        if let Err(e) = self.log.flush() {
            tracing::warn!(error = %e, "traffic log flush failed");
        }
    }
}

fn take(rx: &Receiver<Input>) -> Option<Input> {
    match rx.try_recv() {
        Ok(input) => Some(input),
        Err(TryRecvError::Empty) => None,
        Err(TryRecvError::Disconnected) => Some(Input::Closed),
    }
}
