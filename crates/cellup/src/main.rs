//! # cellup
//!
//! Drives a cellular modem online over its AT command port: checks the
//! modem answers, provisions the data context, enables the radio, waits
//! for the network to attach and brings up the data interface. Every
//! command and reply is appended to a traffic log.
//!
//! ## Usage
//!
//! ```bash
//! # Automatic bring-up, log next to the binary
//! cellup -d /dev/ttyUSB2
//!
//! # Custom APN and log file, stop once connected
//! cellup -d /dev/ttyUSB2 --apn internet -l /var/log/modem.log --exit-on-connect
//!
//! # Talk to the modem by hand (type EXIT to quit)
//! cellup -d /dev/ttyUSB2 -m
//!
//! # Soft-reset the modem
//! cellup -d /dev/ttyUSB2 -r
//! ```

mod cli;
mod tty;

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;

use cellup_core::error::{Source, EXIT_CONFIG, EXIT_INTERRUPTED};
use cellup_core::log::{LogSink, TabLog};
use cellup_core::source::spawn_reader;
use cellup_core::{BringUpConfig, Error, EventLoop, Exit};

use crate::cli::Cli;

type SharedLog = Arc<Mutex<TabLog<BufWriter<File>>>>;

fn main() -> ExitCode {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .compact()
        .init();

    // ── Parse CLI ───────────────────────────────────────────────
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_CONFIG)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, code = e.exit_code(), "cellup failed");
            ExitCode::from(e.exit_code())
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let config = cli.resolve()?;
    let log_path = cli.log_path();

    tracing::info!(
        device = %cli.device.display(),
        log = %log_path.display(),
        mode = ?config.mode,
        apn = %config.apn,
        "cellup starting"
    );

    // ── Traffic log + interrupt hook ────────────────────────────
    let log = open_log(&log_path).map_err(|e| Error::Config(format!("{e:#}")))?;
    install_interrupt_hook(log.clone());

    drive_logged(cli, &config, log)
}

/// Runs [`drive`] and flushes the traffic log however it ends, so the
/// header survives a failed start.
fn drive_logged(cli: &Cli, config: &BringUpConfig, log: SharedLog) -> Result<(), Error> {
    let mut sink = log.clone();
    let result = drive(cli, config, log);
    if let Err(e) = sink.flush() {
        tracing::warn!(error = %e, "traffic log flush failed");
    }
    result
}

fn drive(cli: &Cli, config: &BringUpConfig, log: SharedLog) -> Result<(), Error> {
    // ── Serial port ─────────────────────────────────────────────
    let port = tty::open(&cli.device, config.serial.baud)?;
    let reader = port.try_clone().map_err(|source| Error::TransportOpen {
        path: cli.device.clone(),
        source,
    })?;
    let device_rx = spawn_reader("device", reader, config.serial.read_chunk)
        .map_err(|e| Error::stream(Source::Device, e))?;

    let mut event_loop = EventLoop::new(config, port, device_rx, log)?;

    if cli.reset {
        return event_loop.soft_reset();
    }

    // ── Console ─────────────────────────────────────────────────
    let console_rx = spawn_reader("console", io::stdin(), config.serial.read_chunk)
        .map_err(|e| Error::stream(Source::Console, e))?;
    let mut event_loop = event_loop.with_console(console_rx, io::stdout());

    match event_loop.run()? {
        Exit::Operator => tracing::info!("stopped by operator"),
        Exit::Connected => tracing::info!("modem connected, exiting"),
    }
    Ok(())
}

fn open_log(path: &Path) -> anyhow::Result<SharedLog> {
    let file = File::create(path)
        .with_context(|| format!("cannot create log file {}", path.display()))?;
    let log = TabLog::start(BufWriter::new(file))
        .with_context(|| format!("cannot write log file {}", path.display()))?;
    Ok(Arc::new(Mutex::new(log)))
}

/// SIGINT flushes the traffic log and terminates immediately.
fn install_interrupt_hook(log: SharedLog) {
    let mut log = log;
    let installed = ctrlc::set_handler(move || {
        tracing::info!("interrupted, flushing traffic log");
        if let Err(e) = log.flush() {
            tracing::warn!(error = %e, "traffic log flush failed");
        }
        std::process::exit(i32::from(EXIT_INTERRUPTED));
    });
    if let Err(e) = installed {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
}
