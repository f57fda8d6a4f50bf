use std::path::PathBuf;

use clap::Parser;

use cellup_core::config::{validate_apn, validate_baud};
use cellup_core::{BringUpConfig, Error, Mode};

/// Brings a cellular modem online over its AT serial port.
#[derive(Parser, Debug, Clone)]
#[command(name = "cellup", version, about = "Cellular modem bring-up daemon")]
pub struct Cli {
    /// Modem AT port, e.g. /dev/ttyUSB2.
    #[arg(short = 'd', long)]
    pub device: PathBuf,

    /// Traffic log file [default: <program>.log].
    #[arg(short = 'l', long)]
    pub log: Option<PathBuf>,

    /// Disable the automatic bring-up; console lines are sent to the modem.
    #[arg(short = 'm', long, default_value_t = false)]
    pub manual: bool,

    /// Soft-reset the modem and exit.
    #[arg(short = 'r', long, default_value_t = false)]
    pub reset: bool,

    /// TOML configuration file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Access point name for the data context.
    #[arg(long)]
    pub apn: Option<String>,

    /// Exit once the modem is connected instead of staying attached.
    #[arg(long, default_value_t = false)]
    pub exit_on_connect: bool,

    /// Serial line speed.
    #[arg(long)]
    pub baud: Option<u32>,
}

impl Cli {
    /// Loads the config file (if any) and applies command-line overrides.
    pub fn resolve(&self) -> Result<BringUpConfig, Error> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                BringUpConfig::from_toml_str(&text)?
            }
            None => BringUpConfig::default(),
        };

        if let Some(apn) = &self.apn {
            config.apn = validate_apn(apn.trim())?;
        }
        if self.manual {
            config.mode = Mode::Interactive;
        }
        if self.exit_on_connect {
            config.exit_on_connect = true;
        }
        if let Some(baud) = self.baud {
            validate_baud(baud)?;
            config.serial.baud = baud;
        }
        Ok(config)
    }

    pub fn log_path(&self) -> PathBuf {
        self.log.clone().unwrap_or_else(default_log_path)
    }
}

/// `<argv0>.log`, next to wherever the program was invoked from.
fn default_log_path() -> PathBuf {
    let mut name = std::env::args_os()
        .next()
        .unwrap_or_else(|| "cellup".into());
    name.push(".log");
    PathBuf::from(name)
}
