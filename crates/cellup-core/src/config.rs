use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_APN: &str = "ctnet";
pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_READ_CHUNK: usize = 1024;

/// Baud rates the serial layer knows how to program.
pub const SUPPORTED_BAUDS: [u32; 8] = [
    9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 460_800, 921_600,
];

/// Who drives the modem.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The bring-up sequence runs by itself.
    #[default]
    Automatic,
    /// The bring-up sequence is disabled; console lines go to the modem.
    Interactive,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BringUpConfigInput {
    pub apn: Option<String>,
    pub mode: Option<Mode>,
    pub exit_on_connect: Option<bool>,
    pub timeouts: TimeoutsInput,
    pub serial: SerialConfigInput,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimeoutsInput {
    pub test_link_ms: Option<u64>,
    pub setup_data_context_ms: Option<u64>,
    pub setup_radio_mode_ms: Option<u64>,
    pub wait_network_ms: Option<u64>,
    pub setup_link_mode_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SerialConfigInput {
    pub baud: Option<u32>,
    pub read_chunk: Option<usize>,
}

/// Budgets of the bounded bring-up states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub test_link: Duration,
    pub setup_data_context: Duration,
    pub setup_radio_mode: Duration,
    pub wait_network: Duration,
    pub setup_link_mode: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            test_link: Duration::from_secs(3),
            setup_data_context: Duration::from_secs(3),
            setup_radio_mode: Duration::from_secs(3),
            wait_network: Duration::from_secs(10),
            setup_link_mode: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub baud: u32,
    /// Size of one read from the device or console.
    pub read_chunk: usize,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpConfig {
    pub apn: String,
    pub mode: Mode,
    /// Return from the event loop once `Connected` is reached instead of
    /// serving the console indefinitely.
    pub exit_on_connect: bool,
    pub timeouts: Timeouts,
    pub serial: SerialConfig,
}

impl Default for BringUpConfig {
    fn default() -> Self {
        Self {
            apn: DEFAULT_APN.to_string(),
            mode: Mode::Automatic,
            exit_on_connect: false,
            timeouts: Timeouts::default(),
            serial: SerialConfig::default(),
        }
    }
}

impl BringUpConfigInput {
    pub fn resolve(self) -> Result<BringUpConfig> {
        let defaults = BringUpConfig::default();

        let apn = match self.apn {
            Some(apn) => validate_apn(apn.trim())?,
            None => defaults.apn,
        };

        let ms = |v: Option<u64>, d: Duration| v.map(Duration::from_millis).unwrap_or(d);
        let t = defaults.timeouts;
        let timeouts = Timeouts {
            test_link: ms(self.timeouts.test_link_ms, t.test_link),
            setup_data_context: ms(self.timeouts.setup_data_context_ms, t.setup_data_context),
            setup_radio_mode: ms(self.timeouts.setup_radio_mode_ms, t.setup_radio_mode),
            wait_network: ms(self.timeouts.wait_network_ms, t.wait_network),
            setup_link_mode: ms(self.timeouts.setup_link_mode_ms, t.setup_link_mode),
        };

        let baud = self.serial.baud.unwrap_or(defaults.serial.baud);
        validate_baud(baud)?;
        let read_chunk = self
            .serial
            .read_chunk
            .unwrap_or(defaults.serial.read_chunk)
            .max(64);

        Ok(BringUpConfig {
            apn,
            mode: self.mode.unwrap_or(defaults.mode),
            exit_on_connect: self.exit_on_connect.unwrap_or(defaults.exit_on_connect),
            timeouts,
            serial: SerialConfig { baud, read_chunk },
        })
    }
}

impl BringUpConfig {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(BringUpConfig::default());
        }
        let parsed: BringUpConfigInput = toml::from_str(input)
            .map_err(|e| Error::Config(format!("invalid config TOML: {e}")))?;
        parsed.resolve()
    }
}

/// The APN is spliced into a quoted AT argument.
pub fn validate_apn(apn: &str) -> Result<String> {
    if apn.is_empty() {
        return Err(Error::Config("APN must not be empty".into()));
    }
    if let Some(bad) = apn.chars().find(|c| !c.is_ascii_graphic() || *c == '"') {
        return Err(Error::Config(format!(
            "APN {apn:?} contains unsupported character {bad:?}"
        )));
    }
    Ok(apn.to_string())
}

pub fn validate_baud(baud: u32) -> Result<()> {
    if SUPPORTED_BAUDS.contains(&baud) {
        Ok(())
    } else {
        Err(Error::Config(format!("unsupported baud rate {baud}")))
    }
}
