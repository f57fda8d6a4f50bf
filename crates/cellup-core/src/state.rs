//! # Bring-up States
//!
//! The modem is driven through a fixed sequence:
//!
//! ```text
//!   Init ─▶ TestLink ─OK─▶ SetupDataContext ─OK─▶ SetupRadioMode ─OK─▶ WaitNetwork
//!                                                                        │
//!                                                               +CGEV ME PDN ACT
//!                                                                        ▼
//!                                            Connected ◀─OK─ SetupLinkMode
//!
//!   any non-terminal ─+CME ERROR:─▶ Error
//! ```
//!
//! Every state owns one [`StateEntry`] in the [`StateTable`]: display name,
//! timeout budget and the action performed on entry.

use std::fmt;
use std::time::Duration;

use crate::config::BringUpConfig;
use crate::error::{Error, Result};

/// Resets the modem outside of the bring-up sequence.
pub const SOFT_RESET_COMMAND: &str = "AT+ZSOFTRESET";

// ─── States ─────────────────────────────────────────────────────────────────

/// Bring-up state. Declaration order is bring-up order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModemState {
    /// Nothing done yet.
    Init,
    /// `AT` sent, waiting for the modem to answer at all.
    TestLink,
    /// Provisioning the packet data context.
    SetupDataContext,
    /// Switching the radio to full functionality.
    SetupRadioMode,
    /// Waiting for the unsolicited network-attach notification.
    WaitNetwork,
    /// Activating the data path as a network interface.
    SetupLinkMode,
    /// Bring-up finished.
    Connected,
    /// The modem rejected a command.
    Error,
}

impl ModemState {
    pub const COUNT: usize = 8;

    pub const ALL: [ModemState; Self::COUNT] = [
        ModemState::Init,
        ModemState::TestLink,
        ModemState::SetupDataContext,
        ModemState::SetupRadioMode,
        ModemState::WaitNetwork,
        ModemState::SetupLinkMode,
        ModemState::Connected,
        ModemState::Error,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ModemState::Init => "INIT",
            ModemState::TestLink => "TEST_LINK",
            ModemState::SetupDataContext => "SETUP_DATA_CONTEXT",
            ModemState::SetupRadioMode => "SETUP_RADIO_MODE",
            ModemState::WaitNetwork => "WAIT_NETWORK",
            ModemState::SetupLinkMode => "SETUP_LINK_MODE",
            ModemState::Connected => "CONNECTED",
            ModemState::Error => "ERROR",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ModemState::Connected | ModemState::Error)
    }

    /// Successor after the modem acknowledges this state's command.
    pub fn on_ack(self) -> Option<ModemState> {
        match self {
            ModemState::TestLink => Some(ModemState::SetupDataContext),
            ModemState::SetupDataContext => Some(ModemState::SetupRadioMode),
            ModemState::SetupRadioMode => Some(ModemState::WaitNetwork),
            ModemState::SetupLinkMode => Some(ModemState::Connected),
            ModemState::Init
            | ModemState::WaitNetwork
            | ModemState::Connected
            | ModemState::Error => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ModemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Actions ────────────────────────────────────────────────────────────────

/// What the event loop does when a state is entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No I/O. Block on the inputs for the state's budget.
    Wait,
    /// No I/O. Re-check the state's entry condition before blocking.
    Reevaluate,
    /// Write one command and wait for its terminal response.
    Send(String),
}

/// Immutable per-state attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateEntry {
    pub state: ModemState,
    pub name: &'static str,
    /// `None` is an infinite budget.
    pub timeout: Option<Duration>,
    pub action: Action,
}

// ─── Table ──────────────────────────────────────────────────────────────────

/// One entry per [`ModemState`], indexed by declaration order.
#[derive(Debug, Clone)]
pub struct StateTable {
    entries: Vec<StateEntry>,
}

impl StateTable {
    /// Builds the table for a run and checks it is complete.
    pub fn new(config: &BringUpConfig) -> Result<Self> {
        let entries = ModemState::ALL
            .iter()
            .map(|&state| entry_for(state, config))
            .collect();
        let table = StateTable { entries };
        table.validate()?;
        Ok(table)
    }

    /// Every state must own exactly one entry, stored at its own index.
    pub fn validate(&self) -> Result<()> {
        if self.entries.len() != ModemState::COUNT {
            return Err(Error::CorruptTable(format!(
                "{} entries for {} states",
                self.entries.len(),
                ModemState::COUNT
            )));
        }
        for (idx, state) in ModemState::ALL.iter().enumerate() {
            let entry = &self.entries[idx];
            if entry.state != *state || state.index() != idx {
                return Err(Error::CorruptTable(format!(
                    "slot {idx} holds {} instead of {state}",
                    entry.state
                )));
            }
        }
        Ok(())
    }

    pub fn lookup(&self, state: ModemState) -> &StateEntry {
        &self.entries[state.index()]
    }
}

fn entry_for(state: ModemState, config: &BringUpConfig) -> StateEntry {
    let t = &config.timeouts;
    let (timeout, action) = match state {
        ModemState::Init => (None, Action::Reevaluate),
        ModemState::TestLink => (Some(t.test_link), Action::Send("AT".into())),
        ModemState::SetupDataContext => (
            Some(t.setup_data_context),
            Action::Send(format!("AT+CGDCONT=1,\"IPV4V6\",\"{}\"", config.apn)),
        ),
        ModemState::SetupRadioMode => (Some(t.setup_radio_mode), Action::Send("AT+CFUN=1".into())),
        ModemState::WaitNetwork => (Some(t.wait_network), Action::Wait),
        ModemState::SetupLinkMode => (
            Some(t.setup_link_mode),
            Action::Send("AT+ZGACT=1,1".into()),
        ),
        ModemState::Connected | ModemState::Error => (None, Action::Wait),
    };
    StateEntry {
        state,
        name: state.name(),
        timeout,
        action,
    }
}
