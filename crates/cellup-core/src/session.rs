//! Mutable bring-up state owned by the event loop.

use std::time::Duration;

use crate::state::ModemState;

/// Current state, pending-command flag and the remaining budget.
///
/// The state never changes while a command is pending, with one exception:
/// `WaitNetwork -> SetupLinkMode`, which is driven by an unsolicited
/// notification and never has a command outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    state: ModemState,
    command_pending: bool,
    /// `None` is an unbounded wait.
    remaining: Option<Duration>,
    /// The entry action of `state` has been performed.
    armed: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            state: ModemState::Init,
            command_pending: false,
            remaining: None,
            armed: false,
        }
    }

    pub fn state(&self) -> ModemState {
        self.state
    }

    pub fn command_pending(&self) -> bool {
        self.command_pending
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.remaining
    }

    /// True when the current state's entry action is still due.
    pub fn needs_action(&self) -> bool {
        !self.command_pending && !self.armed
    }

    /// Marks the entry action as performed and resets the budget.
    pub fn arm(&mut self, budget: Option<Duration>) {
        self.remaining = budget;
        self.armed = true;
    }

    pub fn command_sent(&mut self) {
        self.command_pending = true;
    }

    /// A terminal response (ack or failure) arrived for the pending command.
    pub fn settle(&mut self) {
        self.command_pending = false;
    }

    pub fn transition(&mut self, to: ModemState) {
        let from = self.state;
        debug_assert!(
            !self.command_pending
                || to == ModemState::Error
                || (from == ModemState::WaitNetwork && to == ModemState::SetupLinkMode),
            "state change {from} -> {to} with a command pending"
        );
        tracing::debug!(%from, %to, "state transition");
        self.state = to;
        self.armed = false;
    }

    /// Charges `elapsed` against a bounded budget, flooring at zero.
    pub fn consume(&mut self, elapsed: Duration) {
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(elapsed);
        }
    }

    pub fn expired(&self) -> bool {
        self.remaining == Some(Duration::ZERO)
    }
}
