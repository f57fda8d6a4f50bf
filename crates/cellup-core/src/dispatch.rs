//! # Dispatcher
//!
//! Interprets one inbound record against the current state. Records are
//! classified by prefix; only the transitions listed on [`ModemState::on_ack`]
//! and the network-attach notification move the state forward.

use crate::config::Mode;
use crate::session::Session;
use crate::state::ModemState;

const ACK_PREFIX: &str = "OK";
const FAILURE_PREFIX: &str = "+CME ERROR:";
const EVENT_PREFIX: &str = "+CGEV";
const ATTACH_MARKER: &str = "ME PDN ACT";

/// Classification of an inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ack,
    HardFailure,
    NetworkAttached,
    /// A `+CGEV` notification other than an attach.
    Event,
    Other,
}

impl Response {
    pub fn classify(record: &str) -> Self {
        if record.starts_with(ACK_PREFIX) {
            Response::Ack
        } else if record.starts_with(FAILURE_PREFIX) {
            Response::HardFailure
        } else if record.starts_with(EVENT_PREFIX) {
            if record.contains(ATTACH_MARKER) {
                Response::NetworkAttached
            } else {
                Response::Event
            }
        } else {
            Response::Other
        }
    }
}

/// What dispatching a record did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No state change.
    Ignored,
    Advanced { from: ModemState, to: ModemState },
    /// The modem rejected the current stage; the session is now in `Error`.
    Failed { state: ModemState },
}

pub fn dispatch(session: &mut Session, record: &str) -> Outcome {
    let state = session.state();
    match Response::classify(record) {
        Response::Ack => match (session.command_pending(), state.on_ack()) {
            (true, Some(to)) => {
                session.settle();
                session.transition(to);
                Outcome::Advanced { from: state, to }
            }
            _ => {
                tracing::debug!(%state, "ack with no command pending");
                Outcome::Ignored
            }
        },
        Response::HardFailure => {
            if state.is_terminal() {
                tracing::warn!(%state, record, "modem error after bring-up finished");
                return Outcome::Ignored;
            }
            session.settle();
            session.transition(ModemState::Error);
            Outcome::Failed { state }
        }
        Response::NetworkAttached if state == ModemState::WaitNetwork => {
            session.transition(ModemState::SetupLinkMode);
            Outcome::Advanced {
                from: state,
                to: ModemState::SetupLinkMode,
            }
        }
        Response::NetworkAttached | Response::Event | Response::Other => Outcome::Ignored,
    }
}

/// Entry condition of states whose action is [`Action::Reevaluate`].
///
/// [`Action::Reevaluate`]: crate::state::Action::Reevaluate
pub fn reevaluate(session: &mut Session, mode: Mode) -> Option<ModemState> {
    let state = session.state();
    let next = match (state, mode) {
        (ModemState::Init, Mode::Automatic) => Some(ModemState::TestLink),
        _ => None,
    };
    if let Some(to) = next {
        session.transition(to);
    }
    next
}
