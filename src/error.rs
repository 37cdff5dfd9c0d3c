use std::fmt::{self, Display};
use std::io;

use crate::orchestrator::ChannelId;
use crate::AgentId;

/// Provides `ContactError` and maps to other errors to
/// convert to a `ContactError`
///
/// The variants `EvictedState`, `UnknownAgent`, `UnknownChannel` and `DayOutOfRange` are
/// contract violations: they mean the caller asked for something the engine promised never to
/// serve, and a simulation that receives one should stop.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum ContactError {
    /// A time bucket older than the retention window was requested.
    EvictedState { state: usize, oldest_retained: usize },
    UnknownAgent(AgentId),
    UnknownChannel(ChannelId),
    DayOutOfRange { day: usize, offset: isize },
    WrongChannelKind {
        channel: ChannelId,
        expected: &'static str,
    },
    InvalidParameter(String),
    IoError(io::Error),
    JsonError(serde_json::Error),
    ContactError(String),
}

impl From<io::Error> for ContactError {
    fn from(error: io::Error) -> Self {
        ContactError::IoError(error)
    }
}

impl From<serde_json::Error> for ContactError {
    fn from(error: serde_json::Error) -> Self {
        ContactError::JsonError(error)
    }
}

impl From<String> for ContactError {
    fn from(error: String) -> Self {
        ContactError::ContactError(error)
    }
}

impl From<&str> for ContactError {
    fn from(error: &str) -> Self {
        ContactError::ContactError(error.to_string())
    }
}

impl std::error::Error for ContactError {}

impl Display for ContactError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ContactError::EvictedState {
                state,
                oldest_retained,
            } => write!(
                f,
                "Error: state {state} was evicted; the oldest retained state is {oldest_retained}"
            ),
            ContactError::UnknownAgent(agent) => {
                write!(f, "Error: {agent:?} is not registered")
            }
            ContactError::UnknownChannel(channel) => {
                write!(f, "Error: channel {channel} does not exist")
            }
            ContactError::DayOutOfRange { day, offset } => {
                write!(f, "Error: offset {offset} from day {day} is before day 0")
            }
            ContactError::WrongChannelKind { channel, expected } => {
                write!(f, "Error: channel {channel} is not a {expected} channel")
            }
            _ => write!(f, "Error: {self:?}"),
        }
    }
}
