use std::fmt::{self, Debug, Display};
use std::io;

use crate::agent::{AgentId, InfectionStatus};
use crate::arena::ArenaId;

/// Provides `OutbreakError` and maps other errors to
/// convert to an `OutbreakError`
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum OutbreakError {
    IoError(io::Error),
    JsonError(serde_json::Error),
    CsvError(csv::Error),
    /// A tunable is missing, non-finite or outside its allowed range.
    InvalidParameter {
        name: &'static str,
        reason: String,
    },
    /// Statistics were requested before any tick recorded a snapshot.
    NoStatistics,
    /// Migration needs at least two arenas.
    SingleArena,
    InvalidTransition {
        from: InfectionStatus,
        to: InfectionStatus,
    },
    UnknownAgent(AgentId),
    UnknownArena(ArenaId),
    /// A plan was scheduled in the past or at a non-finite time.
    InvalidTime(f64),
    ReportError(String),
    OutbreakError(String),
}

pub(crate) fn invalid_parameter(name: &'static str, reason: impl Into<String>) -> OutbreakError {
    OutbreakError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

impl From<io::Error> for OutbreakError {
    fn from(error: io::Error) -> Self {
        OutbreakError::IoError(error)
    }
}

impl From<serde_json::Error> for OutbreakError {
    fn from(error: serde_json::Error) -> Self {
        OutbreakError::JsonError(error)
    }
}

impl From<csv::Error> for OutbreakError {
    fn from(error: csv::Error) -> Self {
        OutbreakError::CsvError(error)
    }
}

impl From<String> for OutbreakError {
    fn from(error: String) -> Self {
        OutbreakError::OutbreakError(error)
    }
}

impl From<&str> for OutbreakError {
    fn from(error: &str) -> Self {
        OutbreakError::OutbreakError(error.to_string())
    }
}

impl std::error::Error for OutbreakError {}

impl Display for OutbreakError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OutbreakError::InvalidParameter { name, reason } => {
                write!(f, "Error: invalid parameter `{name}`: {reason}")
            }
            OutbreakError::NoStatistics => {
                write!(f, "Error: no statistics have been recorded yet")
            }
            OutbreakError::SingleArena => {
                write!(f, "Error: migration requires more than one arena")
            }
            OutbreakError::InvalidTransition { from, to } => {
                write!(f, "Error: invalid status transition {from:?} -> {to:?}")
            }
            _ => write!(f, "Error: {self:?}"),
        }
    }
}
