use std::fmt;

use crate::geometry::{BlockPos, Direction};

/// Recoverable failures of a single automated attempt. None of these stop the
/// orchestrator; the next triggering event gets a fresh attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DroppyError {
    MapUnknown,
    GeometryUnresolved { map: String },
    NotAtVantagePoint { map: String },
    NoSavedMacro { map: String, direction: Direction },
    NotAligned { steps_x: u32, steps_z: u32 },
    NavigationUnreachable { goal: BlockPos, waited_ticks: u64 },
    StaleEvent { since_last_ticks: u64 },
    Storage(String),
}

impl fmt::Display for DroppyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MapUnknown => write!(f, "no active map detected"),
            Self::GeometryUnresolved { map } => {
                write!(f, "cannot resolve vantage points for map {map}")
            }
            Self::NotAtVantagePoint { map } => {
                write!(f, "player is not standing on a vantage point of {map}")
            }
            Self::NoSavedMacro { map, direction } => {
                write!(f, "no saved macro for {map}/{direction}")
            }
            Self::NotAligned { steps_x, steps_z } => write!(
                f,
                "player is off block center (x steps={steps_x}, z steps={steps_z})"
            ),
            Self::NavigationUnreachable { goal, waited_ticks } => write!(
                f,
                "goal {goal} not reached after {waited_ticks} ticks"
            ),
            Self::StaleEvent { since_last_ticks } => write!(
                f,
                "resync discarded: only {since_last_ticks} ticks after the previous one"
            ),
            Self::Storage(message) => write!(f, "storage failure: {message}"),
        }
    }
}

impl std::error::Error for DroppyError {}

impl From<anyhow::Error> for DroppyError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(format!("{err:#}"))
    }
}
