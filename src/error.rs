use thiserror::Error;

use crate::world::{LocationId, RouteId, VictimId};

/// Which pool of a location an operation touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Captives,
    Escapees,
}

impl std::fmt::Display for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pool::Captives => write!(f, "captive"),
            Pool::Escapees => write!(f, "escapee"),
        }
    }
}

/// Contract violations inside the flow engine. Callers check pool sizes and
/// populations before acting, so these only surface on a logic bug.
#[derive(Debug, Error, PartialEq)]
pub enum SimError {
    #[error("location '{location}' has no population left to acquire from")]
    PopulationExhausted { location: String },
    #[error("{pool} pool of location '{location}' is empty")]
    EmptyPool { location: String, pool: Pool },
    #[error("unknown victim {0:?}")]
    UnknownVictim(VictimId),
    #[error("victim {0:?} is not attached to any location")]
    DetachedVictim(VictimId),
    #[error("unknown location {0:?}")]
    UnknownLocation(LocationId),
    #[error("unknown location '{0}'")]
    UnknownLocationName(String),
    #[error("unknown route {0:?}")]
    UnknownRoute(RouteId),
    #[error("route must visit distinct locations, got {0:?} more than once")]
    RepeatedEndpoint(LocationId),
}

/// Structural problems in a network description. Any of these aborts startup.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("failed to read network file: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing '{0}' section marker")]
    MissingSection(&'static str),
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("line {line}: location '{name}' defined more than once")]
    DuplicateLocation { line: usize, name: String },
    #[error("line {line}: route references unknown location '{name}'")]
    UnknownLocation { line: usize, name: String },
    #[error("line {line}: route visits '{name}' more than once")]
    RepeatedEndpoint { line: usize, name: String },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
