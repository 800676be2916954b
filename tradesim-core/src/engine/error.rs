use chrono::NaiveDateTime;
use thiserror::Error;

use crate::domain::{BarError, PositionError, PositionId};
use crate::engine::config::ConfigError;

/// Fatal engine errors. Signal-level problems are rejections, not errors.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid bar stream: {0}")]
    Bars(#[from] BarError),

    #[error(transparent)]
    Position(#[from] PositionError),

    #[error("capacity exceeded: {open} positions open, limit is {limit}")]
    CapacityExceeded { open: usize, limit: usize },

    #[error("position {0} does not exist")]
    UnknownPosition(PositionId),

    #[error("bar at {current} does not follow the previous bar at {previous}")]
    OutOfOrderBar {
        previous: NaiveDateTime,
        current: NaiveDateTime,
    },

    #[error("close of position {id} at {closed_at} is earlier than {earliest}")]
    BackdatedClose {
        id: PositionId,
        closed_at: NaiveDateTime,
        earliest: NaiveDateTime,
    },

    #[error("no valid close price to mark open positions against")]
    NoMarkPrice,
}
