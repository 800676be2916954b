use serde::{Deserialize, Serialize};
use std::fmt;

/// Position sequence id. Monotonically increasing within one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

impl From<u64> for PositionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Sequential id generator, owned by a single engine.
#[derive(Debug, Default)]
pub struct IdGen {
    next_position: u64,
}

impl IdGen {
    pub fn next_position_id(&mut self) -> PositionId {
        self.next_position += 1;
        PositionId(self.next_position)
    }

    /// Number of ids handed out so far.
    pub fn issued(&self) -> u64 {
        self.next_position
    }
}
