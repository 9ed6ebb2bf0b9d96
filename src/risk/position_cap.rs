use serde::{Deserialize, Serialize};

/// Limits on how much exposure the loop may open
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionCap {
    pub max_concurrent_positions: usize,
}

impl Default for PositionCap {
    fn default() -> Self {
        Self {
            max_concurrent_positions: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionCapTrip {
    MaxConcurrentPositions { committed: usize, max: usize },
}

impl PositionCap {
    pub fn new(max_concurrent_positions: usize) -> Self {
        Self {
            max_concurrent_positions,
        }
    }

    /// Check whether one more symbol may be entered
    ///
    /// `committed` counts symbols with an open position or a resting order, so
    /// that entries still waiting for a fill are covered by the cap.
    pub fn check(&self, committed: usize) -> Result<(), PositionCapTrip> {
        if committed >= self.max_concurrent_positions {
            return Err(PositionCapTrip::MaxConcurrentPositions {
                committed,
                max: self.max_concurrent_positions,
            });
        }

        Ok(())
    }
}
