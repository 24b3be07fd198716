//! Core types shared across the engine.

use serde::{Deserialize, Serialize};

/// The direction of optimization.
///
/// The engine itself always minimizes; [`Maximize`](Direction::Maximize)
/// is applied by negating the extracted metric before it reaches the
/// optimizer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Minimize the objective value.
    #[default]
    Minimize,
    /// Maximize the objective value.
    Maximize,
}

impl Direction {
    /// Maps a raw metric value onto the engine's minimization scale.
    #[must_use]
    pub fn orient(self, value: f64) -> f64 {
        match self {
            Self::Minimize => value,
            Self::Maximize => -value,
        }
    }
}
