//! The [`Objective`] trait defines what gets minimized.
//!
//! The optimizer hands an objective one denormalized value per variable, in
//! declaration order, and expects a scalar back. Plain closures work
//! directly:
//!
//! ```
//! use hypered::prelude::*;
//! use serde_json::Value;
//!
//! let space = Space::new(vec![Variable::real(-10.0, 10.0)]).unwrap();
//! let optimizer = BayesianOptimizer::builder(space)
//!     .n_initial_points(3)
//!     .n_calls(6)
//!     .seed(1)
//!     .build()
//!     .unwrap();
//!
//! let observations = optimizer
//!     .minimize(&|values: &[Value]| -> hypered::Result<f64> {
//!         let x = values[0].as_f64().unwrap_or_default();
//!         Ok((x - 3.0).powi(2))
//!     })
//!     .unwrap();
//! assert_eq!(observations.len(), 6);
//! ```
//!
//! [`Metric`] covers the other half of an evaluation: extracting the
//! scalar from a nested result tree and orienting it for minimization.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::tree::{JsonMap, lookup};
use crate::types::Direction;

/// A scalar function of one point of the search space.
///
/// Implement this on a struct for stateful evaluations; closures of type
/// `Fn(&[Value]) -> Result<f64>` implement it already. The async
/// optimizer additionally requires `Send + Sync + 'static`.
pub trait Objective {
    /// Evaluates the objective at `values`, one per variable.
    ///
    /// # Errors
    ///
    /// Any failure aborts the run and is returned to the caller unchanged.
    fn evaluate(&self, values: &[Value]) -> Result<f64>;
}

impl<F> Objective for F
where
    F: Fn(&[Value]) -> Result<f64>,
{
    fn evaluate(&self, values: &[Value]) -> Result<f64> {
        self(values)
    }
}

/// Where the objective lives in a result tree, and which way it points.
///
/// ```
/// use hypered::Metric;
/// use serde_json::json;
///
/// let results = json!({"metrics": {"accuracy": 0.75}});
/// let results = results.as_object().unwrap();
///
/// assert_eq!(Metric::maximize("metrics.accuracy").extract(results).unwrap(), -0.75);
/// assert!(Metric::minimize("loss").extract(results).is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metric {
    path: String,
    direction: Direction,
}

impl Metric {
    /// A metric to minimize at the dotted `path`.
    #[must_use]
    pub fn minimize(path: impl Into<String>) -> Self {
        Self::new(path, Direction::Minimize)
    }

    /// A metric to maximize at the dotted `path`. Extracted values are
    /// negated.
    #[must_use]
    pub fn maximize(path: impl Into<String>) -> Self {
        Self::new(path, Direction::Maximize)
    }

    /// A metric with an explicit direction.
    #[must_use]
    pub fn new(path: impl Into<String>, direction: Direction) -> Self {
        Self {
            path: path.into(),
            direction,
        }
    }

    /// The dotted path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Reads the metric from `results` on the minimization scale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObjectivePathNotFound`] if the path does not exist
    /// and [`Error::ObjectiveNotNumeric`] if it holds something other than
    /// a number.
    pub fn extract(&self, results: &JsonMap) -> Result<f64> {
        let value = lookup(results, &self.path)
            .ok_or_else(|| Error::ObjectivePathNotFound(self.path.clone()))?;
        let raw = value
            .as_f64()
            .ok_or_else(|| Error::ObjectiveNotNumeric(self.path.clone()))?;
        Ok(self.direction.orient(raw))
    }
}

impl Default for Metric {
    fn default() -> Self {
        Self::minimize("loss")
    }
}
