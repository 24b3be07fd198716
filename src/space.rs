//! The search space: an ordered list of variables laid out in `[0, 1]^d`.

use core::ops::Range;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::rng_util;
use crate::variable::Variable;

/// An ordered sequence of [`Variable`]s with a fixed slot layout.
///
/// Each variable owns a contiguous slice of the normalized vector, assigned
/// in declaration order when the space is built. The layout never changes
/// afterwards.
///
/// # Examples
///
/// ```
/// use hypered::{Space, Variable};
///
/// let space = Space::new(vec![
///     Variable::real(-10.0, 10.0),
///     Variable::categorical(["a", "b", "c"]),
///     Variable::integer(1, 4),
/// ])
/// .unwrap();
///
/// assert_eq!(space.n_slots(), 5);
/// assert_eq!(space.slice(1), Some(1..4));
///
/// let mut rng = fastrand::Rng::with_seed(7);
/// let points = space.sample(3, &mut rng);
/// assert_eq!(points.len(), 3);
/// assert!(points.iter().flatten().all(|x| (0.0..=1.0).contains(x)));
/// ```
#[derive(Clone, Debug)]
pub struct Space {
    variables: Vec<Variable>,
    slices: Vec<Range<usize>>,
    n_slots: usize,
}

impl Space {
    /// Builds a space, validating every variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoVariables`] for an empty list, or the first
    /// validation error of an ill-formed variable.
    pub fn new(variables: Vec<Variable>) -> Result<Self> {
        if variables.is_empty() {
            return Err(Error::NoVariables);
        }
        for variable in &variables {
            variable.validate()?;
        }

        let mut slices = Vec::with_capacity(variables.len());
        let mut start = 0;
        for variable in &variables {
            let end = start + variable.size();
            slices.push(start..end);
            start = end;
        }

        Ok(Self {
            variables,
            slices,
            n_slots: start,
        })
    }

    /// Total number of normalized slots.
    #[must_use]
    pub fn n_slots(&self) -> usize {
        self.n_slots
    }

    /// Number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the space has no variables. Always `false` for a constructed space.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// The variables in declaration order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// The slot range of the variable at `index`.
    #[must_use]
    pub fn slice(&self, index: usize) -> Option<Range<usize>> {
        self.slices.get(index).cloned()
    }

    /// Per-slot bounds; always `(0.0, 1.0)`.
    #[must_use]
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        vec![(0.0, 1.0); self.n_slots]
    }

    /// Draws `n` points uniformly from `[0, 1]^n_slots`.
    #[must_use]
    pub fn sample(&self, n: usize, rng: &mut fastrand::Rng) -> Vec<Vec<f64>> {
        (0..n)
            .map(|_| {
                (0..self.n_slots)
                    .map(|_| rng_util::f64_range(rng, 0.0, 1.0))
                    .collect()
            })
            .collect()
    }

    /// Maps one normalized point to per-variable values, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `x` does not have exactly
    /// [`n_slots`](Self::n_slots) entries.
    pub fn denormalize(&self, x: &[f64]) -> Result<Vec<Value>> {
        if x.len() != self.n_slots {
            return Err(Error::DimensionMismatch {
                expected: self.n_slots,
                got: x.len(),
            });
        }
        Ok(self
            .variables
            .iter()
            .zip(&self.slices)
            .map(|(variable, slice)| variable.denormalize(&x[slice.clone()]))
            .collect())
    }
}
