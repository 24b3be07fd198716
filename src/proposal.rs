//! Multi-start bounded local search over the acquisition surface.
//!
//! Each restart runs a projected gradient descent inside `[0, 1]^d` with
//! central finite-difference gradients and an Armijo backtracking line
//! search. The best local minimum across restarts becomes the next sample.

use crate::acquisition::AcquisitionFn;
use crate::error::{Error, Result};
use crate::gp::GaussianProcess;
use crate::space::Space;

/// Default number of restarts.
pub const DEFAULT_RESTARTS: usize = 5;
/// Default iteration cap of a single local search.
pub const DEFAULT_MAX_ITERS: usize = 200;
/// Default convergence tolerance.
pub const DEFAULT_TOL: f64 = 1e-9;

/// Finite-difference step.
const FD_STEP: f64 = 1e-6;
/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO_C: f64 = 1e-4;
/// Smallest line-search step before the search gives up.
const MIN_STEP: f64 = 1e-12;

/// Result of one local search.
#[derive(Clone, Debug, PartialEq)]
pub struct LocalMinimum {
    /// The final point, inside `[0, 1]^d`.
    pub x: Vec<f64>,
    /// The function value at `x`.
    pub value: f64,
    /// Whether a convergence criterion was met before the iteration cap.
    pub converged: bool,
    /// Number of iterations performed.
    pub iterations: usize,
}

fn project(x: &mut [f64]) {
    for v in x.iter_mut() {
        *v = v.max(0.0).min(1.0);
    }
}

fn finite_or_nan(value: f64) -> f64 {
    if value.is_finite() { value } else { f64::NAN }
}

/// Central finite-difference gradient, one-sided at the bounds.
fn gradient<F>(f: &mut F, x: &[f64]) -> Result<Vec<f64>>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    let mut probe = x.to_vec();
    let mut grad = vec![0.0; x.len()];
    for i in 0..x.len() {
        let hi = (x[i] + FD_STEP).min(1.0);
        let lo = (x[i] - FD_STEP).max(0.0);

        probe[i] = hi;
        let f_hi = f(&probe)?;
        probe[i] = lo;
        let f_lo = f(&probe)?;
        probe[i] = x[i];

        let g = (f_hi - f_lo) / (hi - lo);
        grad[i] = if g.is_finite() { g } else { 0.0 };
    }
    Ok(grad)
}

/// Minimizes `f` over `[0, 1]^d` starting from `x0`.
///
/// `x0` is clamped into the unit cube first. The search stops when the
/// projected gradient vanishes, when an accepted step no longer lowers the
/// value meaningfully, when the line search cannot find a decrease, or after
/// `max_iters` iterations (reported as `converged = false`).
///
/// # Errors
///
/// Returns [`Error::ProposalFailed`] if `f` is not finite at the start
/// point, and propagates any error returned by `f`.
pub fn minimize_bounded<F>(mut f: F, x0: &[f64], max_iters: usize, tol: f64) -> Result<LocalMinimum>
where
    F: FnMut(&[f64]) -> Result<f64>,
{
    let mut x = x0.to_vec();
    project(&mut x);
    let mut fx = f(&x)?;
    if !fx.is_finite() {
        return Err(Error::ProposalFailed {
            restarts: 1,
            reason: format!("score is {fx} at the start point"),
        });
    }

    let mut converged = false;
    let mut iterations = 0;
    while iterations < max_iters {
        iterations += 1;

        let grad = gradient(&mut f, &x)?;
        let projected_norm = x
            .iter()
            .zip(&grad)
            .map(|(xi, gi)| (xi - (xi - gi).max(0.0).min(1.0)).abs())
            .fold(0.0, f64::max);
        if projected_norm <= tol {
            converged = true;
            break;
        }

        let g_inf = grad.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
        let mut step = 1.0 / g_inf;
        let mut accepted = None;
        while step >= MIN_STEP {
            let mut candidate: Vec<f64> = x.iter().zip(&grad).map(|(xi, gi)| xi - step * gi).collect();
            project(&mut candidate);
            let decrease: f64 = grad
                .iter()
                .zip(x.iter().zip(&candidate))
                .map(|(g, (a, b))| g * (a - b))
                .sum();
            let f_candidate = finite_or_nan(f(&candidate)?);
            if f_candidate <= fx - ARMIJO_C * decrease {
                accepted = Some((candidate, f_candidate));
                break;
            }
            step *= 0.5;
        }

        let Some((candidate, f_candidate)) = accepted else {
            converged = true;
            break;
        };
        let change = fx - f_candidate;
        x = candidate;
        fx = f_candidate;
        if change <= tol * fx.abs().max(1.0) {
            converged = true;
            break;
        }
    }

    Ok(LocalMinimum {
        x,
        value: fx,
        converged,
        iterations,
    })
}

/// Multi-start minimization of an acquisition function.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use hypered::acquisition::ExpectedImprovement;
/// use hypered::gp::GaussianProcess;
/// use hypered::kernel::Rbf;
/// use hypered::proposal::ProposalSearch;
/// use hypered::{Space, Variable};
///
/// let space = Space::new(vec![Variable::real(0.0, 1.0)]).unwrap();
/// let mut gp = GaussianProcess::new(Arc::new(Rbf::new(0.3).unwrap()));
/// gp.fit(&[vec![0.2], vec![0.8]], &[1.0, 0.5]).unwrap();
///
/// let mut rng = fastrand::Rng::with_seed(1);
/// let x = ProposalSearch::new(3)
///     .propose(&ExpectedImprovement::default(), &gp, &space, 0.5, &mut rng)
///     .unwrap();
/// assert_eq!(x.len(), 1);
/// assert!((0.0..=1.0).contains(&x[0]));
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProposalSearch {
    n_restarts: usize,
    max_iters: usize,
    tol: f64,
}

impl Default for ProposalSearch {
    fn default() -> Self {
        Self::new(DEFAULT_RESTARTS)
    }
}

impl ProposalSearch {
    /// Creates a search with `n_restarts` starting points.
    #[must_use]
    pub fn new(n_restarts: usize) -> Self {
        Self {
            n_restarts,
            max_iters: DEFAULT_MAX_ITERS,
            tol: DEFAULT_TOL,
        }
    }

    /// Sets the iteration cap of each local search.
    #[must_use]
    pub fn max_iters(mut self, max_iters: usize) -> Self {
        self.max_iters = max_iters;
        self
    }

    /// Sets the convergence tolerance.
    #[must_use]
    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Number of restarts.
    #[must_use]
    pub fn n_restarts(&self) -> usize {
        self.n_restarts
    }

    /// Finds the normalized point minimizing `acquisition` under `model`.
    ///
    /// Starting points are drawn with [`Space::sample`]. On equal scores the
    /// restart with the lowest index wins.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCount`] if there are no restarts and
    /// [`Error::ProposalFailed`] if every restart failed. Errors from the
    /// model are propagated unchanged.
    pub fn propose(
        &self,
        acquisition: &dyn AcquisitionFn,
        model: &GaussianProcess,
        space: &Space,
        y_opt: f64,
        rng: &mut fastrand::Rng,
    ) -> Result<Vec<f64>> {
        if self.n_restarts == 0 {
            return Err(Error::InvalidCount {
                name: "optimizer_restarts",
            });
        }

        let score = |x: &[f64]| -> Result<f64> {
            let scores = acquisition.score(model, &[x.to_vec()], y_opt)?;
            Ok(scores.first().copied().unwrap_or(f64::NAN))
        };

        let mut best: Option<LocalMinimum> = None;
        let mut last_failure = String::new();
        for start in &space.sample(self.n_restarts, rng) {
            match minimize_bounded(&score, start, self.max_iters, self.tol) {
                Ok(found) => {
                    trace_debug!(
                        value = found.value,
                        converged = found.converged,
                        iterations = found.iterations,
                        "local search finished"
                    );
                    if best.as_ref().is_none_or(|b| found.value < b.value) {
                        best = Some(found);
                    }
                }
                Err(Error::ProposalFailed { reason, .. }) => {
                    trace_debug!(%reason, "local search failed");
                    last_failure = reason;
                }
                Err(e) => return Err(e),
            }
        }

        best.map(|b| b.x).ok_or(Error::ProposalFailed {
            restarts: self.n_restarts,
            reason: last_failure,
        })
    }
}
