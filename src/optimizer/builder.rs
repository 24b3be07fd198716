use std::sync::Arc;

use crate::acquisition::{AcquisitionFn, ExpectedImprovement};
use crate::error::{Error, Result};
use crate::gp::DEFAULT_NOISE;
use crate::kernel::{Kernel, KernelParams, Rbf};
use crate::proposal::{DEFAULT_RESTARTS, ProposalSearch};
use crate::space::Space;

use super::{BayesianOptimizer, DEFAULT_CALLS, DEFAULT_INITIAL_POINTS};

/// A builder for [`BayesianOptimizer`].
///
/// # Defaults
///
/// | Setting | Default |
/// |---------|---------|
/// | `n_initial_points` | 10 |
/// | `n_calls` | 100 |
/// | kernel | [`Rbf`] with scale 1.0 |
/// | acquisition | [`ExpectedImprovement`] with `xi = 0.01` |
/// | `n_restarts` | 5 |
/// | noise | 1e-6 |
/// | seed | none (fresh entropy per run) |
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use hypered::acquisition::UpperConfidenceBound;
/// use hypered::kernel::Matern;
/// use hypered::{BayesianOptimizer, Space, Variable};
///
/// let space = Space::new(vec![Variable::integer(1, 8)]).unwrap();
/// let optimizer = BayesianOptimizer::builder(space)
///     .kernel(Arc::new(Matern::new(1.5, 0.5).unwrap()))
///     .acquisition(Arc::new(UpperConfidenceBound::new(1.0).unwrap()))
///     .n_initial_points(4)
///     .n_calls(12)
///     .seed(7)
///     .build()
///     .unwrap();
/// assert_eq!(optimizer.kernel().name(), "Matern");
///
/// let space = Space::new(vec![Variable::real(0.0, 1.0)]).unwrap();
/// assert!(BayesianOptimizer::builder(space).n_initial_points(5).n_calls(3).build().is_err());
/// ```
#[derive(Clone, Debug)]
pub struct BayesianOptimizerBuilder {
    space: Space,
    kernel: Option<Arc<dyn Kernel>>,
    acquisition: Option<Arc<dyn AcquisitionFn>>,
    n_initial_points: usize,
    n_calls: usize,
    n_restarts: usize,
    noise: f64,
    seed: Option<u64>,
}

impl BayesianOptimizerBuilder {
    pub(super) fn new(space: Space) -> Self {
        Self {
            space,
            kernel: None,
            acquisition: None,
            n_initial_points: DEFAULT_INITIAL_POINTS,
            n_calls: DEFAULT_CALLS,
            n_restarts: DEFAULT_RESTARTS,
            noise: DEFAULT_NOISE,
            seed: None,
        }
    }

    /// Sets the covariance function.
    #[must_use]
    pub fn kernel(mut self, kernel: Arc<dyn Kernel>) -> Self {
        self.kernel = Some(kernel);
        self
    }

    /// Sets the acquisition function.
    #[must_use]
    pub fn acquisition(mut self, acquisition: Arc<dyn AcquisitionFn>) -> Self {
        self.acquisition = Some(acquisition);
        self
    }

    /// Sets the number of random-sampling evaluations.
    #[must_use]
    pub fn n_initial_points(mut self, n: usize) -> Self {
        self.n_initial_points = n;
        self
    }

    /// Sets the total number of evaluations.
    #[must_use]
    pub fn n_calls(mut self, n: usize) -> Self {
        self.n_calls = n;
        self
    }

    /// Sets the number of local-search restarts per proposal.
    #[must_use]
    pub fn n_restarts(mut self, n: usize) -> Self {
        self.n_restarts = n;
        self
    }

    /// Sets the observation noise of the Gaussian Process.
    #[must_use]
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Seeds sampling and proposal restarts.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validates the settings and builds the optimizer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoInitialPoints`] if `n_initial_points` is zero,
    /// [`Error::InsufficientCalls`] if `n_calls < n_initial_points`, and
    /// [`Error::InvalidCount`] if `n_restarts` is zero, and
    /// [`Error::UnsupportedParameter`] for a negative or non-finite noise.
    pub fn build(self) -> Result<BayesianOptimizer> {
        if self.n_initial_points == 0 {
            return Err(Error::NoInitialPoints);
        }
        if self.n_calls < self.n_initial_points {
            return Err(Error::InsufficientCalls {
                n_calls: self.n_calls,
                n_initial_points: self.n_initial_points,
            });
        }
        if self.n_restarts == 0 {
            return Err(Error::InvalidCount {
                name: "optimizer_restarts",
            });
        }

        if !self.noise.is_finite() || self.noise < 0.0 {
            return Err(Error::UnsupportedParameter {
                name: "noise",
                value: self.noise,
            });
        }

        let kernel = match self.kernel {
            Some(kernel) => kernel,
            None => Arc::new(Rbf::new(KernelParams::default().scale)?),
        };
        let acquisition = self
            .acquisition
            .unwrap_or_else(|| Arc::new(ExpectedImprovement::default()));

        Ok(BayesianOptimizer {
            space: self.space,
            kernel,
            acquisition,
            n_initial_points: self.n_initial_points,
            n_calls: self.n_calls,
            noise: self.noise,
            proposal: ProposalSearch::new(self.n_restarts),
            seed: self.seed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::Variable;

    fn space() -> Space {
        Space::new(vec![Variable::real(0.0, 1.0)]).unwrap()
    }

    #[test]
    fn defaults() {
        let optimizer = BayesianOptimizer::builder(space()).build().unwrap();
        assert_eq!(optimizer.n_initial_points(), 10);
        assert_eq!(optimizer.n_calls(), 100);
        assert_eq!(optimizer.kernel().name(), "RBF");
        assert_eq!(optimizer.acquisition().name(), "EI");
        assert_eq!(optimizer.seed(), None);
    }

    #[test]
    fn rejects_invalid_noise() {
        for noise in [-1e-3, f64::NAN, f64::INFINITY] {
            let err = BayesianOptimizer::builder(space()).noise(noise).build().unwrap_err();
            assert!(
                matches!(err, Error::UnsupportedParameter { name: "noise", .. }),
                "noise {noise} should be rejected, got {err:?}"
            );
            assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        }
        assert!(BayesianOptimizer::builder(space()).noise(0.0).build().is_ok());
    }

    #[test]
    fn rejects_invalid_counts_before_running() {
        assert!(matches!(
            BayesianOptimizer::builder(space()).n_initial_points(0).build(),
            Err(Error::NoInitialPoints)
        ));
        assert!(matches!(
            BayesianOptimizer::builder(space())
                .n_initial_points(5)
                .n_calls(4)
                .build(),
            Err(Error::InsufficientCalls {
                n_calls: 4,
                n_initial_points: 5
            })
        ));
        let err = BayesianOptimizer::builder(space())
            .n_restarts(0)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }
}
