//! Gaussian Process regression over normalized points.
//!
//! The model is exact GP regression with a zero prior mean:
//!
//! - `fit` stores the training data and factorizes
//!   `K = k(X, X) + σₙ I` via Cholesky, keeping `K⁻¹`.
//! - `predict` returns the posterior mean `K_s K⁻¹ y` and covariance
//!   `K_ss - K_s K⁻¹ K_sᵀ`, where `K_s = k(x, X)` and
//!   `K_ss = k(x, x) + σₙ I`.
//!
//! Each fit starts from scratch; the engine refits on the full observation
//! history every iteration, which is O(n³) per fit.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};
use crate::kernel::Kernel;

/// Default observation noise added to the covariance diagonal.
pub const DEFAULT_NOISE: f64 = 1e-6;

/// Posterior mean and covariance at a batch of query points.
#[derive(Clone, Debug)]
pub struct Posterior {
    /// Posterior mean, one entry per query point.
    pub mean: DVector<f64>,
    /// Posterior covariance between the query points.
    pub cov: DMatrix<f64>,
}

impl Posterior {
    /// Posterior standard deviation per query point, `sqrt(diag(cov))`.
    ///
    /// Negative diagonal entries caused by round-off are treated as zero.
    #[must_use]
    pub fn std(&self) -> Vec<f64> {
        self.cov.diagonal().iter().map(|v| v.max(0.0).sqrt()).collect()
    }
}

/// State computed by [`GaussianProcess::fit`].
#[derive(Clone, Debug)]
struct Fitted {
    xs: Vec<Vec<f64>>,
    ys: DVector<f64>,
    /// `K = k(X, X) + σₙ I`.
    k: DMatrix<f64>,
    /// `K⁻¹`.
    k_inv: DMatrix<f64>,
    /// `K⁻¹ y`.
    alpha: DVector<f64>,
}

/// Gaussian Process surrogate model.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use hypered::gp::GaussianProcess;
/// use hypered::kernel::Rbf;
///
/// let mut gp = GaussianProcess::new(Arc::new(Rbf::new(0.2).unwrap()));
/// gp.fit(&[vec![0.0], vec![0.5], vec![1.0]], &[1.0, -1.0, 2.0]).unwrap();
///
/// let posterior = gp.predict(&[vec![0.5]]).unwrap();
/// assert!((posterior.mean[0] + 1.0).abs() < 1e-3);
/// ```
#[derive(Clone, Debug)]
pub struct GaussianProcess {
    kernel: Arc<dyn Kernel>,
    noise: f64,
    fitted: Option<Fitted>,
}

impl GaussianProcess {
    /// Creates an unfitted model with the default noise ([`DEFAULT_NOISE`]).
    #[must_use]
    pub fn new(kernel: Arc<dyn Kernel>) -> Self {
        Self {
            kernel,
            noise: DEFAULT_NOISE,
            fitted: None,
        }
    }

    /// Sets the observation noise `σₙ` added to the covariance diagonal.
    ///
    /// Negative or non-finite values are replaced by zero.
    #[must_use]
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = if noise.is_finite() { noise.max(0.0) } else { 0.0 };
        self
    }

    /// The observation noise.
    #[must_use]
    pub fn noise(&self) -> f64 {
        self.noise
    }

    /// The covariance function.
    #[must_use]
    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    /// Whether [`fit`](Self::fit) has succeeded at least once.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Training inputs of the last fit.
    #[must_use]
    pub fn train_inputs(&self) -> &[Vec<f64>] {
        self.fitted.as_ref().map_or(&[][..], |f| f.xs.as_slice())
    }

    /// The regularized covariance `K` of the last fit.
    #[must_use]
    pub fn covariance(&self) -> Option<&DMatrix<f64>> {
        self.fitted.as_ref().map(|f| &f.k)
    }

    /// The inverse `K⁻¹` of the last fit.
    #[must_use]
    pub fn covariance_inverse(&self) -> Option<&DMatrix<f64>> {
        self.fitted.as_ref().map(|f| &f.k_inv)
    }

    /// Fits the model to training data, replacing any previous fit.
    ///
    /// An empty training set is valid and leaves the model at its prior.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `xs` and `ys` differ in
    /// length, and [`Error::SingularCovariance`] if `K` cannot be
    /// factorized. A failed fit keeps the previous state unchanged.
    pub fn fit(&mut self, xs: &[Vec<f64>], ys: &[f64]) -> Result<()> {
        if xs.len() != ys.len() {
            return Err(Error::DimensionMismatch {
                expected: xs.len(),
                got: ys.len(),
            });
        }

        let n = xs.len();
        let mut k = self.kernel.compute(xs, xs);
        for i in 0..n {
            k[(i, i)] += self.noise;
        }

        let cholesky =
            nalgebra::linalg::Cholesky::new(k.clone()).ok_or(Error::SingularCovariance { size: n })?;
        let k_inv = cholesky.inverse();
        if k_inv.iter().any(|v| !v.is_finite()) {
            return Err(Error::SingularCovariance { size: n });
        }

        let ys = DVector::from_column_slice(ys);
        let alpha = &k_inv * &ys;

        self.fitted = Some(Fitted {
            xs: xs.to_vec(),
            ys,
            k,
            k_inv,
            alpha,
        });
        Ok(())
    }

    /// Posterior mean and covariance at the query points `x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFitted`] if the model has not been fitted.
    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Posterior> {
        let fitted = self.fitted.as_ref().ok_or(Error::NotFitted)?;

        let k_s = self.kernel.compute(x, &fitted.xs);
        let mut k_ss = self.kernel.compute(x, x);
        for i in 0..x.len() {
            k_ss[(i, i)] += self.noise;
        }

        let mean = &k_s * &fitted.alpha;
        let cov = k_ss - &k_s * &fitted.k_inv * k_s.transpose();

        Ok(Posterior { mean, cov })
    }

    /// Training targets of the last fit.
    #[must_use]
    pub fn train_targets(&self) -> Option<&DVector<f64>> {
        self.fitted.as_ref().map(|f| &f.ys)
    }
}
