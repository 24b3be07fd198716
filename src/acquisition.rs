//! Acquisition functions scoring candidate points under a fitted GP.
//!
//! The engine frames every objective as minimization, and the proposal
//! search minimizes the score returned here. Directionality of the user's
//! metric is handled upstream by a sign flip (see [`Direction`](crate::Direction)).

use core::fmt::Debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::gp::GaussianProcess;

/// Default exploration margin of [`ExpectedImprovement`].
pub const DEFAULT_XI: f64 = 0.01;
/// Default confidence multiplier of [`UpperConfidenceBound`].
pub const DEFAULT_KAPPA: f64 = 2.576;

/// Below this standard deviation the posterior is treated as deterministic.
const MIN_STD: f64 = 1e-12;

/// A scoring function over candidate points.
pub trait AcquisitionFn: Debug + Send + Sync {
    /// The registry name of this acquisition function.
    fn name(&self) -> &'static str;

    /// Scores every point of `x` given the fitted `model` and the best
    /// observed objective `y_opt`.
    ///
    /// # Errors
    ///
    /// Propagates [`Error::NotFitted`] from the model.
    fn score(&self, model: &GaussianProcess, x: &[Vec<f64>], y_opt: f64) -> Result<Vec<f64>>;
}

/// Standard normal probability density.
#[must_use]
pub fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal cumulative distribution (Hart rational approximation).
#[must_use]
pub fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let abs_x = x.abs();
    let t = 1.0 / (1.0 + 0.231_641_9 * abs_x);
    let t2 = t * t;
    let t3 = t2 * t;
    let t4 = t3 * t;
    let t5 = t4 * t;

    let poly = 0.319_381_530 * t - 0.356_563_782 * t2 + 1.781_477_937 * t3 - 1.821_255_978 * t4
        + 1.330_274_429 * t5;
    let cdf = 1.0 - norm_pdf(abs_x) * poly;

    if x >= 0.0 { cdf } else { 1.0 - cdf }
}

fn check_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::UnsupportedParameter { name, value })
    }
}

/// Expected Improvement.
///
/// `imp = mu - y_opt - xi`, `z = imp / sigma`,
/// `ei = imp * Φ(z) + sigma * φ(z)`.
///
/// When `sigma` vanishes the score degenerates to `max(imp, 0)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExpectedImprovement {
    xi: f64,
}

impl ExpectedImprovement {
    /// Creates the function with exploration margin `xi`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if `xi` is not finite.
    pub fn new(xi: f64) -> Result<Self> {
        check_finite("xi", xi)?;
        Ok(Self { xi })
    }

    /// The exploration margin.
    #[must_use]
    pub fn xi(&self) -> f64 {
        self.xi
    }

    fn point(&self, mu: f64, sigma: f64, y_opt: f64) -> f64 {
        let imp = mu - y_opt - self.xi;
        if sigma < MIN_STD {
            return imp.max(0.0);
        }
        let z = imp / sigma;
        imp * norm_cdf(z) + sigma * norm_pdf(z)
    }
}

impl Default for ExpectedImprovement {
    fn default() -> Self {
        Self { xi: DEFAULT_XI }
    }
}

impl AcquisitionFn for ExpectedImprovement {
    fn name(&self) -> &'static str {
        "EI"
    }

    fn score(&self, model: &GaussianProcess, x: &[Vec<f64>], y_opt: f64) -> Result<Vec<f64>> {
        let posterior = model.predict(x)?;
        Ok(posterior
            .mean
            .iter()
            .zip(posterior.std())
            .map(|(&mu, sigma)| self.point(mu, sigma, y_opt))
            .collect())
    }
}

/// Upper Confidence Bound, `mu + kappa * sigma`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UpperConfidenceBound {
    kappa: f64,
}

impl UpperConfidenceBound {
    /// Creates the function with confidence multiplier `kappa`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if `kappa` is not finite.
    pub fn new(kappa: f64) -> Result<Self> {
        check_finite("kappa", kappa)?;
        Ok(Self { kappa })
    }

    /// The confidence multiplier.
    #[must_use]
    pub fn kappa(&self) -> f64 {
        self.kappa
    }
}

impl Default for UpperConfidenceBound {
    fn default() -> Self {
        Self {
            kappa: DEFAULT_KAPPA,
        }
    }
}

impl AcquisitionFn for UpperConfidenceBound {
    fn name(&self) -> &'static str {
        "UCB"
    }

    fn score(&self, model: &GaussianProcess, x: &[Vec<f64>], _y_opt: f64) -> Result<Vec<f64>> {
        let posterior = model.predict(x)?;
        Ok(posterior
            .mean
            .iter()
            .zip(posterior.std())
            .map(|(&mu, sigma)| mu + self.kappa * sigma)
            .collect())
    }
}

/// Hyperparameters handed to an acquisition factory.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcquisitionParams {
    /// Margin for [`ExpectedImprovement`]. Default: 0.01.
    pub xi: f64,
    /// Multiplier for [`UpperConfidenceBound`]. Default: 2.576.
    pub kappa: f64,
}

impl Default for AcquisitionParams {
    fn default() -> Self {
        Self {
            xi: DEFAULT_XI,
            kappa: DEFAULT_KAPPA,
        }
    }
}

/// Constructor stored in an [`AcquisitionRegistry`].
pub type AcquisitionFactory = fn(&AcquisitionParams) -> Result<Arc<dyn AcquisitionFn>>;

/// Name → factory table for acquisition functions.
///
/// The default registry knows `"EI"` and `"UCB"`.
///
/// ```
/// use hypered::acquisition::{AcquisitionParams, AcquisitionRegistry};
///
/// let registry = AcquisitionRegistry::default();
/// let ucb = registry.create("UCB", &AcquisitionParams::default()).unwrap();
/// assert_eq!(ucb.name(), "UCB");
/// assert!(registry.create("PI", &AcquisitionParams::default()).is_err());
/// ```
#[derive(Clone, Debug)]
pub struct AcquisitionRegistry {
    factories: BTreeMap<String, AcquisitionFactory>,
}

impl AcquisitionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) a factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: AcquisitionFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Builds the acquisition function registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAcquisition`] for an unregistered name, or the
    /// factory's own validation error.
    pub fn create(&self, name: &str, params: &AcquisitionParams) -> Result<Arc<dyn AcquisitionFn>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownAcquisition(name.to_owned()))?;
        factory(params)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for AcquisitionRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("EI", ei_factory).register("UCB", ucb_factory);
        registry
    }
}

fn ei_factory(params: &AcquisitionParams) -> Result<Arc<dyn AcquisitionFn>> {
    Ok(Arc::new(ExpectedImprovement::new(params.xi)?))
}

fn ucb_factory(params: &AcquisitionParams) -> Result<Arc<dyn AcquisitionFn>> {
    Ok(Arc::new(UpperConfidenceBound::new(params.kappa)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::Rbf;

    fn fitted() -> GaussianProcess {
        let mut gp = GaussianProcess::new(Arc::new(Rbf::new(0.3).unwrap()));
        gp.fit(&[vec![0.1], vec![0.5], vec![0.9]], &[2.0, 0.5, 3.0])
            .unwrap();
        gp
    }

    #[test]
    fn normal_helpers_match_reference_values() {
        assert!((norm_pdf(0.0) - 0.398_942_280_4).abs() < 1e-9);
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.96) - 0.975_002_1).abs() < 1e-6);
        assert!((norm_cdf(-1.0) - 0.158_655_25).abs() < 1e-6);
        assert_eq!(norm_cdf(-9.0), 0.0);
        assert_eq!(norm_cdf(9.0), 1.0);
    }

    #[test]
    fn ei_matches_formula() {
        let gp = fitted();
        let ei = ExpectedImprovement::new(0.01).unwrap();
        let x = vec![vec![0.3], vec![0.7]];
        let scores = ei.score(&gp, &x, 0.5).unwrap();

        let posterior = gp.predict(&x).unwrap();
        for (i, std) in posterior.std().into_iter().enumerate() {
            let imp = posterior.mean[i] - 0.5 - 0.01;
            let z = imp / std;
            let expected = imp * norm_cdf(z) + std * norm_pdf(z);
            assert!((scores[i] - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn ei_is_non_negative_and_grows_with_mean() {
        let ei = ExpectedImprovement::default();
        for &mu in &[-3.0, -0.5, 0.0, 0.5, 3.0] {
            assert!(ei.point(mu, 0.7, 0.0) >= 0.0);
        }
        assert!(ei.point(1.0, 0.5, 0.0) > ei.point(0.0, 0.5, 0.0));
        assert_eq!(ei.point(2.0, 0.0, 1.0), 2.0 - 1.0 - DEFAULT_XI);
        assert_eq!(ei.point(0.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn ucb_matches_formula() {
        let gp = fitted();
        let ucb = UpperConfidenceBound::new(2.0).unwrap();
        let x = vec![vec![0.2], vec![0.6]];
        let scores = ucb.score(&gp, &x, 0.0).unwrap();
        let posterior = gp.predict(&x).unwrap();
        for (i, std) in posterior.std().into_iter().enumerate() {
            assert!((scores[i] - (posterior.mean[i] + 2.0 * std)).abs() < 1e-12);
        }
    }

    #[test]
    fn scoring_requires_a_fitted_model() {
        let gp = GaussianProcess::new(Arc::new(Rbf::new(1.0).unwrap()));
        let err = ExpectedImprovement::default()
            .score(&gp, &[vec![0.5]], 0.0)
            .unwrap_err();
        assert!(matches!(err, Error::NotFitted));
    }

    #[test]
    fn registry_resolves_names_and_validates() {
        let registry = AcquisitionRegistry::default();
        assert_eq!(registry.names().collect::<Vec<_>>(), ["EI", "UCB"]);

        let params = AcquisitionParams {
            xi: 0.1,
            ..AcquisitionParams::default()
        };
        assert_eq!(registry.create("EI", &params).unwrap().name(), "EI");
        assert!(matches!(
            registry.create("PI", &params),
            Err(Error::UnknownAcquisition(name)) if name == "PI"
        ));

        let bad = AcquisitionParams {
            kappa: f64::NAN,
            ..AcquisitionParams::default()
        };
        assert!(matches!(
            registry.create("UCB", &bad),
            Err(Error::UnsupportedParameter { name: "kappa", .. })
        ));
    }
}
