//! The two-phase Bayesian optimization loop.
//!
//! Phase 1 evaluates `n_initial_points` uniformly sampled points. Phase 2
//! refits the Gaussian Process on every observation so far, proposes the
//! point minimizing the acquisition score, evaluates it, and repeats until
//! `n_calls` evaluations have been made. Phase 2 is strictly sequential.

mod builder;

#[cfg(feature = "async")]
mod async_impl;

use std::sync::Arc;

use serde_json::Value;

pub use self::builder::BayesianOptimizerBuilder;
use crate::acquisition::AcquisitionFn;
use crate::error::{Error, Result};
use crate::gp::GaussianProcess;
use crate::kernel::Kernel;
use crate::objective::Objective;
use crate::proposal::ProposalSearch;
use crate::rng_util;
use crate::space::Space;

/// Default number of random-sampling evaluations.
pub const DEFAULT_INITIAL_POINTS: usize = 10;
/// Default total number of evaluations.
pub const DEFAULT_CALLS: usize = 100;

/// One evaluated point.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    /// The normalized point in `[0, 1]^n_slots`.
    pub x: Vec<f64>,
    /// The denormalized value of each variable, in declaration order.
    pub values: Vec<Value>,
    /// The objective value (minimized).
    pub objective: f64,
}

/// Bayesian optimizer over a fixed [`Space`].
///
/// Built with [`BayesianOptimizer::builder`]; every setting is validated
/// there, so [`minimize`](Self::minimize) only fails on evaluation or
/// numerical errors.
#[derive(Clone, Debug)]
pub struct BayesianOptimizer {
    space: Space,
    kernel: Arc<dyn Kernel>,
    acquisition: Arc<dyn AcquisitionFn>,
    n_initial_points: usize,
    n_calls: usize,
    noise: f64,
    proposal: ProposalSearch,
    seed: Option<u64>,
}

impl BayesianOptimizer {
    /// Starts building an optimizer over `space`.
    #[must_use]
    pub fn builder(space: Space) -> BayesianOptimizerBuilder {
        BayesianOptimizerBuilder::new(space)
    }

    /// The search space.
    #[must_use]
    pub fn space(&self) -> &Space {
        &self.space
    }

    /// The covariance function.
    #[must_use]
    pub fn kernel(&self) -> &Arc<dyn Kernel> {
        &self.kernel
    }

    /// The acquisition function.
    #[must_use]
    pub fn acquisition(&self) -> &Arc<dyn AcquisitionFn> {
        &self.acquisition
    }

    /// Number of random-sampling evaluations.
    #[must_use]
    pub fn n_initial_points(&self) -> usize {
        self.n_initial_points
    }

    /// Total number of evaluations.
    #[must_use]
    pub fn n_calls(&self) -> usize {
        self.n_calls
    }

    /// The seed, if one was set.
    #[must_use]
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Runs the optimization and returns every observation in evaluation
    /// order. Exactly [`n_calls`](Self::n_calls) evaluations are made.
    ///
    /// With a seed and a deterministic objective the result is
    /// reproducible.
    ///
    /// # Errors
    ///
    /// Returns the first error of the objective,
    /// [`Error::NonFiniteObjective`] for a NaN or infinite objective value,
    /// and the numerical errors of model fitting and proposal.
    pub fn minimize<O>(&self, objective: &O) -> Result<Vec<Observation>>
    where
        O: Objective + ?Sized,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "minimize",
            n_calls = self.n_calls,
            n_initial_points = self.n_initial_points
        )
        .entered();

        let mut rng = rng_util::from_seed(self.seed);
        let mut observations = Vec::with_capacity(self.n_calls);

        trace_info!(n = self.n_initial_points, "random sampling phase");
        for x in self.space.sample(self.n_initial_points, &mut rng) {
            let observation = evaluate_point(&self.space, objective, x)?;
            record(&mut observations, observation);
        }

        trace_info!(n = self.n_calls - self.n_initial_points, "guided phase");
        let mut model = self.model();
        for _ in self.n_initial_points..self.n_calls {
            let x = self.next_point(&mut model, &observations, &mut rng)?;
            let observation = evaluate_point(&self.space, objective, x)?;
            record(&mut observations, observation);
        }

        Ok(observations)
    }

    fn model(&self) -> GaussianProcess {
        GaussianProcess::new(Arc::clone(&self.kernel)).with_noise(self.noise)
    }

    /// Refits `model` on `observations` and proposes the next point.
    fn next_point(
        &self,
        model: &mut GaussianProcess,
        observations: &[Observation],
        rng: &mut fastrand::Rng,
    ) -> Result<Vec<f64>> {
        let xs: Vec<Vec<f64>> = observations.iter().map(|o| o.x.clone()).collect();
        let ys: Vec<f64> = observations.iter().map(|o| o.objective).collect();
        model.fit(&xs, &ys)?;

        let y_opt = ys.iter().copied().fold(f64::INFINITY, f64::min);
        self.proposal
            .propose(self.acquisition.as_ref(), model, &self.space, y_opt, rng)
    }
}

/// Denormalizes `x`, evaluates it and checks the result.
fn evaluate_point<O>(space: &Space, objective: &O, x: Vec<f64>) -> Result<Observation>
where
    O: Objective + ?Sized,
{
    let values = space.denormalize(&x)?;
    let value = objective.evaluate(&values)?;
    if !value.is_finite() {
        return Err(Error::NonFiniteObjective(value));
    }
    Ok(Observation {
        x,
        values,
        objective: value,
    })
}

fn record(observations: &mut Vec<Observation>, observation: Observation) {
    #[cfg(feature = "tracing")]
    {
        let index = observations.len();
        let best = observations
            .iter()
            .map(|o| o.objective)
            .fold(f64::INFINITY, f64::min);
        tracing::debug!(index, objective = observation.objective, "evaluation finished");
        if observation.objective < best {
            tracing::info!(index, objective = observation.objective, "new best value found");
        }
    }
    observations.push(observation);
}
