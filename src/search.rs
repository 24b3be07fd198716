//! End-to-end hyperparameter searches over a [`ParamTree`].
//!
//! A [`Search`] ties the pieces together: the variable leaves of the tree
//! span the [`Space`](crate::Space), the [`BayesianOptimizer`] picks points,
//! and the [`Evaluator`] turns each point into a cached experiment. When
//! the search persists its experiments, the best one is written to the
//! group's `summary.json` at the end of the run.
//!
//! ```
//! use hypered::prelude::*;
//! use serde_json::json;
//!
//! let search = Search::builder("quadratic")
//!     .params(ParamTree::new().variable("x", Variable::real(-10.0, 10.0)))
//!     .function(|params: &JsonMap| {
//!         let x = params["x"].as_f64().unwrap_or_default();
//!         let results = json!({"loss": (x - 5.0).powi(2)});
//!         Ok(results.as_object().cloned().unwrap_or_default())
//!     })
//!     .minimize("loss")
//!     .n_initial_points(4)
//!     .n_calls(8)
//!     .seed(2)
//!     .build()
//!     .unwrap();
//!
//! let outcome = search.run().unwrap();
//! assert_eq!(outcome.experiments.len(), 8);
//! assert!(outcome.summary_path.is_none());
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::acquisition::AcquisitionFn;
use crate::error::{Error, Result};
use crate::evaluation::{self, EvaluationMode, Evaluator, Experiment};
use crate::kernel::Kernel;
use crate::objective::Metric;
use crate::optimizer::{BayesianOptimizer, BayesianOptimizerBuilder};
use crate::store::{ExperimentStore, Summary};
use crate::tree::{JsonMap, ParamTree};

/// Output directory used by command-mode searches unless one is set.
pub const DEFAULT_OUTPUT_DIR: &str = "experiments";

/// What a finished search produced.
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    /// The experiment with the smallest objective; the earliest wins ties.
    pub best: Experiment,
    /// Every experiment of the run, in evaluation order.
    pub experiments: Vec<Experiment>,
    /// Where the summary was written, if the search persists experiments.
    pub summary_path: Option<PathBuf>,
}

/// A configured search, ready to [`run`](Self::run).
#[derive(Debug)]
pub struct Search {
    name: String,
    optimizer: BayesianOptimizer,
    evaluator: Arc<Evaluator>,
    parallelism: usize,
}

impl Search {
    /// Starts building a search whose experiments are grouped under `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> SearchBuilder {
        SearchBuilder::new(name.into())
    }

    /// The group name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The optimizer driving the search.
    #[must_use]
    pub fn optimizer(&self) -> &BayesianOptimizer {
        &self.optimizer
    }

    /// The evaluator.
    #[must_use]
    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Upper bound on concurrent random-phase evaluations in
    /// [`run_async`](Self::run_async).
    #[must_use]
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Runs the search, evaluating every point sequentially.
    ///
    /// Experiments whose results are already stored are not executed again,
    /// so re-running a finished search only re-reads its results.
    ///
    /// # Errors
    ///
    /// Returns the first evaluation, numerical or I/O error; the summary is
    /// not written in that case.
    pub fn run(&self) -> Result<SearchOutcome> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("search", name = %self.name).entered();

        self.evaluator.clear();
        let observations = self.optimizer.minimize(self.evaluator.as_ref())?;
        let experiments = self.evaluator.drain_in_order(&observations)?;
        self.finish(experiments)
    }

    /// Like [`run`](Self::run), but evaluates the random phase with up to
    /// [`parallelism`](Self::parallelism) concurrent blocking tasks.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run), plus [`Error::TaskError`] if a blocking
    /// task panics.
    #[cfg(feature = "async")]
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "search", skip_all, fields(name = %self.name, parallelism = self.parallelism))
    )]
    pub async fn run_async(&self) -> Result<SearchOutcome> {

        self.evaluator.clear();
        let observations = self
            .optimizer
            .minimize_parallel(self.parallelism, Arc::clone(&self.evaluator))
            .await?;
        let experiments = self.evaluator.drain_in_order(&observations)?;
        self.finish(experiments)
    }

    fn finish(&self, experiments: Vec<Experiment>) -> Result<SearchOutcome> {
        let best = evaluation::best(&experiments)
            .cloned()
            .ok_or_else(|| Error::Evaluation("search produced no experiments".into()))?;
        trace_info!(objective = best.objective, hash = %best.hash, "search finished");

        let summary_path = match self.evaluator.store() {
            Some(store) => {
                let summary = Summary {
                    group: store.group().to_owned(),
                    experiment_dir: best.paths.experiment_dir.clone(),
                    objective: best.objective,
                    params: best.params.clone(),
                    results: best.results.clone(),
                };
                Some(store.write_summary(&summary)?)
            }
            None => None,
        };

        Ok(SearchOutcome {
            best,
            experiments,
            summary_path,
        })
    }
}

/// A builder for [`Search`].
///
/// Exactly one of [`function`](Self::function) and
/// [`command`](Self::command) must be set. Command searches always persist
/// their experiments, under [`DEFAULT_OUTPUT_DIR`] unless
/// [`output_dir`](Self::output_dir) says otherwise; function searches
/// persist only when an output directory is set.
///
/// The optimizer settings default as in [`BayesianOptimizerBuilder`];
/// `parallelism` defaults to 1.
pub struct SearchBuilder {
    name: String,
    params: ParamTree,
    mode: Option<EvaluationMode>,
    cwd: Option<PathBuf>,
    metric: Metric,
    output_dir: Option<PathBuf>,
    kernel: Option<Arc<dyn Kernel>>,
    acquisition: Option<Arc<dyn AcquisitionFn>>,
    n_initial_points: Option<usize>,
    n_calls: Option<usize>,
    n_restarts: Option<usize>,
    noise: Option<f64>,
    seed: Option<u64>,
    parallelism: usize,
}

impl SearchBuilder {
    fn new(name: String) -> Self {
        Self {
            name,
            params: ParamTree::new(),
            mode: None,
            cwd: None,
            metric: Metric::default(),
            output_dir: None,
            kernel: None,
            acquisition: None,
            n_initial_points: None,
            n_calls: None,
            n_restarts: None,
            noise: None,
            seed: None,
            parallelism: 1,
        }
    }

    /// Sets the parameter tree.
    #[must_use]
    pub fn params(mut self, params: ParamTree) -> Self {
        self.params = params;
        self
    }

    /// Evaluates experiments by calling `function` with the resolved
    /// parameter tree.
    #[must_use]
    pub fn function<F>(mut self, function: F) -> Self
    where
        F: Fn(&JsonMap) -> Result<JsonMap> + Send + Sync + 'static,
    {
        self.mode = Some(EvaluationMode::Function(Arc::new(function)));
        self
    }

    /// Evaluates experiments by running a shell command.
    ///
    /// See [`EvaluationMode::Command`] for the placeholders.
    #[must_use]
    pub fn command(mut self, template: impl Into<String>) -> Self {
        self.mode = Some(EvaluationMode::Command {
            template: template.into(),
            cwd: None,
        });
        self
    }

    /// Sets the working directory of the command.
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Sets the objective metric.
    #[must_use]
    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// Minimizes the result value at the dotted `path`.
    #[must_use]
    pub fn minimize(self, path: impl Into<String>) -> Self {
        self.metric(Metric::minimize(path))
    }

    /// Maximizes the result value at the dotted `path`.
    #[must_use]
    pub fn maximize(self, path: impl Into<String>) -> Self {
        self.metric(Metric::maximize(path))
    }

    /// Sets the directory holding the experiment groups.
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
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
        self.n_initial_points = Some(n);
        self
    }

    /// Sets the total number of evaluations.
    #[must_use]
    pub fn n_calls(mut self, n: usize) -> Self {
        self.n_calls = Some(n);
        self
    }

    /// Sets the number of local-search restarts per proposal.
    #[must_use]
    pub fn n_restarts(mut self, n: usize) -> Self {
        self.n_restarts = Some(n);
        self
    }

    /// Sets the observation noise of the Gaussian Process.
    #[must_use]
    pub fn noise(mut self, noise: f64) -> Self {
        self.noise = Some(noise);
        self
    }

    /// Seeds sampling and proposal restarts.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Bounds concurrent random-phase evaluations in
    /// [`Search::run_async`].
    #[must_use]
    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Validates everything and builds the search. Nothing is evaluated or
    /// written yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingEvaluationMode`] without a function or
    /// command, [`Error::InvalidConfig`] for an empty name,
    /// [`Error::InvalidCount`] for zero parallelism, [`Error::NoVariables`]
    /// for a tree without variables, and the validation errors of the
    /// variables and of [`BayesianOptimizerBuilder::build`].
    pub fn build(self) -> Result<Search> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidConfig("search name must not be empty".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::InvalidCount {
                name: "parallelism",
            });
        }
        let mode = match self.mode.ok_or(Error::MissingEvaluationMode)? {
            EvaluationMode::Command { template, .. } => EvaluationMode::Command {
                template,
                cwd: self.cwd,
            },
            function => function,
        };

        let output_dir = match (&mode, self.output_dir) {
            (_, Some(dir)) => Some(dir),
            (EvaluationMode::Command { .. }, None) => Some(PathBuf::from(DEFAULT_OUTPUT_DIR)),
            (EvaluationMode::Function(_), None) => None,
        };
        let store = output_dir.map(|dir| ExperimentStore::new(dir, self.name.clone()));

        let space = self.params.space()?;
        let mut builder: BayesianOptimizerBuilder = BayesianOptimizer::builder(space);
        if let Some(kernel) = self.kernel {
            builder = builder.kernel(kernel);
        }
        if let Some(acquisition) = self.acquisition {
            builder = builder.acquisition(acquisition);
        }
        if let Some(n) = self.n_initial_points {
            builder = builder.n_initial_points(n);
        }
        if let Some(n) = self.n_calls {
            builder = builder.n_calls(n);
        }
        if let Some(n) = self.n_restarts {
            builder = builder.n_restarts(n);
        }
        if let Some(noise) = self.noise {
            builder = builder.noise(noise);
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        let optimizer = builder.build()?;

        let evaluator = Evaluator::new(self.params, mode, self.metric, store)?;
        Ok(Search {
            name: self.name,
            optimizer,
            evaluator: Arc::new(evaluator),
            parallelism: self.parallelism,
        })
    }
}

impl core::fmt::Debug for SearchBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SearchBuilder")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("metric", &self.metric)
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::variable::Variable;

    fn tree() -> ParamTree {
        ParamTree::new().variable("x", Variable::real(0.0, 1.0))
    }

    fn loss(params: &JsonMap) -> Result<JsonMap> {
        let x = params["x"].as_f64().unwrap_or_default();
        let mut results = JsonMap::new();
        results.insert("loss".into(), json!(x));
        Ok(results)
    }

    #[test]
    fn build_requires_an_evaluation_mode() {
        let err = Search::builder("s").params(tree()).build().unwrap_err();
        assert!(matches!(err, Error::MissingEvaluationMode));
    }

    #[test]
    fn build_rejects_bad_settings_before_running() {
        assert!(matches!(
            Search::builder(" ").params(tree()).function(loss).build(),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            Search::builder("s").params(tree()).function(loss).parallelism(0).build(),
            Err(Error::InvalidCount { name: "parallelism" })
        ));
        assert!(matches!(
            Search::builder("s").function(loss).build(),
            Err(Error::NoVariables)
        ));
        assert!(matches!(
            Search::builder("s")
                .params(tree())
                .function(loss)
                .n_initial_points(3)
                .n_calls(2)
                .build(),
            Err(Error::InsufficientCalls { .. })
        ));
    }

    #[test]
    fn command_searches_persist_by_default() {
        let search = Search::builder("cmd")
            .params(tree())
            .command("true")
            .cwd("/tmp")
            .build()
            .unwrap();
        let store = search.evaluator().store().unwrap();
        assert_eq!(store.group_dir(), PathBuf::from(DEFAULT_OUTPUT_DIR).join("cmd"));

        let search = Search::builder("fn").params(tree()).function(loss).build().unwrap();
        assert!(search.evaluator().store().is_none());
    }

    #[test]
    fn run_returns_the_first_minimum() {
        let search = Search::builder("s")
            .params(tree())
            .function(loss)
            .n_initial_points(5)
            .n_calls(5)
            .seed(9)
            .build()
            .unwrap();
        let outcome = search.run().unwrap();
        assert_eq!(outcome.experiments.len(), 5);
        let min = outcome
            .experiments
            .iter()
            .map(|e| e.objective)
            .fold(f64::INFINITY, f64::min);
        assert_eq!(outcome.best.objective, min);

        // Running again starts from a clean record.
        assert_eq!(search.run().unwrap().experiments.len(), 5);
    }
}
