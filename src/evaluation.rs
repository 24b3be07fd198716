//! Turning a sampled point into a cached, side-effecting evaluation.
//!
//! For every point the [`Evaluator`]:
//!
//! 1. pairs the sampled values with the variable keys and merges them over
//!    the literal leaves of the [`ParamTree`];
//! 2. hashes the sampled values into the experiment's cache key;
//! 3. resolves the dynamic leaves in declaration order;
//! 4. reuses stored results for the key if there are any, otherwise runs
//!    the evaluation function or command and stores what it produced;
//! 5. extracts the objective with the [`Metric`] and records the
//!    [`Experiment`].

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use crate::dynamic::Context;
use crate::error::{Error, Result};
use crate::objective::{Metric, Objective};
use crate::optimizer::Observation;
use crate::store::{self, ExperimentPaths, ExperimentStore};
use crate::tree::{JsonMap, ParamTree, content_hash, merge, unflatten};

/// An in-process evaluation: resolved parameters in, results out.
pub type EvalFn = dyn Fn(&JsonMap) -> Result<JsonMap> + Send + Sync;

/// How an experiment is executed.
#[derive(Clone)]
pub enum EvaluationMode {
    /// Call a function with the resolved parameter tree.
    Function(Arc<EvalFn>),
    /// Write `params.json`, run a shell command, read `results.json`.
    ///
    /// The placeholders `{params_path}`, `{results_path}` and
    /// `{experiment_dir}` in `template` are replaced by the experiment's
    /// paths.
    Command {
        /// The command line template.
        template: String,
        /// Working directory of the command. Defaults to the current one.
        cwd: Option<PathBuf>,
    },
}

impl core::fmt::Debug for EvaluationMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Command { template, cwd } => f
                .debug_struct("Command")
                .field("template", template)
                .field("cwd", cwd)
                .finish(),
        }
    }
}

/// One evaluated sample.
#[derive(Clone, Debug, PartialEq)]
pub struct Experiment {
    /// The sampled values under their flat keys.
    pub sampled: JsonMap,
    /// The fully merged and resolved parameter tree, nested.
    pub params: JsonMap,
    /// The result tree.
    pub results: JsonMap,
    /// The objective, on the minimization scale.
    pub objective: f64,
    /// Content hash of [`sampled`](Self::sampled).
    pub hash: String,
    /// Where the experiment is stored; empty paths when not persisted.
    pub paths: ExperimentPaths,
    /// Whether the results came from the store instead of a fresh run.
    pub cached: bool,
}

/// Evaluates sampled points and keeps every [`Experiment`] of a run.
#[derive(Debug)]
pub struct Evaluator {
    tree: ParamTree,
    keys: Vec<String>,
    mode: EvaluationMode,
    metric: Metric,
    store: Option<ExperimentStore>,
    experiments: Mutex<Vec<Experiment>>,
}

impl Evaluator {
    /// Creates an evaluator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingOutputDir`] for command mode without a
    /// store, since commands exchange data through files.
    pub fn new(
        tree: ParamTree,
        mode: EvaluationMode,
        metric: Metric,
        store: Option<ExperimentStore>,
    ) -> Result<Self> {
        if matches!(mode, EvaluationMode::Command { .. }) && store.is_none() {
            return Err(Error::MissingOutputDir);
        }
        let keys = tree.variable_keys().map(str::to_owned).collect();
        Ok(Self {
            tree,
            keys,
            mode,
            metric,
            store,
            experiments: Mutex::new(Vec::new()),
        })
    }

    /// The store, if experiments are persisted.
    #[must_use]
    pub fn store(&self) -> Option<&ExperimentStore> {
        self.store.as_ref()
    }

    /// Flat keys of the variables, in the order the optimizer sees them.
    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Evaluates one point given as one value per variable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if `values` does not have one
    /// entry per variable, and the errors of
    /// [`evaluate_params`](Self::evaluate_params).
    pub fn evaluate_values(&self, values: &[Value]) -> Result<Experiment> {
        if values.len() != self.keys.len() {
            return Err(Error::DimensionMismatch {
                expected: self.keys.len(),
                got: values.len(),
            });
        }
        let sampled: JsonMap = self.keys.iter().cloned().zip(values.iter().cloned()).collect();
        self.evaluate_params(&sampled)
    }

    /// Evaluates one sampled parameter map keyed by flat variable keys.
    ///
    /// The experiment is recorded before it is returned.
    ///
    /// # Errors
    ///
    /// Returns the failure of a dynamic provider, the evaluation function
    /// or the command, [`Error::MissingResults`] and
    /// [`Error::MalformedResults`] for a bad result file, [`Error::Io`] for
    /// store failures, and the [`Metric`] extraction errors.
    pub fn evaluate_params(&self, sampled: &JsonMap) -> Result<Experiment> {
        let hash = content_hash(sampled)?;
        let paths = self
            .store
            .as_ref()
            .map_or_else(ExperimentPaths::default, |s| s.paths(&hash));
        trace_debug!(%hash, "evaluating parameters");

        let params = self.resolve(sampled, &paths)?;

        let cached = match &self.store {
            Some(store) => store.cached_results(&paths)?,
            None => None,
        };
        let (results, was_cached) = match cached {
            Some(results) => {
                trace_info!(%hash, "skipping experiment, results already stored");
                (results, true)
            }
            None => (self.execute(&params, &paths)?, false),
        };

        let objective = self.metric.extract(&results)?;
        let experiment = Experiment {
            sampled: sampled.clone(),
            params,
            results,
            objective,
            hash,
            paths,
            cached: was_cached,
        };
        self.experiments.lock().push(experiment.clone());
        Ok(experiment)
    }

    /// Merges `sampled` over the tree and resolves the dynamic leaves.
    fn resolve(&self, sampled: &JsonMap, paths: &ExperimentPaths) -> Result<JsonMap> {
        let mut flat = self.tree.base();
        for (key, value) in sampled {
            flat.insert(key.clone(), value.clone());
        }
        let mut params = merge(&flat, &JsonMap::new());

        for (key, provider) in self.tree.dynamic_leaves() {
            let ctx = Context {
                key,
                params: &params,
                paths,
            };
            let value = provider.resolve(&ctx)?;
            flat.insert(key.to_owned(), value);
            params = unflatten(&flat);
        }
        Ok(params)
    }

    fn execute(&self, params: &JsonMap, paths: &ExperimentPaths) -> Result<JsonMap> {
        match &self.mode {
            EvaluationMode::Function(function) => {
                let results = function(params)?;
                if let Some(store) = &self.store {
                    store.write_params(paths, params)?;
                    store.write_results(paths, &results)?;
                }
                Ok(results)
            }
            EvaluationMode::Command { template, cwd } => {
                if let Some(store) = &self.store {
                    store.write_params(paths, params)?;
                }
                run_command(template, cwd.as_deref(), paths)?;
                store::read_results(&paths.results_path)
            }
        }
    }

    /// Every experiment recorded so far, in completion order.
    #[must_use]
    pub fn experiments(&self) -> Vec<Experiment> {
        self.experiments.lock().clone()
    }

    /// Forgets every recorded experiment.
    pub fn clear(&self) {
        self.experiments.lock().clear();
    }

    /// Removes the recorded experiments and returns those matching
    /// `observations`, in observation order.
    ///
    /// Experiments are matched by the content hash of the observed values,
    /// so this recovers evaluation order after a parallel phase.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Evaluation`] if an observation has no recorded
    /// experiment.
    pub fn drain_in_order(&self, observations: &[Observation]) -> Result<Vec<Experiment>> {
        let mut pool: Vec<Option<Experiment>> = core::mem::take(&mut *self.experiments.lock())
            .into_iter()
            .map(Some)
            .collect();
        let mut ordered = Vec::with_capacity(observations.len());
        for observation in observations {
            let sampled: JsonMap = self
                .keys
                .iter()
                .cloned()
                .zip(observation.values.iter().cloned())
                .collect();
            let hash = content_hash(&sampled)?;
            let experiment = pool
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|e| e.hash == hash))
                .and_then(Option::take)
                .ok_or_else(|| Error::Evaluation(format!("no experiment recorded for {hash}")))?;
            ordered.push(experiment);
        }
        Ok(ordered)
    }
}

impl Objective for Evaluator {
    fn evaluate(&self, values: &[Value]) -> Result<f64> {
        self.evaluate_values(values).map(|e| e.objective)
    }
}

/// The experiment with the smallest objective; the earliest one wins ties.
#[must_use]
pub fn best(experiments: &[Experiment]) -> Option<&Experiment> {
    experiments.iter().fold(None, |best, e| match best {
        Some(b) if b.objective <= e.objective => Some(b),
        _ => Some(e),
    })
}

fn format_command(template: &str, paths: &ExperimentPaths) -> String {
    template
        .replace("{params_path}", &paths.params_path.display().to_string())
        .replace("{results_path}", &paths.results_path.display().to_string())
        .replace("{experiment_dir}", &paths.experiment_dir.display().to_string())
}

fn run_command(template: &str, cwd: Option<&Path>, paths: &ExperimentPaths) -> Result<()> {
    let command = format_command(template, paths);
    trace_info!(%command, "launching experiment");

    let mut process = Command::new("sh");
    process.arg("-c").arg(&command);
    if let Some(dir) = cwd {
        process.current_dir(dir);
    }
    let status = process.status().map_err(|e| Error::io("sh", e))?;
    if !status.success() {
        return Err(Error::CommandFailed {
            command,
            status: status.to_string(),
        });
    }
    trace_debug!("experiment finished");
    Ok(())
}
