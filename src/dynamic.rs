//! Dynamic parameter values resolved once per evaluation.
//!
//! A [`DynamicProvider`] computes a leaf of the parameter tree from the
//! evaluation's [`Context`]. Providers are resolved in declaration order
//! after the sampled values have been merged in, so a provider sees every
//! literal and sampled value of the current experiment.

use core::fmt::Debug;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::ExperimentPaths;
use crate::tree::JsonMap;

/// What a provider sees when it is resolved.
#[derive(Clone, Copy, Debug)]
pub struct Context<'a> {
    /// Flat key of the leaf being resolved.
    pub key: &'a str,
    /// The merged parameter tree, nested. Dynamic leaves not yet resolved
    /// are `null`.
    pub params: &'a JsonMap,
    /// Paths of the current experiment. Empty when nothing is persisted.
    pub paths: &'a ExperimentPaths,
}

/// A deferred, context-dependent parameter value.
pub trait DynamicProvider: Debug + Send + Sync {
    /// Registry name of the provider.
    fn name(&self) -> &'static str;

    /// Computes the value for one evaluation.
    ///
    /// # Errors
    ///
    /// Implementations return an error if the value cannot be computed;
    /// the evaluation is aborted.
    fn resolve(&self, ctx: &Context<'_>) -> Result<Value>;
}

/// Hands out `0, 1, …, count - 1, 0, 1, …` on successive resolutions.
///
/// The counter belongs to the instance and is advanced atomically, so
/// concurrent evaluations never receive the same slot out of turn.
///
/// ```
/// use hypered::dynamic::{Context, DynamicProvider, RoundRobin};
/// use hypered::store::ExperimentPaths;
///
/// let devices = RoundRobin::new(2).unwrap();
/// let params = serde_json::Map::new();
/// let paths = ExperimentPaths::default();
/// let ctx = Context { key: "device", params: &params, paths: &paths };
///
/// let ids: Vec<_> = (0..3).map(|_| devices.resolve(&ctx).unwrap()).collect();
/// assert_eq!(ids, [0, 1, 0]);
/// ```
#[derive(Debug)]
pub struct RoundRobin {
    count: usize,
    next: AtomicUsize,
}

impl RoundRobin {
    /// Creates a round-robin over `count` slots, starting at 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCount`] if `count` is zero.
    pub fn new(count: usize) -> Result<Self> {
        if count == 0 {
            return Err(Error::InvalidCount {
                name: "device_id count",
            });
        }
        Ok(Self {
            count,
            next: AtomicUsize::new(0),
        })
    }

    /// Size of the pool.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }
}

impl DynamicProvider for RoundRobin {
    fn name(&self) -> &'static str {
        "device_id"
    }

    fn resolve(&self, _ctx: &Context<'_>) -> Result<Value> {
        let slot = self.next.fetch_add(1, Ordering::Relaxed) % self.count;
        Ok(Value::from(slot))
    }
}

/// Resolves to one of the current experiment's paths, as a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextPath {
    /// The experiment directory.
    ExperimentDir,
    /// The `params.json` file.
    ParamsPath,
    /// The `results.json` file.
    ResultsPath,
}

impl DynamicProvider for ContextPath {
    fn name(&self) -> &'static str {
        match self {
            Self::ExperimentDir => "experiment_dir",
            Self::ParamsPath => "params_path",
            Self::ResultsPath => "results_path",
        }
    }

    fn resolve(&self, ctx: &Context<'_>) -> Result<Value> {
        let path = match self {
            Self::ExperimentDir => &ctx.paths.experiment_dir,
            Self::ParamsPath => &ctx.paths.params_path,
            Self::ResultsPath => &ctx.paths.results_path,
        };
        Ok(Value::from(path.display().to_string()))
    }
}

/// Builds a provider from its configuration argument.
pub type DynamicFactory = fn(&Value) -> Result<Arc<dyn DynamicProvider>>;

/// Built-in providers by configuration name.
pub const DYNAMIC_KINDS: &[(&str, DynamicFactory)] = &[
    ("device_id", device_id),
    ("experiment_dir", experiment_dir),
    ("params_path", params_path),
    ("results_path", results_path),
];

fn experiment_dir(_: &Value) -> Result<Arc<dyn DynamicProvider>> {
    Ok(Arc::new(ContextPath::ExperimentDir))
}

fn params_path(_: &Value) -> Result<Arc<dyn DynamicProvider>> {
    Ok(Arc::new(ContextPath::ParamsPath))
}

fn results_path(_: &Value) -> Result<Arc<dyn DynamicProvider>> {
    Ok(Arc::new(ContextPath::ResultsPath))
}

fn device_id(args: &Value) -> Result<Arc<dyn DynamicProvider>> {
    let count = args
        .as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| Error::InvalidConfig(format!("`$device_id` expects a device count, got {args}")))?;
    Ok(Arc::new(RoundRobin::new(count)?))
}

/// Looks up `kind` in [`DYNAMIC_KINDS`] and builds the provider.
///
/// Returns `None` if no provider of that name exists.
///
/// # Errors
///
/// Returns the factory's error for malformed arguments.
pub fn from_kind(kind: &str, args: &Value) -> Option<Result<Arc<dyn DynamicProvider>>> {
    DYNAMIC_KINDS
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, factory)| factory(args))
}
