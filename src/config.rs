//! Declarative search configuration.
//!
//! A search can be described by a JSON document instead of code:
//!
//! ```json
//! {
//!   "name": "basic",
//!   "command": "python main.py {params_path} {results_path}",
//!   "objective": {"minimize": "loss"},
//!   "random_starts": 5,
//!   "iterations": 20,
//!   "params": {
//!     "vars": {
//!       "x": {"$real": [-10, 10]},
//!       "option": {"$categorical": ["first", "second"]}
//!     },
//!     "device": {"$device_id": 2},
//!     "epochs": 10
//!   }
//! }
//! ```
//!
//! Inside `params`, an object with a single `$`-prefixed key is a special
//! leaf: a variable from [`VARIABLE_KINDS`](crate::variable::VARIABLE_KINDS)
//! or a dynamic value from [`DYNAMIC_KINDS`](crate::dynamic::DYNAMIC_KINDS).
//! Everything else is a literal.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::acquisition::{AcquisitionParams, AcquisitionRegistry, DEFAULT_KAPPA, DEFAULT_XI};
use crate::dynamic;
use crate::error::{Error, Result};
use crate::gp::DEFAULT_NOISE;
use crate::kernel::{KernelParams, KernelRegistry};
use crate::objective::Metric;
use crate::optimizer::{DEFAULT_CALLS, DEFAULT_INITIAL_POINTS};
use crate::proposal::DEFAULT_RESTARTS;
use crate::search::{Search, SearchBuilder};
use crate::tree::{JsonMap, Leaf, ParamTree, SEPARATOR};
use crate::variable;

/// Prefix marking a special parameter leaf.
pub const KIND_SIGIL: char = '$';

/// Which result value to optimize, and in which direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectiveSpec {
    /// Minimize the value at this dotted path.
    Minimize(String),
    /// Maximize the value at this dotted path.
    Maximize(String),
}

impl Default for ObjectiveSpec {
    fn default() -> Self {
        Self::Minimize("loss".into())
    }
}

impl From<&ObjectiveSpec> for Metric {
    fn from(spec: &ObjectiveSpec) -> Self {
        match spec {
            ObjectiveSpec::Minimize(path) => Metric::minimize(path.clone()),
            ObjectiveSpec::Maximize(path) => Metric::maximize(path.clone()),
        }
    }
}

/// A search described as data. Missing fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Group name of the experiments.
    pub name: String,
    /// The parameter tree, with `$`-kind leaves.
    pub params: JsonMap,
    /// The objective.
    pub objective: ObjectiveSpec,
    /// Command template for subprocess evaluations.
    pub command: Option<String>,
    /// Working directory of the command.
    pub cwd: Option<PathBuf>,
    /// Directory holding the experiment groups.
    pub output_dir: Option<PathBuf>,
    /// Kernel registry name.
    pub kernel: String,
    /// Kernel length scale.
    pub kernel_scale: f64,
    /// Matérn smoothness.
    pub kernel_nu: f64,
    /// Acquisition registry name.
    pub acquisition_fn: String,
    /// Expected-improvement margin.
    pub xi: f64,
    /// Upper-confidence-bound multiplier.
    pub kappa: f64,
    /// Gaussian Process observation noise.
    pub noise: f64,
    /// Number of random-sampling evaluations.
    #[serde(alias = "random_starts")]
    pub n_initial_points: usize,
    /// Total number of evaluations.
    #[serde(alias = "iterations")]
    pub n_calls: usize,
    /// Local-search restarts per proposal.
    pub optimizer_restarts: usize,
    /// Bound on concurrent random-phase evaluations.
    pub parallelism: usize,
    /// Seed for sampling and proposal restarts. Unset means fresh entropy.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let kernel = KernelParams::default();
        Self {
            name: String::new(),
            params: JsonMap::new(),
            objective: ObjectiveSpec::default(),
            command: None,
            cwd: None,
            output_dir: None,
            kernel: "RBF".into(),
            kernel_scale: kernel.scale,
            kernel_nu: kernel.nu,
            acquisition_fn: "EI".into(),
            xi: DEFAULT_XI,
            kappa: DEFAULT_KAPPA,
            noise: DEFAULT_NOISE,
            n_initial_points: DEFAULT_INITIAL_POINTS,
            n_calls: DEFAULT_CALLS,
            optimizer_restarts: DEFAULT_RESTARTS,
            parallelism: 1,
            seed: None,
        }
    }
}

/// Reads a [`SearchConfig`] from a JSON file.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read and
/// [`Error::InvalidConfig`] if it is not a valid configuration.
pub fn load(path: impl AsRef<Path>) -> Result<SearchConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    SearchConfig::from_json(&text)
}

impl SearchConfig {
    /// Parses a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for malformed JSON, unknown fields,
    /// or fields of the wrong type.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))
    }

    /// The parameter tree with every `$`-kind leaf resolved.
    ///
    /// # Errors
    ///
    /// See [`parse_params`].
    pub fn param_tree(&self) -> Result<ParamTree> {
        parse_params(&self.params)
    }

    /// A search builder with every setting of this configuration, using the
    /// default kernel and acquisition registries.
    ///
    /// Without a `command` the builder still needs a
    /// [`function`](SearchBuilder::function).
    ///
    /// # Errors
    ///
    /// Returns the parameter, kernel and acquisition errors of
    /// [`search_builder_with`](Self::search_builder_with).
    pub fn search_builder(&self) -> Result<SearchBuilder> {
        self.search_builder_with(&KernelRegistry::default(), &AcquisitionRegistry::default())
    }

    /// Like [`search_builder`](Self::search_builder), with custom registries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownKernel`] and [`Error::UnknownAcquisition`]
    /// for unregistered names, the factories' validation errors, and the
    /// errors of [`parse_params`].
    pub fn search_builder_with(
        &self,
        kernels: &KernelRegistry,
        acquisitions: &AcquisitionRegistry,
    ) -> Result<SearchBuilder> {
        let kernel = kernels.create(
            &self.kernel,
            &KernelParams {
                scale: self.kernel_scale,
                nu: self.kernel_nu,
            },
        )?;
        let acquisition = acquisitions.create(
            &self.acquisition_fn,
            &AcquisitionParams {
                xi: self.xi,
                kappa: self.kappa,
            },
        )?;

        let mut builder = Search::builder(self.name.clone())
            .params(self.param_tree()?)
            .metric(Metric::from(&self.objective))
            .kernel(kernel)
            .acquisition(acquisition)
            .noise(self.noise)
            .n_initial_points(self.n_initial_points)
            .n_calls(self.n_calls)
            .n_restarts(self.optimizer_restarts)
            .parallelism(self.parallelism);
        if let Some(command) = &self.command {
            builder = builder.command(command.clone());
        }
        if let Some(cwd) = &self.cwd {
            builder = builder.cwd(cwd.clone());
        }
        if let Some(dir) = &self.output_dir {
            builder = builder.output_dir(dir.clone());
        }
        if let Some(seed) = self.seed {
            builder = builder.seed(seed);
        }
        Ok(builder)
    }
}

/// Builds a [`ParamTree`] from a JSON parameter tree.
///
/// Leaves keep the depth-first order of the document.
///
/// # Errors
///
/// Returns [`Error::UnknownParamKind`] for a `$`-key naming neither a
/// variable nor a dynamic kind, [`Error::InvalidConfig`] for malformed
/// arguments or keys containing the separator, and the validation errors
/// of the variables.
pub fn parse_params(params: &JsonMap) -> Result<ParamTree> {
    let mut leaves = Vec::new();
    collect_leaves(params, None, &mut leaves)?;
    Ok(leaves
        .into_iter()
        .fold(ParamTree::new(), |tree, (key, leaf)| tree.leaf(key, leaf)))
}

fn collect_leaves(tree: &JsonMap, prefix: Option<&str>, out: &mut Vec<(String, Leaf)>) -> Result<()> {
    for (key, value) in tree {
        if key.contains(SEPARATOR) {
            return Err(Error::InvalidConfig(format!(
                "parameter key `{key}` must not contain `{SEPARATOR}`"
            )));
        }
        let path = match prefix {
            Some(p) => format!("{p}{SEPARATOR}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(child) => match special_kind(child) {
                Some((kind, args)) => out.push((path, parse_kind(kind, args)?)),
                None if child.is_empty() => out.push((path, Leaf::Value(value.clone()))),
                None => collect_leaves(child, Some(&path), out)?,
            },
            other => out.push((path, Leaf::Value(other.clone()))),
        }
    }
    Ok(())
}

fn special_kind(object: &JsonMap) -> Option<(&str, &Value)> {
    if object.len() != 1 {
        return None;
    }
    let (key, args) = object.iter().next()?;
    key.strip_prefix(KIND_SIGIL).map(|kind| (kind, args))
}

fn parse_kind(kind: &str, args: &Value) -> Result<Leaf> {
    if let Some(variable) = variable::from_kind(kind, args) {
        return variable.map(Leaf::Variable);
    }
    if let Some(provider) = dynamic::from_kind(kind, args) {
        return provider.map(Leaf::Dynamic);
    }
    Err(Error::UnknownParamKind(kind.to_owned()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::variable::Variable;

    #[test]
    fn aliases_and_defaults() {
        let config = SearchConfig::from_json(
            r#"{"name": "g", "random_starts": 3, "iterations": 9, "seed": 5}"#,
        )
        .unwrap();
        assert_eq!(config.n_initial_points, 3);
        assert_eq!(config.n_calls, 9);
        assert_eq!(config.seed, Some(5));
        assert_eq!(config.kernel, "RBF");
        assert_eq!(config.acquisition_fn, "EI");
        assert_eq!(config.objective, ObjectiveSpec::Minimize("loss".into()));
        assert_eq!(config.parallelism, 1);
    }

    #[test]
    fn unknown_fields_are_configuration_errors() {
        let err = SearchConfig::from_json(r#"{"name": "g", "iterationz": 3}"#).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn objective_directions() {
        let config =
            SearchConfig::from_json(r#"{"objective": {"maximize": "metrics.acc"}}"#).unwrap();
        assert_eq!(Metric::from(&config.objective), Metric::maximize("metrics.acc"));
    }

    #[test]
    fn special_leaves_become_variables_and_dynamics() {
        let params = json!({
            "vars": {"x": {"$real": [-1, 1]}, "act": {"$categorical": ["a", "b"]}},
            "device": {"$device_id": 2},
            "out": {"$results_path": null},
            "epochs": 3,
            "opts": {},
            "meta": {"tag": "t", "extra": 1}
        });
        let tree = parse_params(params.as_object().unwrap()).unwrap();

        assert_eq!(tree.variable_keys().collect::<Vec<_>>(), ["vars.x", "vars.act"]);
        assert_eq!(
            tree.dynamic_leaves().map(|(k, p)| (k, p.name())).collect::<Vec<_>>(),
            [("device", "device_id"), ("out", "results_path")]
        );
        let base = tree.base();
        assert_eq!(base["epochs"], json!(3));
        assert_eq!(base["opts"], json!({}));
        assert_eq!(base["meta.tag"], json!("t"));
        assert_eq!(tree.space().unwrap().variables()[0], Variable::real(-1.0, 1.0));
    }

    #[test]
    fn bad_leaves_are_rejected() {
        let unknown = json!({"x": {"$quantized": [0, 1]}});
        assert!(matches!(
            parse_params(unknown.as_object().unwrap()),
            Err(Error::UnknownParamKind(k)) if k == "quantized"
        ));
        let bad_bounds = json!({"x": {"$integer": [5, 1]}});
        assert!(matches!(
            parse_params(bad_bounds.as_object().unwrap()),
            Err(Error::InvalidBounds { .. })
        ));
        let dotted = json!({"a.b": 1});
        assert!(matches!(
            parse_params(dotted.as_object().unwrap()),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn unknown_registry_names_fail_before_running() {
        let config = SearchConfig {
            kernel: "Linear".into(),
            ..SearchConfig::default()
        };
        assert!(matches!(config.search_builder(), Err(Error::UnknownKernel(_))));

        let config = SearchConfig {
            acquisition_fn: "PI".into(),
            ..SearchConfig::default()
        };
        assert!(matches!(config.search_builder(), Err(Error::UnknownAcquisition(_))));
    }

    #[test]
    fn builder_carries_the_settings() {
        let config = SearchConfig::from_json(
            r#"{
                "name": "g",
                "kernel": "Matern",
                "kernel_nu": 1.5,
                "acquisition_fn": "UCB",
                "random_starts": 2,
                "iterations": 4,
                "command": "true",
                "params": {"x": {"$integer": [0, 3]}}
            }"#,
        )
        .unwrap();
        let search = config.search_builder().unwrap().build().unwrap();
        assert_eq!(search.optimizer().kernel().name(), "Matern");
        assert_eq!(search.optimizer().acquisition().name(), "UCB");
        assert_eq!(search.optimizer().n_calls(), 4);
        assert!(search.evaluator().store().is_some());
    }
}
