#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![deny(unreachable_pub)]
#![deny(clippy::correctness)]
#![deny(clippy::suspicious)]
#![deny(clippy::style)]
#![deny(clippy::complexity)]
#![deny(clippy::perf)]
#![deny(clippy::pedantic)]
#![deny(clippy::std_instead_of_core)]

//! Bayesian hyperparameter optimization with cached, idempotent
//! experiments.
//!
//! A Gaussian Process surrogate is fitted to every observed (point,
//! objective) pair, and the next point is the one minimizing an acquisition
//! score over the normalized search space. Experiments are addressed by a
//! content hash of their sampled parameters, so re-running a search reuses
//! every result it already has.
//!
//! # Getting Started
//!
//! ```
//! use hypered::prelude::*;
//! use serde_json::json;
//!
//! let params = ParamTree::new()
//!     .value("epochs", json!(10))
//!     .variable("x", Variable::real(-10.0, 10.0))
//!     .variable("option", Variable::categorical(["first", "second"]));
//!
//! let search = Search::builder("basic")
//!     .params(params)
//!     .function(|p: &JsonMap| {
//!         let x = p["x"].as_f64().unwrap_or_default();
//!         let loss = if p["option"] == "first" { (x - 5.0).powi(2) } else { (x - 3.0).abs() - 2.0 };
//!         Ok(json!({"loss": loss}).as_object().cloned().unwrap_or_default())
//!     })
//!     .minimize("loss")
//!     .n_initial_points(5)
//!     .n_calls(10)
//!     .seed(42)
//!     .build()
//!     .unwrap();
//!
//! let outcome = search.run().unwrap();
//! println!("best: {:?} -> {}", outcome.best.params, outcome.best.objective);
//! ```
//!
//! # Core Concepts
//!
//! | Type | Role |
//! |------|------|
//! | [`Variable`] | One optimizable dimension: real (uniform or log-uniform), integer, or categorical. |
//! | [`Space`] | The variables laid out in the unit hypercube. |
//! | [`Kernel`](kernel::Kernel) | Covariance function of the surrogate ([`Rbf`](kernel::Rbf), [`Matern`](kernel::Matern)). |
//! | [`AcquisitionFn`](acquisition::AcquisitionFn) | Scores candidate points ([`ExpectedImprovement`](acquisition::ExpectedImprovement), [`UpperConfidenceBound`](acquisition::UpperConfidenceBound)). |
//! | [`BayesianOptimizer`] | Random sampling followed by GP-guided proposals. |
//! | [`ParamTree`](tree::ParamTree) | A nested parameter tree of literals, variables and dynamic values. |
//! | [`Search`] | Runs the optimizer over a tree, evaluating through a function or a command. |
//! | [`SearchConfig`](config::SearchConfig) | A search described as JSON. |
//!
//! # Feature Flags
//!
//! | Flag | What it enables | Default |
//! |------|----------------|---------|
//! | `async` | Parallel random phase via tokio ([`BayesianOptimizer::minimize_parallel`], [`Search::run_async`]) | off |
//! | `tracing` | Structured log events via [`tracing`](https://docs.rs/tracing) at key optimization points | off |

/// Emit a `tracing::info!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_info {
    ($($arg:tt)*) => { tracing::info!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_info {
    ($($arg:tt)*) => {};
}

/// Emit a `tracing::debug!` event when the `tracing` feature is enabled.
/// No-op otherwise.
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => { tracing::debug!($($arg)*) };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

pub mod acquisition;
pub mod config;
pub mod dynamic;
mod error;
pub mod evaluation;
pub mod gp;
pub mod kernel;
pub mod objective;
pub mod optimizer;
pub mod proposal;
mod rng_util;
pub mod search;
pub mod space;
pub mod store;
pub mod tree;
mod types;
pub mod variable;

pub use error::{Error, ErrorKind, Result};
pub use evaluation::{Evaluator, Experiment};
pub use objective::{Metric, Objective};
pub use optimizer::{BayesianOptimizer, BayesianOptimizerBuilder, Observation};
pub use search::{Search, SearchBuilder, SearchOutcome};
pub use space::Space;
pub use types::Direction;
pub use variable::{Prior, Variable};

/// Convenient wildcard import for the most common types.
///
/// ```
/// use hypered::prelude::*;
/// ```
pub mod prelude {
    pub use crate::acquisition::{AcquisitionFn, ExpectedImprovement, UpperConfidenceBound};
    pub use crate::config::SearchConfig;
    pub use crate::dynamic::{ContextPath, DynamicProvider, RoundRobin};
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::evaluation::{EvaluationMode, Evaluator, Experiment};
    pub use crate::kernel::{Kernel, Matern, Rbf};
    pub use crate::objective::{Metric, Objective};
    pub use crate::optimizer::{BayesianOptimizer, BayesianOptimizerBuilder, Observation};
    pub use crate::search::{Search, SearchBuilder, SearchOutcome};
    pub use crate::space::Space;
    pub use crate::tree::{JsonMap, ParamTree};
    pub use crate::types::Direction;
    pub use crate::variable::{Prior, Variable};
}
