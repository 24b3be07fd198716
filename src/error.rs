use std::path::PathBuf;

/// Broad failure category of an [`Error`].
///
/// Configuration errors are raised before any evaluation runs, evaluation
/// errors abort the run at the failing evaluation, and numerical errors
/// abort the run during model fitting or proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Invalid search space, registry lookup, or run settings.
    Configuration,
    /// A single evaluation (callback or subprocess) failed.
    Evaluation,
    /// The surrogate model or the acquisition search broke down numerically.
    Numerical,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a bounded variable has `low >= high`.
    #[error("invalid bounds: low ({low}) must be less than high ({high})")]
    InvalidBounds {
        /// The lower bound value.
        low: f64,
        /// The upper bound value.
        high: f64,
    },

    /// Returned when a log-uniform prior is used with non-positive bounds.
    #[error("invalid log bounds: low must be positive for a log-uniform prior")]
    InvalidLogBounds,

    /// Returned when a categorical variable has no categories.
    #[error("categorical variable needs at least one category")]
    EmptyCategories,

    /// Returned when a component is configured with a value it cannot handle,
    /// such as a Matérn `nu` outside {0.5, 1.5, 2.5}.
    #[error("unsupported value {value} for parameter '{name}'")]
    UnsupportedParameter {
        /// The parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Returned when no kernel is registered under the given name.
    #[error("unknown kernel '{0}'")]
    UnknownKernel(String),

    /// Returned when no acquisition function is registered under the given name.
    #[error("unknown acquisition function '{0}'")]
    UnknownAcquisition(String),

    /// Returned when a declarative parameter leaf names an unknown kind.
    #[error("unknown parameter kind '{0}'")]
    UnknownParamKind(String),

    /// Returned when the total number of evaluations is smaller than the
    /// number of random starts.
    #[error("n_calls ({n_calls}) must be at least n_initial_points ({n_initial_points})")]
    InsufficientCalls {
        /// Total number of evaluations requested.
        n_calls: usize,
        /// Number of random-sampling evaluations requested.
        n_initial_points: usize,
    },

    /// Returned when the random-sampling phase is empty, leaving the GP
    /// nothing to fit on.
    #[error("at least one initial random point is required")]
    NoInitialPoints,

    /// Returned when neither a function nor a command was configured.
    #[error("either an evaluation function or a command must be provided")]
    MissingEvaluationMode,

    /// Returned when command mode has no output directory to exchange
    /// parameter and result files through.
    #[error("command mode requires an output directory")]
    MissingOutputDir,

    /// Returned when the parameter tree contains no variables to optimize.
    #[error("the parameter tree contains no variables")]
    NoVariables,

    /// Returned when `parallelism` or `optimizer_restarts` is zero.
    #[error("invalid {name}: must be at least 1")]
    InvalidCount {
        /// The setting name.
        name: &'static str,
    },

    /// Returned when a configuration document is structurally invalid.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when a normalized vector does not match the space layout.
    #[error("dimension mismatch: expected {expected} slots, got {got}")]
    DimensionMismatch {
        /// The expected number of slots.
        expected: usize,
        /// The number of slots received.
        got: usize,
    },

    /// Returned when the evaluation subprocess exits unsuccessfully.
    #[error("command `{command}` failed with {status}")]
    CommandFailed {
        /// The formatted command line.
        command: String,
        /// The exit status as reported by the OS.
        status: String,
    },

    /// Returned when a subprocess finished without writing its results file.
    #[error("results file {} was not written", .path.display())]
    MissingResults {
        /// The expected results path.
        path: PathBuf,
    },

    /// Returned when a results file is not a JSON object.
    #[error("malformed results file {}: {reason}", .path.display())]
    MalformedResults {
        /// The results path.
        path: PathBuf,
        /// Why parsing failed.
        reason: String,
    },

    /// Returned when the objective path does not exist in the result tree.
    #[error("objective path '{0}' not found in results")]
    ObjectivePathNotFound(String),

    /// Returned when the objective path points at a non-numeric value.
    #[error("objective path '{0}' does not hold a number")]
    ObjectiveNotNumeric(String),

    /// Returned when a caller-supplied evaluation function fails.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// Returned when reading or writing experiment files fails.
    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        /// The file or directory involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Returned when a parameter or result tree cannot be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Returned when an async evaluation task fails.
    #[cfg(feature = "async")]
    #[error("async task error: {0}")]
    TaskError(String),

    /// Returned when the regularized covariance matrix cannot be factorized.
    #[error("covariance matrix of size {size} is not positive definite")]
    SingularCovariance {
        /// Number of training points.
        size: usize,
    },

    /// Returned when predicting from a model that was never fitted.
    #[error("gaussian process has not been fitted")]
    NotFitted,

    /// Returned when every restart of the acquisition search failed.
    #[error("acquisition search failed after {restarts} restarts: {reason}")]
    ProposalFailed {
        /// Number of restarts attempted.
        restarts: usize,
        /// The failure of the last restart.
        reason: String,
    },

    /// Returned when an objective evaluates to NaN or infinity.
    #[error("objective value is not finite: {0}")]
    NonFiniteObjective(f64),
}

impl Error {
    /// Returns the failure category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidBounds { .. }
            | Self::InvalidLogBounds
            | Self::EmptyCategories
            | Self::UnsupportedParameter { .. }
            | Self::UnknownKernel(_)
            | Self::UnknownAcquisition(_)
            | Self::UnknownParamKind(_)
            | Self::InsufficientCalls { .. }
            | Self::NoInitialPoints
            | Self::MissingEvaluationMode
            | Self::MissingOutputDir
            | Self::NoVariables
            | Self::InvalidCount { .. }
            | Self::InvalidConfig(_)
            | Self::DimensionMismatch { .. } => ErrorKind::Configuration,
            Self::CommandFailed { .. }
            | Self::MissingResults { .. }
            | Self::MalformedResults { .. }
            | Self::ObjectivePathNotFound(_)
            | Self::ObjectiveNotNumeric(_)
            | Self::Evaluation(_)
            | Self::Io { .. }
            | Self::Serialization(_)
            | Self::NonFiniteObjective(_) => ErrorKind::Evaluation,
            #[cfg(feature = "async")]
            Self::TaskError(_) => ErrorKind::Evaluation,
            Self::SingularCovariance { .. } | Self::NotFitted | Self::ProposalFailed { .. } => {
                ErrorKind::Numerical
            }
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

pub type Result<T> = core::result::Result<T, Error>;
