//! Optimizable dimensions and their denormalization rules.
//!
//! Every [`Variable`] occupies a fixed number of slots in the normalized
//! unit hypercube: one for [`Real`](Variable::Real) and
//! [`Integer`](Variable::Integer), one per category for
//! [`Categorical`](Variable::Categorical) (one-hot). Sampling and local
//! search happen in normalized space; [`Variable::denormalize`] maps a
//! variable's slots back to a concrete JSON value.
//!
//! ```
//! use hypered::Variable;
//! use serde_json::json;
//!
//! let lr = Variable::log_real(1e-5, 1e-1);
//! let layers = Variable::integer(1, 8);
//! let act = Variable::categorical(["relu", "tanh"]);
//!
//! assert_eq!(layers.denormalize(&[1.0]), json!(8));
//! assert_eq!(act.denormalize(&[0.2, 0.9]), json!("tanh"));
//! assert_eq!(lr.size() + layers.size() + act.size(), 4);
//! ```

use serde_json::Value;

use crate::error::{Error, Result};

/// How a [`Real`](Variable::Real) variable spreads over its range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Prior {
    /// Linear interpolation between the bounds.
    #[default]
    Uniform,
    /// Linear interpolation between the logarithms of the bounds.
    LogUniform,
}

/// One optimizable dimension of a search space.
#[derive(Clone, Debug, PartialEq)]
pub enum Variable {
    /// A continuous value in `[low, high]`.
    Real {
        /// Lower bound (inclusive).
        low: f64,
        /// Upper bound (inclusive).
        high: f64,
        /// Scale of the range.
        prior: Prior,
    },
    /// An integer value in `[low, high]`.
    Integer {
        /// Lower bound (inclusive).
        low: i64,
        /// Upper bound (inclusive).
        high: i64,
    },
    /// One label out of an ordered list, encoded one-hot.
    Categorical {
        /// The candidate labels, in slot order.
        categories: Vec<String>,
    },
}

impl Variable {
    /// Creates a uniform real variable.
    #[must_use]
    pub fn real(low: f64, high: f64) -> Self {
        Self::Real {
            low,
            high,
            prior: Prior::Uniform,
        }
    }

    /// Creates a real variable with a log-uniform prior.
    #[must_use]
    pub fn log_real(low: f64, high: f64) -> Self {
        Self::Real {
            low,
            high,
            prior: Prior::LogUniform,
        }
    }

    /// Creates an integer variable.
    #[must_use]
    pub fn integer(low: i64, high: i64) -> Self {
        Self::Integer { low, high }
    }

    /// Creates a categorical variable from a list of labels.
    #[must_use]
    pub fn categorical<I, S>(categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Categorical {
            categories: categories.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of normalized slots this variable occupies.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Real { .. } | Self::Integer { .. } => 1,
            Self::Categorical { categories } => categories.len(),
        }
    }

    /// Short kind name used in logs and configuration.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Real {
                prior: Prior::Uniform,
                ..
            } => "real",
            Self::Real {
                prior: Prior::LogUniform,
                ..
            } => "log_real",
            Self::Integer { .. } => "integer",
            Self::Categorical { .. } => "categorical",
        }
    }

    /// Checks the variable's invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBounds`] unless `low < high`,
    /// [`Error::InvalidLogBounds`] for a log-uniform prior with `low <= 0`,
    /// and [`Error::EmptyCategories`] for a categorical without labels.
    #[allow(clippy::cast_precision_loss)]
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Real { low, high, prior } => {
                // NaN bounds fail this comparison as well.
                if !(low < high) {
                    return Err(Error::InvalidBounds {
                        low: *low,
                        high: *high,
                    });
                }
                if *prior == Prior::LogUniform && *low <= 0.0 {
                    return Err(Error::InvalidLogBounds);
                }
                Ok(())
            }
            Self::Integer { low, high } => {
                if low >= high {
                    return Err(Error::InvalidBounds {
                        low: *low as f64,
                        high: *high as f64,
                    });
                }
                Ok(())
            }
            Self::Categorical { categories } => {
                if categories.is_empty() {
                    return Err(Error::EmptyCategories);
                }
                Ok(())
            }
        }
    }

    /// Maps this variable's normalized slots to a concrete value.
    ///
    /// `slots` must hold exactly [`size`](Self::size) values in `[0, 1]`.
    ///
    /// - `Real`: linear (or log-linear) interpolation; `0.0` gives `low`
    ///   and `1.0` gives `high`.
    /// - `Integer`: linear interpolation rounded to the nearest integer and
    ///   clamped to `[low, high]`.
    /// - `Categorical`: the label at the arg-max slot; ties go to the
    ///   lowest index.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn denormalize(&self, slots: &[f64]) -> Value {
        match self {
            Self::Real { low, high, prior } => {
                let x = slots.first().copied().unwrap_or(0.0).clamp(0.0, 1.0);
                let v = match prior {
                    Prior::Uniform => lerp(*low, *high, x),
                    Prior::LogUniform => lerp(low.ln(), high.ln(), x).exp(),
                };
                Value::from(v.max(*low).min(*high))
            }
            Self::Integer { low, high } => {
                let x = slots.first().copied().unwrap_or(0.0).clamp(0.0, 1.0);
                let v = lerp(*low as f64, *high as f64, x).round() as i64;
                Value::from(v.max(*low).min(*high))
            }
            Self::Categorical { categories } => {
                let mut best = 0;
                for (i, &s) in slots.iter().enumerate().take(categories.len()) {
                    if s > slots[best] {
                        best = i;
                    }
                }
                categories
                    .get(best)
                    .map_or(Value::Null, |c| Value::from(c.as_str()))
            }
        }
    }
}

/// Builds a variable from its configuration argument.
pub type VariableFactory = fn(&Value) -> Result<Variable>;

/// Built-in variable kinds by configuration name.
///
/// Numeric kinds take a `[low, high]` array, `categorical` takes an array
/// of labels.
pub const VARIABLE_KINDS: &[(&str, VariableFactory)] = &[
    ("real", real),
    ("log_real", log_real),
    ("integer", integer),
    ("categorical", categorical),
];

/// Looks up `kind` in [`VARIABLE_KINDS`] and builds the variable.
///
/// Returns `None` if no variable kind of that name exists. The variable is
/// validated before it is returned.
///
/// ```
/// use hypered::variable::{Variable, from_kind};
/// use serde_json::json;
///
/// let v = from_kind("integer", &json!([1, 8])).unwrap().unwrap();
/// assert_eq!(v, Variable::integer(1, 8));
/// assert!(from_kind("integer", &json!([8, 1])).unwrap().is_err());
/// assert!(from_kind("quantized", &json!([0, 1])).is_none());
/// ```
pub fn from_kind(kind: &str, args: &Value) -> Option<Result<Variable>> {
    VARIABLE_KINDS
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, factory)| factory(args).and_then(|v| v.validate().map(|()| v)))
}

fn real(args: &Value) -> Result<Variable> {
    let (low, high) = float_bounds("real", args)?;
    Ok(Variable::real(low, high))
}

fn log_real(args: &Value) -> Result<Variable> {
    let (low, high) = float_bounds("log_real", args)?;
    Ok(Variable::log_real(low, high))
}

fn integer(args: &Value) -> Result<Variable> {
    match args.as_array().map(Vec::as_slice) {
        Some([low, high]) => match (low.as_i64(), high.as_i64()) {
            (Some(low), Some(high)) => Ok(Variable::integer(low, high)),
            _ => Err(bad_args("integer", "two integers", args)),
        },
        _ => Err(bad_args("integer", "a [low, high] array", args)),
    }
}

fn categorical(args: &Value) -> Result<Variable> {
    let labels = args
        .as_array()
        .ok_or_else(|| bad_args("categorical", "an array of labels", args))?;
    let categories = labels
        .iter()
        .map(|label| match label {
            Value::String(s) => Ok(s.clone()),
            _ => Err(bad_args("categorical", "string labels", args)),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Variable::Categorical { categories })
}

fn float_bounds(kind: &str, args: &Value) -> Result<(f64, f64)> {
    match args.as_array().map(Vec::as_slice) {
        Some([low, high]) => match (low.as_f64(), high.as_f64()) {
            (Some(low), Some(high)) => Ok((low, high)),
            _ => Err(bad_args(kind, "two numbers", args)),
        },
        _ => Err(bad_args(kind, "a [low, high] array", args)),
    }
}

fn bad_args(kind: &str, expected: &str, args: &Value) -> Error {
    Error::InvalidConfig(format!("`${kind}` expects {expected}, got {args}"))
}

/// Interpolates so that `x = 0` and `x = 1` hit the bounds exactly.
#[inline]
fn lerp(low: f64, high: f64, x: f64) -> f64 {
    (1.0 - x) * low + x * high
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn real_hits_bounds_exactly() {
        let v = Variable::real(-10.0, 10.0);
        assert_eq!(v.denormalize(&[0.0]), json!(-10.0));
        assert_eq!(v.denormalize(&[1.0]), json!(10.0));
        assert_eq!(v.denormalize(&[0.5]), json!(0.0));

        let odd = Variable::real(0.1, 0.7);
        assert_eq!(odd.denormalize(&[0.0]), json!(0.1));
        assert_eq!(odd.denormalize(&[1.0]), json!(0.7));
    }

    #[test]
    fn integer_rounds_to_nearest_and_hits_both_bounds() {
        let v = Variable::integer(1, 5);
        assert_eq!(v.denormalize(&[0.0]), json!(1));
        assert_eq!(v.denormalize(&[1.0]), json!(5));
        // 1 + 0.6 * 4 = 3.4 -> 3
        assert_eq!(v.denormalize(&[0.6]), json!(3));
        // 1 + 0.9 * 4 = 4.6 -> 5
        assert_eq!(v.denormalize(&[0.9]), json!(5));
    }

    #[test]
    fn log_real_stays_in_range() {
        let v = Variable::log_real(1e-4, 1.0);
        for i in 0..=10 {
            let x = f64::from(i) / 10.0;
            let value = v.denormalize(&[x]).as_f64().unwrap();
            assert!((1e-4..=1.0).contains(&value), "{value} out of range");
        }
        let mid = v.denormalize(&[0.5]).as_f64().unwrap();
        assert!((mid - 1e-2).abs() < 1e-9);
    }

    #[test]
    fn categorical_picks_argmax_with_first_index_on_tie() {
        let v = Variable::categorical(["a", "b", "c"]);
        assert_eq!(v.denormalize(&[1.0, 0.0, 0.0]), json!("a"));
        assert_eq!(v.denormalize(&[0.0, 1.0, 0.0]), json!("b"));
        assert_eq!(v.denormalize(&[0.0, 0.0, 1.0]), json!("c"));
        assert_eq!(v.denormalize(&[0.3, 0.7, 0.7]), json!("b"));
        assert_eq!(v.denormalize(&[0.5, 0.5, 0.5]), json!("a"));
    }

    #[test]
    fn validation_rejects_bad_configurations() {
        assert!(matches!(
            Variable::real(1.0, 1.0).validate(),
            Err(Error::InvalidBounds { .. })
        ));
        assert!(matches!(
            Variable::integer(3, 2).validate(),
            Err(Error::InvalidBounds { .. })
        ));
        assert!(matches!(
            Variable::log_real(0.0, 1.0).validate(),
            Err(Error::InvalidLogBounds)
        ));
        assert!(matches!(
            Variable::categorical(Vec::<String>::new()).validate(),
            Err(Error::EmptyCategories)
        ));
        assert!(Variable::categorical(["x", "x"]).validate().is_ok());
    }

    #[test]
    fn kinds_parse_their_arguments() {
        assert_eq!(
            from_kind("log_real", &json!([1e-4, 0.1])).unwrap().unwrap(),
            Variable::log_real(1e-4, 0.1)
        );
        assert_eq!(
            from_kind("categorical", &json!(["relu", "tanh"])).unwrap().unwrap(),
            Variable::categorical(["relu", "tanh"])
        );
        assert!(matches!(
            from_kind("real", &json!([0.0])),
            Some(Err(Error::InvalidConfig(_)))
        ));
        assert!(matches!(
            from_kind("integer", &json!([0.5, 2])),
            Some(Err(Error::InvalidConfig(_)))
        ));
        assert!(matches!(
            from_kind("categorical", &json!(["a", 1])),
            Some(Err(Error::InvalidConfig(_)))
        ));
        assert!(matches!(
            from_kind("categorical", &json!([])),
            Some(Err(Error::EmptyCategories))
        ));
        assert!(matches!(
            from_kind("log_real", &json!([0.0, 1.0])),
            Some(Err(Error::InvalidLogBounds))
        ));
    }
}
