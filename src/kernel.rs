//! Covariance functions for the Gaussian Process surrogate.
//!
//! A [`Kernel`] maps two batches of normalized points to their covariance
//! matrix. Two families are built in:
//!
//! | Name | Type | Formula (`d` = distance of the scaled inputs) |
//! |------|------|---------|
//! | `"RBF"` | [`Rbf`] | `exp(-d² / 2)` |
//! | `"Matern"` | [`Matern`] | closed forms for `nu` ∈ {0.5, 1.5, 2.5} |
//!
//! Kernels are selected by name through a [`KernelRegistry`], which callers
//! can extend with their own factories.
//!
//! ```
//! use hypered::kernel::{KernelParams, KernelRegistry};
//!
//! let registry = KernelRegistry::default();
//! let kernel = registry
//!     .create("Matern", &KernelParams { scale: 0.5, nu: 1.5 })
//!     .unwrap();
//! assert_eq!(kernel.name(), "Matern");
//! assert!(registry.create("Periodic", &KernelParams::default()).is_err());
//! ```

use core::fmt::Debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::DMatrix;

use crate::error::{Error, Result};

/// √3, used by the Matérn 3/2 kernel.
const SQRT_3: f64 = 1.732_050_807_568_877_2;
/// √5, used by the Matérn 5/2 kernel.
const SQRT_5: f64 = 2.236_067_977_499_79;

/// A covariance function over normalized points.
///
/// `compute(x, x)` must be symmetric positive semi-definite.
pub trait Kernel: Debug + Send + Sync {
    /// The registry name of this kernel family.
    fn name(&self) -> &'static str;

    /// Covariance between a single pair of points.
    fn eval(&self, a: &[f64], b: &[f64]) -> f64;

    /// Covariance matrix between every point of `x1` (rows) and `x2` (columns).
    fn compute(&self, x1: &[Vec<f64>], x2: &[Vec<f64>]) -> DMatrix<f64> {
        DMatrix::from_fn(x1.len(), x2.len(), |i, j| self.eval(&x1[i], &x2[j]))
    }
}

/// Squared Euclidean distance between `a / scale` and `b / scale`.
fn scaled_sq_distance(a: &[f64], b: &[f64], scale: f64) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x / scale - y / scale;
            d * d
        })
        .sum()
}

/// Squared-exponential kernel `exp(-0.5 * |x1/scale - x2/scale|²)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rbf {
    scale: f64,
}

impl Rbf {
    /// Creates an RBF kernel with the given length scale.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] unless `scale` is positive and finite.
    pub fn new(scale: f64) -> Result<Self> {
        check_scale(scale)?;
        Ok(Self { scale })
    }

    /// The length scale.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Kernel for Rbf {
    fn name(&self) -> &'static str {
        "RBF"
    }

    fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        (-0.5 * scaled_sq_distance(a, b, self.scale)).exp()
    }
}

/// Smoothness of a [`Matern`] kernel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaternNu {
    /// `nu = 0.5`, the exponential kernel.
    Half,
    /// `nu = 1.5`.
    ThreeHalves,
    /// `nu = 2.5`.
    FiveHalves,
}

impl MaternNu {
    /// Maps a numeric `nu` onto a supported smoothness.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] for any value other than
    /// 0.5, 1.5 or 2.5.
    #[allow(clippy::float_cmp)]
    pub fn from_value(nu: f64) -> Result<Self> {
        if nu == 0.5 {
            Ok(Self::Half)
        } else if nu == 1.5 {
            Ok(Self::ThreeHalves)
        } else if nu == 2.5 {
            Ok(Self::FiveHalves)
        } else {
            Err(Error::UnsupportedParameter {
                name: "nu",
                value: nu,
            })
        }
    }

    /// The numeric value of `nu`.
    #[must_use]
    pub fn value(self) -> f64 {
        match self {
            Self::Half => 0.5,
            Self::ThreeHalves => 1.5,
            Self::FiveHalves => 2.5,
        }
    }
}

/// Matérn kernel with closed forms for half-integer smoothness.
///
/// With `d = |x1/scale - x2/scale|`:
///
/// - `nu = 0.5`: `exp(-d)`
/// - `nu = 1.5`: `(1 + √3 d) exp(-√3 d)`
/// - `nu = 2.5`: `(1 + √5 d + 5/3 d²) exp(-√5 d)`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matern {
    nu: MaternNu,
    scale: f64,
}

impl Matern {
    /// Creates a Matérn kernel.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedParameter`] if `nu` is not one of 0.5,
    /// 1.5, 2.5, or if `scale` is not positive and finite.
    pub fn new(nu: f64, scale: f64) -> Result<Self> {
        let nu = MaternNu::from_value(nu)?;
        check_scale(scale)?;
        Ok(Self { nu, scale })
    }

    /// The smoothness parameter.
    #[must_use]
    pub fn nu(&self) -> MaternNu {
        self.nu
    }

    /// The length scale.
    #[must_use]
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Kernel for Matern {
    fn name(&self) -> &'static str {
        "Matern"
    }

    fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        let d_sq = scaled_sq_distance(a, b, self.scale);
        let d = d_sq.sqrt();
        match self.nu {
            MaternNu::Half => (-d).exp(),
            MaternNu::ThreeHalves => {
                let r = SQRT_3 * d;
                (1.0 + r) * (-r).exp()
            }
            MaternNu::FiveHalves => {
                let r = SQRT_5 * d;
                (1.0 + r + 5.0 / 3.0 * d_sq) * (-r).exp()
            }
        }
    }
}

fn check_scale(scale: f64) -> Result<()> {
    if scale > 0.0 && scale.is_finite() {
        Ok(())
    } else {
        Err(Error::UnsupportedParameter {
            name: "scale",
            value: scale,
        })
    }
}

/// Hyperparameters handed to a kernel factory.
///
/// Factories read the fields they need and ignore the rest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KernelParams {
    /// Length scale. Default: 1.0.
    pub scale: f64,
    /// Matérn smoothness. Default: 1.5.
    pub nu: f64,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self { scale: 1.0, nu: 1.5 }
    }
}

/// Constructor stored in a [`KernelRegistry`].
pub type KernelFactory = fn(&KernelParams) -> Result<Arc<dyn Kernel>>;

/// Name → factory table for kernels.
///
/// [`KernelRegistry::default`] registers `"RBF"` and `"Matern"`.
#[derive(Clone, Debug)]
pub struct KernelRegistry {
    factories: BTreeMap<String, KernelFactory>,
}

impl KernelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers (or replaces) a factory under `name`.
    pub fn register(&mut self, name: impl Into<String>, factory: KernelFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Builds the kernel registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownKernel`] for an unregistered name, or the
    /// factory's own validation error.
    pub fn create(&self, name: &str, params: &KernelParams) -> Result<Arc<dyn Kernel>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownKernel(name.to_owned()))?;
        factory(params)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl Default for KernelRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("RBF", rbf_factory)
            .register("Matern", matern_factory);
        registry
    }
}

fn rbf_factory(params: &KernelParams) -> Result<Arc<dyn Kernel>> {
    Ok(Arc::new(Rbf::new(params.scale)?))
}

fn matern_factory(params: &KernelParams) -> Result<Arc<dyn Kernel>> {
    Ok(Arc::new(Matern::new(params.nu, params.scale)?))
}
