use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::{Distribution, Exp, Normal, StandardNormal, StudentT, Uniform, Weibull};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::utils::error::{Result, SimError};

/// Time offset of a parent relative to its child. `-tau` is `tau` steps in the
/// past; `0` is contemporaneous. Positive lags are rejected everywhere.
pub type Lag = i32;

/// Function applied to a parent value before it is scaled by the link coefficient.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transfer {
    #[default]
    Linear,
    /// `x + 5 x² exp(-x² / 20)`
    Nonlinear,
    Tanh,
    Square,
    Cubic,
    #[serde(skip)]
    Custom(Arc<dyn Fn(f64) -> f64 + Send + Sync>),
}

impl Transfer {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        Transfer::Custom(Arc::new(f))
    }

    pub fn apply(&self, x: f64) -> f64 {
        match self {
            Transfer::Linear => x,
            Transfer::Nonlinear => x + 5.0 * x * x * (-x * x / 20.0).exp(),
            Transfer::Tanh => x.tanh(),
            Transfer::Square => x * x,
            Transfer::Cubic => x * x * x,
            Transfer::Custom(f) => f(x),
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transfer::Linear => write!(f, "Linear"),
            Transfer::Nonlinear => write!(f, "Nonlinear"),
            Transfer::Tanh => write!(f, "Tanh"),
            Transfer::Square => write!(f, "Square"),
            Transfer::Cubic => write!(f, "Cubic"),
            Transfer::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// One additive term `coeff * transfer(X^parent_{t+lag})` of a structural equation.
#[derive(Debug, Clone)]
pub struct Link {
    pub parent: usize,
    pub lag: Lag,
    pub coeff: f64,
    pub transfer: Transfer,
}

impl Link {
    pub fn new(parent: usize, lag: Lag, coeff: f64, transfer: Transfer) -> Self {
        Self {
            parent,
            lag,
            coeff,
            transfer,
        }
    }

    pub fn linear(parent: usize, lag: Lag, coeff: f64) -> Self {
        Self::new(parent, lag, coeff, Transfer::Linear)
    }
}

/// Structural links keyed by child variable. Keys must be `0..N`.
pub type Links = BTreeMap<usize, Vec<Link>>;

/// Anything that names a `(parent, lag)` pair of the ground-truth graph.
pub trait LinkEntry {
    fn parent(&self) -> usize;
    fn lag(&self) -> Lag;

    /// Inactive entries (zero coefficient) are not part of the graph.
    fn is_active(&self) -> bool {
        true
    }
}

impl LinkEntry for Link {
    fn parent(&self) -> usize {
        self.parent
    }

    fn lag(&self) -> Lag {
        self.lag
    }

    fn is_active(&self) -> bool {
        self.coeff != 0.0
    }
}

impl LinkEntry for (usize, Lag) {
    fn parent(&self) -> usize {
        self.0
    }

    fn lag(&self) -> Lag {
        self.1
    }
}

/// Parent-neighbor coefficient of a VAR process. Lag-0 entries describe
/// innovation covariance rather than a lagged effect.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarLink {
    pub parent: usize,
    pub lag: Lag,
    pub coeff: f64,
}

impl VarLink {
    pub fn new(parent: usize, lag: Lag, coeff: f64) -> Self {
        Self { parent, lag, coeff }
    }
}

impl LinkEntry for VarLink {
    fn parent(&self) -> usize {
        self.parent
    }

    fn lag(&self) -> Lag {
        self.lag
    }

    fn is_active(&self) -> bool {
        self.coeff != 0.0
    }
}

pub type VarCoeffs = BTreeMap<usize, Vec<VarLink>>;

/// `(parent, lag)` lists keyed by child variable.
pub type ParentMap = BTreeMap<usize, Vec<(usize, Lag)>>;

/// Distribution of the additive innovation of one variable.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Noise {
    #[default]
    StandardNormal,
    Gaussian { std: f64 },
    Uniform { low: f64, high: f64 },
    StudentT { dof: f64 },
    Weibull { scale: f64, shape: f64 },
    Exponential { rate: f64 },
}

/// `Uniform::new` panics on non-finite bounds or a range that overflows.
fn uniform_bounds_ok(low: f64, high: f64) -> bool {
    low.is_finite() && high.is_finite() && low < high && (high - low) <= f64::MAX / 2.0
}

impl Noise {
    pub fn check(&self) -> Result<()> {
        let ok = match *self {
            Noise::StandardNormal => true,
            Noise::Gaussian { std } => std.is_finite() && std >= 0.0,
            Noise::Uniform { low, high } => uniform_bounds_ok(low, high),
            Noise::StudentT { dof } => dof.is_finite() && dof > 0.0,
            Noise::Weibull { scale, shape } => scale > 0.0 && shape > 0.0,
            Noise::Exponential { rate } => rate.is_finite() && rate > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(SimError::invalid_model(format!("invalid noise parameters: {:?}", self)))
        }
    }

    /// Draws `n` independent samples.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, n: usize) -> Result<Vec<f64>> {
        let bad = |e: &dyn fmt::Display| {
            SimError::invalid_model(format!("invalid noise parameters {:?}: {}", self, e))
        };
        let values: Vec<f64> = match *self {
            Noise::StandardNormal => (0..n).map(|_| rng.sample(StandardNormal)).collect(),
            Noise::Gaussian { std } => {
                let dist = Normal::new(0.0, std).map_err(|e| bad(&e))?;
                (0..n).map(|_| dist.sample(rng)).collect()
            }
            Noise::Uniform { low, high } => {
                if !uniform_bounds_ok(low, high) {
                    return Err(bad(&"bounds must be finite, ordered and not too far apart"));
                }
                let dist = Uniform::new(low, high);
                (0..n).map(|_| dist.sample(rng)).collect()
            }
            Noise::StudentT { dof } => {
                let dist = StudentT::new(dof).map_err(|e| bad(&e))?;
                (0..n).map(|_| dist.sample(rng)).collect()
            }
            Noise::Weibull { scale, shape } => {
                let dist = Weibull::new(scale, shape).map_err(|e| bad(&e))?;
                (0..n).map(|_| dist.sample(rng)).collect()
            }
            Noise::Exponential { rate } => {
                let dist = Exp::new(rate).map_err(|e| bad(&e))?;
                (0..n).map(|_| dist.sample(rng)).collect()
            }
        };
        Ok(values)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Replace the structural equation by the given value.
    #[default]
    Hard,
    /// Add the given value on top of the structural equation.
    Soft,
}

/// Per-sample interventional values of one variable. `None` leaves that time
/// step un-intervened.
#[derive(Debug, Clone, PartialEq)]
pub struct Intervention {
    pub values: Vec<Option<f64>>,
    pub kind: InterventionKind,
}

impl Intervention {
    pub fn hard(values: Vec<Option<f64>>) -> Self {
        Self {
            values,
            kind: InterventionKind::Hard,
        }
    }

    pub fn soft(values: Vec<Option<f64>>) -> Self {
        Self {
            values,
            kind: InterventionKind::Soft,
        }
    }

    /// Treats NaN as "not intervened".
    pub fn from_nan_padded(values: &[f64], kind: InterventionKind) -> Self {
        Self {
            values: values
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect(),
            kind,
        }
    }
}

pub type Interventions = BTreeMap<usize, Intervention>;

/// A simulated sample path, `T` rows by `N` variables.
#[derive(Debug, Clone)]
pub struct Realization {
    pub data: DMatrix<f64>,
    /// Set when any value is NaN or infinite.
    pub nonstationary: bool,
}

impl Realization {
    pub fn new(data: DMatrix<f64>) -> Self {
        let nonstationary = data.iter().any(|v| !v.is_finite());
        Self {
            data,
            nonstationary,
        }
    }

    pub fn samples(&self) -> usize {
        self.data.nrows()
    }

    pub fn variables(&self) -> usize {
        self.data.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_transfer_functions() {
        assert_eq!(Transfer::Linear.apply(2.0), 2.0);
        assert_eq!(Transfer::Square.apply(-3.0), 9.0);
        assert_eq!(Transfer::Cubic.apply(-2.0), -8.0);
        assert_eq!(Transfer::Nonlinear.apply(0.0), 0.0);
        let expected = 2.0 + 5.0 * 4.0 * (-4.0f64 / 20.0).exp();
        assert!((Transfer::Nonlinear.apply(2.0) - expected).abs() < 1e-12);
        assert_eq!(Transfer::custom(|x| x + 1.0).apply(1.0), 2.0);
    }

    #[test]
    fn test_transfer_deserializes_from_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            function: Transfer,
        }
        let w: Wrapper = toml::from_str("function = \"nonlinear\"").unwrap();
        assert!(matches!(w.function, Transfer::Nonlinear));
    }

    #[test]
    fn test_link_entry_activity() {
        assert!(!Link::linear(0, -1, 0.0).is_active());
        assert!(Link::linear(0, -1, 0.4).is_active());
        assert!((1usize, 0).is_active());
    }

    #[test]
    fn test_noise_sampling_respects_support() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws = Noise::Uniform { low: 1.0, high: 2.0 }
            .sample(&mut rng, 500)
            .unwrap();
        assert_eq!(draws.len(), 500);
        assert!(draws.iter().all(|v| (1.0..2.0).contains(v)));

        let exp = Noise::Exponential { rate: 2.0 }.sample(&mut rng, 200).unwrap();
        assert!(exp.iter().all(|v| *v >= 0.0));

        assert!(Noise::Gaussian { std: -1.0 }.check().is_err());
        assert!(Noise::Gaussian { std: -1.0 }.sample(&mut rng, 3).is_err());
    }

    #[test]
    fn test_uniform_noise_rejects_unsampleable_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let overflowing = Noise::Uniform { low: -1e308, high: 1e308 };
        assert!(overflowing.check().is_err());
        assert!(matches!(
            overflowing.sample(&mut rng, 4),
            Err(SimError::InvalidModel { .. })
        ));

        let unbounded = Noise::Uniform { low: f64::NEG_INFINITY, high: 0.0 };
        assert!(unbounded.check().is_err());
        assert!(unbounded.sample(&mut rng, 4).is_err());
    }

    #[test]
    fn test_intervention_from_nan_padded() {
        let iv = Intervention::from_nan_padded(&[1.0, f64::NAN, 3.0], InterventionKind::Soft);
        assert_eq!(iv.values, vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(iv.kind, InterventionKind::Soft);
    }

    #[test]
    fn test_realization_flags_non_finite() {
        let ok = Realization::new(DMatrix::from_element(3, 2, 1.0));
        assert!(!ok.nonstationary);
        let mut data = DMatrix::from_element(3, 2, 1.0);
        data[(2, 1)] = f64::INFINITY;
        assert!(Realization::new(data).nonstationary);
    }
}
