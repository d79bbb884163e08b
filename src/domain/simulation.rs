use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::graph::LagGraph;
use crate::domain::model::{Interventions, Links, Noise, Realization, VarCoeffs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Structural,
    Var,
}

/// How a VAR process turns its lag-0 entries into innovations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMode {
    /// Lag-0 entries are the innovation covariance.
    InnoCov,
    /// Lag-0 entries are the negated off-diagonal of the inverse covariance.
    #[default]
    InvInnoCov,
    /// Deterministic recursion, initial values are still random unless given.
    NoNoise,
    /// Independent standard-normal innovations, lag-0 entries ignored.
    Uncorrelated,
}

#[derive(Debug, Clone)]
pub struct VarModel {
    pub coeffs: VarCoeffs,
    pub mode: NoiseMode,
    pub initial_values: Option<DMatrix<f64>>,
}

#[derive(Debug, Clone)]
pub struct StructuralModel {
    pub links: Links,
    pub noises: Option<Vec<Noise>>,
    pub interventions: Interventions,
}

#[derive(Debug, Clone)]
pub enum ModelSpec {
    Var(VarModel),
    Structural(StructuralModel),
}

impl ModelSpec {
    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::Var(_) => ModelKind::Var,
            ModelSpec::Structural(_) => ModelKind::Structural,
        }
    }
}

/// A fully resolved model, ready to simulate.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub variables: Vec<String>,
    pub samples: usize,
    pub seed: Option<u64>,
    /// Lag range of the exported graph, the largest lag present by default.
    pub tau_max: Option<usize>,
    pub spec: ModelSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub model: String,
    pub kind: ModelKind,
    pub samples: usize,
    pub seed: Option<u64>,
    pub variables: Vec<String>,
    pub nonstationary: bool,
    pub edges: usize,
    pub generated_at: String,
}

#[derive(Debug, Clone)]
pub struct SimulationOutput {
    pub realization: Realization,
    pub graph: LagGraph,
    pub metadata: RunMetadata,
}
