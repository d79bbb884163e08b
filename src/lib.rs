//! Synthetic time series with known causal graphs, for benchmarking
//! conditional independence tests and causal discovery.
//!
//! Two generators are provided: [`var_process`] for vector-autoregressive
//! processes with correlated innovations, and [`structural_causal_process`]
//! for nonlinear additive noise models with contemporaneous links and
//! interventions. [`links_to_graph`] turns link definitions into the
//! ground-truth graph array.

pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::CliConfig;
pub use crate::config::{cli::LocalStorage, toml_config::ModelConfig};

pub use crate::core::{
    engine::SimulationEngine,
    links::{children, links_to_graph, minmax_lag, parents},
    pipeline::ModelPipeline,
    scp::structural_causal_process,
    var::var_process,
};
pub use crate::domain::graph::{Edge, EdgeMark, LagGraph};
pub use crate::domain::model::{
    Intervention, InterventionKind, Interventions, Lag, Link, LinkEntry, Links, Noise,
    Realization, Transfer, VarCoeffs, VarLink,
};
pub use crate::domain::simulation::{Model, ModelKind, NoiseMode};
pub use crate::utils::error::{Result, SimError};
