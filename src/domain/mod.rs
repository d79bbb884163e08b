// Domain layer: model types and ports. Simulation algorithms live in `core`.

pub mod graph;
pub mod model;
pub mod ports;
pub mod simulation;
