use crate::core::Pipeline;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

pub struct SimulationEngine<P: Pipeline> {
    pipeline: P,
    monitor: SystemMonitor,
}

impl<P: Pipeline> SimulationEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitor_enabled: bool) -> Self {
        Self {
            pipeline,
            monitor: SystemMonitor::new(monitor_enabled),
        }
    }

    /// Runs model building, simulation and persistence in order and returns
    /// where the output was written.
    pub fn run(&self) -> Result<String> {
        tracing::info!("Starting simulation...");
        self.monitor.log_stats("Start");

        let model = self.pipeline.build_model()?;
        tracing::info!(
            "Model '{}' ready: {} variables, {} samples",
            model.name,
            model.variables.len(),
            model.samples
        );
        self.monitor.log_stats("Model");

        let output = self.pipeline.simulate(model)?;
        tracing::info!(
            "Simulated {} x {} realization with {} ground-truth edges",
            output.realization.samples(),
            output.realization.variables(),
            output.metadata.edges
        );
        self.monitor.log_stats("Simulate");

        let location = self.pipeline.persist(output)?;
        tracing::info!("Output saved to: {}", location);
        self.monitor.log_stats("Persist");
        self.monitor.log_final_stats();

        Ok(location)
    }
}
