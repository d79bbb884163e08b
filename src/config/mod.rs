pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "causal-toymodels")]
#[command(about = "Generate time series with known causal graphs from a TOML model")]
pub struct CliConfig {
    /// Path to the TOML model file
    #[arg(short, long, default_value = "model.toml")]
    pub config: String,

    /// Override simulation.samples
    #[arg(long)]
    pub samples: Option<usize>,

    /// Override simulation.seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Override output.path
    #[arg(long)]
    pub output_path: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, help = "Log CPU and memory usage per stage")]
    pub monitor: bool,

    /// Validate the model and print a summary without simulating
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// 將命令列覆蓋設定套用到模型配置
    pub fn apply_overrides(&self, config: &mut toml_config::ModelConfig) {
        if let Some(samples) = self.samples {
            config.simulation.samples = samples;
            tracing::info!("🔧 samples overridden to: {}", samples);
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = Some(seed);
            tracing::info!("🔧 seed overridden to: {}", seed);
        }
        if let Some(path) = &self.output_path {
            config.output.path = path.clone();
            tracing::info!("🔧 output path overridden to: {}", path);
        }
    }
}
