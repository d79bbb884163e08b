use crate::domain::simulation::{Model, SimulationOutput};
use crate::utils::error::Result;

pub trait Storage {
    fn write_file(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Human-readable location of `path`, used in log lines and the CLI summary.
    fn locate(&self, path: &str) -> String {
        path.to_string()
    }
}

pub trait ConfigProvider {
    fn output_path(&self) -> &str;
    fn output_formats(&self) -> &[String];
    /// Archive name when all outputs are bundled, `None` for loose files.
    fn archive_name(&self) -> Option<&str>;
    fn data_filename(&self, format: &str) -> String;
    fn graph_filename(&self) -> String;
    fn metadata_filename(&self) -> String;
}

pub trait Pipeline {
    fn build_model(&self) -> Result<Model>;
    fn simulate(&self, model: Model) -> Result<SimulationOutput>;
    fn persist(&self, output: SimulationOutput) -> Result<String>;
}
