pub use crate::app::pipelines::model_pipeline::ModelPipeline;
