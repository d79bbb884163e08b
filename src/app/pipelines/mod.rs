pub mod model_pipeline;
