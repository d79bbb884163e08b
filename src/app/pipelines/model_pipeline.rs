use crate::core::links::{self, links_to_graph};
use crate::core::{scp, var};
use crate::core::{ConfigProvider, Pipeline, Storage};
use crate::domain::graph::LagGraph;
use crate::domain::model::Realization;
use crate::domain::simulation::{Model, ModelSpec, RunMetadata, SimulationOutput};
use crate::utils::error::{Result, SimError};
use std::io::Write;
use zip::write::{SimpleFileOptions, ZipWriter};

/// Simulates one model and writes the data table, the ground-truth graph and
/// the run metadata through a [`Storage`].
pub struct ModelPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    model: Model,
}

impl<S: Storage, C: ConfigProvider> ModelPipeline<S, C> {
    pub fn new(storage: S, config: C, model: Model) -> Self {
        Self {
            storage,
            config,
            model,
        }
    }

    /// Renders every output file as `(name, bytes)`.
    pub fn render(&self, output: &SimulationOutput) -> Result<Vec<(String, Vec<u8>)>> {
        let mut files = Vec::new();

        for format in self.config.output_formats() {
            let bytes = match format.as_str() {
                "csv" => render_delimited(&output.realization, &output.metadata.variables, b',')?,
                "tsv" => render_delimited(&output.realization, &output.metadata.variables, b'\t')?,
                "json" => render_json(&output.realization, &output.metadata.variables)?,
                other => {
                    return Err(SimError::InvalidConfigValueError {
                        field: "output.formats".to_string(),
                        value: other.to_string(),
                        reason: "Unsupported format".to_string(),
                    })
                }
            };
            files.push((self.config.data_filename(format), bytes));
        }

        files.push((self.config.graph_filename(), render_graph(&output.graph)?));
        files.push((
            self.config.metadata_filename(),
            serde_json::to_vec_pretty(&output.metadata)?,
        ));

        Ok(files)
    }
}

pub fn render_delimited(realization: &Realization, variables: &[String], delimiter: u8) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());

    writer.write_record(variables)?;
    for row in realization.data.row_iter() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }

    writer.into_inner().map_err(|e| SimError::ProcessingError {
        message: format!("failed to flush table: {}", e),
    })
}

pub fn render_json(realization: &Realization, variables: &[String]) -> Result<Vec<u8>> {
    let rows: Vec<serde_json::Map<String, serde_json::Value>> = realization
        .data
        .row_iter()
        .map(|row| {
            variables
                .iter()
                .zip(row.iter())
                // 非有限值在 JSON 中輸出為 null
                .map(|(name, v)| (name.clone(), serde_json::json!(v)))
                .collect()
        })
        .collect();
    Ok(serde_json::to_vec_pretty(&rows)?)
}

pub fn render_graph(graph: &LagGraph) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let edges = graph.edges();
    if edges.is_empty() {
        writer.write_record(["source", "target", "lag"])?;
    }
    for edge in edges {
        writer.serialize(edge)?;
    }
    writer.into_inner().map_err(|e| SimError::ProcessingError {
        message: format!("failed to flush graph: {}", e),
    })
}

impl<S: Storage, C: ConfigProvider> Pipeline for ModelPipeline<S, C> {
    fn build_model(&self) -> Result<Model> {
        let n_vars = match &self.model.spec {
            ModelSpec::Var(v) => v.coeffs.len(),
            ModelSpec::Structural(s) => s.links.len(),
        };
        if n_vars != self.model.variables.len() {
            return Err(SimError::invalid_model(format!(
                "model defines {} variables but {} names were given",
                n_vars,
                self.model.variables.len()
            )));
        }

        tracing::debug!(
            "Model '{}' ({:?}) with variables {:?}",
            self.model.name,
            self.model.spec.kind(),
            self.model.variables
        );
        Ok(self.model.clone())
    }

    fn simulate(&self, model: Model) -> Result<SimulationOutput> {
        let (realization, graph) = match &model.spec {
            ModelSpec::Structural(s) => {
                let realization = scp::structural_causal_process(
                    &s.links,
                    model.samples,
                    s.noises.as_deref(),
                    &s.interventions,
                    model.seed,
                )?;
                (realization, links_to_graph(&s.links, model.tau_max)?)
            }
            ModelSpec::Var(v) => {
                let (realization, _) = var::var_process(
                    &v.coeffs,
                    model.samples,
                    v.mode,
                    v.initial_values.as_ref(),
                    model.seed,
                )?;
                // 同期項為創新共變異數，不列入因果圖
                let lagged = links::parents(&v.coeffs, true);
                (realization, links_to_graph(&lagged, model.tau_max)?)
            }
        };

        if realization.nonstationary {
            tracing::warn!("⚠️ Realization contains NaN or infinite values");
        }

        let metadata = RunMetadata {
            model: model.name.clone(),
            kind: model.spec.kind(),
            samples: model.samples,
            seed: model.seed,
            variables: model.variables.clone(),
            nonstationary: realization.nonstationary,
            edges: graph.edges().len(),
            generated_at: chrono::Utc::now().to_rfc3339(),
        };

        Ok(SimulationOutput {
            realization,
            graph,
            metadata,
        })
    }

    fn persist(&self, output: SimulationOutput) -> Result<String> {
        let files = self.render(&output)?;

        match self.config.archive_name() {
            Some(archive) => {
                tracing::debug!("Creating ZIP file with {} files", files.len());

                let zip_data = {
                    let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                    for (name, bytes) in &files {
                        zip.start_file(name.as_str(), SimpleFileOptions::default())?;
                        zip.write_all(bytes)?;
                    }
                    // 完成並取回底層 Vec<u8>
                    zip.finish()?.into_inner()
                };

                tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
                self.storage.write_file(archive, &zip_data)?;
                Ok(self.storage.locate(archive))
            }
            None => {
                for (name, bytes) in &files {
                    tracing::debug!("Writing {} ({} bytes)", name, bytes.len());
                    self.storage.write_file(name, bytes)?;
                }
                Ok(self.storage.locate(""))
            }
        }
    }
}
