use crate::core::ConfigProvider;
use crate::domain::model::{
    Intervention, InterventionKind, Interventions, Lag, Link, Links, Noise, Transfer, VarCoeffs,
    VarLink,
};
use crate::domain::simulation::{Model, ModelKind, ModelSpec, NoiseMode, StructuralModel, VarModel};
use crate::utils::error::{Result, SimError};
use crate::utils::validation::{self, Validate};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const OUTPUT_FORMATS: [&str; 3] = ["csv", "tsv", "json"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: ModelSection,
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub links: Vec<LinkConfig>,
    #[serde(default)]
    pub noises: Vec<NoiseConfig>,
    #[serde(default)]
    pub interventions: Vec<InterventionConfig>,
    pub var: Option<VarConfig>,
    pub output: OutputConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSection {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub kind: ModelKind,
    pub variables: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub samples: usize,
    pub seed: Option<u64>,
    /// Lag range of the exported ground-truth graph.
    pub tau_max: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    pub target: usize,
    pub parent: usize,
    pub lag: Lag,
    pub coeff: f64,
    #[serde(default)]
    pub function: Transfer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseConfig {
    pub variable: usize,
    #[serde(flatten)]
    pub noise: Noise,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionConfig {
    pub variable: usize,
    #[serde(default)]
    pub kind: InterventionKind,
    /// One value per sample, `nan` leaves a sample un-intervened.
    pub values: Option<Vec<f64>>,
    /// Applied on `start..end` (whole run by default).
    pub constant: Option<f64>,
    pub start: Option<usize>,
    pub end: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VarConfig {
    #[serde(default)]
    pub noise_mode: NoiseMode,
    /// Rows are variables, columns the first `max_lag + 1` samples.
    pub initial_values: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
    #[serde(default = "default_formats")]
    pub formats: Vec<String>,
    pub compression: Option<CompressionConfig>,
    pub filenames: Option<FilenameConfig>,
}

fn default_formats() -> Vec<String> {
    vec!["csv".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilenameConfig {
    /// Stem of the data table, the format is appended as extension.
    pub data: Option<String>,
    pub graph: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
}

impl InterventionConfig {
    fn expand(&self, samples: usize) -> Result<Intervention> {
        let field = format!("interventions[variable={}]", self.variable);
        match (&self.values, self.constant) {
            (Some(values), None) => {
                if values.len() != samples {
                    return Err(SimError::ConfigValidationError {
                        field,
                        message: format!(
                            "values must have one entry per sample ({}), got {}",
                            samples,
                            values.len()
                        ),
                    });
                }
                Ok(Intervention::from_nan_padded(values, self.kind))
            }
            (None, Some(constant)) => {
                validation::validate_finite(&field, constant)?;
                let start = self.start.unwrap_or(0);
                let end = self.end.unwrap_or(samples);
                if start >= end || end > samples {
                    return Err(SimError::ConfigValidationError {
                        field,
                        message: format!(
                            "window {}..{} must be non-empty and within 0..{}",
                            start, end, samples
                        ),
                    });
                }
                let values = (0..samples)
                    .map(|t| (start..end).contains(&t).then_some(constant))
                    .collect();
                Ok(Intervention {
                    values,
                    kind: self.kind,
                })
            }
            _ => Err(SimError::ConfigValidationError {
                field,
                message: "exactly one of `values` or `constant` must be set".to_string(),
            }),
        }
    }
}

impl ModelConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SimError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${SEED})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SimError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// Number of variables: the explicit name list, else one past the largest id used.
    pub fn n_vars(&self) -> usize {
        if let Some(variables) = &self.model.variables {
            return variables.len();
        }
        self.links
            .iter()
            .map(|link| link.target.max(link.parent) + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn variable_names(&self) -> Vec<String> {
        match &self.model.variables {
            Some(variables) => variables.clone(),
            None => (0..self.n_vars()).map(|j| format!("X{}", j)).collect(),
        }
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("model.name", &self.model.name)?;
        validation::validate_positive_number("simulation.samples", self.simulation.samples, 1)?;
        validation::validate_path("output.path", &self.output.path)?;

        if self.output.formats.is_empty() {
            return Err(SimError::MissingConfigError {
                field: "output.formats".to_string(),
            });
        }
        validation::validate_choices("output.formats", &self.output.formats, &OUTPUT_FORMATS)?;
        validation::validate_unique("output.formats", &self.output.formats)?;

        if let Some(variables) = &self.model.variables {
            validation::validate_unique("model.variables", variables)?;
            for name in variables {
                validation::validate_non_empty_string("model.variables", name)?;
            }
        }

        let n = self.n_vars();
        validation::validate_positive_number("model.variables", n, 1)?;

        for (idx, link) in self.links.iter().enumerate() {
            let field = format!("links[{}]", idx);
            validation::validate_range(&format!("{}.target", field), link.target, 0, n - 1)?;
            validation::validate_range(&format!("{}.parent", field), link.parent, 0, n - 1)?;
            validation::validate_finite(&format!("{}.coeff", field), link.coeff)?;
            if link.lag > 0 {
                return Err(SimError::InvalidConfigValueError {
                    field: format!("{}.lag", field),
                    value: link.lag.to_string(),
                    reason: "lag must be <= 0".to_string(),
                });
            }
            // 延遲長度不可超過樣本數，否則延遲陣列無從配置
            if link.lag.unsigned_abs() as usize >= self.simulation.samples {
                return Err(SimError::InvalidConfigValueError {
                    field: format!("{}.lag", field),
                    value: link.lag.to_string(),
                    reason: format!(
                        "|lag| must be smaller than simulation.samples ({})",
                        self.simulation.samples
                    ),
                });
            }
        }

        if let Some(tau_max) = self.simulation.tau_max {
            validation::validate_range(
                "simulation.tau_max",
                tau_max,
                0,
                self.simulation.samples - 1,
            )?;
        }

        match self.model.kind {
            ModelKind::Structural => {
                if self.var.is_some() {
                    return Err(SimError::ConfigValidationError {
                        field: "var".to_string(),
                        message: "the [var] section only applies to kind = \"var\"".to_string(),
                    });
                }
                for (idx, noise) in self.noises.iter().enumerate() {
                    let field = format!("noises[{}].variable", idx);
                    validation::validate_range(&field, noise.variable, 0, n - 1)?;
                    noise.noise.check()?;
                }
                for intervention in &self.interventions {
                    let field = format!("interventions[variable={}]", intervention.variable);
                    validation::validate_range(&field, intervention.variable, 0, n - 1)?;
                    intervention.expand(self.simulation.samples)?;
                }
            }
            ModelKind::Var => {
                if !self.noises.is_empty() || !self.interventions.is_empty() {
                    return Err(SimError::ConfigValidationError {
                        field: "model.kind".to_string(),
                        message: "noises and interventions only apply to kind = \"structural\""
                            .to_string(),
                    });
                }
                if self.links.iter().any(|link| !matches!(link.function, Transfer::Linear)) {
                    tracing::warn!("Link functions are ignored for VAR models");
                }
            }
        }

        Ok(())
    }

    fn structural_links(&self, n: usize) -> Links {
        let mut links: Links = (0..n).map(|j| (j, Vec::new())).collect();
        for link in &self.links {
            links.entry(link.target).or_default().push(Link::new(
                link.parent,
                link.lag,
                link.coeff,
                link.function.clone(),
            ));
        }
        links
    }

    fn var_coeffs(&self, n: usize) -> VarCoeffs {
        let mut coeffs: VarCoeffs = (0..n).map(|j| (j, Vec::new())).collect();
        for link in &self.links {
            coeffs
                .entry(link.target)
                .or_default()
                .push(VarLink::new(link.parent, link.lag, link.coeff));
        }
        coeffs
    }

    fn initial_values(&self) -> Result<Option<DMatrix<f64>>> {
        let rows = match self.var.as_ref().and_then(|v| v.initial_values.as_ref()) {
            Some(rows) => rows,
            None => return Ok(None),
        };
        let ncols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != ncols) {
            return Err(SimError::ConfigValidationError {
                field: "var.initial_values".to_string(),
                message: "all rows must have the same length".to_string(),
            });
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Ok(Some(DMatrix::from_row_slice(rows.len(), ncols, &flat)))
    }

    /// Resolves the configuration into a simulatable model.
    pub fn to_model(&self) -> Result<Model> {
        self.validate_config()?;
        let n = self.n_vars();

        let spec = match self.model.kind {
            ModelKind::Structural => {
                let noises = if self.noises.is_empty() {
                    None
                } else {
                    let mut noises = vec![Noise::StandardNormal; n];
                    for entry in &self.noises {
                        noises[entry.variable] = entry.noise;
                    }
                    Some(noises)
                };
                let mut interventions = Interventions::new();
                for entry in &self.interventions {
                    interventions.insert(entry.variable, entry.expand(self.simulation.samples)?);
                }
                ModelSpec::Structural(StructuralModel {
                    links: self.structural_links(n),
                    noises,
                    interventions,
                })
            }
            ModelKind::Var => ModelSpec::Var(VarModel {
                coeffs: self.var_coeffs(n),
                mode: self.var.as_ref().map(|v| v.noise_mode).unwrap_or_default(),
                initial_values: self.initial_values()?,
            }),
        };

        Ok(Model {
            name: self.model.name.clone(),
            variables: self.variable_names(),
            samples: self.simulation.samples,
            seed: self.simulation.seed,
            tau_max: self.simulation.tau_max,
            spec,
        })
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    fn filenames(&self) -> FilenameConfig {
        self.output.filenames.clone().unwrap_or_default()
    }
}

impl ConfigProvider for ModelConfig {
    fn output_path(&self) -> &str {
        &self.output.path
    }

    fn output_formats(&self) -> &[String] {
        &self.output.formats
    }

    fn archive_name(&self) -> Option<&str> {
        match &self.output.compression {
            Some(c) if c.enabled => Some(c.filename.as_deref().unwrap_or("simulation.zip")),
            _ => None,
        }
    }

    fn data_filename(&self, format: &str) -> String {
        let stem = self.filenames().data.unwrap_or_else(|| "data".to_string());
        format!("{}.{}", stem, format)
    }

    fn graph_filename(&self) -> String {
        self.filenames()
            .graph
            .unwrap_or_else(|| "graph.csv".to_string())
    }

    fn metadata_filename(&self) -> String {
        self.filenames()
            .metadata
            .unwrap_or_else(|| "metadata.json".to_string())
    }
}

impl Validate for ModelConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
