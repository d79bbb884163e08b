use anyhow::Result;
use causal_toymodels::{
    LocalStorage, ModelConfig, ModelPipeline, SimulationEngine,
};
use std::io::Read;
use tempfile::TempDir;

fn model_toml(output_path: &str, extra_output: &str) -> String {
    format!(
        r#"
[model]
name = "chain-with-intervention"
description = "X0 -> X1 -> X2 with a nonlinear lagged link"
kind = "structural"

[simulation]
samples = 120
seed = 2024

[[links]]
target = 0
parent = 0
lag = -1
coeff = 0.9

[[links]]
target = 1
parent = 1
lag = -1
coeff = 0.8

[[links]]
target = 1
parent = 0
lag = -1
coeff = 0.3
function = "nonlinear"

[[links]]
target = 2
parent = 2
lag = -1
coeff = 0.7

[[links]]
target = 2
parent = 1
lag = 0
coeff = -0.2

[[noises]]
variable = 0
kind = "gaussian"
std = 0.5

[[interventions]]
variable = 0
kind = "hard"
constant = -1.0
start = 100

[output]
path = "{}"
formats = ["csv", "json"]
{}
"#,
        output_path, extra_output
    )
}

fn run(config: ModelConfig) -> Result<String> {
    let model = config.to_model()?;
    let storage = LocalStorage::new(config.output.path.clone());
    let pipeline = ModelPipeline::new(storage, config, model);
    Ok(SimulationEngine::new_with_monitoring(pipeline, false).run()?)
}

#[test]
fn test_end_to_end_structural_model_to_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();

    let config = ModelConfig::from_toml_str(&model_toml(&output_path, ""))?;
    run(config)?;

    let csv = std::fs::read_to_string(temp_dir.path().join("data.csv"))?;
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    assert_eq!(reader.headers()?.iter().collect::<Vec<_>>(), vec!["X0", "X1", "X2"]);

    let rows: Vec<Vec<f64>> = reader
        .records()
        .map(|r| r.unwrap().iter().map(|v| v.parse().unwrap()).collect())
        .collect();
    assert_eq!(rows.len(), 120);
    // 硬干預自第 100 筆起固定 X0
    assert!(rows[100..].iter().all(|row| row[0] == -1.0));
    assert!(rows[..100].iter().any(|row| row[0] != -1.0));

    assert!(temp_dir.path().join("data.json").exists());

    let graph = std::fs::read_to_string(temp_dir.path().join("graph.csv"))?;
    assert_eq!(
        graph,
        "source,target,lag\n0,0,1\n0,1,1\n1,1,1\n1,2,0\n2,2,1\n"
    );

    let metadata: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(temp_dir.path().join("metadata.json"))?)?;
    assert_eq!(metadata["model"], "chain-with-intervention");
    assert_eq!(metadata["kind"], "structural");
    assert_eq!(metadata["seed"], 2024);
    assert_eq!(metadata["nonstationary"], false);

    Ok(())
}

#[test]
fn test_end_to_end_zip_bundle() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output_path = temp_dir.path().to_str().unwrap().to_string();
    let extra = "compression = { enabled = true, filename = \"bundle.zip\" }\nfilenames = { data = \"series\" }";

    let config = ModelConfig::from_toml_str(&model_toml(&output_path, extra))?;
    let location = run(config)?;
    assert!(location.ends_with("bundle.zip"));

    let zip_data = std::fs::read(temp_dir.path().join("bundle.zip"))?;
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_data))?;

    let names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    assert!(names.contains(&"series.csv".to_string()));
    assert!(names.contains(&"series.json".to_string()));
    assert!(names.contains(&"graph.csv".to_string()));
    assert!(names.contains(&"metadata.json".to_string()));

    let mut csv_content = String::new();
    archive.by_name("series.csv")?.read_to_string(&mut csv_content)?;
    assert!(csv_content.starts_with("X0,X1,X2"));

    Ok(())
}

#[test]
fn test_same_seed_same_files() -> Result<()> {
    let first = TempDir::new()?;
    let second = TempDir::new()?;

    for dir in [&first, &second] {
        let config = ModelConfig::from_toml_str(&model_toml(dir.path().to_str().unwrap(), ""))?;
        run(config)?;
    }

    let a = std::fs::read(first.path().join("data.csv"))?;
    let b = std::fs::read(second.path().join("data.csv"))?;
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn test_contemporaneous_cycle_is_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut content = model_toml(temp_dir.path().to_str().unwrap(), "");
    content.push_str(
        r#"
[[links]]
target = 1
parent = 2
lag = 0
coeff = 0.1
"#,
    );
    let config = ModelConfig::from_toml_str(&content)?;
    let err = run(config).unwrap_err();
    let err = err.downcast::<causal_toymodels::SimError>()?;
    assert!(matches!(err, causal_toymodels::SimError::CyclicContemporaneous));
    assert!(!temp_dir.path().join("data.csv").exists());
    Ok(())
}

#[test]
fn test_explosive_var_model_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let content = format!(
        r#"
[model]
name = "explosive"
kind = "var"

[simulation]
samples = 50

[[links]]
target = 0
parent = 0
lag = -1
coeff = 1.05

[output]
path = "{}"
"#,
        temp_dir.path().to_str().unwrap()
    );
    let config = ModelConfig::from_toml_str(&content)?;
    let err = run(config).unwrap_err().downcast::<causal_toymodels::SimError>()?;
    assert!(matches!(err, causal_toymodels::SimError::NonStationary { .. }));
    Ok(())
}
