use causal_toymodels::config::toml_config::ModelConfig;
use causal_toymodels::core::ConfigProvider;
use causal_toymodels::domain::simulation::ModelSpec;
use causal_toymodels::utils::error::SimError;
use causal_toymodels::utils::{logger, validation::Validate};
use causal_toymodels::{CliConfig, LocalStorage, ModelPipeline, SimulationEngine};
use clap::Parser;

fn exit_with(e: &SimError) -> ! {
    tracing::error!(
        "❌ Simulation failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

    // 根據錯誤嚴重程度決定退出碼
    std::process::exit(e.severity().exit_code());
}

fn display_config_summary(config: &ModelConfig) {
    tracing::info!("📋 Model: {} ({:?})", config.model.name, config.model.kind);
    if let Some(description) = &config.model.description {
        tracing::info!("   {}", description);
    }
    tracing::info!("   Variables: {}", config.variable_names().join(", "));
    tracing::info!("   Links: {}", config.links.len());
    tracing::info!(
        "   Samples: {}, seed: {}",
        config.simulation.samples,
        config
            .simulation
            .seed
            .map(|s| s.to_string())
            .unwrap_or_else(|| "entropy".to_string())
    );
    if !config.interventions.is_empty() {
        tracing::info!("   Interventions on: {:?}", config.interventions.iter().map(|i| i.variable).collect::<Vec<_>>());
    }
    tracing::info!(
        "   Output: {} [{}]{}",
        config.output_path(),
        config.output_formats().join(", "),
        config
            .archive_name()
            .map(|a| format!(" -> {}", a))
            .unwrap_or_default()
    );
}

fn main() -> anyhow::Result<()> {
    let args = CliConfig::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting causal-toymodels");
    tracing::info!("📁 Loading model from: {}", args.config);

    let mut config = match ModelConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load model file '{}'", args.config);
            exit_with(&e)
        }
    };

    args.apply_overrides(&mut config);

    // 驗證配置
    if let Err(e) = config.validate() {
        exit_with(&e);
    }
    tracing::info!("✅ Model loaded and validated successfully");
    display_config_summary(&config);

    let model = match config.to_model() {
        Ok(model) => model,
        Err(e) => exit_with(&e),
    };

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No simulation will occur");
        // 乾跑時仍檢查結構，提早發現同期循環或不穩定的係數
        let check = match &model.spec {
            ModelSpec::Structural(s) => {
                causal_toymodels::core::scp::analyze_links(&s.links).map(|structure| {
                    tracing::info!(
                        "   Max lag {}, causal order {:?}",
                        structure.max_lag,
                        structure.causal_order
                    );
                })
            }
            ModelSpec::Var(v) => causal_toymodels::core::var::check_parent_neighbor(&v.coeffs)
                .and_then(|_| {
                    causal_toymodels::core::var::check_stability(
                        &causal_toymodels::core::var::lag_connect_matrix(&v.coeffs),
                    )
                }),
        };
        if let Err(e) = check {
            exit_with(&e);
        }
        println!("✅ Model '{}' is valid", model.name);
        return Ok(());
    }

    let monitor_enabled = args.monitor || config.monitoring_enabled();
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(config.output_path().to_string());
    let pipeline = ModelPipeline::new(storage, config, model);
    let engine = SimulationEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run() {
        Ok(location) => {
            tracing::info!("✅ Simulation completed successfully!");
            println!("✅ Simulation completed successfully!");
            println!("📁 Output saved to: {}", location);
        }
        Err(e) => exit_with(&e),
    }

    Ok(())
}
