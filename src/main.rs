use anyhow::{Context, Result};
use aqi_pipeline::config::InvalidDatePolicy;
use aqi_pipeline::encoding::prepare_model_inputs;
use aqi_pipeline::evaluation::{evaluate_model, PersistenceModel, Regressor};
use aqi_pipeline::export::{write_dataset, write_model_inputs};
use aqi_pipeline::importance::{feature_importances, top_features, CorrelationImportance};
use aqi_pipeline::loader::load_input;
use aqi_pipeline::metrics::METRICS;
use aqi_pipeline::parsers::csv_parser::CsvOptions;
use aqi_pipeline::schema::Column;
use aqi_pipeline::summary::build_summary;
use aqi_pipeline::{load_config, Dataset, FeaturePipeline, PipelineConfig};
use clap::{Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "aqi_pipeline")]
#[command(about = "AQI computation and feature pipeline for hourly multi-station air quality data", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true, env = "AQI_CONFIG")]
    config: Option<PathBuf>,

    /// Disable the stage cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Share of each station's rows used for training
    #[arg(long, global = true)]
    train_ratio: Option<f64>,

    /// Rolling window (observations) for the PM2.5/PM10 means
    #[arg(long, global = true)]
    rolling_window: Option<usize>,

    /// What to do with rows whose calendar fields are not a real date
    #[arg(long, global = true, value_enum)]
    invalid_dates: Option<DatePolicyArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DatePolicyArg {
    Reject,
    Drop,
}

impl From<DatePolicyArg> for InvalidDatePolicy {
    fn from(arg: DatePolicyArg) -> Self {
        match arg {
            DatePolicyArg::Reject => InvalidDatePolicy::Reject,
            DatePolicyArg::Drop => InvalidDatePolicy::Drop,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute AQI and derived features and write the transformed dataset
    Transform {
        /// Input file, directory or glob pattern
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: PathBuf,
    },
    /// Build lag features, split per station and write model inputs
    TrainSplit {
        /// Raw or transformed input: file, directory or glob pattern
        #[arg(long)]
        input: String,
        #[arg(long)]
        output_dir: PathBuf,
        /// Number of ranked features to print
        #[arg(long)]
        top: Option<usize>,
    },
    /// Aggregate a dataset into the exploratory summary tables
    Summary {
        /// Raw or transformed input: file, directory or glob pattern
        #[arg(long)]
        input: String,
        /// JSON output file; printed to stdout when omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn resolve_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(&path.to_string_lossy())
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.apply_env().context("Invalid AQI_* environment override")?;
    if let Some(ratio) = cli.train_ratio {
        config.train_ratio = ratio;
    }
    if let Some(window) = cli.rolling_window {
        config.rolling_window = window;
    }
    if let Some(policy) = cli.invalid_dates {
        config.invalid_dates = policy.into();
    }
    if cli.no_cache {
        config.cache_capacity = 0;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Loads `input` and runs the transform stages unless it already holds AQI values.
fn load_transformed(pipeline: &FeaturePipeline, input: &str) -> Result<Dataset> {
    let options = CsvOptions {
        null_markers: pipeline.config().null_markers.clone(),
        ..Default::default()
    };
    let dataset = load_input(input, &options).with_context(|| format!("Failed to load input '{}'", input))?;
    if dataset.has_column(Column::Timestamp) && dataset.has_column(Column::Aqi) {
        info!("Input '{}' is already transformed; skipping transform stages", input);
        return Ok(dataset);
    }
    pipeline.transform(&dataset).context("Transform stages failed")
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;
    let top_default = config.top_features;
    let pipeline = FeaturePipeline::new(config).context("Failed to build pipeline")?;

    match &cli.command {
        Command::Transform { input, output } => {
            let transformed = load_transformed(&pipeline, input)?;
            write_dataset(output, &transformed)
                .with_context(|| format!("Failed to write {}", output.display()))?;
        }
        Command::TrainSplit { input, output_dir, top } => {
            let transformed = load_transformed(&pipeline, input)?;
            let split = pipeline.prepare_training(&transformed).context("Lag/split stages failed")?;
            let inputs = prepare_model_inputs(&split).context("Failed to encode model inputs")?;
            write_model_inputs(output_dir, &inputs)
                .with_context(|| format!("Failed to write model inputs to {}", output_dir.display()))?;

            let ranked = feature_importances(&CorrelationImportance, &inputs.x_train, &inputs.y_train)?;
            println!("\nTop features (|correlation| with AQI):");
            for (rank, feature) in top_features(&ranked, top.unwrap_or(top_default)).iter().enumerate() {
                println!("  {:>2}. {:<22} {:.4}", rank + 1, feature.feature, feature.importance);
            }

            if inputs.x_test.is_empty() {
                println!("\nTest partition is empty; skipping baseline evaluation.");
            } else {
                let baseline = PersistenceModel::from_inputs(&inputs)?;
                let metrics = evaluate_model(&baseline, &inputs)?;
                println!(
                    "\nBaseline '{}': MAE {:.3}, MSE {:.3}, RMSE {:.3}, R2 {:.4}",
                    baseline.name(),
                    metrics.mae,
                    metrics.mse,
                    metrics.rmse,
                    metrics.r2
                );
            }
        }
        Command::Summary { input, output } => {
            let transformed = load_transformed(&pipeline, input)?;
            let summary = build_summary(&transformed).context("Failed to build summary")?;
            match output {
                Some(path) => {
                    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
                    serde_json::to_writer_pretty(BufWriter::new(file), &summary)?;
                    info!("Wrote summary to {}", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&summary)?),
            }
        }
    }

    METRICS.lock().print_summary();
    Ok(())
}
