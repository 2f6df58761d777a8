//! CLI: обучение моделей и предсказание для одной записи

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use koi_classifier::{resolve_source, run_training, Algorithm, ModelStore, PipelineConfig, Predictor};

#[derive(Parser)]
#[command(name = "koi-classifier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Kepler KOI disposition classifier", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train all models and persist the best
    Train {
        /// Primary dataset (cumulative KOI table)
        #[arg(long, default_value = "cumulative.csv")]
        data: PathBuf,

        /// Used when the primary dataset is missing
        #[arg(long, default_value = "data/sample/kepler_sample.csv")]
        fallback: PathBuf,

        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Classify a single object
    Predict {
        #[arg(long)]
        orbital_period: f64,

        #[arg(long)]
        transit_duration: f64,

        #[arg(long)]
        planet_radius: f64,

        #[arg(long)]
        stellar_temp: f64,

        /// RandomForest, SVM or NeuralNet; defaults to the best model
        #[arg(long)]
        model: Option<Algorithm>,

        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    // Инициализация логирования
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, fallback, config } => {
            let config = PipelineConfig::load(config.as_deref()).context("failed to load configuration")?;
            let source = resolve_source(Some(data.as_path()), Some(fallback.as_path()))?;
            let report = run_training(&config, &source).context("training failed")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Predict {
            orbital_period,
            transit_duration,
            planet_radius,
            stellar_temp,
            model,
            config,
        } => {
            let config = PipelineConfig::load(config.as_deref()).context("failed to load configuration")?;
            let input = HashMap::from([
                ("orbital_period".to_string(), orbital_period),
                ("transit_duration".to_string(), transit_duration),
                ("planet_radius".to_string(), planet_radius),
                ("stellar_temp".to_string(), stellar_temp),
            ]);

            let predictor = Predictor::new(ModelStore::new(config.models_dir)).with_preferred(model);
            let prediction = predictor.predict(&input).context("prediction failed")?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
    }

    Ok(())
}
