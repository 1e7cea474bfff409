use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use features::FeatureExtractor;
use monitor::{simulate, DriftMonitor, FeatureFrame};
use tracing::{info, instrument};
use training::{partition, DatasetBuilder, TrainedModel, Trainer};

mod config;
mod pipeline;
mod serve;

use config::{MonitorSource, PipelineConfig};
use pipeline::Pipeline;
use serve::ModelService;

#[derive(Debug, clap::Parser)]
#[command(version, about = "Audio sentiment training, monitoring and serving")]
enum Command {
    /// Run the full data → train → monitor pipeline.
    Run {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Build a dataset, train a forest and save it.
    Train {
        data_dir: PathBuf,
        #[arg(long)]
        manifest: Option<PathBuf>,
        #[arg(long)]
        model_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the feature vector of one audio file as JSON.
    Extract {
        path: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Compare two JSON feature frames and print the drift report.
    Monitor {
        reference: PathBuf,
        current: PathBuf,
        #[arg(short, long, default_value_t = 0.1)]
        threshold: f64,
    },
    /// Run drift detection on synthetic data.
    Simulate {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Classify one audio file with a saved model.
    Predict {
        model_dir: PathBuf,
        audio: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Serve predictions over HTTP.
    Serve {
        #[arg(long, default_value = "models")]
        model_dir: PathBuf,
        #[arg(long, default_value = "0.0.0.0:8000")]
        addr: SocketAddr,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    {
        use tracing_subscriber::prelude::*;

        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init()
    }

    match Command::parse() {
        Command::Run { config } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let pipeline = Pipeline::new(config);
            info!(
                data_dir = %pipeline.config().data_dir.display(),
                model_dir = %pipeline.config().model_dir.display(),
                "loaded pipeline config"
            );
            let outcome = tokio::task::spawn_blocking(move || pipeline.run()).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Train {
            data_dir,
            manifest,
            model_dir,
            config,
        } => {
            let mut config = PipelineConfig::load(config.as_deref())?;
            config.data_dir = data_dir;
            config.manifest = manifest.or(config.manifest);
            if let Some(model_dir) = model_dir {
                config.model_dir = model_dir;
            }
            let accuracy = tokio::task::spawn_blocking(move || train(&config)).await??;
            println!("accuracy: {accuracy:.4}");
        }
        Command::Extract { path, config } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let features = FeatureExtractor::new(config.extractor)
                .try_extract(&path)
                .with_context(|| format!("extracting features from {}", path.display()))?;
            println!("{}", serde_json::to_string(&features)?);
        }
        Command::Monitor {
            reference,
            current,
            threshold,
        } => monitor_files(&reference, &current, threshold)?,
        Command::Simulate { config } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let sim = match config.monitor {
                MonitorSource::Synthetic(sim) => sim,
                _ => Default::default(),
            };
            let (reference, current) = simulate::synthetic_frames(&sim)?;
            let report = DriftMonitor::default().check_drift(
                &reference,
                &current,
                config.drift_threshold,
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Predict {
            model_dir,
            audio,
            config,
        } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let model = TrainedModel::load(&model_dir)?;
            let features = FeatureExtractor::new(config.extractor).try_extract(&audio)?;
            let Some(prediction) = model.predict(&features) else {
                bail!("model produced a class its encoder does not know");
            };
            println!("{}", serde_json::to_string_pretty(&prediction)?);
        }
        Command::Serve {
            model_dir,
            addr,
            config,
        } => {
            let config = PipelineConfig::load(config.as_deref())?;
            let service = ModelService::load(&model_dir, config.extractor);
            serve::serve(addr, service).await?;
        }
    }
    Ok(())
}

#[instrument(skip_all, level = "trace")]
fn train(config: &PipelineConfig) -> Result<f64> {
    let builder = DatasetBuilder::new(
        FeatureExtractor::new(config.extractor.clone()),
        config.audio_extension.clone(),
    );
    let dataset = builder.build(&config.data_dir, config.manifest.as_deref())?;
    let data = partition(&dataset, config.test_fraction)?;
    info!(
        n_train = data.train_indices.len(),
        n_test = data.test_indices.len(),
        stratified = data.is_stratified(),
        "dataset ready"
    );

    let trainer = Trainer::new(config.experiment.clone(), config.forest);
    let (model, accuracy) = trainer.fit_dataset(&data)?;
    trainer.save(&model, &config.model_dir)?;
    Ok(accuracy)
}

fn monitor_files(reference: &Path, current: &Path, threshold: f64) -> Result<()> {
    let reference = FeatureFrame::load(reference)?;
    let current = FeatureFrame::load(current)?;
    let report = DriftMonitor::default().check_drift(&reference, &current, threshold)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
