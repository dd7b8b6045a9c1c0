#![recursion_limit = "256"]

use std::path::PathBuf;

use aae::backend::{TrainBackend, default_device};
use aae::data::{TRAINING_DATA_FILE, TrainingArray};
use aae::model::AdversarialAutoencoder;
use aae::run_dir::RunDirectory;
use aae::trainer::adam_trainer;
use aae::{AaeConfig, NetworkVariant};
use anyhow::{Context, Result};
use burn::config::Config;
use burn::tensor::backend::Backend;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Trains an adversarial autoencoder on a prepared training array.
///
/// Every run writes into a fresh timestamped directory under the results root:
/// the config, a text log, a JSON-lines metric log and one checkpoint per epoch.
#[derive(Parser, Debug)]
#[command(author, version, about = "Adversarial autoencoder trainer")]
struct Args {
    /// Training array written by `prepare_data`.
    #[arg(short, long, default_value = TRAINING_DATA_FILE)]
    data: PathBuf,

    /// JSON config to start from; flags below override its fields.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    variant: Option<NetworkVariant>,

    #[arg(long)]
    latent_dim: Option<usize>,

    #[arg(long)]
    hidden_dim: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    learning_rate: Option<f64>,

    #[arg(long)]
    beta_1: Option<f32>,

    #[arg(long)]
    log_interval: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Parent directory of the run directories.
    #[arg(long)]
    results_root: Option<String>,
}

impl Args {
    fn into_config(self, image_dims: [usize; 3]) -> Result<AaeConfig> {
        let mut config = match &self.config {
            Some(path) => AaeConfig::load(path)
                .map_err(|e| anyhow::anyhow!("{e:?}"))
                .with_context(|| format!("cannot read config {}", path.display()))?,
            None => AaeConfig::new(),
        };

        // Geometry always follows the data.
        let [size, _, channels] = image_dims;
        config.image_size = size;
        config.channels = channels;

        if let Some(v) = self.variant {
            config.variant = v;
        }
        if let Some(v) = self.latent_dim {
            config.latent_dim = v;
        }
        if let Some(v) = self.hidden_dim {
            config.hidden_dim = v;
        }
        if let Some(v) = self.epochs {
            config.num_epochs = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.learning_rate {
            config.learning_rate = v;
        }
        if let Some(v) = self.beta_1 {
            config.beta_1 = v;
        }
        if let Some(v) = self.log_interval {
            config.log_interval = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.results_root {
            config.results_root = v;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("cannot install logger")?;

    let args = Args::parse();

    let data = TrainingArray::load(&args.data)
        .with_context(|| format!("cannot load training data from {}", args.data.display()))?;
    let [_, h, w, _] = data.shape();
    if h != w {
        anyhow::bail!("training images must be square, found {h}x{w}");
    }
    info!("loaded {} images of {:?}", data.num_images(), data.image_dims());

    let config = args.into_config(data.image_dims())?;
    info!("configuration: {config:?}");

    let device = default_device();
    info!("using device: {device:?}");

    TrainBackend::seed(config.seed);
    let model = AdversarialAutoencoder::<TrainBackend>::new(&config, &device)?;
    let run = RunDirectory::create(&config).context("cannot create run directory")?;
    info!("writing results to {}", run.path().display());

    let mut trainer = adam_trainer(config, model, device);
    let summary = trainer.fit(&data, &run)?;

    info!(
        "finished {} epochs, {} batches; last checkpoint {:?}",
        summary.epochs,
        summary.steps,
        summary.checkpoints.last()
    );
    Ok(())
}
