use std::path::PathBuf;

use aae::AaeConfig;
use aae::data::TRAINING_DATA_FILE;
use aae::prepare::{collect_image_paths, prepare_training_data};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Resizes every image of a folder into the training array read by `train`.
#[derive(Parser, Debug)]
#[command(author, version, about = "Training data preparation")]
struct Args {
    /// Folder of source images; every regular file is tried.
    #[arg(short, long, default_value = "data/images")]
    input: PathBuf,

    #[arg(short, long, default_value = TRAINING_DATA_FILE)]
    output: PathBuf,

    /// Side length of the square output images.
    #[arg(long, default_value_t = 64)]
    image_size: usize,

    /// 1 = gray, 3 = RGB, 4 = RGBA.
    #[arg(long, default_value_t = 3)]
    channels: usize,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("cannot install logger")?;

    let args = Args::parse();
    let config = AaeConfig::new()
        .with_image_size(args.image_size)
        .with_channels(args.channels);

    let paths = collect_image_paths(&args.input)
        .with_context(|| format!("cannot list {}", args.input.display()))?;
    info!("found {} files in {}", paths.len(), args.input.display());

    let prepared = prepare_training_data(&paths, &config)?;
    if prepared.array.is_empty() {
        warn!("no image could be decoded; writing an empty training array");
    }

    prepared
        .array
        .save(&args.output)
        .with_context(|| format!("cannot write {}", args.output.display()))?;
    info!("wrote {:?} to {}", prepared.array.shape(), args.output.display());
    Ok(())
}
