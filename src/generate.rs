#![recursion_limit = "256"]

use std::path::PathBuf;

use aae::backend::{InferenceBackend, default_device};
use aae::generation::{Generator, GridSpec};
use aae::run_dir::RunDirectory;
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Decodes a grid of hand-picked latent vectors with the most recent trained model.
///
/// Latent dimension 0 is swept down the rows and dimension 1 across the
/// columns over `start, start + step, …` (excluding `end`); every other
/// dimension is zero.
#[derive(Parser, Debug)]
#[command(author, version, about = "Adversarial autoencoder grid generator")]
struct Args {
    /// Parent directory of the training runs; the newest run is used.
    #[arg(long, default_value = "./Results/Adversarial_Autoencoder")]
    results_root: PathBuf,

    /// Use this run directory instead of the newest one.
    #[arg(long)]
    run: Option<PathBuf>,

    #[arg(long, default_value_t = -10.0, allow_hyphen_values = true)]
    start: f32,

    #[arg(long, default_value_t = 10.0, allow_hyphen_values = true)]
    end: f32,

    #[arg(long, default_value_t = 1.5)]
    step: f32,

    /// File path for the saved grid image.
    #[arg(short, long, default_value = "latent_grid.png")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("cannot install logger")?;

    let args = Args::parse();
    let device = default_device();

    let generator = match &args.run {
        Some(run) => Generator::<InferenceBackend>::from_run(&RunDirectory::open(run), &device)?,
        None => Generator::<InferenceBackend>::from_latest_run(&args.results_root, &device)?,
    };

    let spec = GridSpec {
        start: args.start,
        end: args.end,
        step: args.step,
    };
    let grid = generator.generate_grid(&spec)?;
    info!("decoded {} latent vectors", grid.images.len());

    grid.save(&args.output)
        .with_context(|| format!("cannot write {}", args.output.display()))?;
    Ok(())
}
