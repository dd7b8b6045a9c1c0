//! Per-run artifact directory: config, text log, metric log and checkpoints.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use burn::config::Config;
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::debug;

use crate::config::AaeConfig;
use crate::error::{AaeError, Result};

pub const CONFIG_FILE: &str = "config.json";
pub const CHECKPOINT_DIR: &str = "checkpoints";
pub const METRICS_DIR: &str = "metrics";
pub const LOG_DIR: &str = "log";

const RUN_SUFFIX: &str = "Adversarial_Autoencoder";
const CHECKPOINT_PREFIX: &str = "checkpoint-";
const CHECKPOINT_EXTENSION: &str = "bin";

/// The three objectives evaluated on one batch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LossReport {
    pub autoencoder: f64,
    pub discriminator: f64,
    pub generator: f64,
}

/// Mean and standard deviation of a batch of values.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
}

/// One line of `metrics/metrics.jsonl`.
#[derive(Clone, Debug, Serialize)]
pub struct MetricsRecord {
    pub step: usize,
    pub epoch: usize,
    pub iteration: usize,
    pub losses: LossReport,
    /// Spread of the encoder's latent codes on the logged batch.
    pub encoder_latent: Moments,
    /// Spread of the prior sample drawn for the logged batch.
    pub prior_latent: Moments,
}

/// Directory holding everything one training run writes.
///
/// ```text
/// <results_root>/<timestamp>_<latent>_<lr>_<batch>_<epochs>_<beta1>_Adversarial_Autoencoder/
///     config.json
///     checkpoints/checkpoint-<step>.bin
///     metrics/metrics.jsonl
///     log/log.txt
/// ```
#[derive(Clone, Debug)]
pub struct RunDirectory {
    root: PathBuf,
}

impl RunDirectory {
    /// Directory name of a run started at `started` with `config`.
    ///
    /// The timestamp comes first so that names sort chronologically.
    pub fn run_name(config: &AaeConfig, started: &DateTime<Local>) -> String {
        format!(
            "{}_{}_{}_{}_{}_{}_{RUN_SUFFIX}",
            started.format("%Y-%m-%d_%H-%M-%S%.6f"),
            config.latent_dim,
            config.learning_rate,
            config.batch_size,
            config.num_epochs,
            config.beta_1,
        )
    }

    /// Creates a fresh run directory under `config.results_root` and saves the config into it.
    pub fn create(config: &AaeConfig) -> Result<Self> {
        let results_root = Path::new(&config.results_root);
        std::fs::create_dir_all(results_root)?;

        let root = results_root.join(Self::run_name(config, &Local::now()));
        std::fs::create_dir(&root)?;
        for sub in [CHECKPOINT_DIR, METRICS_DIR, LOG_DIR] {
            std::fs::create_dir(root.join(sub))?;
        }
        config.save(root.join(CONFIG_FILE))?;

        debug!("created run directory {}", root.display());
        Ok(Self { root })
    }

    /// Wraps an existing run directory.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The most recent run under `results_root`, by directory name.
    pub fn latest(results_root: impl AsRef<Path>) -> Result<Self> {
        let results_root = results_root.as_ref();
        let no_model = || AaeError::NoTrainedModel(results_root.to_path_buf());

        let entries = match std::fs::read_dir(results_root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Err(no_model()),
            Err(err) => return Err(err.into()),
        };

        let mut runs = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                runs.push(entry.path());
            }
        }
        runs.sort();

        runs.pop().map(Self::open).ok_or_else(no_model)
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_DIR).join("log.txt")
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.root.join(METRICS_DIR).join("metrics.jsonl")
    }

    /// Where the checkpoint of global step `step` lives, without the recorder's extension.
    pub fn checkpoint_path(&self, step: usize) -> PathBuf {
        self.root.join(CHECKPOINT_DIR).join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// All checkpoints of the run as `(step, file)`, oldest first.
    pub fn checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        let dir = self.root.join(CHECKPOINT_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHECKPOINT_EXTENSION) {
                continue;
            }
            let step = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|s| s.parse::<usize>().ok());
            if let Some(step) = step {
                found.push((step, path));
            }
        }
        found.sort();
        Ok(found)
    }

    /// The checkpoint with the highest step.
    pub fn latest_checkpoint(&self) -> Result<PathBuf> {
        self.checkpoints()?
            .pop()
            .map(|(_, path)| path)
            .ok_or_else(|| AaeError::NoTrainedModel(self.root.clone()))
    }

    /// Appends one entry to `log/log.txt`.
    pub fn append_log(&self, epoch: usize, iteration: usize, losses: &LossReport) -> Result<()> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())?;
        writeln!(log, "Epoch: {epoch}, iteration: {iteration}")?;
        writeln!(log, "Autoencoder Loss: {}", losses.autoencoder)?;
        writeln!(log, "Discriminator Loss: {}", losses.discriminator)?;
        writeln!(log, "Generator Loss: {}", losses.generator)?;
        Ok(())
    }

    /// Appends one JSON line to `metrics/metrics.jsonl`.
    pub fn append_metrics(&self, record: &MetricsRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.metrics_path())?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}
