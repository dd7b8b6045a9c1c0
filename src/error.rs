use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by data preparation, training and generation.
#[derive(Debug, Error)]
pub enum AaeError {
    /// The configuration cannot describe a working network.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The training array holds no images.
    #[error("training data is empty")]
    EmptyDataset,

    /// The training data file exists but does not match what the trainer expects.
    #[error("invalid training data: {0}")]
    InvalidData(String),

    /// A loss became NaN or infinite.
    #[error("training diverged at epoch {epoch}, batch {batch}: {objective} loss is {value}")]
    Diverged {
        objective: &'static str,
        epoch: usize,
        batch: usize,
        value: f64,
    },

    /// Generation was requested but no run under the results root has a checkpoint.
    #[error("no trained model found under {}", .0.display())]
    NoTrainedModel(PathBuf),

    /// Saving or loading model weights failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    SafeTensors(#[from] safetensors::SafeTensorError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AaeError>;
