use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::error::AaeError;

/// Number of 2× max-pool stages in the convolutional encoder.
pub const CONV_STAGES: u32 = 4;

/// Channel depth of the convolutional bottleneck feature map.
pub const CONV_BOTTLENECK_CHANNELS: usize = 8;

/// Which encoder/decoder pair to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum NetworkVariant {
    /// Fully connected encoder and decoder.
    Dense,
    /// Convolutional encoder and decoder.
    Conv,
}

// --- CONFIG ---

/// Every knob of an adversarial autoencoder run.
///
/// Image geometry, network sizes and training hyperparameters live in one
/// struct so that resolution and latent size are validated together: the
/// convolutional encoder flattens an `8 × (size/16) × (size/16)` feature map
/// straight into the latent vector, so the two cannot be chosen independently.
///
/// The config is written to every run directory and read back by the
/// generator, which rebuilds the exact architecture from it.
#[derive(Config, Debug)]
pub struct AaeConfig {
    /// Side length of the square training images.
    #[config(default = 64)]
    pub image_size: usize,
    /// Channels per pixel (1 = gray, 3 = RGB, 4 = RGBA).
    #[config(default = 3)]
    pub channels: usize,
    #[config(default = 128)]
    pub latent_dim: usize,
    /// Width of the hidden layers of the dense networks and the discriminator.
    #[config(default = 1000)]
    pub hidden_dim: usize,
    #[config(default = "NetworkVariant::Conv")]
    pub variant: NetworkVariant,

    #[config(default = 100)]
    pub batch_size: usize,
    #[config(default = 500)]
    pub num_epochs: usize,
    #[config(default = 1e-3)]
    pub learning_rate: f64,
    /// Adam first-moment decay shared by all three optimizers.
    #[config(default = 0.9)]
    pub beta_1: f32,
    /// Standard deviation of the Gaussian prior the latent code is pushed towards.
    #[config(default = 5.0)]
    pub prior_std: f64,
    /// Standard deviation of the normal initializer of dense weights.
    #[config(default = 0.01)]
    pub init_std: f64,

    /// Losses are recomputed and logged every `log_interval` batches.
    #[config(default = 5)]
    pub log_interval: usize,
    #[config(default = "String::from(\"./Results/Adversarial_Autoencoder\")")]
    pub results_root: String,
    #[config(default = 42)]
    pub seed: u64,
}

impl AaeConfig {
    /// Flattened pixel count of one image.
    pub fn input_dim(&self) -> usize {
        self.image_size * self.image_size * self.channels
    }

    /// Spatial side of the convolutional bottleneck (`image_size / 16`).
    pub fn conv_grid(&self) -> usize {
        self.image_size >> CONV_STAGES
    }

    /// Checks that the geometry can be built into working networks.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.image_size == 0 || self.latent_dim == 0 || self.hidden_dim == 0 {
            return Err(AaeError::InvalidConfig(
                "image_size, latent_dim and hidden_dim must be positive".into(),
            ));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(AaeError::InvalidConfig(format!(
                "channels must be 1, 3 or 4, got {}",
                self.channels
            )));
        }
        if self.batch_size == 0 || self.log_interval == 0 {
            return Err(AaeError::InvalidConfig(
                "batch_size and log_interval must be positive".into(),
            ));
        }
        if self.variant == NetworkVariant::Conv {
            let factor = 1 << CONV_STAGES;
            if self.image_size % factor != 0 {
                return Err(AaeError::InvalidConfig(format!(
                    "conv variant needs image_size divisible by {factor}, got {}",
                    self.image_size
                )));
            }
            let grid = self.conv_grid();
            let flattened = CONV_BOTTLENECK_CHANNELS * grid * grid;
            if flattened != self.latent_dim {
                return Err(AaeError::InvalidConfig(format!(
                    "conv variant flattens a {CONV_BOTTLENECK_CHANNELS}x{grid}x{grid} feature map \
                     ({flattened} values) but latent_dim is {}",
                    self.latent_dim
                )));
            }
        }
        Ok(())
    }
}
