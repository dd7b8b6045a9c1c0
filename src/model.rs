//! The three networks and the parameter groups the trainer optimizes.
//!
//! Every network is built once and owned by exactly one field, so each
//! computation that needs the encoder, decoder or discriminator calls the same
//! instance instead of looking weights up again. The groups are:
//!
//! * [`Autoencoder`]: encoder and decoder, updated by the reconstruction objective
//! * [`Discriminator`]: updated by the discriminator objective
//! * [`Encoder`]: the encoder alone, updated by the generator objective

use burn::{
    module::Module,
    tensor::{Tensor, backend::Backend},
};

use crate::config::{AaeConfig, NetworkVariant};
use crate::conv_model::{ConvDecoder, ConvEncoder};
use crate::dense_model::{DenseDecoder, DenseEncoder};
use crate::discriminator::Discriminator;

/// Image → latent code, in either variant.
#[derive(Module, Debug)]
pub enum Encoder<B: Backend> {
    Dense(DenseEncoder<B>),
    Conv(ConvEncoder<B>),
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &AaeConfig, device: &B::Device) -> Self {
        match config.variant {
            NetworkVariant::Dense => Self::Dense(DenseEncoder::new(config, device)),
            NetworkVariant::Conv => Self::Conv(ConvEncoder::new(config, device)),
        }
    }

    /// `[batch, H, W, C]` → `[batch, latent_dim]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            Self::Dense(encoder) => encoder.forward(images),
            Self::Conv(encoder) => encoder.forward(images),
        }
    }
}

/// Latent code → image, in either variant.
#[derive(Module, Debug)]
pub enum Decoder<B: Backend> {
    Dense(DenseDecoder<B>),
    Conv(ConvDecoder<B>),
}

impl<B: Backend> Decoder<B> {
    pub fn new(config: &AaeConfig, device: &B::Device) -> Self {
        match config.variant {
            NetworkVariant::Dense => Self::Dense(DenseDecoder::new(config, device)),
            NetworkVariant::Conv => Self::Conv(ConvDecoder::new(config, device)),
        }
    }

    /// `[batch, latent_dim]` → `[batch, H, W, C]` with values in `[0, 1]`.
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        match self {
            Self::Dense(decoder) => decoder.forward(latent),
            Self::Conv(decoder) => decoder.forward(latent),
        }
    }
}

/// Encoder and decoder, the parameter group of the reconstruction objective.
#[derive(Module, Debug)]
pub struct Autoencoder<B: Backend> {
    pub encoder: Encoder<B>,
    pub decoder: Decoder<B>,
}

impl<B: Backend> Autoencoder<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        self.decoder.forward(self.encoder.forward(images))
    }
}

/// All parameters of a run; this is what a checkpoint holds.
#[derive(Module, Debug)]
pub struct AdversarialAutoencoder<B: Backend> {
    pub autoencoder: Autoencoder<B>,
    pub discriminator: Discriminator<B>,
}

impl<B: Backend> AdversarialAutoencoder<B> {
    /// Validates `config` and allocates fresh parameters for all three networks.
    pub fn new(config: &AaeConfig, device: &B::Device) -> crate::error::Result<Self> {
        config.validate()?;

        Ok(Self {
            autoencoder: Autoencoder {
                encoder: Encoder::new(config, device),
                decoder: Decoder::new(config, device),
            },
            discriminator: Discriminator::new(config, device),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    fn dense_config() -> AaeConfig {
        AaeConfig::new()
            .with_variant(NetworkVariant::Dense)
            .with_image_size(8)
            .with_channels(1)
            .with_latent_dim(2)
            .with_hidden_dim(16)
    }

    fn conv_config() -> AaeConfig {
        AaeConfig::new()
            .with_variant(NetworkVariant::Conv)
            .with_image_size(32)
            .with_channels(3)
            .with_latent_dim(32)
            .with_hidden_dim(16)
    }

    fn random_images(config: &AaeConfig, batch: usize) -> Tensor<TestBackend, 4> {
        Tensor::random(
            [batch, config.image_size, config.image_size, config.channels],
            Distribution::Uniform(0.0, 1.0),
            &Default::default(),
        )
    }

    #[test]
    fn encoder_emits_latent_batch_for_both_variants() {
        let device = Default::default();
        for config in [dense_config(), conv_config()] {
            let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
            let latent = model.autoencoder.encoder.forward(random_images(&config, 5));
            assert_eq!(latent.dims(), [5, config.latent_dim]);
        }
    }

    #[test]
    fn decoder_emits_images_in_unit_range() {
        let device = Default::default();
        for config in [dense_config(), conv_config()] {
            let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
            let latent = Tensor::<TestBackend, 2>::random(
                [4, config.latent_dim],
                Distribution::Normal(0.0, 5.0),
                &device,
            );
            let images = model.autoencoder.decoder.forward(latent);
            assert_eq!(
                images.dims(),
                [4, config.image_size, config.image_size, config.channels]
            );
            let pixels = images.into_data().to_vec::<f32>().unwrap();
            assert!(pixels.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn discriminator_scores_one_logit_per_example() {
        let device = Default::default();
        let config = dense_config();
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let latent = model.autoencoder.encoder.forward(random_images(&config, 3));
        assert_eq!(model.discriminator.forward(latent).dims(), [3, 1]);
    }

    #[test]
    fn autoencoder_round_trip_keeps_image_shape() {
        let device = Default::default();
        let config = conv_config();
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let recon = model.autoencoder.forward(random_images(&config, 2));
        assert_eq!(recon.dims(), [2, 32, 32, 3]);
    }

    #[test]
    fn inconsistent_conv_geometry_fails_at_construction() {
        let device = Default::default();
        let config = conv_config().with_latent_dim(20);
        assert!(AdversarialAutoencoder::<TestBackend>::new(&config, &device).is_err());
    }
}
