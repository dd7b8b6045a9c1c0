//! The adversarial training loop.
//!
//! Every batch runs three updates, always in this order:
//!
//! 1. **Reconstruction**: MSE between `decoder(encoder(x))` and `x`; steps the
//!    [`Autoencoder`] group (encoder and decoder).
//! 2. **Discriminator**: prior samples labelled real, encoder outputs labelled
//!    fake; steps the [`Discriminator`] group. The encoder output is recomputed
//!    here, so it already reflects step 1.
//! 3. **Generator**: encoder outputs labelled real; steps the [`Encoder`]
//!    group only, leaving the decoder alone.
//!
//! Each step reads the parameters the previous one just wrote.

use std::path::PathBuf;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::{AutodiffModule, Module},
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::ElementConversion,
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::{
        Tensor, TensorData,
        backend::{AutodiffBackend, Backend},
    },
};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use rand_distr::StandardNormal;
use tracing::{debug, info, warn};

use crate::config::AaeConfig;
use crate::data::{ImageBatcher, ImageItem, TrainingArray};
use crate::discriminator::Discriminator;
use crate::error::{AaeError, Result};
use crate::model::{AdversarialAutoencoder, Autoencoder, Encoder};
use crate::run_dir::{LossReport, MetricsRecord, Moments, RunDirectory};
use crate::{discriminator_loss, generator_loss, reconstruction_loss};

/// How many times each optimizer has stepped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateCounts {
    pub reconstruction: usize,
    pub discriminator: usize,
    pub generator: usize,
}

/// What a call to [`Trainer::fit`] did.
#[derive(Clone, Debug)]
pub struct TrainingSummary {
    pub epochs: usize,
    /// Batches processed over the whole run.
    pub steps: usize,
    pub updates: UpdateCounts,
    /// One checkpoint per epoch that ran at least one batch, in order.
    pub checkpoints: Vec<PathBuf>,
    /// Losses at the most recent log point, if any was reached.
    pub last_losses: Option<LossReport>,
}

/// Owns the three networks and one optimizer per parameter group.
///
/// `OA` steps the autoencoder group, `OD` the discriminator and `OG` the
/// encoder when it acts as generator. The groups are fixed by the module type
/// each optimizer is built for; [`GradientsParams::from_grads`] keeps only the
/// gradients of that module's parameters.
pub struct Trainer<B: AutodiffBackend, OA, OD, OG> {
    config: AaeConfig,
    device: B::Device,
    model: AdversarialAutoencoder<B>,
    autoencoder_optim: OA,
    discriminator_optim: OD,
    generator_optim: OG,
    batcher: ImageBatcher,
    rng: StdRng,
    updates: UpdateCounts,
    step: usize,
}

/// Builds a trainer with three independent Adam optimizers sharing the configured β₁.
pub fn adam_trainer<B: AutodiffBackend>(
    config: AaeConfig,
    model: AdversarialAutoencoder<B>,
    device: B::Device,
) -> Trainer<
    B,
    impl Optimizer<Autoencoder<B>, B>,
    impl Optimizer<Discriminator<B>, B>,
    impl Optimizer<Encoder<B>, B>,
> {
    let adam = AdamConfig::new().with_beta_1(config.beta_1);
    let autoencoder_optim = adam.init::<B, Autoencoder<B>>();
    let discriminator_optim = adam.init::<B, Discriminator<B>>();
    let generator_optim = adam.init::<B, Encoder<B>>();

    Trainer::with_optimizers(
        config,
        model,
        device,
        autoencoder_optim,
        discriminator_optim,
        generator_optim,
    )
}

impl<B, OA, OD, OG> Trainer<B, OA, OD, OG>
where
    B: AutodiffBackend,
    OA: Optimizer<Autoencoder<B>, B>,
    OD: Optimizer<Discriminator<B>, B>,
    OG: Optimizer<Encoder<B>, B>,
{
    pub fn with_optimizers(
        config: AaeConfig,
        model: AdversarialAutoencoder<B>,
        device: B::Device,
        autoencoder_optim: OA,
        discriminator_optim: OD,
        generator_optim: OG,
    ) -> Self {
        let batcher = ImageBatcher::new([config.image_size, config.image_size, config.channels]);
        let rng = StdRng::seed_from_u64(config.seed);

        Self {
            config,
            device,
            model,
            autoencoder_optim,
            discriminator_optim,
            generator_optim,
            batcher,
            rng,
            updates: UpdateCounts::default(),
            step: 0,
        }
    }

    pub fn model(&self) -> &AdversarialAutoencoder<B> {
        &self.model
    }

    pub fn into_model(self) -> AdversarialAutoencoder<B> {
        self.model
    }

    pub fn config(&self) -> &AaeConfig {
        &self.config
    }

    pub fn updates(&self) -> UpdateCounts {
        self.updates
    }

    /// Draws `[batch_size, latent_dim]` values from `N(0, prior_std²)`.
    pub fn sample_prior(&mut self, batch_size: usize) -> Tensor<B, 2> {
        let latent_dim = self.config.latent_dim;
        let std = self.config.prior_std;
        let values: Vec<f32> = (0..batch_size * latent_dim)
            .map(|_| {
                let z: f64 = self.rng.sample(StandardNormal);
                (z * std) as f32
            })
            .collect();

        Tensor::from_data(TensorData::new(values, [batch_size, latent_dim]), &self.device)
    }

    /// Gathers the images at `indices` into one `[batch, H, W, C]` tensor.
    pub fn batch(&self, data: &TrainingArray, indices: &[usize]) -> Tensor<B, 4> {
        let items: Vec<ImageItem> = indices.iter().filter_map(|&i| data.get(i)).collect();
        Batcher::<B, ImageItem, Tensor<B, 4>>::batch(&self.batcher, items, &self.device)
    }

    /// One optimizer step on the reconstruction objective. Returns the loss before the step.
    pub fn reconstruction_update(&mut self, images: Tensor<B, 4>) -> f64 {
        let autoencoder = &self.model.autoencoder;
        let loss = reconstruction_loss(autoencoder.forward(images.clone()), images);
        let value = scalar(loss.clone());

        let grads = GradientsParams::from_grads(loss.backward(), autoencoder);
        self.model.autoencoder = self.autoencoder_optim.step(
            self.config.learning_rate,
            self.model.autoencoder.clone(),
            grads,
        );

        self.updates.reconstruction += 1;
        value
    }

    /// One optimizer step on the discriminator objective. Returns the loss before the step.
    pub fn discriminator_update(&mut self, images: Tensor<B, 4>, prior: Tensor<B, 2>) -> f64 {
        // Only the discriminator learns here; cut the graph at the encoder output.
        let latent = self.model.autoencoder.encoder.forward(images).detach();
        let discriminator = &self.model.discriminator;
        let loss = discriminator_loss(discriminator.forward(prior), discriminator.forward(latent));
        let value = scalar(loss.clone());

        let grads = GradientsParams::from_grads(loss.backward(), discriminator);
        self.model.discriminator = self.discriminator_optim.step(
            self.config.learning_rate,
            self.model.discriminator.clone(),
            grads,
        );

        self.updates.discriminator += 1;
        value
    }

    /// One optimizer step of the encoder against the discriminator. Returns the loss before the step.
    pub fn generator_update(&mut self, images: Tensor<B, 4>) -> f64 {
        let encoder = &self.model.autoencoder.encoder;
        let loss = generator_loss(self.model.discriminator.forward(encoder.forward(images)));
        let value = scalar(loss.clone());

        let grads = GradientsParams::from_grads(loss.backward(), encoder);
        self.model.autoencoder.encoder = self.generator_optim.step(
            self.config.learning_rate,
            self.model.autoencoder.encoder.clone(),
            grads,
        );

        self.updates.generator += 1;
        value
    }

    /// Runs the three updates on one batch in their fixed order.
    pub fn train_batch(&mut self, images: Tensor<B, 4>, prior: Tensor<B, 2>) -> LossReport {
        let autoencoder = self.reconstruction_update(images.clone());
        let discriminator = self.discriminator_update(images.clone(), prior);
        let generator = self.generator_update(images);

        LossReport {
            autoencoder,
            discriminator,
            generator,
        }
    }

    /// Recomputes the three losses with the current parameters, without updating anything.
    pub fn evaluate(&self, images: Tensor<B, 4>, prior: Tensor<B, 2>) -> LossReport {
        self.inspect(images, prior).0
    }

    /// Losses plus the spread of encoder codes and prior samples.
    fn inspect(&self, images: Tensor<B, 4>, prior: Tensor<B, 2>) -> (LossReport, Moments, Moments) {
        let model = self.model.valid();
        let images = images.inner();
        let prior = prior.inner();

        let latent = model.autoencoder.encoder.forward(images.clone());
        let recon = model.autoencoder.decoder.forward(latent.clone());
        let real = model.discriminator.forward(prior.clone());
        let fake = model.discriminator.forward(latent.clone());

        let losses = LossReport {
            autoencoder: scalar(reconstruction_loss(recon, images)),
            discriminator: scalar(discriminator_loss(real, fake.clone())),
            generator: scalar(generator_loss(fake)),
        };
        (losses, moments(latent), moments(prior))
    }

    /// Writes every parameter to `checkpoints/checkpoint-<step>` in `run`.
    pub fn save_checkpoint(&self, run: &RunDirectory) -> Result<PathBuf> {
        let path = run.checkpoint_path(self.step);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        self.model
            .valid()
            .save_file(path.clone(), &recorder)
            .map_err(|e| AaeError::Checkpoint(format!("{e:?}")))?;

        debug!("saved checkpoint {}", path.display());
        Ok(path)
    }

    /// Trains for `config.num_epochs` epochs over `data`, writing logs and
    /// checkpoints into `run`.
    ///
    /// Each epoch reshuffles the image order and walks it in full batches;
    /// a trailing batch smaller than `batch_size` is dropped. An epoch without
    /// a full batch writes no checkpoint. Any non-finite loss aborts the run
    /// with [`AaeError::Diverged`].
    pub fn fit(&mut self, data: &TrainingArray, run: &RunDirectory) -> Result<TrainingSummary> {
        self.config.validate()?;
        if data.is_empty() {
            return Err(AaeError::EmptyDataset);
        }
        let expected = [self.config.image_size, self.config.image_size, self.config.channels];
        if data.image_dims() != expected {
            return Err(AaeError::InvalidData(format!(
                "images are {:?} but the model expects {expected:?}",
                data.image_dims()
            )));
        }

        let batch_size = self.config.batch_size;
        let num_epochs = self.config.num_epochs;
        let n_batches = data.num_images() / batch_size;
        if n_batches == 0 {
            warn!(
                "{} images cannot fill a single batch of {batch_size}; no update or checkpoint will be made",
                data.num_images()
            );
        }

        let mut order: Vec<usize> = (0..data.num_images()).collect();
        let mut checkpoints = Vec::with_capacity(num_epochs);
        let mut last_losses = None;

        for epoch in 0..num_epochs {
            info!("------------------Epoch {epoch}/{num_epochs}------------------");
            order.shuffle(&mut self.rng);

            for (b, indices) in (1..).zip(order.chunks_exact(batch_size)) {
                let images = self.batch(data, indices);
                let prior = self.sample_prior(batch_size);

                let losses = self.train_batch(images.clone(), prior.clone());
                check_finite(&losses, epoch, b)?;

                if b % self.config.log_interval == 0 {
                    let (losses, encoder_latent, prior_latent) = self.inspect(images, prior);
                    check_finite(&losses, epoch, b)?;

                    info!(
                        "Epoch: {epoch}, iteration: {b} | autoencoder {:.6} | discriminator {:.6} | generator {:.6}",
                        losses.autoencoder, losses.discriminator, losses.generator
                    );
                    run.append_log(epoch, b, &losses)?;
                    run.append_metrics(&MetricsRecord {
                        step: self.step,
                        epoch,
                        iteration: b,
                        losses,
                        encoder_latent,
                        prior_latent,
                    })?;
                    last_losses = Some(losses);
                }

                self.step += 1;
            }

            if n_batches > 0 {
                checkpoints.push(self.save_checkpoint(run)?);
            }
        }

        Ok(TrainingSummary {
            epochs: num_epochs,
            steps: self.step,
            updates: self.updates,
            checkpoints,
            last_losses,
        })
    }
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor.into_scalar().elem::<f64>()
}

fn moments<B: Backend>(values: Tensor<B, 2>) -> Moments {
    let mean = values.clone().mean();
    let variance = (values - mean.clone().unsqueeze()).powf_scalar(2.0).mean();
    Moments {
        mean: scalar(mean),
        std: scalar(variance).sqrt(),
    }
}

fn check_finite(losses: &LossReport, epoch: usize, batch: usize) -> Result<()> {
    let objectives = [
        ("autoencoder", losses.autoencoder),
        ("discriminator", losses.discriminator),
        ("generator", losses.generator),
    ];
    for (objective, value) in objectives {
        if !value.is_finite() {
            return Err(AaeError::Diverged {
                objective,
                epoch,
                batch,
                value,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkVariant;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;

    type TestBackend = Autodiff<NdArray>;

    fn small_config() -> AaeConfig {
        AaeConfig::new()
            .with_variant(NetworkVariant::Dense)
            .with_image_size(8)
            .with_channels(1)
            .with_latent_dim(2)
            .with_hidden_dim(16)
            .with_batch_size(4)
            .with_learning_rate(1e-2)
    }

    fn outputs(
        model: &AdversarialAutoencoder<TestBackend>,
        images: Tensor<TestBackend, 4>,
        latent: Tensor<TestBackend, 2>,
    ) -> [Vec<f32>; 3] {
        [
            model.autoencoder.encoder.forward(images).into_data().to_vec().unwrap(),
            model.autoencoder.decoder.forward(latent.clone()).into_data().to_vec().unwrap(),
            model.discriminator.forward(latent).into_data().to_vec().unwrap(),
        ]
    }

    #[test]
    fn prior_sample_has_configured_shape_and_spread() {
        let config = small_config().with_latent_dim(3).with_prior_std(5.0);
        let device = Default::default();
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let mut trainer = adam_trainer(config, model, device.clone());

        let prior = trainer.sample_prior(2000);
        assert_eq!(prior.dims(), [2000, 3]);
        let spread = moments(prior);
        assert!(spread.mean.abs() < 0.5);
        assert!((spread.std - 5.0).abs() < 0.5);
    }

    #[test]
    fn zero_learning_rate_leaves_every_group_unchanged() {
        let config = small_config().with_learning_rate(0.0);
        let device = Default::default();
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let mut trainer = adam_trainer(config, model, device.clone());

        let images = Tensor::<TestBackend, 4>::random([4, 8, 8, 1], Distribution::Default, &device);
        let probe = Tensor::<TestBackend, 2>::random([4, 2], Distribution::Default, &device);
        let before = outputs(trainer.model(), images.clone(), probe.clone());

        trainer.reconstruction_update(images.clone());

        assert_eq!(outputs(trainer.model(), images, probe), before);
        assert_eq!(trainer.updates().reconstruction, 1);
    }

    #[test]
    fn generator_update_leaves_decoder_and_discriminator_alone() {
        let config = small_config();
        let device = Default::default();
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let mut trainer = adam_trainer(config, model, device.clone());

        let images = Tensor::<TestBackend, 4>::random([4, 8, 8, 1], Distribution::Default, &device);
        let probe = Tensor::<TestBackend, 2>::random([4, 2], Distribution::Default, &device);
        let [enc_before, dec_before, disc_before] =
            outputs(trainer.model(), images.clone(), probe.clone());

        trainer.generator_update(images.clone());

        let [enc_after, dec_after, disc_after] = outputs(trainer.model(), images, probe);
        assert_ne!(enc_after, enc_before);
        assert_eq!(dec_after, dec_before);
        assert_eq!(disc_after, disc_before);
    }

    #[test]
    fn swapping_discriminator_and_generator_updates_changes_the_outcome() {
        // Small weights make the discriminator nearly flat in the latent, so
        // the two orders would differ only below float resolution.
        let config = small_config()
            .with_hidden_dim(32)
            .with_init_std(0.3)
            .with_batch_size(8);
        let device = Default::default();
        TestBackend::seed(config.seed);
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let images = Tensor::<TestBackend, 4>::random([8, 8, 8, 1], Distribution::Default, &device);
        let prior = Tensor::<TestBackend, 2>::random([8, 2], Distribution::Normal(0.0, 5.0), &device);

        let mut in_order = adam_trainer(config.clone(), model.clone(), device.clone());
        in_order.reconstruction_update(images.clone());
        in_order.discriminator_update(images.clone(), prior.clone());
        in_order.generator_update(images.clone());

        let mut swapped = adam_trainer(config, model, device.clone());
        swapped.reconstruction_update(images.clone());
        swapped.generator_update(images.clone());
        swapped.discriminator_update(images.clone(), prior.clone());

        let expected = in_order.evaluate(images.clone(), prior.clone()).discriminator;
        let reordered = swapped.evaluate(images, prior).discriminator;
        assert!(
            (expected - reordered).abs() > 1e-5,
            "discriminator loss {expected} did not depend on update order"
        );
    }

    #[test]
    fn fit_rejects_an_invalid_trainer_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = small_config().with_results_root(dir.path().display().to_string());
        let device = Default::default();
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let run = RunDirectory::create(&config).unwrap();
        let data = TrainingArray::new(vec![0.5; 4 * 64], [4, 8, 8, 1]).unwrap();

        for broken in [config.clone().with_batch_size(0), config.clone().with_log_interval(0)] {
            let mut trainer = adam_trainer(broken, model.clone(), device.clone());
            assert!(matches!(
                trainer.fit(&data, &run),
                Err(AaeError::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn epochs_without_a_full_batch_write_no_checkpoint() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = small_config()
            .with_num_epochs(3)
            .with_results_root(dir.path().display().to_string());
        let device = Default::default();
        let model = AdversarialAutoencoder::<TestBackend>::new(&config, &device).unwrap();
        let run = RunDirectory::create(&config).unwrap();
        let data = TrainingArray::new(vec![0.5; 3 * 64], [3, 8, 8, 1]).unwrap();

        let summary = adam_trainer(config, model, device).fit(&data, &run).unwrap();

        assert_eq!(summary.steps, 0);
        assert!(summary.checkpoints.is_empty());
        assert!(run.checkpoints().unwrap().is_empty());
    }

    #[test]
    fn non_finite_loss_is_reported_as_divergence() {
        let losses = LossReport {
            autoencoder: 0.1,
            discriminator: f64::NAN,
            generator: 0.3,
        };
        let err = check_finite(&losses, 2, 7).unwrap_err();
        assert!(matches!(
            err,
            AaeError::Diverged {
                objective: "discriminator",
                epoch: 2,
                batch: 7,
                ..
            }
        ));
    }
}
