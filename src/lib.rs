use burn::tensor::{Tensor, backend::Backend};

pub mod backend;
pub mod config;
pub mod conv_model;
pub mod data;
pub mod dense_model;
pub mod discriminator;
pub mod error;
pub mod generation;
pub mod model;
pub mod prepare;
pub mod run_dir;
pub mod trainer;

pub use config::{AaeConfig, NetworkVariant};
pub use error::{AaeError, Result};

/// Target label of a prior sample in the adversarial losses.
pub const REAL_LABEL: f32 = 1.0;

/// Target label of an encoder output in the discriminator loss.
pub const FAKE_LABEL: f32 = 0.0;

// --- Loss Functions ---

/// Mean squared pixel error between a reconstruction and its input.
///
/// Both tensors are `[batch, H, W, C]`; the result is a single scalar.
pub fn reconstruction_loss<B: Backend>(recon: Tensor<B, 4>, target: Tensor<B, 4>) -> Tensor<B, 1> {
    (target - recon).powf_scalar(2.0).mean()
}

/// Sigmoid cross-entropy of raw logits against a constant label, averaged over the batch.
///
/// Uses the overflow-free form
/// ```text
/// max(x, 0) − x·z + log(1 + exp(−|x|))
/// ```
/// so large logits of either sign stay finite.
pub fn sigmoid_cross_entropy_with_logits<B: Backend>(
    logits: Tensor<B, 2>,
    label: f32,
) -> Tensor<B, 1> {
    let relu = logits.clone().clamp_min(0.0);
    let shifted = logits.clone().mul_scalar(label);
    let soft = logits.abs().neg().exp().log1p();
    (relu - shifted + soft).mean()
}

/// Discriminator objective: prior samples are real, encoder outputs are fake.
pub fn discriminator_loss<B: Backend>(
    real_logits: Tensor<B, 2>,
    fake_logits: Tensor<B, 2>,
) -> Tensor<B, 1> {
    sigmoid_cross_entropy_with_logits(real_logits, REAL_LABEL)
        + sigmoid_cross_entropy_with_logits(fake_logits, FAKE_LABEL)
}

/// Generator objective: the encoder wants its outputs scored as real.
pub fn generator_loss<B: Backend>(fake_logits: Tensor<B, 2>) -> Tensor<B, 1> {
    sigmoid_cross_entropy_with_logits(fake_logits, REAL_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;
    use burn::tensor::{ElementConversion, TensorData};

    type TestBackend = NdArray;

    fn logits(values: Vec<f32>) -> Tensor<TestBackend, 2> {
        let n = values.len();
        Tensor::from_data(TensorData::new(values, [n, 1]), &Default::default())
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar().elem::<f32>()
    }

    #[test]
    fn cross_entropy_of_zero_logit_is_ln2() {
        let loss = scalar(sigmoid_cross_entropy_with_logits(logits(vec![0.0, 0.0]), 1.0));
        assert_relative_eq!(loss, std::f32::consts::LN_2, epsilon = 1e-6);
    }

    #[test]
    fn cross_entropy_stays_finite_for_large_logits() {
        let confident = scalar(sigmoid_cross_entropy_with_logits(logits(vec![100.0]), 1.0));
        assert_relative_eq!(confident, 0.0, epsilon = 1e-6);

        let wrong = scalar(sigmoid_cross_entropy_with_logits(logits(vec![100.0]), 0.0));
        assert_relative_eq!(wrong, 100.0, epsilon = 1e-3);
    }

    #[test]
    fn discriminator_loss_sums_both_branches() {
        let real = logits(vec![2.0]);
        let fake = logits(vec![-1.0]);
        let expected = (1.0 + (-2.0f32).exp()).ln() + (1.0 + (-1.0f32).exp()).ln();
        assert_relative_eq!(scalar(discriminator_loss(real, fake)), expected, epsilon = 1e-5);
    }

    #[test]
    fn generator_loss_flips_the_fake_label() {
        let fake = logits(vec![-1.0, 3.0]);
        let expected = ((1.0 + 1.0f32.exp()).ln() + (1.0 + (-3.0f32).exp()).ln()) / 2.0;
        assert_relative_eq!(scalar(generator_loss(fake)), expected, epsilon = 1e-5);
    }

    #[test]
    fn reconstruction_loss_is_mean_squared_error() {
        let device = Default::default();
        let target = Tensor::<TestBackend, 4>::zeros([1, 2, 2, 1], &device);
        let recon = Tensor::<TestBackend, 4>::ones([1, 2, 2, 1], &device).mul_scalar(0.5);
        assert_relative_eq!(scalar(reconstruction_loss(recon, target)), 0.25, epsilon = 1e-6);
    }
}
