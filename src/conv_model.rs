use burn::{
    module::{Module, Param},
    nn::{
        Initializer, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        interpolate::{Interpolate2d, Interpolate2dConfig, InterpolateMode},
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    tensor::{Tensor, activation, backend::Backend},
};

use crate::config::{AaeConfig, CONV_BOTTLENECK_CHANNELS};

/// 3×3 same-padded convolution with Glorot-uniform weights and zero bias.
fn conv3x3<B: Backend>(channels: [usize; 2], device: &B::Device) -> Conv2d<B> {
    let mut conv = Conv2dConfig::new(channels, [3, 3])
        .with_padding(PaddingConfig2d::Same)
        .with_initializer(Initializer::XavierUniform { gain: 1.0 })
        .init(device);
    conv.bias = Some(Param::from_tensor(Tensor::zeros([channels[1]], device)));
    conv
}

// --- CONV ENCODER ---

/// Convolutional encoder.
///
/// Structure (for a 64×64 input):
/// - Four stages of conv + ReLU + 2×2 max-pool: 64 → 32 → 16 → 8 → 4
/// - Channels 32 → 16 → 16 → 8
/// - The final `[8, 4, 4]` map is flattened directly into the 128-wide latent code
///
/// There is no dense projection, which is why [`AaeConfig::validate`] insists
/// that `latent_dim == 8 × (size/16)²`.
#[derive(Module, Debug)]
pub struct ConvEncoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> ConvEncoder<B> {
    /// Builds the encoder. `config` must have passed [`AaeConfig::validate`].
    pub fn new(config: &AaeConfig, device: &B::Device) -> Self {
        Self {
            conv1: conv3x3([config.channels, 32], device),
            conv2: conv3x3([32, 16], device),
            conv3: conv3x3([16, 16], device),
            conv4: conv3x3([16, CONV_BOTTLENECK_CHANNELS], device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: Relu::new(),
        }
    }

    /// Encodes `[batch, H, W, C]` images into `[batch, latent_dim]` codes.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        // Burn convolutions expect channels first.
        let mut x = images.permute([0, 3, 1, 2]);

        for conv in [&self.conv1, &self.conv2, &self.conv3, &self.conv4] {
            x = self.activation.forward(conv.forward(x));
            x = self.pool.forward(x);
        }

        x.flatten(1, 3)
    }
}

// --- CONV DECODER ---

/// Convolutional decoder.
///
/// Structure (for a 64×64 output):
/// - Reshape the 128-wide code into an `[8, 4, 4]` map
/// - Four stages of conv + ReLU + nearest-neighbour 2× upsample: 4 → 8 → 16 → 32 → 64
/// - Channels 8 → 16 → 16 → 32
/// - Final conv to the image channel count with a sigmoid
#[derive(Module, Debug)]
pub struct ConvDecoder<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    conv3: Conv2d<B>,
    conv4: Conv2d<B>,
    output_conv: Conv2d<B>,
    upsample: Interpolate2d,
    activation: Relu,
    /// Side of the bottleneck map the latent code is reshaped into.
    grid: usize,
}

impl<B: Backend> ConvDecoder<B> {
    /// Builds the decoder. `config` must have passed [`AaeConfig::validate`].
    pub fn new(config: &AaeConfig, device: &B::Device) -> Self {
        let upsample = Interpolate2dConfig::new()
            .with_scale_factor(Some([2.0, 2.0]))
            .with_mode(InterpolateMode::Nearest)
            .init();

        Self {
            conv1: conv3x3([CONV_BOTTLENECK_CHANNELS, 8], device),
            conv2: conv3x3([8, 16], device),
            conv3: conv3x3([16, 16], device),
            conv4: conv3x3([16, 32], device),
            output_conv: conv3x3([32, config.channels], device),
            upsample,
            activation: Relu::new(),
            grid: config.conv_grid(),
        }
    }

    /// Decodes `[batch, latent_dim]` codes into `[batch, H, W, C]` images in `[0, 1]`.
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch, _] = latent.dims();
        let mut x = latent.reshape([batch, CONV_BOTTLENECK_CHANNELS, self.grid, self.grid]);

        for conv in [&self.conv1, &self.conv2, &self.conv3, &self.conv4] {
            x = self.activation.forward(conv.forward(x));
            x = self.upsample.forward(x);
        }

        let x = activation::sigmoid(self.output_conv.forward(x));

        // Back to channels last.
        x.permute([0, 2, 3, 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn conv3x3_starts_with_zero_bias() {
        let conv = conv3x3::<NdArray>([3, 16], &Default::default());

        let bias = conv.bias.as_ref().unwrap().val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(bias, vec![0.0; 16]);
    }
}
