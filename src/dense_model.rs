use burn::{
    module::{Module, Param},
    nn::{Initializer, Linear, LinearConfig, Relu},
    tensor::{Tensor, activation, backend::Backend},
};

use crate::config::AaeConfig;

/// Linear layer with the small-normal weights and zero biases every dense layer starts from.
pub(crate) fn dense_layer<B: Backend>(
    d_input: usize,
    d_output: usize,
    init_std: f64,
    device: &B::Device,
) -> Linear<B> {
    let mut layer = LinearConfig::new(d_input, d_output)
        .with_initializer(Initializer::Normal {
            mean: 0.0,
            std: init_std,
        })
        .init(device);
    // The initializer also fills the bias.
    layer.bias = Some(Param::from_tensor(Tensor::zeros([d_output], device)));
    layer
}

// --- ENCODER ---

/// Fully connected encoder: `H·W·C → hidden → hidden → latent`.
///
/// The last projection has no activation, so latent values are unconstrained
/// and free to follow whatever prior the discriminator enforces.
#[derive(Module, Debug)]
pub struct DenseEncoder<B: Backend> {
    hidden: Vec<Linear<B>>,
    latent: Linear<B>,
    activation: Relu,
}

impl<B: Backend> DenseEncoder<B> {
    pub fn new(config: &AaeConfig, device: &B::Device) -> Self {
        let h = config.hidden_dim;
        let hidden = vec![
            dense_layer(config.input_dim(), h, config.init_std, device),
            dense_layer(h, h, config.init_std, device),
        ];
        let latent = dense_layer(h, config.latent_dim, config.init_std, device);

        Self {
            hidden,
            latent,
            activation: Relu::new(),
        }
    }

    /// Encodes `[batch, H, W, C]` images into `[batch, latent_dim]` codes.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x: Tensor<B, 2> = images.flatten(1, 3);

        for layer in &self.hidden {
            x = layer.forward(x);
            x = self.activation.forward(x);
        }

        self.latent.forward(x)
    }
}

// --- DECODER ---

/// Mirror of [`DenseEncoder`], ending in a sigmoid over every pixel.
#[derive(Module, Debug)]
pub struct DenseDecoder<B: Backend> {
    hidden: Vec<Linear<B>>,
    output_layer: Linear<B>,
    activation: Relu,
    image_size: usize,
    channels: usize,
}

impl<B: Backend> DenseDecoder<B> {
    pub fn new(config: &AaeConfig, device: &B::Device) -> Self {
        let h = config.hidden_dim;
        let hidden = vec![
            dense_layer(config.latent_dim, h, config.init_std, device),
            dense_layer(h, h, config.init_std, device),
        ];
        let output_layer = dense_layer(h, config.input_dim(), config.init_std, device);

        Self {
            hidden,
            output_layer,
            activation: Relu::new(),
            image_size: config.image_size,
            channels: config.channels,
        }
    }

    /// Decodes `[batch, latent_dim]` codes into `[batch, H, W, C]` images in `[0, 1]`.
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 4> {
        let mut x = latent;

        for layer in &self.hidden {
            x = layer.forward(x);
            x = self.activation.forward(x);
        }

        let [batch, _] = x.dims();
        let pixels = activation::sigmoid(self.output_layer.forward(x));
        pixels.reshape([batch, self.image_size, self.image_size, self.channels])
    }
}
