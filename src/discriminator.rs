use burn::{
    module::Module,
    nn::{Linear, Relu},
    tensor::{Tensor, backend::Backend},
};

use crate::config::AaeConfig;
use crate::dense_model::dense_layer;

/// Scores latent vectors as drawn from the prior (high) or produced by the encoder (low).
///
/// Outputs raw logits; the sigmoid lives inside the loss.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    hidden: Vec<Linear<B>>,
    output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> Discriminator<B> {
    pub fn new(config: &AaeConfig, device: &B::Device) -> Self {
        let h = config.hidden_dim;
        let hidden = vec![
            dense_layer(config.latent_dim, h, config.init_std, device),
            dense_layer(h, h, config.init_std, device),
        ];
        let output = dense_layer(h, 1, config.init_std, device);

        Self {
            hidden,
            output,
            activation: Relu::new(),
        }
    }

    /// Maps `[batch, latent_dim]` to `[batch, 1]` logits.
    pub fn forward(&self, latent: Tensor<B, 2>) -> Tensor<B, 2> {
        let mut x = latent;

        for layer in &self.hidden {
            x = self.activation.forward(layer.forward(x));
        }

        self.output.forward(x)
    }
}
