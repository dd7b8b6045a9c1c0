//! Backends used by the binaries.
//!
//! WGPU (Metal on Mac, Vulkan/DX12 elsewhere) when the `wgpu` feature is on,
//! the CPU ndarray backend otherwise.

#[cfg(feature = "wgpu")]
pub type InferenceBackend = burn_wgpu::Wgpu;
#[cfg(not(feature = "wgpu"))]
pub type InferenceBackend = burn::backend::NdArray;

/// Autodiff wrapper required for gradient tracking during training.
pub type TrainBackend = burn::backend::Autodiff<InferenceBackend>;

/// The default device of [`InferenceBackend`]; for WGPU this picks the most powerful GPU.
pub fn default_device() -> <InferenceBackend as burn::tensor::backend::Backend>::Device {
    Default::default()
}
