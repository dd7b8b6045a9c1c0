use std::collections::HashMap;
use std::path::Path;

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{Tensor, TensorData, backend::Backend},
};
use safetensors::{Dtype, SafeTensors, tensor::TensorView};

use crate::error::{AaeError, Result};

/// Name of the tensor inside the training data container.
pub const TRAINING_TENSOR_NAME: &str = "training_data";

/// Default file name of the training data container.
pub const TRAINING_DATA_FILE: &str = "training_data.safetensors";

// --- Training Array ---

/// The prepared training set: `N` images of `[H, W, C]` `f32` pixels in `[0, 1]`,
/// stored row-major as one contiguous buffer.
///
/// Written once by the data preparer and read back by the trainer; nothing
/// mutates it in between. Shuffling is done on an index order, not on the
/// pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingArray {
    pixels: Vec<f32>,
    shape: [usize; 4],
}

/// One image of a [`TrainingArray`], `H × W × C` values.
#[derive(Clone, Debug)]
pub struct ImageItem {
    pub pixels: Vec<f32>,
}

impl TrainingArray {
    pub fn new(pixels: Vec<f32>, shape: [usize; 4]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if pixels.len() != expected {
            return Err(AaeError::InvalidData(format!(
                "{} values cannot fill shape {shape:?}",
                pixels.len()
            )));
        }
        Ok(Self { pixels, shape })
    }

    /// An array with no images but a fixed image geometry.
    pub fn empty(image_dims: [usize; 3]) -> Self {
        let [h, w, c] = image_dims;
        Self {
            pixels: Vec::new(),
            shape: [0, h, w, c],
        }
    }

    /// `[N, H, W, C]`.
    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    /// `[H, W, C]` of every image.
    pub fn image_dims(&self) -> [usize; 3] {
        let [_, h, w, c] = self.shape;
        [h, w, c]
    }

    pub fn num_images(&self) -> usize {
        self.shape[0]
    }

    pub fn is_empty(&self) -> bool {
        self.num_images() == 0
    }

    /// Pixels of image `index`.
    pub fn image(&self, index: usize) -> Option<&[f32]> {
        let stride = self.image_dims().iter().product::<usize>();
        let start = index.checked_mul(stride)?;
        self.pixels.get(start..start + stride)
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    /// Writes the array as a safetensors container holding the single tensor
    /// [`TRAINING_TENSOR_NAME`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let bytes: &[u8] = bytemuck::cast_slice(&self.pixels);
        let view = TensorView::new(Dtype::F32, self.shape.to_vec(), bytes)?;

        let [_, h, w, c] = self.shape;
        let mut metadata = HashMap::new();
        metadata.insert("height".to_string(), h.to_string());
        metadata.insert("width".to_string(), w.to_string());
        metadata.insert("channels".to_string(), c.to_string());

        let serialized = safetensors::serialize([(TRAINING_TENSOR_NAME, view)], Some(metadata))?;
        std::fs::write(path, serialized)?;
        Ok(())
    }

    /// Reads an array written by [`TrainingArray::save`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let (_, header) = SafeTensors::read_metadata(&bytes)?;
        let tensors = SafeTensors::deserialize(&bytes)?;
        let view = tensors.tensor(TRAINING_TENSOR_NAME)?;

        if view.dtype() != Dtype::F32 {
            return Err(AaeError::InvalidData(format!(
                "expected F32 pixels, found {:?}",
                view.dtype()
            )));
        }
        let shape: [usize; 4] = view.shape().try_into().map_err(|_| {
            AaeError::InvalidData(format!("expected a 4D tensor, found shape {:?}", view.shape()))
        })?;

        if let Some(metadata) = header.metadata() {
            let [_, h, w, c] = shape;
            for (key, dim) in [("height", h), ("width", w), ("channels", c)] {
                let Some(recorded) = metadata.get(key) else {
                    continue;
                };
                if recorded.parse::<usize>().ok() != Some(dim) {
                    return Err(AaeError::InvalidData(format!(
                        "metadata {key} = {recorded} disagrees with tensor shape {shape:?}"
                    )));
                }
            }
        }

        // The buffer is not guaranteed to be 4-byte aligned, so decode value by value.
        let pixels = view
            .data()
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Self::new(pixels, shape)
    }
}

impl Dataset<ImageItem> for TrainingArray {
    fn get(&self, index: usize) -> Option<ImageItem> {
        self.image(index).map(|pixels| ImageItem {
            pixels: pixels.to_vec(),
        })
    }

    fn len(&self) -> usize {
        self.num_images()
    }
}

// --- Batching ---

/// Stacks [`ImageItem`]s into a `[batch, H, W, C]` tensor.
///
/// The batcher holds only the image geometry; pixels are already normalized
/// by the data preparer, so they are copied through unchanged.
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    image_dims: [usize; 3],
}

impl ImageBatcher {
    pub fn new(image_dims: [usize; 3]) -> Self {
        Self { image_dims }
    }
}

impl<B: Backend> Batcher<B, ImageItem, Tensor<B, 4>> for ImageBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> Tensor<B, 4> {
        let [h, w, c] = self.image_dims;
        let batch_size = items.len();

        let pixels: Vec<f32> = items.into_iter().flat_map(|item| item.pixels).collect();

        Tensor::from_data(TensorData::new(pixels, [batch_size, h, w, c]), device)
    }
}
