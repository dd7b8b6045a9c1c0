//! Inference-only generation: decode hand-built latent vectors with a trained decoder.

use std::path::Path;

use burn::{
    config::Config,
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::{Tensor, TensorData, backend::Backend},
};
use image::{Rgb, RgbImage};
use tracing::info;

use crate::config::AaeConfig;
use crate::error::{AaeError, Result};
use crate::model::{AdversarialAutoencoder, Decoder};
use crate::run_dir::RunDirectory;

// --- GRID ---

/// Evenly spaced sweep `start, start + step, …` stopping before `end`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridSpec {
    pub start: f32,
    pub end: f32,
    pub step: f32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            start: -10.0,
            end: 10.0,
            step: 1.5,
        }
    }
}

impl GridSpec {
    pub fn points(&self) -> Result<Vec<f32>> {
        if !(self.step > 0.0) || !(self.end > self.start) {
            return Err(AaeError::InvalidConfig(format!(
                "grid needs start < end and a positive step, got {self:?}"
            )));
        }
        let count = ((self.end - self.start) / self.step).ceil() as usize;
        Ok((0..count).map(|i| self.start + i as f32 * self.step).collect())
    }
}

/// Latent vectors laid out as a `rows × cols` grid, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentGrid {
    pub rows: usize,
    pub cols: usize,
    pub latents: Vec<Vec<f32>>,
}

/// Sweeps latent dimension 0 down the rows and dimension 1 across the columns;
/// all other dimensions stay at zero. A one-dimensional latent space gives a single row.
pub fn grid_latents(spec: &GridSpec, latent_dim: usize) -> Result<LatentGrid> {
    let points = spec.points()?;

    if latent_dim == 1 {
        return Ok(LatentGrid {
            rows: 1,
            cols: points.len(),
            latents: points.iter().map(|&x| vec![x]).collect(),
        });
    }

    let mut latents = Vec::with_capacity(points.len() * points.len());
    for &x in &points {
        for &y in &points {
            let mut z = vec![0.0; latent_dim];
            z[0] = x;
            z[1] = y;
            latents.push(z);
        }
    }

    Ok(LatentGrid {
        rows: points.len(),
        cols: points.len(),
        latents,
    })
}

// --- GENERATOR ---

/// A trained decoder restored from a checkpoint.
pub struct Generator<B: Backend> {
    config: AaeConfig,
    decoder: Decoder<B>,
    device: B::Device,
}

/// Decoded images arranged as a grid.
#[derive(Clone, Debug)]
pub struct ImageGrid {
    pub rows: usize,
    pub cols: usize,
    pub image_size: usize,
    pub channels: usize,
    /// One `H × W × C` buffer per cell, row-major.
    pub images: Vec<Vec<f32>>,
}

impl<B: Backend> Generator<B> {
    /// Loads the newest checkpoint of the most recent run under `results_root`.
    pub fn from_latest_run(results_root: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let run = RunDirectory::latest(results_root)?;
        Self::from_run(&run, device)
    }

    /// Loads the newest checkpoint of `run`, rebuilding the architecture from its config.
    pub fn from_run(run: &RunDirectory, device: &B::Device) -> Result<Self> {
        let checkpoint = run.latest_checkpoint()?;
        let config = AaeConfig::load(run.config_path())
            .map_err(|e| AaeError::InvalidConfig(format!("{e:?}")))?;

        info!("loading {}", checkpoint.display());
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        let model = AdversarialAutoencoder::<B>::new(&config, device)?
            .load_file(checkpoint, &recorder, device)
            .map_err(|e| AaeError::Checkpoint(format!("{e:?}")))?;

        Ok(Self {
            config,
            decoder: model.autoencoder.decoder,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &AaeConfig {
        &self.config
    }

    /// Decodes a single latent vector into `H × W × C` pixels.
    pub fn decode(&self, latent: &[f32]) -> Result<Vec<f32>> {
        let latent_dim = self.config.latent_dim;
        if latent.len() != latent_dim {
            return Err(AaeError::InvalidData(format!(
                "latent vector has {} values but the decoder expects {latent_dim}",
                latent.len()
            )));
        }

        let z = Tensor::<B, 2>::from_data(
            TensorData::new(latent.to_vec(), [1, latent_dim]),
            &self.device,
        );
        self.decoder
            .forward(z)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| AaeError::InvalidData(format!("{e:?}")))
    }

    /// Decodes every cell of the sweep described by `spec`.
    pub fn generate_grid(&self, spec: &GridSpec) -> Result<ImageGrid> {
        let grid = grid_latents(spec, self.config.latent_dim)?;
        let images = grid
            .latents
            .iter()
            .map(|z| self.decode(z))
            .collect::<Result<Vec<_>>>()?;

        Ok(ImageGrid {
            rows: grid.rows,
            cols: grid.cols,
            image_size: self.config.image_size,
            channels: self.config.channels,
            images,
        })
    }
}

impl ImageGrid {
    /// Tiles the cells into one RGB picture. Gray images are replicated across
    /// R, G and B; alpha is dropped.
    pub fn to_image(&self) -> RgbImage {
        let size = self.image_size as u32;
        let mut canvas = RgbImage::new(self.cols as u32 * size, self.rows as u32 * size);

        for (cell, pixels) in self.images.iter().enumerate() {
            let x0 = (cell % self.cols) as u32 * size;
            let y0 = (cell / self.cols) as u32 * size;
            for (i, px) in pixels.chunks_exact(self.channels).enumerate() {
                let x = x0 + (i % self.image_size) as u32;
                let y = y0 + (i / self.image_size) as u32;
                canvas.put_pixel(x, y, to_rgb(px));
            }
        }
        canvas
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.to_image().save(path)?;
        info!("saved {}x{} grid to {}", self.rows, self.cols, path.display());
        Ok(())
    }
}

/// Scales `[0, 1]` channel values to bytes.
fn to_rgb(px: &[f32]) -> Rgb<u8> {
    let byte = |v: f32| (v * 255.0).clamp(0.0, 255.0) as u8;
    match px {
        [g] => Rgb([byte(*g); 3]),
        [r, g, b, ..] => Rgb([byte(*r), byte(*g), byte(*b)]),
        _ => Rgb([0, 0, 0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sweep_matches_fourteen_points() {
        let points = GridSpec::default().points().unwrap();
        assert_eq!(points.len(), 14);
        assert_eq!(points[0], -10.0);
        assert_eq!(points[13], 9.5);
    }

    #[test]
    fn grid_varies_first_two_dimensions_only() {
        let spec = GridSpec {
            start: -1.0,
            end: 1.0,
            step: 1.0,
        };
        let grid = grid_latents(&spec, 4).unwrap();

        assert_eq!((grid.rows, grid.cols), (2, 2));
        assert_eq!(
            grid.latents,
            vec![
                vec![-1.0, -1.0, 0.0, 0.0],
                vec![-1.0, 0.0, 0.0, 0.0],
                vec![0.0, -1.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0, 0.0],
            ]
        );
    }

    #[test]
    fn one_dimensional_latent_gives_a_single_row() {
        let grid = grid_latents(&GridSpec::default(), 1).unwrap();
        assert_eq!((grid.rows, grid.cols), (1, 14));
    }

    #[test]
    fn degenerate_sweep_is_rejected() {
        let spec = GridSpec {
            start: 0.0,
            end: 1.0,
            step: 0.0,
        };
        assert!(spec.points().is_err());
    }

    #[test]
    fn grid_image_tiles_cells() {
        let grid = ImageGrid {
            rows: 1,
            cols: 2,
            image_size: 2,
            channels: 1,
            images: vec![vec![0.0; 4], vec![1.0; 4]],
        };
        let img = grid.to_image();

        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(1, 1), &Rgb([0, 0, 0]));
        assert_eq!(img.get_pixel(2, 0), &Rgb([255, 255, 255]));
    }
}
