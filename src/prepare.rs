//! Turns a folder of arbitrary images into the fixed-size training array.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader, imageops::FilterType};
use tracing::{info, warn};

use crate::config::AaeConfig;
use crate::data::TrainingArray;
use crate::error::{AaeError, Result};

/// A file the preparer could not use, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of a preparation pass.
#[derive(Debug)]
pub struct PreparedData {
    /// Successfully decoded images, in input order.
    pub array: TrainingArray,
    /// Files that failed to open or decode.
    pub skipped: Vec<SkippedImage>,
}

/// Lists the regular files of `dir`, sorted by path.
///
/// No extension filtering happens here: anything that is not an image is
/// reported as skipped by [`prepare_training_data`].
pub fn collect_image_paths(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            paths.push(entry.path());
        }
    }
    paths.sort();
    Ok(paths)
}

/// Decodes, converts and resizes every path into one `[N, size, size, channels]` array.
///
/// Files that cannot be decoded are skipped and reported; they never abort the
/// pass. With nothing decodable the result is an empty array.
pub fn prepare_training_data<P: AsRef<Path>>(paths: &[P], config: &AaeConfig) -> Result<PreparedData> {
    if !matches!(config.channels, 1 | 3 | 4) || config.image_size == 0 {
        return Err(AaeError::InvalidConfig(format!(
            "cannot prepare {}x{} images with {} channels",
            config.image_size, config.image_size, config.channels
        )));
    }

    let size = config.image_size as u32;
    let mut pixels = Vec::new();
    let mut count = 0;
    let mut skipped = Vec::new();

    for path in paths {
        let path = path.as_ref();
        match decode(path) {
            Ok(img) => {
                pixels.extend(resize_to_pixels(&img, size, config.channels));
                count += 1;
            }
            Err(err) => {
                warn!("cannot rescale {}: {err}", path.display());
                skipped.push(SkippedImage {
                    path: path.to_path_buf(),
                    reason: err.to_string(),
                });
            }
        }
    }

    info!(
        "prepared {count} images of {size}x{size}x{}, skipped {}",
        config.channels,
        skipped.len()
    );

    let array = TrainingArray::new(
        pixels,
        [count, config.image_size, config.image_size, config.channels],
    )?;
    Ok(PreparedData { array, skipped })
}

/// Decodes by content, so files without a recognised extension still load.
fn decode(path: &Path) -> image::ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Converts to `channels` float channels in `[0, 1]` and resizes with a bilinear filter.
fn resize_to_pixels(img: &DynamicImage, size: u32, channels: usize) -> Vec<f32> {
    let filter = FilterType::Triangle;
    let raw = match channels {
        1 => image::imageops::resize(&img.to_luma32f(), size, size, filter).into_raw(),
        4 => image::imageops::resize(&img.to_rgba32f(), size, size, filter).into_raw(),
        _ => image::imageops::resize(&img.to_rgb32f(), size, size, filter).into_raw(),
    };
    // Filter weights can sum to a hair above one.
    raw.into_iter().map(|p| p.clamp(0.0, 1.0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TRAINING_DATA_FILE;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, 200])
        });
        let path = dir.join(name);
        img.save(&path).unwrap();
        path
    }

    fn config(channels: usize) -> AaeConfig {
        AaeConfig::new().with_image_size(16).with_channels(channels)
    }

    #[test]
    fn corrupt_file_is_skipped_and_reported() {
        let dir = TempDir::new().unwrap();
        let corrupt = dir.path().join("broken.png");
        std::fs::write(&corrupt, b"definitely not a png").unwrap();
        let paths = vec![
            write_png(dir.path(), "a.png", 30, 20),
            corrupt.clone(),
            write_png(dir.path(), "b.png", 5, 9),
            write_png(dir.path(), "c.png", 64, 64),
        ];

        let prepared = prepare_training_data(&paths, &config(3)).unwrap();

        assert_eq!(prepared.array.shape(), [3, 16, 16, 3]);
        assert_eq!(prepared.skipped.len(), 1);
        assert_eq!(prepared.skipped[0].path, corrupt);
    }

    #[test]
    fn any_input_size_round_trips_to_configured_shape() {
        let dir = TempDir::new().unwrap();
        let paths: Vec<_> = [(3, 3), (17, 40), (100, 7)]
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| write_png(dir.path(), &format!("{i}.png"), w, h))
            .collect();

        for channels in [1, 3, 4] {
            let prepared = prepare_training_data(&paths, &config(channels)).unwrap();
            let file = dir.path().join(TRAINING_DATA_FILE);
            prepared.array.save(&file).unwrap();
            let loaded = TrainingArray::load(&file).unwrap();

            assert_eq!(loaded.shape(), [3, 16, 16, channels]);
            assert!(loaded.pixels().iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn image_without_extension_is_decoded_by_content() {
        let dir = TempDir::new().unwrap();
        let png = write_png(dir.path(), "a.png", 12, 12);
        let bare = dir.path().join("img0001");
        std::fs::rename(&png, &bare).unwrap();

        let prepared = prepare_training_data(&[bare], &config(3)).unwrap();

        assert_eq!(prepared.array.num_images(), 1);
        assert!(prepared.skipped.is_empty());
    }

    #[test]
    fn nothing_decodable_yields_empty_array() {
        let dir = TempDir::new().unwrap();
        let junk = dir.path().join("junk.txt");
        std::fs::write(&junk, b"hello").unwrap();

        let prepared = prepare_training_data(&[junk, dir.path().join("missing.png")], &config(1)).unwrap();

        assert!(prepared.array.is_empty());
        assert_eq!(prepared.skipped.len(), 2);
    }

    #[test]
    fn directory_listing_is_sorted() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "b.png", 2, 2);
        write_png(dir.path(), "a.png", 2, 2);
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let paths = collect_image_paths(dir.path()).unwrap();

        let names: Vec<_> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.png", "b.png"]);
    }
}
