//! MNIST dataset loading
//!
//! Reads the four IDX files of the classic handwritten-digit corpus and
//! normalizes pixels to the channel statistics the classifier was tuned
//! for. Files are looked up first directly under the data directory,
//! then under the `MNIST/raw/` layout that dataset downloaders produce.

use crate::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Image side length in pixels
pub const IMAGE_SIDE: usize = 28;

/// Pixels per image
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;

/// Channel mean and standard deviation for normalization
const MEAN: f32 = 0.1307;
const STD: f32 = 0.3081;

/// IDX magic numbers (big-endian)
const IMAGE_MAGIC: u32 = 2051;
const LABEL_MAGIC: u32 = 2049;

/// A fully loaded split of MNIST
///
/// Images are stored as one flat normalized `f32` buffer, one 784-pixel
/// row per sample. Labels are the raw `0..=9` class indices.
pub struct MnistDataset {
    images: Vec<f32>,
    labels: Vec<u8>,
}

impl MnistDataset {
    /// Load the 60k-image training split from `dir`
    pub fn train(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load(
            dir.as_ref(),
            "train-images-idx3-ubyte",
            "train-labels-idx1-ubyte",
        )
    }

    /// Load the 10k-image test split from `dir`
    pub fn test(dir: impl AsRef<Path>) -> Result<Self> {
        Self::load(
            dir.as_ref(),
            "t10k-images-idx3-ubyte",
            "t10k-labels-idx1-ubyte",
        )
    }

    fn load(dir: &Path, images_name: &str, labels_name: &str) -> Result<Self> {
        let images_raw = fs::read(locate(dir, images_name)?)?;
        let labels_raw = fs::read(locate(dir, labels_name)?)?;

        let images = parse_images(&images_raw, images_name)?;
        let labels = parse_labels(&labels_raw, labels_name)?;

        let image_count = images.len() / IMAGE_PIXELS;
        if image_count != labels.len() {
            return Err(Error::Data(format!(
                "{images_name} holds {image_count} images but {labels_name} holds {} labels",
                labels.len()
            )));
        }

        Ok(Self { images, labels })
    }

    /// Number of samples in the split
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Normalized pixels of one image
    pub fn image(&self, index: usize) -> &[f32] {
        &self.images[index * IMAGE_PIXELS..(index + 1) * IMAGE_PIXELS]
    }

    /// Class index of one image
    pub fn label(&self, index: usize) -> u8 {
        self.labels[index]
    }

    /// Build an in-memory split for tests, no files involved
    #[cfg(test)]
    pub(crate) fn synthetic(count: usize) -> Self {
        let images = (0..count * IMAGE_PIXELS)
            .map(|i| ((i % 64) as f32 / 64.0 - MEAN) / STD)
            .collect();
        let labels = (0..count).map(|i| (i % 10) as u8).collect();
        Self { images, labels }
    }
}

/// Resolve a dataset file, probing `dir/name` then `dir/MNIST/raw/name`
fn locate(dir: &Path, name: &str) -> Result<PathBuf> {
    let direct = dir.join(name);
    if direct.is_file() {
        return Ok(direct);
    }

    let nested = dir.join("MNIST").join("raw").join(name);
    if nested.is_file() {
        return Ok(nested);
    }

    Err(Error::Data(format!(
        "{name} not found under {} (also tried MNIST/raw/)",
        dir.display()
    )))
}

fn read_u32(bytes: &[u8], offset: usize, name: &str) -> Result<u32> {
    let end = offset + 4;
    if bytes.len() < end {
        return Err(Error::Data(format!("{name} is truncated")));
    }
    let word = [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]];
    Ok(u32::from_be_bytes(word))
}

fn parse_images(bytes: &[u8], name: &str) -> Result<Vec<f32>> {
    let magic = read_u32(bytes, 0, name)?;
    if magic != IMAGE_MAGIC {
        return Err(Error::Data(format!(
            "{name} has magic {magic}, expected {IMAGE_MAGIC}"
        )));
    }

    let count = read_u32(bytes, 4, name)? as usize;
    let rows = read_u32(bytes, 8, name)? as usize;
    let cols = read_u32(bytes, 12, name)? as usize;
    if rows != IMAGE_SIDE || cols != IMAGE_SIDE {
        return Err(Error::Data(format!(
            "{name} holds {rows}×{cols} images, expected {IMAGE_SIDE}×{IMAGE_SIDE}"
        )));
    }

    let expected = 16 + count * IMAGE_PIXELS;
    if bytes.len() != expected {
        return Err(Error::Data(format!(
            "{name} is {} bytes, expected {expected}",
            bytes.len()
        )));
    }

    let images = bytes[16..]
        .iter()
        .map(|&p| (p as f32 / 255.0 - MEAN) / STD)
        .collect();
    Ok(images)
}

fn parse_labels(bytes: &[u8], name: &str) -> Result<Vec<u8>> {
    let magic = read_u32(bytes, 0, name)?;
    if magic != LABEL_MAGIC {
        return Err(Error::Data(format!(
            "{name} has magic {magic}, expected {LABEL_MAGIC}"
        )));
    }

    let count = read_u32(bytes, 4, name)? as usize;
    let expected = 8 + count;
    if bytes.len() != expected {
        return Err(Error::Data(format!(
            "{name} is {} bytes, expected {expected}",
            bytes.len()
        )));
    }

    let labels = bytes[8..].to_vec();
    if let Some(bad) = labels.iter().find(|&&l| l > 9) {
        return Err(Error::Data(format!("{name} holds label {bad}, expected 0..=9")));
    }
    Ok(labels)
}
