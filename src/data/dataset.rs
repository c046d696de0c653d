use std::path::Path;

use crate::data::{npy, IMAGE_PIXELS, NUM_CLASSES, SAMPLE_SHAPE};
use crate::data::{X_TEST_FILE, X_TRAIN_FILE, Y_TEST_FILE, Y_TRAIN_FILE};
use crate::error::{Error, Result};
use crate::math::tensor::Tensor;

/// Normalized images and their labels, order-aligned.
///
/// `images` holds `len() * 784` values in `[0, 1]`, one `(28, 28, 1)` image
/// after another.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DigitSet {
    pub images: Vec<f32>,
    pub labels: Vec<u8>,
}

impl DigitSet {
    pub fn new(images: Vec<f32>, labels: Vec<u8>) -> Result<DigitSet> {
        if images.len() != labels.len() * IMAGE_PIXELS {
            return Err(Error::ShapeMismatch(format!(
                "{} labels need {} pixel values, got {}",
                labels.len(), labels.len() * IMAGE_PIXELS, images.len()
            )));
        }
        Ok(DigitSet { images, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn image(&self, idx: usize) -> &[f32] {
        &self.images[idx * IMAGE_PIXELS..(idx + 1) * IMAGE_PIXELS]
    }

    /// Sample `idx` as a `(28, 28, 1)` tensor.
    pub fn tensor(&self, idx: usize) -> Tensor {
        Tensor { shape: SAMPLE_SHAPE.to_vec(), data: self.image(idx).to_vec() }
    }

    /// Copies the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> DigitSet {
        let mut images = Vec::with_capacity(indices.len() * IMAGE_PIXELS);
        for &i in indices {
            images.extend_from_slice(self.image(i));
        }
        DigitSet { images, labels: indices.iter().map(|&i| self.labels[i]).collect() }
    }

    /// Splits off the trailing `fraction` of rows: the first
    /// `floor((1 - fraction) * n)` stay for fitting, the rest validate.
    pub fn split_tail(&self, fraction: f64) -> (DigitSet, DigitSet) {
        let keep = ((1.0 - fraction) * self.len() as f64).floor() as usize;
        let keep = keep.min(self.len());
        let head: Vec<usize> = (0..keep).collect();
        let tail: Vec<usize> = (keep..self.len()).collect();
        (self.select(&head), self.select(&tail))
    }

    fn save(&self, dir: &Path, x_file: &str, y_file: &str) -> Result<()> {
        let n = self.len();
        npy::save_f32(&dir.join(x_file), &[n, SAMPLE_SHAPE[0], SAMPLE_SHAPE[1], SAMPLE_SHAPE[2]], &self.images)?;
        let labels: Vec<i64> = self.labels.iter().map(|&l| l as i64).collect();
        npy::save_i64(&dir.join(y_file), &[n], &labels)
    }

    fn load(dir: &Path, x_file: &str, y_file: &str) -> Result<DigitSet> {
        let x_path = dir.join(x_file);
        let y_path = dir.join(y_file);
        let (x_shape, images) = npy::load_f32(&x_path)?;
        let (y_shape, raw_labels) = npy::load_i64(&y_path)?;

        if x_shape.len() != 4 || x_shape[1..] != SAMPLE_SHAPE {
            return Err(Error::ShapeMismatch(format!(
                "{} has shape {:?}, expected (n, 28, 28, 1)", x_path.display(), x_shape
            )));
        }
        if y_shape.len() != 1 {
            return Err(Error::ShapeMismatch(format!(
                "{} has shape {:?}, expected (n,)", y_path.display(), y_shape
            )));
        }
        if x_shape[0] != y_shape[0] {
            return Err(Error::ShapeMismatch(format!(
                "{} holds {} images but {} holds {} labels",
                x_path.display(), x_shape[0], y_path.display(), y_shape[0]
            )));
        }

        let labels = raw_labels.iter()
            .map(|&l| {
                if (0..NUM_CLASSES as i64).contains(&l) {
                    Ok(l as u8)
                } else {
                    Err(Error::ShapeMismatch(format!("{} contains label {}", y_path.display(), l)))
                }
            })
            .collect::<Result<Vec<u8>>>()?;

        DigitSet::new(images, labels)
    }
}

/// The four arrays the preparer writes and the trainer reads.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    pub train: DigitSet,
    pub test: DigitSet,
}

impl PreparedDataset {
    /// Writes `x_train.npy`, `y_train.npy`, `x_test.npy`, `y_test.npy` into
    /// `dir`, creating it when needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.train.save(dir, X_TRAIN_FILE, Y_TRAIN_FILE)?;
        self.test.save(dir, X_TEST_FILE, Y_TEST_FILE)
    }

    pub fn load(dir: &Path) -> Result<PreparedDataset> {
        for file in [X_TRAIN_FILE, Y_TRAIN_FILE, X_TEST_FILE, Y_TEST_FILE] {
            let path = dir.join(file);
            if !path.exists() {
                return Err(Error::missing(path));
            }
        }
        Ok(PreparedDataset {
            train: DigitSet::load(dir, X_TRAIN_FILE, Y_TRAIN_FILE)?,
            test: DigitSet::load(dir, X_TEST_FILE, Y_TEST_FILE)?,
        })
    }
}
