use std::fs::File;
use std::path::Path;

use log::info;

use crate::data::digit_csv::parse_digit_csv;
use crate::data::dataset::{DigitSet, PreparedDataset};
use crate::data::split::stratified_split;
use crate::data::{CSV_FILE, SAMPLE_SHAPE};
use crate::error::{Error, Result};

pub const TEST_FRACTION: f64 = 0.2;
pub const SPLIT_SEED: u64 = 42;

/// Summary of one preparation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparationReport {
    pub total_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    /// Distinct labels present in the training split.
    pub num_classes: usize,
}

/// Reads `<input_dir>/mnist_full.csv`, normalizes it, splits it 80/20 by
/// class and writes the four `.npy` arrays into `output_dir`.
pub fn run_preparation(input_dir: &Path, output_dir: &Path) -> Result<PreparationReport> {
    let csv_path = input_dir.join(CSV_FILE);
    if !csv_path.is_file() {
        return Err(Error::missing(csv_path));
    }

    info!("Loading digits from {}", csv_path.display());
    let raw = parse_digit_csv(File::open(&csv_path)?)?;
    info!("Loaded {} samples", raw.len());

    let images: Vec<f32> = raw.pixels.iter().map(|&p| p as f32 / 255.0).collect();
    let all = DigitSet::new(images, raw.labels)?;

    let split = stratified_split(&all.labels, TEST_FRACTION, SPLIT_SEED);
    let prepared = PreparedDataset {
        train: all.select(&split.train),
        test: all.select(&split.test),
    };

    info!("Saving prepared arrays to {}", output_dir.display());
    prepared.save(output_dir)?;

    let mut seen = [false; 256];
    prepared.train.labels.iter().for_each(|&l| seen[l as usize] = true);
    let report = PreparationReport {
        total_samples: all.len(),
        train_samples: prepared.train.len(),
        test_samples: prepared.test.len(),
        num_classes: seen.iter().filter(|&&s| s).count(),
    };

    info!("Training samples: {}", report.train_samples);
    info!("Test samples: {}", report.test_samples);
    info!("Image shape: {:?}", SAMPLE_SHAPE);
    info!("Number of classes: {}", report.num_classes);
    Ok(report)
}
