use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use crate::train::epoch_stats::EpochStats;

/// Stop when the monitored loss has not improved for `patience` epochs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EarlyStoppingConfig {
    pub patience: usize,
    /// An epoch counts as an improvement only if it beats the best loss by
    /// more than this.
    pub min_delta: f64,
    /// Put the best-scoring weights back once training ends.
    pub restore_best_weights: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        EarlyStoppingConfig { patience: 5, min_delta: 0.0, restore_best_weights: true }
    }
}

/// Multiply the learning rate by `factor` after `patience` epochs without
/// improvement, never going below `min_lr`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReduceLrConfig {
    pub factor: f64,
    pub patience: usize,
    pub min_delta: f64,
    pub min_lr: f64,
}

impl Default for ReduceLrConfig {
    fn default() -> Self {
        ReduceLrConfig { factor: 0.5, patience: 3, min_delta: 1e-4, min_lr: 1e-7 }
    }
}

/// Configuration for a `train_loop` run.
///
/// # Fields
/// - `epochs` - maximum number of full passes over the training data
/// - `batch_size` - samples per mini-batch
/// - `learning_rate` - initial Adam learning rate
/// - `validation_split` - trailing fraction of the training arrays held out
///   for validation (0 disables validation)
/// - `seed` - seeds weight init, shuffling and dropout masks
/// - `early_stopping` - optional early stopping policy
/// - `reduce_lr` - optional plateau learning-rate schedule
/// - `progress_tx` - optional channel sender; one `EpochStats` is sent per
///   completed epoch.  If the receiver is dropped the loop
///   terminates early.
/// - `stop_flag` - optional atomic flag; when set to `true` from another
///   thread the loop terminates after the current epoch.
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub validation_split: f64,
    pub seed: u64,
    pub early_stopping: Option<EarlyStoppingConfig>,
    pub reduce_lr: Option<ReduceLrConfig>,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// The digit trainer's policy: 10% validation, early stopping and plateau
    /// decay with their default settings, no progress channel, no stop flag.
    pub fn new(epochs: usize, batch_size: usize, learning_rate: f32) -> Self {
        TrainConfig {
            epochs,
            batch_size,
            learning_rate,
            validation_split: 0.1,
            seed: 42,
            early_stopping: Some(EarlyStoppingConfig::default()),
            reduce_lr: Some(ReduceLrConfig::default()),
            progress_tx: None,
            stop_flag: None,
        }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig::new(15, 128, 0.001)
    }
}
