pub mod callbacks;
pub mod epoch_stats;
pub mod loop_fn;
pub mod tracker;
pub mod train_config;
pub mod trainer;

pub use callbacks::{EarlyStopping, ReduceLrOnPlateau};
pub use epoch_stats::EpochStats;
pub use loop_fn::{evaluate, train_loop};
pub use tracker::{ExperimentTracker, JsonlTracker, NoopTracker};
pub use train_config::{EarlyStoppingConfig, ReduceLrConfig, TrainConfig};
pub use trainer::{run_training, TrainingReport, MODEL_FILE};
