pub mod digit_csv;
pub mod dataset;
pub mod npy;
pub mod prepare;
pub mod split;

pub use digit_csv::{parse_digit_csv, RawDigits};
pub use dataset::{DigitSet, PreparedDataset};
pub use prepare::{run_preparation, PreparationReport};
pub use split::{stratified_split, SplitIndices};

/// Width and height of every digit image.
pub const IMAGE_SIDE: usize = 28;
pub const IMAGE_PIXELS: usize = IMAGE_SIDE * IMAGE_SIDE;
pub const NUM_CLASSES: usize = 10;

/// Shape of one sample, channels-last.
pub const SAMPLE_SHAPE: [usize; 3] = [IMAGE_SIDE, IMAGE_SIDE, 1];

pub const CSV_FILE: &str = "mnist_full.csv";
pub const X_TRAIN_FILE: &str = "x_train.npy";
pub const Y_TRAIN_FILE: &str = "y_train.npy";
pub const X_TEST_FILE: &str = "x_test.npy";
pub const Y_TEST_FILE: &str = "y_test.npy";
