pub mod error;
pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;
pub mod data;
pub mod service;
pub mod server;

// Convenience re-exports
pub use error::{Error, Result};
pub use math::tensor::Tensor;
pub use activation::activation::ActivationFunction;
pub use layers::Layer;
pub use network::{Network, NetworkSpec, ModelMetadata};
pub use loss::SparseCrossEntropyLoss;
pub use optim::{Adam, Optimizer};
pub use train::{run_training, EpochStats, TrainConfig, TrainingReport};
pub use data::{run_preparation, DigitSet, PreparedDataset, PreparationReport};
pub use service::{DigitService, InkPolarity, ServiceConfig};
