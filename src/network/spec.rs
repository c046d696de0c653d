use serde::{Serialize, Deserialize};

use crate::activation::activation::ActivationFunction;
use crate::network::metadata::ModelMetadata;

/// Describes one layer of an architecture, independent of its weights.
/// Input sizes are not stored; they follow from the previous layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Conv2d { filters: usize, kernel_size: usize, activation: ActivationFunction },
    MaxPool2d { pool: usize },
    Flatten,
    Dropout { rate: f32 },
    Dense { size: usize, activation: ActivationFunction },
}

/// A fully serializable description of a network architecture plus optional
/// metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Human-readable name used in logs and model info.
    pub name: String,
    /// Shape of one input sample, channels-last.
    pub input_shape: Vec<usize>,
    /// Ordered list of layer descriptions (input → output).
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub metadata: Option<ModelMetadata>,
}

impl NetworkSpec {
    /// The fixed digit classifier topology:
    ///
    /// ```text
    /// (28, 28, 1) → Conv 32@3x3 ReLU → MaxPool 2 → Conv 64@3x3 ReLU → MaxPool 2
    ///             → Flatten → Dropout 0.5 → Dense 128 ReLU → Dropout 0.3 → Dense 10 Softmax
    /// ```
    pub fn digit_cnn() -> NetworkSpec {
        use ActivationFunction::{ReLU, Softmax};

        NetworkSpec {
            name: "mnist-digit-classifier".into(),
            input_shape: vec![28, 28, 1],
            layers: vec![
                LayerSpec::Conv2d { filters: 32, kernel_size: 3, activation: ReLU },
                LayerSpec::MaxPool2d { pool: 2 },
                LayerSpec::Conv2d { filters: 64, kernel_size: 3, activation: ReLU },
                LayerSpec::MaxPool2d { pool: 2 },
                LayerSpec::Flatten,
                LayerSpec::Dropout { rate: 0.5 },
                LayerSpec::Dense { size: 128, activation: ReLU },
                LayerSpec::Dropout { rate: 0.3 },
                LayerSpec::Dense { size: 10, activation: Softmax },
            ],
            metadata: Some(ModelMetadata::mnist_digits()),
        }
    }
}
