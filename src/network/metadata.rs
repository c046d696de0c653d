use serde::{Deserialize, Serialize};

/// Describes how to interpret the input fed to a Network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InputType {
    /// Grayscale image of width×height, normalized to [0, 1], bright ink on a dark background.
    ImageGrayscale { width: u32, height: u32 },
}

/// Optional annotations attached to a saved Network.
/// All fields are Option<> so models without metadata deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub description: Option<String>,
    pub input_type: Option<InputType>,
    /// Human-readable class labels for the output layer (e.g. ["0","1",...,"9"]).
    pub output_labels: Option<Vec<String>>,
}

impl ModelMetadata {
    pub fn mnist_digits() -> ModelMetadata {
        ModelMetadata {
            description: Some("MNIST handwritten digit classifier".into()),
            input_type: Some(InputType::ImageGrayscale { width: 28, height: 28 }),
            output_labels: Some((0..10).map(|d| d.to_string()).collect()),
        }
    }
}
