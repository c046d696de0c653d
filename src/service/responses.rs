use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub classes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_source: String,
    pub model_name: String,
    pub model_type: String,
    pub classes: Vec<u8>,
    pub input_size: String,
    pub framework: String,
    pub deployment: String,
}

/// `/predict` success body; probabilities keyed by digit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadPrediction {
    pub success: bool,
    pub filename: Option<String>,
    pub predicted_digit: usize,
    pub confidence: f32,
    pub all_probabilities: BTreeMap<String, f32>,
}

/// `/predict-drawing` success body; probabilities in digit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingPrediction {
    pub success: bool,
    pub predicted_digit: usize,
    pub confidence: f32,
    pub all_probabilities: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> ErrorResponse {
        ErrorResponse { success: false, error: error.into() }
    }
}

/// A classification result as sent over the wire: either body, always HTTP 200.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply<T> {
    Success(T),
    Failure(ErrorResponse),
}

/// Body of `POST /predict-drawing`.
#[derive(Debug, Clone, Deserialize)]
pub struct DrawingRequest {
    pub image: String,
}
