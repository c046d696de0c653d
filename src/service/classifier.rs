use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::data::NUM_CLASSES;
use crate::error::{Error, Result};
use crate::math::argmax;
use crate::math::tensor::Tensor;
use crate::service::config::ServiceConfig;
use crate::service::model_slot::{DigitModel, FileModelLoader, ModelLoader, ModelSlot};
use crate::service::preprocess::{decode_data_url, image_to_input};
use crate::service::responses::{
    DrawingPrediction, ErrorResponse, HealthResponse, ModelInfo, Reply, UploadPrediction,
};

/// One classified image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub digit: usize,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

/// The inference service: owns the model slot and the request-path settings.
pub struct DigitService {
    config: ServiceConfig,
    slot: ModelSlot,
}

impl DigitService {
    /// Service loading the model from `config.model_path`.
    pub fn new(config: ServiceConfig) -> DigitService {
        let loader = FileModelLoader::new(config.model_path.clone());
        DigitService::with_loader(config, Box::new(loader))
    }

    pub fn with_loader(config: ServiceConfig, loader: Box<dyn ModelLoader>) -> DigitService {
        DigitService { config, slot: ModelSlot::new(loader) }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn load_attempts(&self) -> usize {
        self.slot.load_attempts()
    }

    /// Startup load. A failure only logs; the next classification retries.
    pub fn warm_up(&self) {
        match self.slot.get_or_load() {
            Ok(_) => info!("Startup complete, model ready"),
            Err(e) => warn!("Failed to load model on startup: {}; will retry on first prediction", e),
        }
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: "healthy".into(),
            model_loaded: self.slot.is_loaded(),
            classes: (0..NUM_CLASSES as u8).collect(),
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            model_source: "digit-mlops training pipeline".into(),
            model_name: "mnist-digit-classifier".into(),
            model_type: "CNN (Convolutional Neural Network)".into(),
            classes: (0..NUM_CLASSES as u8).collect(),
            input_size: "28x28 grayscale images".into(),
            framework: "digit-mlops (Rust)".into(),
            deployment: "Standalone HTTP inference service".into(),
        }
    }

    /// Classifies an uploaded image file.
    pub fn classify_upload(&self, filename: Option<String>, bytes: &[u8]) -> Reply<UploadPrediction> {
        match self.classify(|| Ok(bytes.to_vec())) {
            Ok(p) => Reply::Success(UploadPrediction {
                success: true,
                filename,
                predicted_digit: p.digit,
                confidence: p.confidence,
                all_probabilities: p.probabilities.iter().enumerate()
                    .map(|(digit, &prob)| (digit.to_string(), prob))
                    .collect(),
            }),
            Err(reply) => Reply::Failure(reply),
        }
    }

    /// Classifies a canvas snapshot sent as a base64 data URL.
    pub fn classify_drawing(&self, data_url: &str) -> Reply<DrawingPrediction> {
        match self.classify(|| decode_data_url(data_url)) {
            Ok(p) => Reply::Success(DrawingPrediction {
                success: true,
                predicted_digit: p.digit,
                confidence: p.confidence,
                all_probabilities: p.probabilities,
            }),
            Err(reply) => Reply::Failure(reply),
        }
    }

    /// Model readiness first, then decoding, so a missing model is reported
    /// even for unreadable payloads.
    fn classify<F>(&self, image_bytes: F) -> std::result::Result<Prediction, ErrorResponse>
    where
        F: FnOnce() -> Result<Vec<u8>>,
    {
        let model = self.slot.get_or_load()
            .map_err(|e| ErrorResponse::new(format!("Model not loaded: {}", e)))?;

        let prediction = image_bytes()
            .and_then(|bytes| image_to_input(&bytes, self.config.ink))
            .and_then(|input| run_with_timeout(model, input, self.config.inference_timeout))
            .and_then(into_prediction);

        prediction.map_err(|e| {
            error!("Prediction failed: {}", e);
            ErrorResponse::new(e.to_string())
        })
    }
}

/// Runs the model on its own thread so a stuck invocation cannot hold the
/// request past `timeout`.
fn run_with_timeout(model: Arc<dyn DigitModel>, input: Tensor, timeout: Duration) -> Result<Vec<f32>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("inference".into())
        .spawn(move || {
            let _ = tx.send(model.predict(&input));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(Error::Inference(format!(
            "inference timed out after {} ms", timeout.as_millis()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(Error::Inference("inference worker stopped without a result".into()))
        }
    }
}

fn into_prediction(probabilities: Vec<f32>) -> Result<Prediction> {
    if probabilities.len() != NUM_CLASSES {
        return Err(Error::Inference(format!(
            "model returned {} outputs, expected {}", probabilities.len(), NUM_CLASSES
        )));
    }
    if probabilities.iter().any(|p| !p.is_finite()) {
        return Err(Error::Inference("model returned non-finite probabilities".into()));
    }
    let digit = argmax(&probabilities);
    Ok(Prediction { digit, confidence: probabilities[digit], probabilities })
}
