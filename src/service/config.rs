use std::path::PathBuf;
use std::time::Duration;

/// Which way round ink and paper are in the images clients send.
///
/// The model is trained on bright ink over a dark background. Canvas drawings
/// and scanned digits are dark ink on white, so they are inverted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InkPolarity {
    #[default]
    DarkOnLight,
    LightOnDark,
}

/// Settings for the inference service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Serialized model produced by the trainer.
    pub model_path: PathBuf,
    /// Upper bound on a single model invocation.
    pub inference_timeout: Duration,
    /// Request bodies larger than this are refused.
    pub max_body_bytes: usize,
    pub ink: InkPolarity,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            model_path: PathBuf::from("./model/model.json"),
            inference_timeout: Duration::from_millis(10_000),
            max_body_bytes: 10 * 1024 * 1024,
            ink: InkPolarity::DarkOnLight,
        }
    }
}
