pub mod classifier;
pub mod config;
pub mod model_slot;
pub mod preprocess;
pub mod responses;

pub use classifier::{DigitService, Prediction};
pub use config::{InkPolarity, ServiceConfig};
pub use model_slot::{DigitModel, FileModelLoader, ModelLoader, ModelSlot, ModelState};
pub use responses::{DrawingPrediction, DrawingRequest, ErrorResponse, HealthResponse, ModelInfo, Reply, UploadPrediction};
