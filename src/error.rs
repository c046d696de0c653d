use std::path::PathBuf;

/// Every failure the pipeline can report.
///
/// Batch jobs (preparation, training) treat all variants as fatal. The
/// inference service only ever sees `ModelLoad`, `Decode` and `Inference`,
/// and reports them in-band to the caller that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("required input not found: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("{0}")]
    ModelLoad(String),

    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Inference(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn missing(path: impl Into<PathBuf>) -> Self {
        Error::MissingInput { path: path.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
