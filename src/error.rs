use thiserror::Error;

/// Central error type for the tf-cluster-separator crate.
#[derive(Debug, Error)]
pub enum SeparationError {
    // Generic fallback (wraps anyhow)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),

    // Domain-specific variants
    #[error("Clustering error: {0}")]
    Clustering(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Model does not support `{0}`")]
    Unsupported(&'static str),

    #[error("Audio error: {0}")]
    Audio(String),
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for SeparationError {
    fn from(e: std::io::Error) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for SeparationError {
    fn from(e: serde_json::Error) -> Self {
        SeparationError::Anyhow(e.into())
    }
}

impl From<ndarray::ShapeError> for SeparationError {
    fn from(e: ndarray::ShapeError) -> Self {
        SeparationError::ShapeMismatch(e.to_string())
    }
}

impl From<hound::Error> for SeparationError {
    fn from(e: hound::Error) -> Self {
        SeparationError::Audio(e.to_string())
    }
}

impl From<symphonia::core::errors::Error> for SeparationError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        SeparationError::Audio(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SeparationError>;
