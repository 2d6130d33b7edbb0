use thiserror::Error;

/// Failures of a single classification request. A low-confidence result is not
/// one of these; it is `Outcome::Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("cannot decode image: {0}")]
    Decode(String),

    #[error("Model not loaded")]
    ModelUnavailable,

    #[error("inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    pub fn inference(err: impl std::fmt::Display) -> Self {
        PipelineError::Inference(err.to_string())
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(err: image::ImageError) -> Self {
        PipelineError::Decode(err.to_string())
    }
}
