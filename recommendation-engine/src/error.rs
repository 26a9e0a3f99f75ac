use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cached computation failed: {0}")]
    CacheComputation(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
