//! Error types for the nbeats-core crate.

use thiserror::Error;

/// Top-level error type for ensemble sweeps.
#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("Frequency must be one of the following: [Yearly, Quarterly, Monthly], not {0}")]
    UnsupportedFrequency(String),

    #[error("Invalid GPU configuration: {0}")]
    InvalidGpuConfig(String),

    #[error("Invalid hyperparameters: {}", .0.join("; "))]
    InvalidHyperparameters(Vec<String>),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Prediction error: {0}")]
    Prediction(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type Result<T, E = EnsembleError> = std::result::Result<T, E>;

impl EnsembleError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn prediction(msg: impl Into<String>) -> Self {
        Self::Prediction(msg.into())
    }

    pub fn aggregation(msg: impl Into<String>) -> Self {
        Self::Aggregation(msg.into())
    }

    pub fn gpu(msg: impl Into<String>) -> Self {
        Self::InvalidGpuConfig(msg.into())
    }
}

impl From<figment::Error> for EnsembleError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}
