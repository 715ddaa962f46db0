use crate::series::error::SeriesError;
use crate::types::pollutant::Pollutant;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Failed to read model file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to write model file '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode model bundle from '{0}'")]
    Decode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error("Failed to encode model bundle")]
    Encode(#[source] Box<bincode::error::EncodeError>),

    #[error("Model '{name}' expects {expected} features but {found} coefficients were given")]
    FeatureCountMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Model for {pollutant} returned {found} values for {expected} rows")]
    ModelOutputLength {
        pollutant: Pollutant,
        expected: usize,
        found: usize,
    },

    #[error("Failed to arrange model inputs")]
    Series(#[from] SeriesError),
}
