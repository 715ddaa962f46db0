use crate::config::ConfigError;
use crate::predict::error::{ModelError, PredictError};
use crate::series::error::SeriesError;
use crate::sources::error::SourceError;
use crate::types::pollutant::Pollutant;
use polars::error::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AircastError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Series(#[from] SeriesError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to build table: {0}")]
    Frame(#[from] PolarsError),

    #[error("Failed to write '{0}'")]
    Write(std::path::PathBuf, #[source] std::io::Error),

    #[error("Failed to determine model directory")]
    ModelDirResolution(#[source] std::io::Error),

    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("No source could provide {0}")]
    NoSource(Pollutant),

    #[error("No forecast data available")]
    NoForecastData,

    #[error("No current air-quality data available")]
    NoCurrentData,
}
