use crate::series::error::SeriesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to build HTTP client")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode response from {0}")]
    Decode(String, #[source] reqwest::Error),

    #[error("Unparseable timestamp '{0}'")]
    Timestamp(String, #[source] chrono::ParseError),

    #[error("Provider returned an inconsistent series")]
    Series(#[from] SeriesError),

    #[error("Source '{0}' is unavailable")]
    Offline(String),
}
