use chrono::{DateTime, Utc};
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeriesError {
    #[error("Timestamp {0} is not aligned to a whole hour")]
    NotHourAligned(DateTime<Utc>),

    #[error("Timestamps must be strictly increasing, found {current} after {previous}")]
    NotIncreasing {
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Field '{field}' has {found} values but the index has {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        found: usize,
    },

    #[error("Field name '{0}' is reserved for the index")]
    ReservedField(String),

    #[error("Time-series frame operation failed")]
    Frame(#[from] PolarsError),
}
