//! Upstream data providers.
//!
//! The pipeline only talks to [`AirDataSource`]. [`OpenMeteoSource`] is the production
//! implementation, [`OpenAqSource`] layers ground observations on top of any other
//! source and [`MemorySource`] replays fixed series.

pub mod error;
pub mod memory;
pub mod open_meteo;
pub mod openaq;

use crate::series::time_series::TimeSeries;
use crate::sources::error::SourceError;
use crate::types::location::LatLon;
use crate::types::pollutant::Pollutant;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub use memory::{MemorySource, SourceCall};
pub use open_meteo::OpenMeteoSource;
pub use openaq::OpenAqSource;

/// Hourly meteorology variables requested from the provider, by provider name.
pub const METEOROLOGY_VARIABLES: [&str; 8] = [
    "temperature_2m",
    "relative_humidity_2m",
    "dew_point_2m",
    "wind_speed_10m",
    "wind_direction_10m",
    "surface_pressure",
    "precipitation",
    "shortwave_radiation",
];

/// Air-quality fields fetched for history.
pub const HISTORY_POLLUTANTS: [Pollutant; 3] = [Pollutant::Pm25, Pollutant::O3, Pollutant::No2];

/// Air-quality fields fetched for the short-range forecast.
pub const FORECAST_POLLUTANTS: [Pollutant; 4] =
    [Pollutant::Pm25, Pollutant::O3, Pollutant::No2, Pollutant::Pm10];

/// Air-quality fields of the current snapshot.
pub const CURRENT_POLLUTANTS: [Pollutant; 6] = Pollutant::ALL;

/// Weather fields of the current snapshot.
pub const CURRENT_WEATHER_VARIABLES: [&str; 5] = [
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "wind_direction_10m",
    "visibility",
];

/// Provider values at a single instant, by provider field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub time: Option<DateTime<Utc>>,
    pub values: BTreeMap<String, Option<f64>>,
}

impl Snapshot {
    pub fn get(&self, field: &str) -> Option<f64> {
        self.values.get(field).copied().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.values.values().all(Option::is_none)
    }
}

/// A provider of hourly meteorology and air-quality data.
///
/// Missing variables in a provider response yield partial or empty series, not errors.
/// Air-quality series use provider field names (`pm2_5`, `ozone`, ...); the aligner
/// maps them to canonical keys.
#[allow(async_fn_in_trait)]
pub trait AirDataSource {
    /// Observed meteorology for `[start, end)`.
    async fn meteorology_history(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError>;

    /// Forecast meteorology covering at least `hours` hours from now.
    async fn meteorology_forecast(
        &self,
        location: LatLon,
        hours: usize,
    ) -> Result<TimeSeries, SourceError>;

    /// Modelled air-quality history for `[start, end]`, possibly as several overlapping
    /// chunks.
    async fn air_quality_history(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeries>, SourceError>;

    /// Short-range air-quality forecast covering at least `hours` hours from now.
    async fn air_quality_forecast(
        &self,
        location: LatLon,
        hours: usize,
    ) -> Result<TimeSeries, SourceError>;

    /// Ground-level station observations, keyed by canonical pollutant keys.
    async fn ground_observations(
        &self,
        _location: LatLon,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        Ok(TimeSeries::empty())
    }

    async fn current_air_quality(&self, location: LatLon) -> Result<Snapshot, SourceError>;

    async fn current_weather(&self, location: LatLon) -> Result<Snapshot, SourceError>;
}
