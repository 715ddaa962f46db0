use crate::series::time_series::TimeSeries;
use crate::sources::error::SourceError;
use crate::sources::{AirDataSource, Snapshot};
use crate::types::location::LatLon;
use bon::Builder;
use chrono::{DateTime, Utc};

/// Identifies one [`AirDataSource`] call, for simulating failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCall {
    MeteorologyHistory,
    MeteorologyForecast,
    AirQualityHistory,
    AirQualityForecast,
    GroundObservations,
    CurrentAirQuality,
    CurrentWeather,
}

/// Replays fixed series regardless of location. History calls are cut to the requested
/// window; forecasts are returned whole.
///
/// # Examples
///
/// ```
/// use aircast::{MemorySource, SourceCall, TimeSeries};
///
/// let source = MemorySource::builder()
///     .air_quality_forecast(TimeSeries::empty())
///     .failing(vec![SourceCall::MeteorologyForecast])
///     .build();
/// assert!(source.fails(SourceCall::MeteorologyForecast));
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct MemorySource {
    #[builder(default)]
    pub meteorology_history: TimeSeries,
    #[builder(default)]
    pub meteorology_forecast: TimeSeries,
    #[builder(default)]
    pub air_quality_history: Vec<TimeSeries>,
    #[builder(default)]
    pub air_quality_forecast: TimeSeries,
    #[builder(default)]
    pub ground_observations: TimeSeries,
    #[builder(default)]
    pub current_air_quality: Snapshot,
    #[builder(default)]
    pub current_weather: Snapshot,
    /// Calls that return [`SourceError::Offline`].
    #[builder(default)]
    pub failing: Vec<SourceCall>,
}

impl MemorySource {
    pub fn fails(&self, call: SourceCall) -> bool {
        self.failing.contains(&call)
    }

    fn check(&self, call: SourceCall) -> Result<(), SourceError> {
        if self.fails(call) {
            return Err(SourceError::Offline(format!("memory:{:?}", call)));
        }
        Ok(())
    }
}

impl AirDataSource for MemorySource {
    async fn meteorology_history(
        &self,
        _location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        self.check(SourceCall::MeteorologyHistory)?;
        Ok(self.meteorology_history.between(start, end)?)
    }

    async fn meteorology_forecast(
        &self,
        _location: LatLon,
        _hours: usize,
    ) -> Result<TimeSeries, SourceError> {
        self.check(SourceCall::MeteorologyForecast)?;
        Ok(self.meteorology_forecast.clone())
    }

    async fn air_quality_history(
        &self,
        _location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeries>, SourceError> {
        self.check(SourceCall::AirQualityHistory)?;
        let parts = self
            .air_quality_history
            .iter()
            .map(|part| part.between(start, end))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(parts)
    }

    async fn air_quality_forecast(
        &self,
        _location: LatLon,
        _hours: usize,
    ) -> Result<TimeSeries, SourceError> {
        self.check(SourceCall::AirQualityForecast)?;
        Ok(self.air_quality_forecast.clone())
    }

    async fn ground_observations(
        &self,
        _location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        self.check(SourceCall::GroundObservations)?;
        Ok(self.ground_observations.between(start, end)?)
    }

    async fn current_air_quality(&self, _location: LatLon) -> Result<Snapshot, SourceError> {
        self.check(SourceCall::CurrentAirQuality)?;
        Ok(self.current_air_quality.clone())
    }

    async fn current_weather(&self, _location: LatLon) -> Result<Snapshot, SourceError> {
        self.check(SourceCall::CurrentWeather)?;
        Ok(self.current_weather.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[tokio::test]
    async fn test_history_is_windowed() -> Result<(), Box<dyn std::error::Error>> {
        let t0 = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let history = TimeSeries::with_index((0..10).map(|h| t0 + Duration::hours(h)).collect())?
            .with_field("temperature_2m", (0..10).map(|h| Some(h as f64)).collect())?;
        let source = MemorySource::builder()
            .meteorology_history(history)
            .build();
        let window = source
            .meteorology_history(LatLon(0.0, 0.0), t0 + Duration::hours(2), t0 + Duration::hours(4))
            .await?;
        assert_eq!(window.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_simulated_failure() {
        let source = MemorySource::builder()
            .failing(vec![SourceCall::AirQualityForecast])
            .build();
        let result = source.air_quality_forecast(LatLon(0.0, 0.0), 24).await;
        assert!(matches!(result, Err(SourceError::Offline(_))));
        let ok = source.ground_observations(LatLon(0.0, 0.0), Utc::now(), Utc::now()).await;
        assert!(ok.is_ok());
    }
}
