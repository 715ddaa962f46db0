//! Client for the Open-Meteo ERA5 archive, weather forecast and CAMS air-quality APIs.

use crate::config::AircastConfig;
use crate::series::time_series::TimeSeries;
use crate::sources::error::SourceError;
use crate::sources::{
    AirDataSource, Snapshot, CURRENT_POLLUTANTS, CURRENT_WEATHER_VARIABLES, FORECAST_POLLUTANTS,
    HISTORY_POLLUTANTS, METEOROLOGY_VARIABLES,
};
use crate::types::location::LatLon;
use crate::types::pollutant::Pollutant;
use crate::utils::forecast_days;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use futures_util::future::join_all;
use log::{info, warn};
use reqwest::Client;
use serde_json::Value;

pub const ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/era5";
pub const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const AIR_QUALITY_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";

pub struct OpenMeteoSource {
    client: Client,
    chunk_days: i64,
}

impl OpenMeteoSource {
    pub fn new(config: &AircastConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(SourceError::ClientBuild)?;
        Ok(Self {
            client,
            chunk_days: config.aq_history_chunk_days.max(1),
        })
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, SourceError> {
        info!("Requesting {}", url);
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| SourceError::NetworkRequest(url.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(if let Some(status) = e.status() {
                    SourceError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    SourceError::NetworkRequest(url.to_string(), e)
                });
            }
        };

        response
            .json::<Value>()
            .await
            .map_err(|e| SourceError::Decode(url.to_string(), e))
    }

    fn location_params(location: LatLon) -> Vec<(&'static str, String)> {
        vec![
            ("latitude", location.lat().to_string()),
            ("longitude", location.lon().to_string()),
            ("timezone", "UTC".to_string()),
        ]
    }

    async fn air_quality_chunk(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        let mut params = Self::location_params(location);
        params.push(("hourly", provider_fields(&HISTORY_POLLUTANTS)));
        params.push(("start_date", start.date_naive().to_string()));
        // Inclusive, so the current day is not missed.
        params.push(("end_date", end.date_naive().to_string()));
        let js = self.get_json(AIR_QUALITY_URL, &params).await?;
        parse_hourly(&js)
    }
}

fn provider_fields(pollutants: &[Pollutant]) -> String {
    pollutants
        .iter()
        .map(Pollutant::provider_field)
        .collect::<Vec<_>>()
        .join(",")
}

/// `[start, end]` split into consecutive windows of at most `chunk_days` days.
pub fn date_chunks(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    chunk_days: i64,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut chunks = Vec::new();
    let mut cur = start;
    while cur < end {
        let next = (cur + Duration::days(chunk_days)).min(end);
        chunks.push((cur, next));
        cur = next;
    }
    chunks
}

/// Parses an Open-Meteo timestamp (`2025-01-01T13:00`, with or without seconds, or RFC 3339).
pub fn parse_time(raw: &str) -> Result<DateTime<Utc>, SourceError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| SourceError::Timestamp(raw.to_string(), e))
}

/// Converts the `hourly` block of a response to a series. A response without it (or
/// without a `time` array) gives an empty series; missing and non-numeric cells are
/// undefined. Rows whose timestamp does not parse are skipped with a warning.
pub fn parse_hourly(js: &Value) -> Result<TimeSeries, SourceError> {
    let Some(hourly) = js.get("hourly").and_then(Value::as_object) else {
        return Ok(TimeSeries::empty());
    };
    let Some(times) = hourly.get("time").and_then(Value::as_array) else {
        return Ok(TimeSeries::empty());
    };

    let mut rows = Vec::with_capacity(times.len());
    let mut timestamps = Vec::with_capacity(times.len());
    for (i, raw) in times.iter().enumerate() {
        let Some(raw) = raw.as_str() else {
            continue;
        };
        match parse_time(raw) {
            Ok(ts) => {
                rows.push(i);
                timestamps.push(ts);
            }
            Err(e) => warn!("Skipping hourly row {}: {}", i, e),
        }
    }

    let columns = hourly
        .iter()
        .filter(|(name, _)| name.as_str() != "time")
        .filter_map(|(name, values)| {
            let values = values.as_array()?;
            let column: Vec<Option<f64>> = rows
                .iter()
                .map(|&i| values.get(i).and_then(Value::as_f64))
                .collect();
            Some((name.clone(), column))
        });
    Ok(TimeSeries::from_columns(&timestamps, columns)?)
}

/// Converts the `current` block of a response to a snapshot.
pub fn parse_current(js: &Value) -> Result<Snapshot, SourceError> {
    let Some(current) = js.get("current").and_then(Value::as_object) else {
        return Ok(Snapshot::default());
    };
    let time = current
        .get("time")
        .and_then(Value::as_str)
        .map(parse_time)
        .transpose()?;
    let values = current
        .iter()
        .filter(|(name, _)| !matches!(name.as_str(), "time" | "interval"))
        .map(|(name, value)| (name.clone(), value.as_f64()))
        .collect();
    Ok(Snapshot { time, values })
}

impl AirDataSource for OpenMeteoSource {
    async fn meteorology_history(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        let mut params = Self::location_params(location);
        params.push(("start_date", start.date_naive().to_string()));
        // The archive is end-exclusive by date.
        params.push((
            "end_date",
            (end - Duration::days(1)).date_naive().to_string(),
        ));
        params.push(("hourly", METEOROLOGY_VARIABLES.join(",")));
        let js = self.get_json(ARCHIVE_URL, &params).await?;
        parse_hourly(&js)
    }

    async fn meteorology_forecast(
        &self,
        location: LatLon,
        hours: usize,
    ) -> Result<TimeSeries, SourceError> {
        let mut params = Self::location_params(location);
        params.push(("hourly", METEOROLOGY_VARIABLES.join(",")));
        params.push(("forecast_days", forecast_days(hours).to_string()));
        let js = self.get_json(FORECAST_URL, &params).await?;
        parse_hourly(&js)
    }

    async fn air_quality_history(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeries>, SourceError> {
        let chunks = date_chunks(start, end, self.chunk_days);
        let results = join_all(
            chunks
                .iter()
                .map(|(from, to)| self.air_quality_chunk(location, *from, *to)),
        )
        .await;

        let mut parts = Vec::with_capacity(results.len());
        for ((from, to), result) in chunks.iter().zip(results) {
            match result {
                Ok(series) => parts.push(series),
                Err(e) => warn!(
                    "Skipping air-quality chunk {} .. {}: {}",
                    from.date_naive(),
                    to.date_naive(),
                    e
                ),
            }
        }
        Ok(parts)
    }

    async fn air_quality_forecast(
        &self,
        location: LatLon,
        hours: usize,
    ) -> Result<TimeSeries, SourceError> {
        let mut params = Self::location_params(location);
        params.push(("hourly", provider_fields(&FORECAST_POLLUTANTS)));
        params.push(("forecast_days", forecast_days(hours).to_string()));
        let js = self.get_json(AIR_QUALITY_URL, &params).await?;
        parse_hourly(&js)
    }

    async fn current_air_quality(&self, location: LatLon) -> Result<Snapshot, SourceError> {
        let mut params = Self::location_params(location);
        params.push(("current", provider_fields(&CURRENT_POLLUTANTS)));
        let js = self.get_json(AIR_QUALITY_URL, &params).await?;
        parse_current(&js)
    }

    async fn current_weather(&self, location: LatLon) -> Result<Snapshot, SourceError> {
        let mut params = Self::location_params(location);
        params.push(("current", CURRENT_WEATHER_VARIABLES.join(",")));
        let js = self.get_json(FORECAST_URL, &params).await?;
        parse_current(&js)
    }
}
