//! Ground-level observations from the OpenAQ measurements API.

use crate::config::AircastConfig;
use crate::frame::datetime_column;
use crate::series::error::SeriesError;
use crate::series::time_series::{SeriesLazyFrame, TimeSeries, DATETIME_COLUMN};
use crate::sources::error::SourceError;
use crate::sources::{AirDataSource, Snapshot, HISTORY_POLLUTANTS};
use crate::types::location::LatLon;
use crate::types::pollutant::Pollutant;
use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::future::join_all;
use log::{debug, info, warn};
use polars::prelude::{col, lit, Column, DataFrame, Expr, IntoLazy};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const MEASUREMENTS_URL: &str = "https://api.openaq.org/v2/measurements";
const PAGE_LIMIT: usize = 10_000;

#[derive(Debug, Deserialize)]
struct MeasurementsPage {
    #[serde(default)]
    results: Vec<Measurement>,
}

#[derive(Debug, Deserialize)]
struct Measurement {
    date: MeasurementDate,
    value: Option<f64>,
    #[serde(default)]
    unit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MeasurementDate {
    utc: String,
}

fn is_mass_concentration(unit: &Option<String>) -> bool {
    match unit.as_deref() {
        None => true,
        Some(u) => matches!(u, "µg/m³" | "μg/m³" | "ug/m3" | "µg/m3"),
    }
}

/// Adds OpenAQ station observations to another source. Every other call is delegated.
pub struct OpenAqSource<S> {
    inner: S,
    client: Client,
    radius_km: f64,
    max_pages: usize,
}

impl<S: AirDataSource> OpenAqSource<S> {
    pub fn new(inner: S, config: &AircastConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(SourceError::ClientBuild)?;
        Ok(Self {
            inner,
            client,
            radius_km: config.openaq_radius_km,
            max_pages: config.openaq_max_pages,
        })
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn fetch_page(
        &self,
        pollutant: Pollutant,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        page: usize,
    ) -> Result<MeasurementsPage, SourceError> {
        let params = [
            ("parameter", pollutant.openaq_parameter().to_string()),
            ("date_from", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("date_to", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("coordinates", format!("{},{}", location.lat(), location.lon())),
            ("radius", ((self.radius_km * 1000.0) as i64).to_string()),
            ("limit", PAGE_LIMIT.to_string()),
            ("page", page.to_string()),
            ("sort", "desc".to_string()),
            ("order_by", "datetime".to_string()),
            ("temporal", "hour".to_string()),
        ];
        let response = self
            .client
            .get(MEASUREMENTS_URL)
            .query(&params)
            .send()
            .await
            .map_err(|e| SourceError::NetworkRequest(MEASUREMENTS_URL.to_string(), e))?;
        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                return Err(if let Some(status) = e.status() {
                    SourceError::HttpStatus {
                        url: MEASUREMENTS_URL.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    SourceError::NetworkRequest(MEASUREMENTS_URL.to_string(), e)
                });
            }
        };
        response
            .json::<MeasurementsPage>()
            .await
            .map_err(|e| SourceError::Decode(MEASUREMENTS_URL.to_string(), e))
    }

    /// All pages of one parameter, stopping at the first empty page. A failing page ends
    /// the walk but keeps what was already collected.
    async fn fetch_parameter(
        &self,
        pollutant: Pollutant,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<(DateTime<Utc>, f64)>, SourceError> {
        let mut points = Vec::new();
        for page in 1..=self.max_pages {
            let result = match self.fetch_page(pollutant, location, start, end, page).await {
                Ok(result) => result,
                Err(e) if page == 1 => return Err(e),
                Err(e) => {
                    warn!("OpenAQ {} page {} failed: {}", pollutant, page, e);
                    break;
                }
            };
            if result.results.is_empty() {
                break;
            }
            points.extend(measurement_points(&result.results));
        }
        debug!("OpenAQ returned {} {} measurements", points.len(), pollutant);
        Ok(points)
    }
}

fn measurement_points(results: &[Measurement]) -> Vec<(DateTime<Utc>, f64)> {
    results
        .iter()
        .filter(|m| is_mass_concentration(&m.unit))
        .filter_map(|m| {
            let ts = DateTime::parse_from_rfc3339(&m.date.utc).ok()?;
            Some((ts.with_timezone(&Utc), m.value?))
        })
        .collect()
}

/// Averages all station measurements falling in the same hour.
pub fn hourly_mean(
    per_pollutant: &BTreeMap<Pollutant, Vec<(DateTime<Utc>, f64)>>,
) -> Result<TimeSeries, SeriesError> {
    if per_pollutant.values().all(|points| points.is_empty()) {
        return Ok(TimeSeries::empty());
    }
    let (mut timestamps, mut parameters, mut values) = (Vec::new(), Vec::new(), Vec::new());
    for (pollutant, points) in per_pollutant {
        for (ts, value) in points {
            timestamps.push(*ts);
            parameters.push(pollutant.key());
            values.push(*value);
        }
    }
    let frame = DataFrame::new(vec![
        datetime_column(DATETIME_COLUMN, &timestamps)?,
        Column::new("parameter".into(), parameters),
        Column::new("value".into(), values),
    ])?;
    let means: Vec<Expr> = per_pollutant
        .keys()
        .map(|pollutant| {
            col("value")
                .filter(col("parameter").eq(lit(pollutant.key())))
                .mean()
                .alias(pollutant.key())
        })
        .collect();
    let hourly = frame
        .lazy()
        .with_column(col(DATETIME_COLUMN).dt().truncate(lit("1h")))
        .group_by([col(DATETIME_COLUMN)])
        .agg(means);
    SeriesLazyFrame::new(hourly).collect()
}

impl<S: AirDataSource> AirDataSource for OpenAqSource<S> {
    async fn meteorology_history(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        self.inner.meteorology_history(location, start, end).await
    }

    async fn meteorology_forecast(
        &self,
        location: LatLon,
        hours: usize,
    ) -> Result<TimeSeries, SourceError> {
        self.inner.meteorology_forecast(location, hours).await
    }

    async fn air_quality_history(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimeSeries>, SourceError> {
        self.inner.air_quality_history(location, start, end).await
    }

    async fn air_quality_forecast(
        &self,
        location: LatLon,
        hours: usize,
    ) -> Result<TimeSeries, SourceError> {
        self.inner.air_quality_forecast(location, hours).await
    }

    async fn ground_observations(
        &self,
        location: LatLon,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<TimeSeries, SourceError> {
        let results = join_all(
            HISTORY_POLLUTANTS
                .iter()
                .map(|p| self.fetch_parameter(*p, location, start, end)),
        )
        .await;

        let mut per_pollutant = BTreeMap::new();
        for (pollutant, result) in HISTORY_POLLUTANTS.iter().zip(results) {
            match result {
                Ok(points) if !points.is_empty() => {
                    per_pollutant.insert(*pollutant, points);
                }
                Ok(_) => info!("No OpenAQ {} observations near {:?}", pollutant, location),
                Err(e) => warn!("OpenAQ {} unavailable: {}", pollutant, e),
            }
        }
        Ok(hourly_mean(&per_pollutant)?)
    }

    async fn current_air_quality(&self, location: LatLon) -> Result<Snapshot, SourceError> {
        self.inner.current_air_quality(location).await
    }

    async fn current_weather(&self, location: LatLon) -> Result<Snapshot, SourceError> {
        self.inner.current_weather(location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_page_decoding_and_unit_filter() {
        let page: MeasurementsPage = serde_json::from_str(
            r#"{
                "meta": {"found": 3},
                "results": [
                    {"date": {"utc": "2025-02-01T10:00:00+00:00"}, "value": 12.0, "unit": "µg/m³"},
                    {"date": {"utc": "2025-02-01T10:00:00+00:00"}, "value": 0.04, "unit": "ppm"},
                    {"date": {"utc": "2025-02-01T11:00:00Z"}, "value": null, "unit": "µg/m³"},
                    {"date": {"utc": "not a date"}, "value": 3.0}
                ]
            }"#,
        )
        .unwrap();
        let points = measurement_points(&page.results);
        assert_eq!(
            points,
            vec![(Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap(), 12.0)]
        );
    }

    #[test]
    fn test_empty_page() {
        let page: MeasurementsPage = serde_json::from_str(r#"{"meta": {}}"#).unwrap();
        assert!(page.results.is_empty());
    }

    #[test]
    fn test_hourly_mean_across_stations() -> Result<(), Box<dyn std::error::Error>> {
        let ten = Utc.with_ymd_and_hms(2025, 2, 1, 10, 0, 0).unwrap();
        let mut per_pollutant = BTreeMap::new();
        per_pollutant.insert(
            Pollutant::Pm25,
            vec![
                (ten + chrono::Duration::minutes(40), 20.0),
                (ten, 10.0),
                (ten + chrono::Duration::minutes(59), 30.0),
            ],
        );
        per_pollutant.insert(Pollutant::O3, vec![(ten + chrono::Duration::hours(1), 80.0)]);
        let series = hourly_mean(&per_pollutant)?;
        assert_eq!(series.index(), vec![ten, ten + chrono::Duration::hours(1)]);
        assert_eq!(series.field("pm25"), Some(vec![Some(20.0), None]));
        assert_eq!(series.field("o3"), Some(vec![None, Some(80.0)]));
        Ok(())
    }

    #[test]
    fn test_hourly_mean_without_observations() -> Result<(), Box<dyn std::error::Error>> {
        let mut per_pollutant = BTreeMap::new();
        assert!(hourly_mean(&per_pollutant)?.is_empty());
        per_pollutant.insert(Pollutant::No2, Vec::new());
        assert!(hourly_mean(&per_pollutant)?.is_empty());
        Ok(())
    }
}
