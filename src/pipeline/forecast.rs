use crate::config::AircastConfig;
use crate::error::AircastError;
use crate::features::builder::{build_features, FeatureSet};
use crate::predict::model::ModelRegistry;
use crate::predict::predictor::{Prediction, PredictionInput, PredictionSource, Predictor};
use crate::series::align::{align_hourly, canonicalize_air_quality, concat};
use crate::series::error::SeriesError;
use crate::series::time_series::{TimeSeries, DATETIME_COLUMN};
use crate::types::forecast_point::ForecastPoint;
use crate::types::location::LatLon;
use crate::types::pollutant::Pollutant;
use crate::utils::truncate_to_hour;
use chrono::{DateTime, Utc};
use log::{info, warn};
use polars::prelude::{col, lit};
use serde::Serialize;
use std::collections::BTreeMap;

/// Pollutants carried by every forecast point, in output order.
pub const FORECAST_POLLUTANTS: [Pollutant; 4] =
    [Pollutant::Pm25, Pollutant::O3, Pollutant::No2, Pollutant::Pm10];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRequest {
    pub location: LatLon,
    pub hours: usize,
    pub hist_hours: usize,
    pub now: DateTime<Utc>,
}

/// Raw provider data for one forecast.
#[derive(Debug, Clone, Default)]
pub struct ForecastInputs {
    pub meteorology_history: TimeSeries,
    pub meteorology_forecast: TimeSeries,
    pub air_quality_history: Vec<TimeSeries>,
    pub air_quality_forecast: TimeSeries,
}

/// An hourly air-quality forecast for one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub location: LatLon,
    pub generated_at: DateTime<Utc>,
    /// The first forecast hour.
    pub current: Option<ForecastPoint>,
    #[serde(rename = "forecast")]
    pub points: Vec<ForecastPoint>,
    /// Which strategy produced each pollutant.
    pub model_info: BTreeMap<Pollutant, PredictionSource>,
}

impl Forecast {
    /// Points whose overall AQI is at or above `threshold`.
    pub fn alerts(&self, threshold: u16) -> impl Iterator<Item = &ForecastPoint> {
        self.points.iter().filter(move |p| p.aqi.value >= threshold)
    }

    pub fn peak(&self) -> Option<&ForecastPoint> {
        self.points.iter().max_by_key(|p| p.aqi.value)
    }
}

// Forecast hours start at the current hour, on the meteorology forecast's index when
// there is one and on the air-quality forecast's otherwise.
fn forecast_grid(
    inputs: &ForecastInputs,
    now: DateTime<Utc>,
    hours: usize,
) -> Result<Vec<DateTime<Utc>>, SeriesError> {
    let source = if inputs.meteorology_forecast.is_empty() {
        &inputs.air_quality_forecast
    } else {
        &inputs.meteorology_forecast
    };
    let from = truncate_to_hour(now);
    let upcoming = source
        .lazy()
        .filter(col(DATETIME_COLUMN).gt_eq(lit(from.naive_utc())))
        .collect()?;
    Ok(upcoming.index().into_iter().take(hours).collect())
}

/// Computes a forecast from already fetched inputs. Pure: the same inputs give the same
/// forecast.
pub fn compute_forecast(
    request: &ForecastRequest,
    inputs: &ForecastInputs,
    models: &ModelRegistry,
    config: &AircastConfig,
) -> Result<Forecast, AircastError> {
    let grid = forecast_grid(inputs, request.now, request.hours)?;
    if grid.is_empty() {
        warn!("No forecast grid for {:?}", request.location);
        return Err(AircastError::NoForecastData);
    }

    let meteorology = concat([&inputs.meteorology_history, &inputs.meteorology_forecast])?;
    let aligned = align_hourly(&[], &inputs.air_quality_history)?;
    let short_range = canonicalize_air_quality(&inputs.air_quality_forecast)?;
    let predictor = Predictor::new(models, config.ffill_limit, config.use_models);

    let mut predictions: Vec<Prediction> = Vec::with_capacity(FORECAST_POLLUTANTS.len());
    for pollutant in FORECAST_POLLUTANTS {
        let features: Option<FeatureSet> = if config.use_models && models.get(pollutant).is_some() {
            let target = aligned
                .pollutants
                .series(pollutant)
                .cloned()
                .unwrap_or_default();
            Some(build_features(&meteorology, &target, pollutant.key())?)
        } else {
            None
        };
        let input = PredictionInput {
            grid: &grid,
            features: features.as_ref(),
            short_range: &short_range,
        };
        let prediction = predictor.predict(pollutant, &input)?;
        if !prediction.is_available() && config.required_pollutants.contains(&pollutant) {
            return Err(AircastError::NoSource(pollutant));
        }
        info!("{} forecast source: {:?}", pollutant, prediction.source);
        predictions.push(prediction);
    }

    let points: Vec<ForecastPoint> = grid
        .iter()
        .enumerate()
        .map(|(i, ts)| {
            let readings = predictions
                .iter()
                .map(|p| p.reading(i).in_aqi_unit())
                .collect();
            ForecastPoint::from_readings(*ts, readings, config.confidence(i))
        })
        .collect();

    Ok(Forecast {
        location: request.location,
        generated_at: request.now,
        current: points.first().cloned(),
        model_info: predictions
            .into_iter()
            .map(|p| (p.pollutant, p.source))
            .collect(),
        points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqi::aggregate::DEFAULT_OVERALL_AQI;
    use crate::predict::model::{LinearRegressor, ModelHandle};
    use crate::types::pollutant::Unit;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 1, 12, 30, 0).unwrap()
    }

    fn hours_from(start: i64, n: i64) -> Vec<DateTime<Utc>> {
        let base = truncate_to_hour(now());
        (start..start + n).map(|h| base + Duration::hours(h)).collect()
    }

    fn aq_forecast(n: i64) -> TimeSeries {
        TimeSeries::with_index(hours_from(-12, n))
            .unwrap()
            .with_field("pm2_5", (0..n).map(|i| Some(10.0 + i as f64)).collect())
            .unwrap()
            .with_field("ozone", vec![Some(100.0); n as usize])
            .unwrap()
            .with_field("nitrogen_dioxide", vec![Some(30.0); n as usize])
            .unwrap()
    }

    fn request(hours: usize) -> ForecastRequest {
        ForecastRequest {
            location: LatLon(40.7128, -74.0060),
            hours,
            hist_hours: 72,
            now: now(),
        }
    }

    #[test]
    fn test_passthrough_forecast() {
        let inputs = ForecastInputs {
            air_quality_forecast: aq_forecast(60),
            ..Default::default()
        };
        let config = AircastConfig::default();
        let forecast =
            compute_forecast(&request(24), &inputs, &ModelRegistry::empty(), &config).unwrap();

        assert_eq!(forecast.points.len(), 24);
        let first = &forecast.points[0];
        assert_eq!(first.timestamp, truncate_to_hour(now()));
        assert_eq!(forecast.current.as_ref(), Some(first));
        // 12 hours in: pm2_5 = 22.0
        assert_eq!(first.reading(Pollutant::Pm25).unwrap().value, Some(22.0));
        let o3 = first.reading(Pollutant::O3).unwrap();
        assert_eq!(o3.unit, Unit::Ppb);
        assert!((o3.value.unwrap() - 50.9).abs() < 1e-9);
        assert_eq!(
            first.reading(Pollutant::Pm10).unwrap().value,
            None,
        );
        assert_eq!(
            forecast.model_info[&Pollutant::Pm25],
            PredictionSource::ForecastPassthrough
        );
        assert_eq!(forecast.model_info[&Pollutant::Pm10], PredictionSource::Unavailable);
        assert!(forecast
            .points
            .windows(2)
            .all(|w| w[1].confidence <= w[0].confidence));
    }

    #[test]
    fn test_no_grid_is_error() {
        let result = compute_forecast(
            &request(24),
            &ForecastInputs::default(),
            &ModelRegistry::empty(),
            &AircastConfig::default(),
        );
        assert!(matches!(result, Err(AircastError::NoForecastData)));
    }

    #[test]
    fn test_required_pollutant_without_source() {
        let aq = TimeSeries::with_index(hours_from(0, 24))
            .unwrap()
            .with_field("pm2_5", vec![Some(5.0); 24])
            .unwrap();
        let inputs = ForecastInputs {
            air_quality_forecast: aq,
            ..Default::default()
        };
        let result = compute_forecast(
            &request(24),
            &inputs,
            &ModelRegistry::empty(),
            &AircastConfig::default(),
        );
        assert!(matches!(result, Err(AircastError::NoSource(Pollutant::O3))));

        let lenient = AircastConfig {
            required_pollutants: vec![Pollutant::Pm25],
            ..Default::default()
        };
        let forecast = compute_forecast(&request(24), &inputs, &ModelRegistry::empty(), &lenient)
            .unwrap();
        assert_eq!(forecast.points[0].aqi_of(Pollutant::O3), None);
    }

    #[test]
    fn test_placeholder_when_nothing_defined() {
        let aq = TimeSeries::with_index(hours_from(0, 2))
            .unwrap()
            .with_field("pm2_5", vec![None, None])
            .unwrap()
            .with_field("ozone", vec![None, None])
            .unwrap();
        let inputs = ForecastInputs {
            air_quality_forecast: aq,
            ..Default::default()
        };
        let forecast = compute_forecast(
            &request(2),
            &inputs,
            &ModelRegistry::empty(),
            &AircastConfig::default(),
        )
        .unwrap();
        assert_eq!(forecast.points[0].aqi.value, DEFAULT_OVERALL_AQI);
        assert!(forecast.points[0].aqi.defaulted);
    }

    #[test]
    fn test_model_forecast_on_meteorology_grid() {
        let met_forecast = TimeSeries::with_index(hours_from(0, 6))
            .unwrap()
            .with_field("temperature_2m", vec![Some(20.0); 6])
            .unwrap();
        let history = TimeSeries::with_index(hours_from(-3, 3))
            .unwrap()
            .with_field("pm2_5", vec![Some(8.0), Some(9.0), Some(10.0)])
            .unwrap()
            .with_field("ozone", vec![Some(50.0); 3])
            .unwrap();
        let inputs = ForecastInputs {
            meteorology_forecast: met_forecast,
            air_quality_history: vec![history],
            air_quality_forecast: aq_forecast(60),
            ..Default::default()
        };
        let models = ModelRegistry::empty().with_model(
            Pollutant::Pm25,
            ModelHandle::new(
                "pm25-linear",
                "1",
                vec!["pm25_lag1h".to_string(), "temperature_2m".to_string()],
                Arc::new(LinearRegressor {
                    intercept: -100.0,
                    coefficients: vec![1.0, 0.0],
                }),
            ),
        );
        let forecast =
            compute_forecast(&request(6), &inputs, &models, &AircastConfig::default()).unwrap();
        assert_eq!(forecast.points.len(), 6);
        assert_eq!(
            forecast.model_info[&Pollutant::Pm25],
            PredictionSource::Model {
                name: "pm25-linear".into(),
                version: "1".into()
            }
        );
        // negative regression output is reported as is; its AQI bottoms out at 0
        assert_eq!(
            forecast.points[0].reading(Pollutant::Pm25).unwrap().value,
            Some(-90.0)
        );
        assert_eq!(forecast.points[0].aqi_of(Pollutant::Pm25), Some(0));
        assert_eq!(
            forecast.model_info[&Pollutant::O3],
            PredictionSource::ForecastPassthrough
        );
    }
}
