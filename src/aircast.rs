//! The main entry point: an [`Aircast`] client answering forecast, nowcast and current
//! conditions requests for a coordinate.

use crate::cache::ForecastCache;
use crate::config::AircastConfig;
use crate::error::AircastError;
use crate::nowcast::{blend, NowcastInputs};
use crate::pipeline::current::{compute_current, CurrentConditions};
use crate::pipeline::forecast::{compute_forecast, Forecast, ForecastInputs, ForecastRequest};
use crate::predict::model::ModelRegistry;
use crate::series::align::{align_hourly, canonicalize_air_quality, split_pollutants};
use crate::series::time_series::TimeSeries;
use crate::sources::error::SourceError;
use crate::sources::{AirDataSource, OpenAqSource, OpenMeteoSource, Snapshot};
use crate::types::forecast_point::NowcastWindow;
use crate::types::location::LatLon;
use crate::utils::{get_model_dir, truncate_to_hour};
use bon::bon;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use serde::Serialize;

// Hours of short-range forecast requested for a nowcast: the current hour plus the two
// nowcast hours.
const NOWCAST_FORECAST_HOURS: usize = 3;

/// The structured result envelope: `success` and `error` next to the flattened payload.
///
/// # Examples
///
/// ```
/// use aircast::{AircastError, Report};
///
/// let report: Report<u8> = Report::from(Err::<u8, _>(AircastError::NoForecastData));
/// assert!(!report.success);
/// assert_eq!(report.error.as_deref(), Some("No forecast data available"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report<T> {
    pub success: bool,
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Option<T>,
}

impl<T> From<Result<T, AircastError>> for Report<T> {
    fn from(result: Result<T, AircastError>) -> Self {
        match result {
            Ok(data) => Report {
                success: true,
                error: None,
                data: Some(data),
            },
            Err(e) => {
                warn!("Request failed: {}", e);
                Report {
                    success: false,
                    error: Some(e.to_string()),
                    data: None,
                }
            }
        }
    }
}

// A failed upstream call only removes its own data from the request.
fn or_empty<T: Default>(what: &str, result: Result<T, SourceError>) -> T {
    result.unwrap_or_else(|e| {
        warn!("Fetching {} failed, continuing without it: {}", what, e);
        T::default()
    })
}

/// The air-quality client.
///
/// Holds the data source, the policy constants and the models loaded at construction.
/// Every request is computed from freshly fetched inputs; the only shared state is the
/// optional forecast cache.
///
/// # Examples
///
/// ```rust,no_run
/// # use aircast::{Aircast, AircastError, LatLon};
/// # async fn run() -> Result<(), AircastError> {
/// let client = Aircast::new().await?;
/// let forecast = client
///     .forecast()
///     .location(LatLon(52.3676, 4.9041))
///     .hours(24)
///     .call()
///     .await?;
/// if let Some(peak) = forecast.peak() {
///     println!("Peak AQI {} at {}", peak.aqi.value, peak.timestamp);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Aircast<S> {
    source: S,
    config: AircastConfig,
    models: ModelRegistry,
    cache: Option<ForecastCache>,
}

impl Aircast<OpenAqSource<OpenMeteoSource>> {
    /// Creates a client on Open-Meteo and OpenAQ with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AircastError::Source`] if the HTTP client cannot be built and
    /// [`AircastError::ModelDirResolution`] if no model directory can be determined.
    pub async fn new() -> Result<Self, AircastError> {
        Self::with_config(AircastConfig::default()).await
    }

    /// Creates a client on Open-Meteo and OpenAQ, loading models from
    /// `config.model_dir` or, when unset, the platform data directory.
    pub async fn with_config(config: AircastConfig) -> Result<Self, AircastError> {
        config.validate()?;
        let source = OpenAqSource::new(OpenMeteoSource::new(&config)?, &config)?;
        let model_dir = match &config.model_dir {
            Some(dir) => dir.clone(),
            None => get_model_dir().map_err(AircastError::ModelDirResolution)?,
        };
        let models = if config.use_models {
            ModelRegistry::load_dir(&model_dir).await?
        } else {
            ModelRegistry::empty()
        };
        Ok(Self::from_source()
            .source(source)
            .config(config)
            .models(models)
            .call())
    }
}

#[bon]
impl<S: AirDataSource> Aircast<S> {
    /// Creates a client on any data source.
    ///
    /// # Arguments
    ///
    /// * `source` - Where meteorology and air-quality data come from.
    /// * `config` - Policy constants. Defaults to [`AircastConfig::default`].
    /// * `models` - Trained models. Defaults to none, so every pollutant passes the
    ///   provider forecast through.
    ///
    /// # Examples
    ///
    /// ```
    /// use aircast::{Aircast, MemorySource};
    ///
    /// let client = Aircast::from_source()
    ///     .source(MemorySource::default())
    ///     .call();
    /// assert!(client.models().is_empty());
    /// ```
    #[builder]
    pub fn from_source(
        source: S,
        #[builder(default)] config: AircastConfig,
        #[builder(default)] models: ModelRegistry,
    ) -> Self {
        let cache = config.cache_results.then(ForecastCache::new);
        Self {
            source,
            config,
            models,
            cache,
        }
    }

    pub fn config(&self) -> &AircastConfig {
        &self.config
    }

    pub fn models(&self) -> &ModelRegistry {
        &self.models
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Forecasts air quality for the coming hours.
    ///
    /// Upstream data is fetched concurrently. A failed fetch is logged and treated as
    /// empty; the request only fails when a required pollutant ends up without any
    /// source or when there are no forecast hours at all.
    ///
    /// # Arguments
    ///
    /// * `location` - The coordinate to forecast for.
    /// * `hours` - Forecast length. Defaults to `config.forecast_hours`, capped at
    ///   `config.max_forecast_hours`.
    /// * `hist_hours` - Hours of history used for model features. Defaults to
    ///   `config.history_hours`.
    /// * `now` - Reference time. Defaults to the current time.
    ///
    /// # Errors
    ///
    /// * [`AircastError::NoForecastData`] when no forecast hour at or after `now` exists.
    /// * [`AircastError::NoSource`] when a required pollutant cannot be provided.
    /// * [`AircastError::Predict`] when a model returns the wrong number of values.
    #[builder]
    pub async fn forecast(
        &self,
        location: LatLon,
        hours: Option<usize>,
        hist_hours: Option<usize>,
        now: Option<DateTime<Utc>>,
    ) -> Result<Forecast, AircastError> {
        let request = ForecastRequest {
            location,
            hours: self.config.forecast_len(hours),
            hist_hours: hist_hours.unwrap_or(self.config.history_hours),
            now: now.unwrap_or_else(Utc::now),
        };
        match &self.cache {
            Some(cache) => {
                cache
                    .get_or_compute(&request, || self.fetch_and_forecast(&request))
                    .await
            }
            None => self.fetch_and_forecast(&request).await,
        }
    }

    async fn fetch_and_forecast(&self, request: &ForecastRequest) -> Result<Forecast, AircastError> {
        let inputs = self.fetch_forecast_inputs(request).await;
        compute_forecast(request, &inputs, &self.models, &self.config)
    }

    async fn fetch_forecast_inputs(&self, request: &ForecastRequest) -> ForecastInputs {
        let end = truncate_to_hour(request.now);
        let start = end - Duration::hours(request.hist_hours as i64);
        info!(
            "Fetching forecast inputs for {:?}: {}h ahead, history from {}",
            request.location, request.hours, start
        );

        let (met_history, met_forecast, aq_history, aq_forecast) = tokio::join!(
            self.source.meteorology_history(request.location, start, end),
            self.source.meteorology_forecast(request.location, request.hours),
            self.source.air_quality_history(request.location, start, end),
            self.source.air_quality_forecast(request.location, request.hours),
        );

        ForecastInputs {
            meteorology_history: or_empty("meteorology history", met_history),
            meteorology_forecast: or_empty("meteorology forecast", met_forecast),
            air_quality_history: or_empty("air-quality history", aq_history),
            air_quality_forecast: or_empty("air-quality forecast", aq_forecast),
        }
    }

    /// Estimates PM2.5, O3 and NO2 for the next two whole hours.
    ///
    /// Each pollutant uses the short-range forecast value for the hour when there is one,
    /// otherwise a moving average of the trailing `config.nowcast_history_hours` of ground
    /// observations (or, without those, provider history), otherwise zero. The state
    /// used is reported per pollutant and hour.
    #[builder]
    pub async fn nowcast(
        &self,
        location: LatLon,
        now: Option<DateTime<Utc>>,
    ) -> Result<NowcastWindow, AircastError> {
        let now = now.unwrap_or_else(Utc::now);
        let start = now - Duration::hours(self.config.nowcast_history_hours as i64);

        let (aq_forecast, aq_history, ground) = tokio::join!(
            self.source
                .air_quality_forecast(location, NOWCAST_FORECAST_HOURS),
            self.source.air_quality_history(location, start, now),
            self.source.ground_observations(location, start, now),
        );

        let short_range =
            canonicalize_air_quality(&or_empty("air-quality forecast", aq_forecast))?;
        let history = align_hourly(&[], &or_empty("air-quality history", aq_history))?.pollutants;
        let ground = split_pollutants(&or_empty::<TimeSeries>("ground observations", ground))?;

        let inputs = NowcastInputs {
            short_range: &short_range,
            history: &history,
            ground: &ground,
            history_hours: self.config.nowcast_history_hours,
        };
        Ok(blend(location, now, &inputs, &self.config.smoothing)?)
    }

    /// Current air quality and weather.
    ///
    /// # Errors
    ///
    /// Returns [`AircastError::NoCurrentData`] when no current air-quality value is
    /// available. Missing weather only leaves the weather fields empty.
    #[builder]
    pub async fn current_conditions(
        &self,
        location: LatLon,
        now: Option<DateTime<Utc>>,
    ) -> Result<CurrentConditions, AircastError> {
        let (air_quality, weather) = tokio::join!(
            self.source.current_air_quality(location),
            self.source.current_weather(location),
        );
        let air_quality: Snapshot = or_empty("current air quality", air_quality);
        let weather: Snapshot = or_empty("current weather", weather);
        compute_current(location, &air_quality, &weather, now.unwrap_or_else(Utc::now))
    }

    /// [`Aircast::forecast`] wrapped in a [`Report`].
    #[builder]
    pub async fn forecast_report(
        &self,
        location: LatLon,
        hours: Option<usize>,
        hist_hours: Option<usize>,
        now: Option<DateTime<Utc>>,
    ) -> Report<Forecast> {
        self.forecast()
            .location(location)
            .maybe_hours(hours)
            .maybe_hist_hours(hist_hours)
            .maybe_now(now)
            .call()
            .await
            .into()
    }

    /// [`Aircast::nowcast`] wrapped in a [`Report`].
    #[builder]
    pub async fn nowcast_report(
        &self,
        location: LatLon,
        now: Option<DateTime<Utc>>,
    ) -> Report<NowcastWindow> {
        self.nowcast()
            .location(location)
            .maybe_now(now)
            .call()
            .await
            .into()
    }

    /// [`Aircast::current_conditions`] wrapped in a [`Report`].
    #[builder]
    pub async fn current_conditions_report(
        &self,
        location: LatLon,
        now: Option<DateTime<Utc>>,
    ) -> Report<CurrentConditions> {
        self.current_conditions()
            .location(location)
            .maybe_now(now)
            .call()
            .await
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nowcast::{HistorySource, NowcastState};
    use crate::predict::predictor::PredictionSource;
    use crate::sources::{MemorySource, SourceCall};
    use crate::types::pollutant::{Pollutant, Unit};
    use chrono::TimeZone;

    const NYC: LatLon = LatLon(40.7128, -74.0060);

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 10, 14, 25, 0).unwrap()
    }

    fn hour(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 10, 14, 0, 0).unwrap() + Duration::hours(h)
    }

    fn hourly(from: i64, to: i64, fields: &[(&str, f64)]) -> TimeSeries {
        let mut series = TimeSeries::with_index((from..to).map(hour).collect()).unwrap();
        for (name, value) in fields {
            series = series
                .with_field(*name, (from..to).map(|_| Some(*value)).collect())
                .unwrap();
        }
        series
    }

    fn forecast_source() -> MemorySource {
        MemorySource::builder()
            .meteorology_history(hourly(-72, 0, &[("temperature_2m", 21.0)]))
            .meteorology_forecast(hourly(-14, 58, &[("temperature_2m", 24.0), ("wind_speed_10m", 8.0)]))
            .air_quality_history(vec![hourly(-72, 0, &[("pm2_5", 9.0), ("ozone", 60.0)])])
            .air_quality_forecast(hourly(
                -14,
                58,
                &[
                    ("pm2_5", 22.0),
                    ("ozone", 100.0),
                    ("nitrogen_dioxide", 30.0),
                    ("pm10", 35.0),
                ],
            ))
            .build()
    }

    #[tokio::test]
    async fn test_forecast_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
        let client = Aircast::from_source().source(forecast_source()).call();
        let forecast = client
            .forecast()
            .location(NYC)
            .hours(24)
            .now(now())
            .call()
            .await?;

        assert_eq!(forecast.points.len(), 24);
        assert_eq!(forecast.points[0].timestamp, hour(0));
        assert_eq!(forecast.points[23].timestamp, hour(23));
        assert_eq!(forecast.current.as_ref(), forecast.points.first());
        assert_eq!(
            forecast.model_info.get(&Pollutant::Pm25),
            Some(&PredictionSource::ForecastPassthrough)
        );

        let first = &forecast.points[0];
        assert_eq!(first.reading(Pollutant::Pm25).unwrap().value, Some(22.0));
        let o3 = first.reading(Pollutant::O3).unwrap();
        assert_eq!(o3.unit, Unit::Ppb);
        assert!((o3.value.unwrap() - 50.9).abs() < 1e-9);
        // PM2.5 22 -> 71 beats O3 50.9 ppb -> 47
        assert_eq!(first.aqi.value, 71);
        assert_eq!(first.aqi.dominant, Some(Pollutant::Pm25));

        for pair in forecast.points.windows(2) {
            assert!(pair[1].confidence <= pair[0].confidence);
        }
        assert!((first.confidence - 0.92).abs() < 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn test_forecast_survives_failed_meteorology() -> Result<(), Box<dyn std::error::Error>> {
        let mut source = forecast_source();
        source.failing = vec![SourceCall::MeteorologyForecast, SourceCall::MeteorologyHistory];
        let client = Aircast::from_source().source(source).call();
        let forecast = client
            .forecast()
            .location(NYC)
            .hours(6)
            .now(now())
            .call()
            .await?;
        // The grid falls back to the air-quality forecast's hours.
        assert_eq!(forecast.points.len(), 6);
        assert_eq!(forecast.points[0].timestamp, hour(0));
        Ok(())
    }

    #[tokio::test]
    async fn test_required_pollutant_without_source() {
        let mut source = forecast_source();
        source.failing = vec![SourceCall::AirQualityForecast];
        let client = Aircast::from_source().source(source).call();
        let result = client
            .forecast()
            .location(NYC)
            .hours(6)
            .now(now())
            .call()
            .await;
        assert!(matches!(result, Err(AircastError::NoSource(Pollutant::Pm25))));
    }

    #[tokio::test]
    async fn test_forecast_report_failure_envelope() -> Result<(), Box<dyn std::error::Error>> {
        let client = Aircast::from_source().source(MemorySource::default()).call();
        let report = client
            .forecast_report()
            .location(NYC)
            .now(now())
            .call()
            .await;
        assert!(!report.success);
        assert_eq!(report.error.as_deref(), Some("No forecast data available"));

        let js = serde_json::to_value(&report)?;
        assert_eq!(js["success"], serde_json::Value::Bool(false));
        assert!(js.get("forecast").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_forecast_report_success_is_flattened() -> Result<(), Box<dyn std::error::Error>> {
        let client = Aircast::from_source().source(forecast_source()).call();
        let report = client
            .forecast_report()
            .location(NYC)
            .hours(3)
            .now(now())
            .call()
            .await;
        assert!(report.success);
        let js = serde_json::to_value(&report)?;
        assert_eq!(js["forecast"].as_array().map(|a| a.len()), Some(3));
        assert!(js["error"].is_null());
        Ok(())
    }

    #[tokio::test]
    async fn test_cached_forecast() -> Result<(), Box<dyn std::error::Error>> {
        let config = AircastConfig {
            cache_results: true,
            ..AircastConfig::default()
        };
        let client = Aircast::from_source()
            .source(forecast_source())
            .config(config)
            .call();
        let first = client.forecast().location(NYC).hours(4).now(now()).call().await?;
        let again = client
            .forecast()
            .location(NYC)
            .hours(4)
            .now(now() + Duration::minutes(20))
            .call()
            .await?;
        // Same hour bucket, so the first result is returned unchanged.
        assert_eq!(first, again);
        Ok(())
    }

    #[tokio::test]
    async fn test_nowcast_smoothed_and_broadcast() -> Result<(), Box<dyn std::error::Error>> {
        let history = TimeSeries::with_index(vec![hour(-2), hour(-1), hour(0)])?
            .with_field("pm2_5", vec![Some(10.0), Some(20.0), Some(30.0)])?;
        let short_range = TimeSeries::with_index(vec![hour(1)])?
            .with_field("ozone", vec![Some(100.0)])?;
        let source = MemorySource::builder()
            .air_quality_history(vec![history])
            .air_quality_forecast(short_range)
            .build();
        let client = Aircast::from_source().source(source).call();
        let window = client.nowcast().location(NYC).now(now()).call().await?;

        assert_eq!(window.points[0].point.timestamp, hour(1));
        assert_eq!(window.points[1].point.timestamp, hour(2));
        for point in &window.points {
            assert_eq!(
                point.states.get(&Pollutant::Pm25),
                Some(&NowcastState::Smoothed(HistorySource::Aligned))
            );
            let pm25 = point.point.reading(Pollutant::Pm25).unwrap().value.unwrap();
            assert!((pm25 - 24.4).abs() < 1e-9);
            assert_eq!(point.states.get(&Pollutant::No2), Some(&NowcastState::Zero));
        }
        assert_eq!(
            window.points[0].states.get(&Pollutant::O3),
            Some(&NowcastState::Direct)
        );
        assert_eq!(
            window.points[1].states.get(&Pollutant::O3),
            Some(&NowcastState::Zero)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_nowcast_prefers_ground_observations() -> Result<(), Box<dyn std::error::Error>> {
        let modelled = TimeSeries::with_index(vec![hour(0)])?.with_field("pm2_5", vec![Some(80.0)])?;
        let ground = TimeSeries::with_index(vec![hour(-1), hour(0)])?
            .with_field("pm25", vec![Some(4.0), Some(4.0)])?;
        let source = MemorySource::builder()
            .air_quality_history(vec![modelled])
            .ground_observations(ground)
            .build();
        let client = Aircast::from_source().source(source).call();
        let window = client.nowcast().location(NYC).now(now()).call().await?;
        let point = &window.points[0];
        assert_eq!(
            point.states.get(&Pollutant::Pm25),
            Some(&NowcastState::Smoothed(HistorySource::Ground))
        );
        assert_eq!(point.point.reading(Pollutant::Pm25).unwrap().value, Some(4.0));
        Ok(())
    }

    #[tokio::test]
    async fn test_nowcast_history_window_follows_config() -> Result<(), Box<dyn std::error::Error>> {
        let source = || {
            MemorySource::builder()
                .air_quality_history(vec![hourly(-40, -29, &[("pm2_5", 12.0)])])
                .build()
        };

        let default_window = Aircast::from_source().source(source()).call();
        let window = default_window.nowcast().location(NYC).now(now()).call().await?;
        assert_eq!(
            window.points[0].states.get(&Pollutant::Pm25),
            Some(&NowcastState::Zero)
        );

        let config = AircastConfig {
            nowcast_history_hours: 48,
            ..AircastConfig::default()
        };
        let two_days = Aircast::from_source().source(source()).config(config).call();
        let window = two_days.nowcast().location(NYC).now(now()).call().await?;
        let point = &window.points[0];
        assert_eq!(
            point.states.get(&Pollutant::Pm25),
            Some(&NowcastState::Smoothed(HistorySource::Aligned))
        );
        let pm25 = point.point.reading(Pollutant::Pm25).unwrap().value.unwrap();
        assert!((pm25 - 12.0).abs() < 1e-9);
        Ok(())
    }

    #[tokio::test]
    async fn test_current_conditions_report()-> Result<(), Box<dyn std::error::Error>> {
        let aq = Snapshot {
            time: Some(hour(0)),
            values: [("pm2_5".to_string(), Some(8.0))].into_iter().collect(),
        };
        let source = MemorySource::builder()
            .current_air_quality(aq)
            .failing(vec![SourceCall::CurrentWeather])
            .build();
        let client = Aircast::from_source().source(source).call();
        let report = client
            .current_conditions_report()
            .location(NYC)
            .call()
            .await;
        assert!(report.success);
        let current = report.data.unwrap();
        assert_eq!(current.timestamp, hour(0));
        assert_eq!(current.weather.temperature, None);

        let empty = Aircast::from_source().source(MemorySource::default()).call();
        let failed = empty.current_conditions_report().location(NYC).call().await;
        assert!(!failed.success);
        Ok(())
    }
}
