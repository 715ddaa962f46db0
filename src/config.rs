use crate::nowcast::{SmoothingFactors, NOWCAST_HISTORY_HOURS};
use crate::types::pollutant::Pollutant;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_USER_AGENT: &str = concat!("aircast/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse config file '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Every policy constant of the pipeline. Missing keys in a config file take the defaults
/// below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AircastConfig {
    /// Per-request timeout for upstream calls. Calls are never retried.
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Forecast length when the caller does not specify one.
    pub forecast_hours: usize,
    /// Upper bound for requested forecast lengths.
    pub max_forecast_hours: usize,
    /// History window when the caller does not specify one.
    pub history_hours: usize,
    /// Day span of a single air-quality history request.
    pub aq_history_chunk_days: i64,
    /// Trailing window fetched for, and smoothed by, the nowcast moving average.
    pub nowcast_history_hours: usize,
    /// Forward-fill limit (hours) applied to the model's feature matrix.
    pub ffill_limit: usize,
    pub smoothing: SmoothingFactors,
    /// Pollutants that fail the request when no source can provide them.
    pub required_pollutants: Vec<Pollutant>,
    pub confidence_base: f64,
    pub confidence_step: f64,
    /// When `false` the provider forecast is passed through even if models are loaded.
    pub use_models: bool,
    /// Directory holding `model_<key>.bin` bundles. `None` means the platform data dir.
    pub model_dir: Option<PathBuf>,
    pub cache_results: bool,
    pub openaq_radius_km: f64,
    pub openaq_max_pages: usize,
    /// Overall AQI from which an hour counts as an alert.
    pub alert_threshold: u16,
}

impl Default for AircastConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            forecast_hours: 72,
            max_forecast_hours: 168,
            history_hours: 72,
            aq_history_chunk_days: 90,
            nowcast_history_hours: NOWCAST_HISTORY_HOURS,
            ffill_limit: 2,
            smoothing: SmoothingFactors::default(),
            required_pollutants: vec![Pollutant::Pm25, Pollutant::O3],
            confidence_base: 0.92,
            confidence_step: 0.003,
            use_models: true,
            model_dir: None,
            cache_results: false,
            openaq_radius_km: 25.0,
            openaq_max_pages: 30,
            alert_threshold: 100,
        }
    }
}

impl AircastConfig {
    /// Reads a JSON config file.
    pub async fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
        let config: AircastConfig =
            serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_forecast_hours == 0 {
            return Err(ConfigError::Invalid(
                "max_forecast_hours must be positive".to_string(),
            ));
        }
        if self.nowcast_history_hours == 0 {
            return Err(ConfigError::Invalid(
                "nowcast_history_hours must be positive".to_string(),
            ));
        }
        if self.aq_history_chunk_days <= 0 {
            return Err(ConfigError::Invalid(
                "aq_history_chunk_days must be positive".to_string(),
            ));
        }
        for (name, alpha) in [
            ("pm25", self.smoothing.pm25),
            ("o3", self.smoothing.o3),
            ("no2", self.smoothing.no2),
        ] {
            if !(alpha > 0.0 && alpha <= 1.0) {
                return Err(ConfigError::Invalid(format!(
                    "smoothing factor for {} must be in (0, 1], got {}",
                    name, alpha
                )));
            }
        }
        Ok(())
    }

    /// Requested forecast length, defaulted and capped.
    pub fn forecast_len(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.forecast_hours)
            .min(self.max_forecast_hours)
    }

    /// Confidence of the `i`-th forecast hour. Never increases with `i`, never negative.
    pub fn confidence(&self, i: usize) -> f64 {
        (self.confidence_base - self.confidence_step * i as f64).max(0.0)
    }
}
