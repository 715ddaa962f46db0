mod aircast;
mod aqi;
mod cache;
mod config;
mod error;
mod features;
mod frame;
mod nowcast;
mod pipeline;
mod predict;
mod series;
mod sources;
mod types;
mod units;
mod utils;

pub use aircast::*;
pub use error::AircastError;

pub use config::{AircastConfig, ConfigError, DEFAULT_USER_AGENT};

pub use types::forecast_point::{ForecastPoint, NowcastPoint, NowcastWindow};
pub use types::location::LatLon;
pub use types::pollutant::{Pollutant, Unit};
pub use types::reading::PollutantReading;

pub use units::{conversion_factor, to_ppb_no2, to_ppb_o3, NO2_UGM3_TO_PPB, O3_UGM3_TO_PPB};

pub use aqi::aggregate::{aggregate, assess, AqiValue, OverallAqi, DEFAULT_OVERALL_AQI, MAX_AQI};
pub use aqi::breakpoints::{
    aqi_from_no2, aqi_from_o3, aqi_from_pm25, Breakpoint, BreakpointTable, NO2_TABLE, O3_TABLE,
    PM25_TABLE,
};
pub use aqi::category::AqiCategory;

pub use series::align::{
    align_hourly, canonicalize_air_quality, concat, left_join, split_pollutants, AlignedHistory,
    PollutantHistory,
};
pub use series::error::SeriesError;
pub use series::time_series::{SeriesLazyFrame, TimeSeries, DATETIME_COLUMN};

pub use features::*;

pub use predict::error::{ModelError, PredictError};
pub use predict::model::{
    Estimator, LinearRegressor, ModelBundle, ModelHandle, ModelRegistry, Regressor,
};
pub use predict::predictor::{
    Prediction, PredictionInput, PredictionSource, PredictionStep, Predictor,
};

pub use nowcast::{
    blend, ewma, nowcast_hours, HistorySource, NowcastInputs, NowcastState, NowcastStep,
    SmoothingFactors, NOWCAST_CONFIDENCE, NOWCAST_HISTORY_HOURS, NOWCAST_ZERO,
};

pub use pipeline::current::{compass_direction, compute_current, CurrentConditions, WeatherSnapshot};
pub use pipeline::forecast::{
    compute_forecast, Forecast, ForecastInputs, ForecastRequest, FORECAST_POLLUTANTS,
};

pub use cache::{CacheKey, ForecastCache};
pub use frame::{write_csv, ForecastFrame};

pub use sources::error::SourceError;
pub use sources::open_meteo::{AIR_QUALITY_URL, ARCHIVE_URL, FORECAST_URL};
pub use sources::openaq::MEASUREMENTS_URL;
pub use sources::{
    AirDataSource, MemorySource, OpenAqSource, OpenMeteoSource, Snapshot, SourceCall,
    METEOROLOGY_VARIABLES,
};

pub use utils::{hour_grid, truncate_to_hour};
