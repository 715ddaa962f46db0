//! Estimates for the next two whole hours.
//!
//! Every pollutant is resolved on its own, hour by hour, through an ordered cascade:
//!
//! 1. [`NowcastStep::Direct`]: the short-range forecast has a value at that exact hour.
//! 2. [`NowcastStep::Smoothed`]: an exponentially weighted moving average of the trailing
//!    history window ([`NowcastInputs::history_hours`]), broadcast to both hours. Ground
//!    observations are preferred over the modelled history when they hold any value.
//! 3. [`NowcastStep::Zero`]: [`NOWCAST_ZERO`], a low-confidence default.
//!
//! Ozone and nitrogen dioxide are converted to ppb after selection.

use crate::series::align::PollutantHistory;
use crate::series::error::SeriesError;
use crate::series::time_series::{TimeSeries, DATETIME_COLUMN};
use crate::types::forecast_point::{ForecastPoint, NowcastPoint, NowcastWindow};
use crate::types::location::LatLon;
use crate::types::pollutant::{Pollutant, Unit};
use crate::types::reading::PollutantReading;
use crate::utils::truncate_to_hour;
use chrono::{DateTime, Duration, Utc};
use log::debug;
use polars::prelude::{col, lit, Column, DataFrame, EWMOptions, Expr, IntoLazy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value used when no source can say anything about a pollutant.
pub const NOWCAST_ZERO: f64 = 0.0;

/// Default length of the trailing history window fed to the moving average.
pub const NOWCAST_HISTORY_HOURS: usize = 24;

/// Confidence attached to nowcast points.
pub const NOWCAST_CONFIDENCE: f64 = 0.92;

/// EWMA smoothing factor per pollutant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingFactors {
    pub pm25: f64,
    pub o3: f64,
    pub no2: f64,
}

impl Default for SmoothingFactors {
    fn default() -> Self {
        Self {
            pm25: 0.6,
            o3: 0.5,
            no2: 0.5,
        }
    }
}

impl SmoothingFactors {
    pub fn alpha(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::Pm25 => Some(self.pm25),
            Pollutant::O3 => Some(self.o3),
            Pollutant::No2 => Some(self.no2),
            _ => None,
        }
    }
}

/// Where a smoothed estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HistorySource {
    /// Ground-level station observations.
    Ground,
    /// The aligned provider history.
    Aligned,
}

/// Which cascade step produced a pollutant's value at one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "history", rename_all = "snake_case")]
pub enum NowcastState {
    Direct,
    Smoothed(HistorySource),
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NowcastStep {
    Direct,
    Smoothed,
    Zero,
}

/// Inputs of one nowcast.
#[derive(Debug, Clone, Copy)]
pub struct NowcastInputs<'a> {
    /// Short-range forecast with canonical pollutant keys.
    pub short_range: &'a TimeSeries,
    /// Aligned provider history, per pollutant.
    pub history: &'a PollutantHistory,
    /// Ground-level observations, per pollutant.
    pub ground: &'a PollutantHistory,
    /// Length of the smoothing window `(now - history_hours, now]`.
    pub history_hours: usize,
}

impl NowcastStep {
    pub const CASCADE: [NowcastStep; 3] =
        [NowcastStep::Direct, NowcastStep::Smoothed, NowcastStep::Zero];

    /// Returns the value and state when this step applies.
    fn resolve(
        &self,
        pollutant: Pollutant,
        at: &DateTime<Utc>,
        now: DateTime<Utc>,
        alpha: f64,
        inputs: &NowcastInputs<'_>,
    ) -> Result<Option<(f64, NowcastState)>, SeriesError> {
        match self {
            NowcastStep::Direct => Ok(inputs
                .short_range
                .value_at(pollutant.key(), at)
                .map(|v| (v, NowcastState::Direct))),
            NowcastStep::Smoothed => {
                for (history, source) in [
                    (inputs.ground, HistorySource::Ground),
                    (inputs.history, HistorySource::Aligned),
                ] {
                    let smoothed =
                        trailing_ewma(history, pollutant, now, inputs.history_hours, alpha)?;
                    if let Some(value) = smoothed {
                        return Ok(Some((value, NowcastState::Smoothed(source))));
                    }
                }
                Ok(None)
            }
            NowcastStep::Zero => Ok(Some((NOWCAST_ZERO, NowcastState::Zero))),
        }
    }
}

/// The two whole hours following `now`.
pub fn nowcast_hours(now: DateTime<Utc>) -> [DateTime<Utc>; 2] {
    let first = truncate_to_hour(now + Duration::hours(1));
    [first, first + Duration::hours(1)]
}

// Last value of the unadjusted EWMA of `name`.
fn ewm_last(name: &str, alpha: f64) -> Expr {
    col(name)
        .ewm_mean(EWMOptions {
            alpha,
            adjust: false,
            ..Default::default()
        })
        .last()
}

/// Exponentially weighted moving average without bias adjustment:
/// `s0 = x0`, `st = alpha * xt + (1 - alpha) * s(t-1)`. Returns the last smoothed value,
/// or `None` for an empty input.
pub fn ewma(values: &[f64], alpha: f64) -> Result<Option<f64>, SeriesError> {
    let frame = DataFrame::new(vec![Column::new("value".into(), values)])?;
    let out = frame.lazy().select([ewm_last("value", alpha)]).collect()?;
    Ok(out.column("value")?.f64()?.get(0))
}

// EWMA over the defined values in (now - hours, now], oldest first.
fn trailing_ewma(
    history: &PollutantHistory,
    pollutant: Pollutant,
    now: DateTime<Utc>,
    hours: usize,
    alpha: f64,
) -> Result<Option<f64>, SeriesError> {
    let key = pollutant.key();
    let Some(series) = history.series(pollutant).filter(|s| s.has_field(key)) else {
        return Ok(None);
    };
    let start = now - Duration::hours(hours as i64);
    let out = series
        .lazy()
        .filter(
            col(DATETIME_COLUMN)
                .gt(lit(start.naive_utc()))
                .and(col(DATETIME_COLUMN).lt_eq(lit(now.naive_utc()))),
        )
        .frame
        .drop_nulls(Some(vec![col(key)]))
        .select([ewm_last(key, alpha)])
        .collect()?;
    Ok(out.column(key)?.f64()?.get(0))
}

fn nowcast_point(
    at: DateTime<Utc>,
    now: DateTime<Utc>,
    inputs: &NowcastInputs<'_>,
    factors: &SmoothingFactors,
) -> Result<NowcastPoint, SeriesError> {
    let mut readings = Vec::with_capacity(Pollutant::WITH_AQI.len());
    let mut states = BTreeMap::new();
    for pollutant in Pollutant::WITH_AQI {
        let alpha = factors.alpha(pollutant).unwrap_or(0.5);
        let mut resolved = None;
        for step in NowcastStep::CASCADE {
            resolved = step.resolve(pollutant, &at, now, alpha, inputs)?;
            if resolved.is_some() {
                break;
            }
        }
        let (value, state) = resolved.unwrap_or((NOWCAST_ZERO, NowcastState::Zero));
        debug!("Nowcast {} at {}: {:?}", pollutant, at, state);

        readings.push(PollutantReading::new(pollutant, Unit::UgM3, Some(value)).in_aqi_unit());
        states.insert(pollutant, state);
    }
    Ok(NowcastPoint {
        point: ForecastPoint::from_readings(at, readings, NOWCAST_CONFIDENCE),
        states,
    })
}

/// Runs the cascade for every AQI pollutant and both nowcast hours.
pub fn blend(
    location: LatLon,
    now: DateTime<Utc>,
    inputs: &NowcastInputs<'_>,
    factors: &SmoothingFactors,
) -> Result<NowcastWindow, SeriesError> {
    let [first, second] = nowcast_hours(now);
    Ok(NowcastWindow {
        location,
        generated_at: now,
        points: [
            nowcast_point(first, now, inputs, factors)?,
            nowcast_point(second, now, inputs, factors)?,
        ],
    })
}
