use chrono::{DateTime, Datelike, Timelike, Utc};
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Trailing-window aggregates of the target.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingStats {
    pub mean: Option<f64>,
    pub max: Option<f64>,
}

/// Zonal (`u10`) and meridional (`v10`) wind components at 10 m.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WindComponents {
    pub u10: Option<f64>,
    pub v10: Option<f64>,
}

impl WindComponents {
    /// `u = speed * cos(dir)`, `v = speed * sin(dir)` with `dir` in degrees. Undefined when
    /// either input is.
    pub fn from_speed_direction(speed: Option<f64>, direction_deg: Option<f64>) -> Self {
        match (speed, direction_deg) {
            (Some(speed), Some(dir)) => {
                let rad = dir.to_radians();
                Self {
                    u10: Some(speed * rad.cos()),
                    v10: Some(speed * rad.sin()),
                }
            }
            _ => Self::default(),
        }
    }
}

/// UTC calendar encodings of a timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalendarFeatures {
    pub hour: u32,
    /// Monday = 0.
    pub day_of_week: u32,
    /// 1-based.
    pub day_of_year: u32,
    pub sin_doy: f64,
    pub cos_doy: f64,
}

impl CalendarFeatures {
    pub fn from_timestamp(ts: &DateTime<Utc>) -> Self {
        let doy = ts.ordinal();
        let angle = 2.0 * PI * doy as f64 / 365.25;
        Self {
            hour: ts.hour(),
            day_of_week: ts.weekday().num_days_from_monday(),
            day_of_year: doy,
            sin_doy: angle.sin(),
            cos_doy: angle.cos(),
        }
    }
}

/// One row of derived features for a single target pollutant.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub timestamp: DateTime<Utc>,
    pub target: Option<f64>,
    /// Indexed like [`crate::features::LAG_HOURS`].
    pub lags: [Option<f64>; 6],
    /// Indexed like [`crate::features::ROLLING_WINDOWS`].
    pub rolling: [RollingStats; 3],
    /// `None` when the source series has no wind fields at all.
    pub wind: Option<WindComponents>,
    pub calendar: CalendarFeatures,
    /// Meteorology values by provider field name.
    pub meteorology: BTreeMap<String, Option<f64>>,
}

impl FeatureRow {
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub fn has_wind(&self) -> bool {
        self.wind.is_some()
    }
}
