use crate::aqi::aggregate::{assess, AqiValue, OverallAqi};
use crate::aqi::category::AqiCategory;
use crate::error::AircastError;
use crate::sources::{Snapshot, CURRENT_POLLUTANTS};
use crate::types::location::LatLon;
use crate::types::pollutant::Pollutant;
use crate::types::reading::PollutantReading;
use chrono::{DateTime, Utc};
use serde::Serialize;

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// 16-point compass name of a direction in degrees, `None` for NaN.
pub fn compass_direction(degrees: f64) -> Option<&'static str> {
    if !degrees.is_finite() {
        return None;
    }
    let sector = (degrees.rem_euclid(360.0) / 22.5) as usize;
    COMPASS_POINTS.get(sector.min(15)).copied()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    /// °C.
    pub temperature: Option<f64>,
    /// Percent.
    pub humidity: Option<f64>,
    /// km/h.
    pub wind_speed: Option<f64>,
    /// Degrees.
    pub wind_direction: Option<f64>,
    pub wind_direction_text: Option<&'static str>,
    pub visibility_km: Option<f64>,
}

impl WeatherSnapshot {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let wind_direction = snapshot.get("wind_direction_10m");
        Self {
            temperature: snapshot.get("temperature_2m").map(|v| round_to(v, 1)),
            humidity: snapshot.get("relative_humidity_2m").map(|v| v.round()),
            wind_speed: snapshot.get("wind_speed_10m").map(|v| round_to(v, 1)),
            wind_direction: wind_direction.map(|v| v.round()),
            wind_direction_text: wind_direction.and_then(compass_direction),
            visibility_km: snapshot
                .get("visibility")
                .map(|metres| round_to(metres / 1000.0, 1)),
        }
    }
}

/// Air quality and weather right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub location: LatLon,
    pub timestamp: DateTime<Utc>,
    pub aqi: OverallAqi,
    pub category: AqiCategory,
    /// PM in µg/m³, O3 and NO2 in ppb, SO2 and CO as reported.
    pub readings: Vec<PollutantReading>,
    pub aqi_values: Vec<AqiValue>,
    pub weather: WeatherSnapshot,
}

impl CurrentConditions {
    pub fn reading(&self, pollutant: Pollutant) -> Option<&PollutantReading> {
        self.readings.iter().find(|r| r.pollutant == pollutant)
    }
}

/// Builds current conditions from the provider snapshots. `now` stands in for a snapshot
/// without a timestamp.
pub fn compute_current(
    location: LatLon,
    air_quality: &Snapshot,
    weather: &Snapshot,
    now: DateTime<Utc>,
) -> Result<CurrentConditions, AircastError> {
    if air_quality.is_empty() {
        return Err(AircastError::NoCurrentData);
    }
    let readings: Vec<PollutantReading> = CURRENT_POLLUTANTS
        .iter()
        .map(|p| PollutantReading::ugm3(*p, air_quality.get(p.provider_field())).in_aqi_unit())
        .collect();
    let (aqi_values, aqi) = assess(&readings);

    Ok(CurrentConditions {
        location,
        timestamp: air_quality.time.unwrap_or(now),
        aqi,
        category: aqi.category(),
        readings,
        aqi_values,
        weather: WeatherSnapshot::from_snapshot(weather),
    })
}
