use crate::aqi::aggregate::{assess, AqiValue, OverallAqi};
use crate::aqi::category::AqiCategory;
use crate::nowcast::NowcastState;
use crate::types::location::LatLon;
use crate::types::pollutant::Pollutant;
use crate::types::reading::PollutantReading;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// One hour of a forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub aqi: OverallAqi,
    pub category: AqiCategory,
    pub readings: Vec<PollutantReading>,
    pub aqi_values: Vec<AqiValue>,
    pub confidence: f64,
}

impl ForecastPoint {
    /// Builds a point from its readings, computing per-pollutant and overall AQI.
    pub fn from_readings(
        timestamp: DateTime<Utc>,
        readings: Vec<PollutantReading>,
        confidence: f64,
    ) -> Self {
        let (aqi_values, aqi) = assess(&readings);
        Self {
            timestamp,
            aqi,
            category: aqi.category(),
            readings,
            aqi_values,
            confidence,
        }
    }

    pub fn reading(&self, pollutant: Pollutant) -> Option<&PollutantReading> {
        self.readings.iter().find(|r| r.pollutant == pollutant)
    }

    pub fn aqi_of(&self, pollutant: Pollutant) -> Option<u16> {
        self.aqi_values
            .iter()
            .find(|v| v.pollutant == pollutant)
            .and_then(|v| v.value)
    }
}

/// A forecast point annotated with the nowcast state that produced each pollutant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowcastPoint {
    #[serde(flatten)]
    pub point: ForecastPoint,
    pub states: BTreeMap<Pollutant, NowcastState>,
}

/// Estimates for the next two whole hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowcastWindow {
    pub location: LatLon,
    pub generated_at: DateTime<Utc>,
    pub points: [NowcastPoint; 2],
}
