use crate::aqi::breakpoints::BreakpointTable;
use crate::aqi::category::AqiCategory;
use crate::types::pollutant::Pollutant;
use crate::types::reading::PollutantReading;
use serde::Serialize;

/// Overall AQI reported when no pollutant has a defined index.
///
/// This is a placeholder, not a "Good" verdict: [`OverallAqi::defaulted`] is set whenever it
/// is used.
pub const DEFAULT_OVERALL_AQI: u16 = 50;

pub const MAX_AQI: u16 = 500;

/// The AQI of a single pollutant at a single timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AqiValue {
    pub pollutant: Pollutant,
    /// Integer index in `0..=500`, `None` when undefined.
    pub value: Option<u16>,
    /// Un-truncated index, kept so ties are decided on the exact value.
    #[serde(skip)]
    pub raw: Option<f64>,
}

impl AqiValue {
    pub fn undefined(pollutant: Pollutant) -> Self {
        Self {
            pollutant,
            value: None,
            raw: None,
        }
    }

    pub fn from_raw(pollutant: Pollutant, raw: Option<f64>) -> Self {
        let raw = raw.filter(|r| !r.is_nan());
        Self {
            pollutant,
            value: raw.map(truncate_aqi),
            raw,
        }
    }

    /// Computes the index of a reading, converting it to the unit of the pollutant's
    /// breakpoint table first. Pollutants without a table yield an undefined value.
    pub fn from_reading(reading: &PollutantReading) -> Self {
        let Some(table) = BreakpointTable::for_pollutant(reading.pollutant) else {
            return Self::undefined(reading.pollutant);
        };
        let converted = reading.in_aqi_unit();
        if converted.unit != table.unit {
            return Self::undefined(reading.pollutant);
        }
        Self::from_raw(reading.pollutant, table.index(converted.value))
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }
}

// Truncation toward zero, with a small epsilon so 50.99999999 coming out of the float
// interpolation still reads 50 and 51.0 - 1e-12 reads 51.
fn truncate_aqi(raw: f64) -> u16 {
    let clamped = raw.clamp(0.0, MAX_AQI as f64);
    (clamped + 1e-9).trunc().min(MAX_AQI as f64) as u16
}

/// The overall AQI of a timestamp: the maximum over its pollutants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OverallAqi {
    pub value: u16,
    /// The pollutant attaining the maximum, `None` when no index was defined.
    pub dominant: Option<Pollutant>,
    /// `true` when `value` is [`DEFAULT_OVERALL_AQI`] because nothing was defined.
    pub defaulted: bool,
}

impl OverallAqi {
    pub fn placeholder() -> Self {
        Self {
            value: DEFAULT_OVERALL_AQI,
            dominant: None,
            defaulted: true,
        }
    }

    pub fn category(&self) -> AqiCategory {
        AqiCategory::from_aqi(self.value)
    }
}

/// Reduces per-pollutant indices to the overall index.
///
/// Undefined values never win. Ties go to the pollutant earliest in
/// [`Pollutant::WITH_AQI`] order: O3 only replaces PM2.5 when strictly greater, and NO2
/// only when strictly greater than both.
///
/// # Examples
///
/// ```
/// use aircast::{aggregate, AqiValue, Pollutant};
///
/// let overall = aggregate(&[
///     AqiValue::from_raw(Pollutant::Pm25, Some(42.0)),
///     AqiValue::from_raw(Pollutant::O3, Some(42.0)),
///     AqiValue::from_raw(Pollutant::No2, None),
/// ]);
/// assert_eq!(overall.value, 42);
/// assert_eq!(overall.dominant, Some(Pollutant::Pm25));
/// ```
pub fn aggregate(values: &[AqiValue]) -> OverallAqi {
    let mut ordered: Vec<&AqiValue> = values.iter().filter(|v| v.is_defined()).collect();
    ordered.sort_by_key(|v| v.pollutant);

    let mut best: Option<(Pollutant, f64)> = None;
    for value in ordered {
        let Some(raw) = value.raw.or(value.value.map(f64::from)) else {
            continue;
        };
        match best {
            Some((_, current)) if raw <= current => {}
            _ => best = Some((value.pollutant, raw)),
        }
    }

    match best {
        Some((pollutant, raw)) => OverallAqi {
            value: truncate_aqi(raw),
            dominant: Some(pollutant),
            defaulted: false,
        },
        None => OverallAqi::placeholder(),
    }
}

/// Convenience: indices for every reading plus their aggregate.
pub fn assess(readings: &[PollutantReading]) -> (Vec<AqiValue>, OverallAqi) {
    let values: Vec<AqiValue> = readings
        .iter()
        .filter(|r| Pollutant::WITH_AQI.contains(&r.pollutant))
        .map(AqiValue::from_reading)
        .collect();
    let overall = aggregate(&values);
    (values, overall)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(p: Pollutant, raw: Option<f64>) -> AqiValue {
        AqiValue::from_raw(p, raw)
    }

    #[test]
    fn test_overall_is_max_of_defined() {
        let overall = aggregate(&[
            v(Pollutant::Pm25, Some(42.0)),
            v(Pollutant::O3, Some(87.3)),
            v(Pollutant::No2, Some(12.0)),
        ]);
        assert_eq!(overall.value, 87);
        assert_eq!(overall.dominant, Some(Pollutant::O3));
        assert!(!overall.defaulted);
    }

    #[test]
    fn test_all_undefined_gives_placeholder() {
        let overall = aggregate(&[
            v(Pollutant::Pm25, None),
            v(Pollutant::O3, None),
            v(Pollutant::No2, Some(f64::NAN)),
        ]);
        assert_eq!(overall.value, DEFAULT_OVERALL_AQI);
        assert_eq!(overall.dominant, None);
        assert!(overall.defaulted);
        assert_eq!(aggregate(&[]), OverallAqi::placeholder());
    }

    #[test]
    fn test_tie_break_order() {
        let overall = aggregate(&[
            v(Pollutant::No2, Some(60.0)),
            v(Pollutant::O3, Some(60.0)),
            v(Pollutant::Pm25, Some(60.0)),
        ]);
        assert_eq!(overall.dominant, Some(Pollutant::Pm25));

        let overall = aggregate(&[v(Pollutant::No2, Some(60.0)), v(Pollutant::O3, Some(60.0))]);
        assert_eq!(overall.dominant, Some(Pollutant::O3));
    }

    #[test]
    fn test_ties_are_decided_on_raw_values() {
        let overall = aggregate(&[
            v(Pollutant::Pm25, Some(50.3)),
            v(Pollutant::O3, Some(50.7)),
        ]);
        assert_eq!(overall.value, 50);
        assert_eq!(overall.dominant, Some(Pollutant::O3));
    }

    #[test]
    fn test_undefined_never_wins() {
        let overall = aggregate(&[v(Pollutant::Pm25, None), v(Pollutant::No2, Some(3.0))]);
        assert_eq!(overall.value, 3);
        assert_eq!(overall.dominant, Some(Pollutant::No2));
    }

    #[test]
    fn test_from_reading_converts_units() {
        // 106.09 µg/m³ ozone ≈ 54 ppb -> AQI 50
        let reading = PollutantReading::ugm3(Pollutant::O3, Some(54.0 / 0.509));
        let value = AqiValue::from_reading(&reading);
        assert_eq!(value.value, Some(50));

        let pm10 = PollutantReading::ugm3(Pollutant::Pm10, Some(80.0));
        assert!(!AqiValue::from_reading(&pm10).is_defined());
    }

    #[test]
    fn test_truncation() {
        assert_eq!(v(Pollutant::Pm25, Some(99.99)).value, Some(99));
        assert_eq!(v(Pollutant::Pm25, Some(51.0 - 1e-12)).value, Some(51));
        assert_eq!(v(Pollutant::Pm25, Some(700.0)).value, Some(500));
    }

    #[test]
    fn test_assess_skips_pollutants_without_table() {
        let (values, overall) = assess(&[
            PollutantReading::ugm3(Pollutant::Pm25, Some(12.0)),
            PollutantReading::ugm3(Pollutant::Pm10, Some(300.0)),
        ]);
        assert_eq!(values.len(), 1);
        assert_eq!(overall.value, 50);
        assert_eq!(overall.dominant, Some(Pollutant::Pm25));
    }
}
