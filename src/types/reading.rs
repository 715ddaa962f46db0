use crate::types::pollutant::{Pollutant, Unit};
use crate::units::conversion_factor;
use serde::Serialize;

/// A single concentration value for one pollutant.
///
/// `value` is `None` when the concentration is undefined (missing upstream data, a
/// feature gap the model could not bridge, ...). Readings are transient: they are
/// produced by the predictor or the nowcast blender and consumed by the AQI aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PollutantReading {
    pub pollutant: Pollutant,
    pub unit: Unit,
    pub value: Option<f64>,
}

impl PollutantReading {
    pub fn new(pollutant: Pollutant, unit: Unit, value: Option<f64>) -> Self {
        Self {
            pollutant,
            unit,
            value: value.filter(|v| !v.is_nan()),
        }
    }

    pub fn ugm3(pollutant: Pollutant, value: Option<f64>) -> Self {
        Self::new(pollutant, Unit::UgM3, value)
    }

    pub fn ppb(pollutant: Pollutant, value: Option<f64>) -> Self {
        Self::new(pollutant, Unit::Ppb, value)
    }

    pub fn is_defined(&self) -> bool {
        self.value.is_some()
    }

    /// Returns this reading expressed in the unit of the pollutant's AQI table.
    ///
    /// Only the fixed µg/m³ → ppb conversions exist; a reading that cannot be
    /// converted is returned unchanged.
    pub fn in_aqi_unit(&self) -> PollutantReading {
        let target = self.pollutant.aqi_unit();
        if self.unit == target {
            return *self;
        }
        match (self.unit, target, conversion_factor(self.pollutant)) {
            (Unit::UgM3, Unit::Ppb, Some(factor)) => PollutantReading {
                pollutant: self.pollutant,
                unit: Unit::Ppb,
                value: self.value.map(|v| v * factor),
            },
            _ => *self,
        }
    }
}
