//! Fixed µg/m³ → ppb conversions at standard conditions (25 °C, 1 atm).
//!
//! The factors are derived from the molar masses of the gases and must not be altered.
//! Conversions are one-directional: the pipeline never needs to go back to µg/m³.

use crate::types::pollutant::Pollutant;

pub const O3_UGM3_TO_PPB: f64 = 0.509;
pub const NO2_UGM3_TO_PPB: f64 = 1.88;

/// Converts an ozone concentration from µg/m³ to ppb. NaN propagates.
pub fn to_ppb_o3(ugm3: f64) -> f64 {
    ugm3 * O3_UGM3_TO_PPB
}

/// Converts a nitrogen dioxide concentration from µg/m³ to ppb. NaN propagates.
pub fn to_ppb_no2(ugm3: f64) -> f64 {
    ugm3 * NO2_UGM3_TO_PPB
}

/// The µg/m³ → ppb factor for a pollutant, if one is defined.
pub fn conversion_factor(pollutant: Pollutant) -> Option<f64> {
    match pollutant {
        Pollutant::O3 => Some(O3_UGM3_TO_PPB),
        Pollutant::No2 => Some(NO2_UGM3_TO_PPB),
        _ => None,
    }
}
