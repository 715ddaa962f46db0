//! Defines the pollutants tracked by the pipeline and the concentration units they are
//! reported in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pollutant identity.
///
/// The declaration order is the tie-break priority used when several pollutants share
/// the maximum AQI (PM2.5 first, then O3, then NO2), so the derived `Ord` can be relied
/// upon for that purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Pollutant {
    /// Fine particulate matter, diameter below 2.5 µm.
    #[serde(rename = "PM2.5")]
    Pm25,
    /// Ground-level ozone.
    #[serde(rename = "O3")]
    O3,
    /// Nitrogen dioxide.
    #[serde(rename = "NO2")]
    No2,
    /// Coarse particulate matter, diameter below 10 µm.
    #[serde(rename = "PM10")]
    Pm10,
    /// Sulphur dioxide.
    #[serde(rename = "SO2")]
    So2,
    /// Carbon monoxide.
    #[serde(rename = "CO")]
    Co,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::Pm25,
        Pollutant::O3,
        Pollutant::No2,
        Pollutant::Pm10,
        Pollutant::So2,
        Pollutant::Co,
    ];

    /// Pollutants with an AQI breakpoint table, in tie-break priority order.
    pub const WITH_AQI: [Pollutant; 3] = [Pollutant::Pm25, Pollutant::O3, Pollutant::No2];

    /// Canonical field name used inside aligned series and feature names.
    pub fn key(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm25",
            Pollutant::O3 => "o3",
            Pollutant::No2 => "no2",
            Pollutant::Pm10 => "pm10",
            Pollutant::So2 => "so2",
            Pollutant::Co => "co",
        }
    }

    /// Field name used by the Open-Meteo / CAMS air-quality API.
    pub fn provider_field(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "pm2_5",
            Pollutant::O3 => "ozone",
            Pollutant::No2 => "nitrogen_dioxide",
            Pollutant::Pm10 => "pm10",
            Pollutant::So2 => "sulphur_dioxide",
            Pollutant::Co => "carbon_monoxide",
        }
    }

    /// Parameter name used by the OpenAQ measurements API.
    pub fn openaq_parameter(&self) -> &'static str {
        self.key()
    }

    pub fn from_provider_field(name: &str) -> Option<Pollutant> {
        Pollutant::ALL
            .into_iter()
            .find(|p| p.provider_field() == name)
    }

    pub fn from_key(key: &str) -> Option<Pollutant> {
        Pollutant::ALL.into_iter().find(|p| p.key() == key)
    }

    /// Human readable label, e.g. `PM2.5`.
    pub fn label(&self) -> &'static str {
        match self {
            Pollutant::Pm25 => "PM2.5",
            Pollutant::O3 => "O3",
            Pollutant::No2 => "NO2",
            Pollutant::Pm10 => "PM10",
            Pollutant::So2 => "SO2",
            Pollutant::Co => "CO",
        }
    }

    /// The unit in which this pollutant's AQI breakpoints are expressed.
    pub fn aqi_unit(&self) -> Unit {
        match self {
            Pollutant::O3 | Pollutant::No2 => Unit::Ppb,
            _ => Unit::UgM3,
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Concentration unit of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    /// Micrograms per cubic metre.
    #[serde(rename = "ug/m3")]
    UgM3,
    /// Parts per billion.
    #[serde(rename = "ppb")]
    Ppb,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::UgM3 => write!(f, "µg/m³"),
            Unit::Ppb => write!(f, "ppb"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order_follows_declaration() {
        let mut shuffled = vec![Pollutant::No2, Pollutant::Pm25, Pollutant::O3];
        shuffled.sort();
        assert_eq!(shuffled, Pollutant::WITH_AQI.to_vec());
    }

    #[test]
    fn test_provider_field_round_trip() {
        for p in Pollutant::ALL {
            assert_eq!(Pollutant::from_provider_field(p.provider_field()), Some(p));
            assert_eq!(Pollutant::from_key(p.key()), Some(p));
        }
        assert_eq!(Pollutant::from_provider_field("pm25"), None);
    }

    #[test]
    fn test_serialized_labels() {
        let json = serde_json::to_string(&Pollutant::Pm25).unwrap();
        assert_eq!(json, "\"PM2.5\"");
        assert_eq!(Unit::Ppb.to_string(), "ppb");
    }
}
