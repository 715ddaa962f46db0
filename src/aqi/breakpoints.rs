//! Piecewise-linear mapping from a pollutant concentration to the 0–500 AQI scale.

use crate::types::pollutant::{Pollutant, Unit};

/// One segment of a breakpoint table: concentrations `c_lo..=c_hi` map linearly onto
/// indices `a_lo..=a_hi`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Breakpoint {
    pub c_lo: f64,
    pub c_hi: f64,
    pub a_lo: f64,
    pub a_hi: f64,
}

const fn bp(c_lo: f64, c_hi: f64, a_lo: f64, a_hi: f64) -> Breakpoint {
    Breakpoint {
        c_lo,
        c_hi,
        a_lo,
        a_hi,
    }
}

/// An ordered breakpoint table for one pollutant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakpointTable {
    pub pollutant: Pollutant,
    pub unit: Unit,
    pub segments: &'static [Breakpoint],
    /// Index returned for concentrations above the last segment.
    pub ceiling: f64,
}

pub const PM25_TABLE: BreakpointTable = BreakpointTable {
    pollutant: Pollutant::Pm25,
    unit: Unit::UgM3,
    segments: &[
        bp(0.0, 12.0, 0.0, 50.0),
        bp(12.1, 35.4, 51.0, 100.0),
        bp(35.5, 55.4, 101.0, 150.0),
        bp(55.5, 150.4, 151.0, 200.0),
        bp(150.5, 250.4, 201.0, 300.0),
        bp(250.5, 350.4, 301.0, 400.0),
        bp(350.5, 500.4, 401.0, 500.0),
    ],
    ceiling: 500.0,
};

pub const O3_TABLE: BreakpointTable = BreakpointTable {
    pollutant: Pollutant::O3,
    unit: Unit::Ppb,
    segments: &[
        bp(0.0, 54.0, 0.0, 50.0),
        bp(55.0, 70.0, 51.0, 100.0),
        bp(71.0, 85.0, 101.0, 150.0),
        bp(86.0, 105.0, 151.0, 200.0),
        bp(106.0, 200.0, 201.0, 300.0),
    ],
    ceiling: 300.0,
};

// The last segment tops out at 400 but anything above it saturates at 500.
pub const NO2_TABLE: BreakpointTable = BreakpointTable {
    pollutant: Pollutant::No2,
    unit: Unit::Ppb,
    segments: &[
        bp(0.0, 53.0, 0.0, 50.0),
        bp(54.0, 100.0, 51.0, 100.0),
        bp(101.0, 360.0, 101.0, 150.0),
        bp(361.0, 649.0, 151.0, 200.0),
        bp(650.0, 1249.0, 201.0, 300.0),
        bp(1250.0, 2049.0, 301.0, 400.0),
    ],
    ceiling: 500.0,
};

impl BreakpointTable {
    pub fn for_pollutant(pollutant: Pollutant) -> Option<&'static BreakpointTable> {
        match pollutant {
            Pollutant::Pm25 => Some(&PM25_TABLE),
            Pollutant::O3 => Some(&O3_TABLE),
            Pollutant::No2 => Some(&NO2_TABLE),
            _ => None,
        }
    }

    /// Interpolates the index for a concentration expressed in the table's unit.
    ///
    /// * NaN in, NaN out.
    /// * Above the last segment: the table ceiling.
    /// * Below the first segment (negative input): the first `a_lo`.
    /// * Between two segments (e.g. PM2.5 12.05): the `a_hi` of the segment below.
    pub fn interpolate(&self, c: f64) -> f64 {
        if c.is_nan() {
            return f64::NAN;
        }
        if let Some(seg) = self
            .segments
            .iter()
            .find(|seg| seg.c_lo <= c && c <= seg.c_hi)
        {
            // Multiplying before dividing keeps the segment end points exact.
            return seg.a_lo + (seg.a_hi - seg.a_lo) * (c - seg.c_lo) / (seg.c_hi - seg.c_lo);
        }

        match (self.segments.first(), self.segments.last()) {
            (Some(first), _) if c < first.c_lo => first.a_lo,
            (_, Some(last)) if c > last.c_hi => self.ceiling,
            _ => self
                .segments
                .iter()
                .rev()
                .find(|seg| seg.c_hi < c)
                .map(|seg| seg.a_hi)
                .unwrap_or(self.ceiling),
        }
    }

    /// `Option` flavoured [`BreakpointTable::interpolate`]: undefined stays undefined.
    pub fn index(&self, c: Option<f64>) -> Option<f64> {
        c.map(|c| self.interpolate(c)).filter(|a| !a.is_nan())
    }
}

/// AQI for a PM2.5 concentration in µg/m³.
pub fn aqi_from_pm25(ugm3: Option<f64>) -> Option<f64> {
    PM25_TABLE.index(ugm3)
}

/// AQI for an ozone concentration in ppb.
pub fn aqi_from_o3(ppb: Option<f64>) -> Option<f64> {
    O3_TABLE.index(ppb)
}

/// AQI for a nitrogen dioxide concentration in ppb.
pub fn aqi_from_no2(ppb: Option<f64>) -> Option<f64> {
    NO2_TABLE.index(ppb)
}
