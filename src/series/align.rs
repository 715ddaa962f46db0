//! Merging of heterogeneous hourly series into one table.

use crate::series::error::SeriesError;
use crate::series::time_series::{SeriesLazyFrame, TimeSeries};
use crate::types::pollutant::Pollutant;
use chrono::{DateTime, Utc};
use polars::prelude::{concat_lf_diagonal, LazyFrame, UnionArgs};
use std::collections::BTreeMap;

/// Concatenates series, sorting by timestamp. A timestamp present in several parts keeps
/// the row of the last part that carries it, as a whole.
pub fn concat<'a, I>(parts: I) -> Result<TimeSeries, SeriesError>
where
    I: IntoIterator<Item = &'a TimeSeries>,
{
    let frames: Vec<LazyFrame> = parts
        .into_iter()
        .filter(|part| !part.is_empty())
        .map(|part| part.lazy().frame)
        .collect();
    if frames.is_empty() {
        return Ok(TimeSeries::empty());
    }
    // Parts stay in order, so the last duplicate is the one of the latest part.
    let stacked = concat_lf_diagonal(frames, UnionArgs::default())?;
    SeriesLazyFrame::new(stacked).collect()
}

/// Left-outer join onto the primary's index. Fields of `other` missing at a primary
/// timestamp are `None`; on a name collision the primary's field is kept.
pub fn left_join(primary: &TimeSeries, other: &TimeSeries) -> Result<TimeSeries, SeriesError> {
    primary.left_join(other)
}

/// Renames provider air-quality fields (`pm2_5`, `ozone`, ...) to canonical pollutant keys.
pub fn canonicalize_air_quality(series: &TimeSeries) -> Result<TimeSeries, SeriesError> {
    let mut renamed = series.clone();
    for pollutant in Pollutant::ALL {
        renamed.rename_field(pollutant.provider_field(), pollutant.key())?;
    }
    Ok(renamed)
}

/// One single-field series per pollutant, each under the pollutant's canonical key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollutantHistory(pub BTreeMap<Pollutant, TimeSeries>);

impl PollutantHistory {
    pub fn series(&self, pollutant: Pollutant) -> Option<&TimeSeries> {
        self.0.get(&pollutant)
    }

    /// Defined values of a pollutant, oldest first.
    pub fn values(&self, pollutant: Pollutant) -> Vec<(DateTime<Utc>, f64)> {
        self.series(pollutant)
            .map(|s| s.defined_values(pollutant.key()))
            .unwrap_or_default()
    }

    pub fn pollutants(&self) -> impl Iterator<Item = Pollutant> + '_ {
        self.0.keys().copied()
    }
}

/// Splits a canonicalized air-quality table into one series per pollutant it carries.
pub fn split_pollutants(aq: &TimeSeries) -> Result<PollutantHistory, SeriesError> {
    let mut split = BTreeMap::new();
    for pollutant in Pollutant::ALL {
        if aq.has_field(pollutant.key()) {
            split.insert(pollutant, aq.select(&[pollutant.key()])?);
        }
    }
    Ok(PollutantHistory(split))
}

/// Result of aligning one request's raw inputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedHistory {
    /// Meteorology joined with canonical air-quality fields, on the meteorology index
    /// (or the air-quality index when there is no meteorology).
    pub table: TimeSeries,
    pub pollutants: PollutantHistory,
}

/// Aligns chunked meteorology and air-quality history into a single hourly table.
pub fn align_hourly(
    meteorology: &[TimeSeries],
    air_quality: &[TimeSeries],
) -> Result<AlignedHistory, SeriesError> {
    let met = concat(meteorology)?;
    let aq = canonicalize_air_quality(&concat(air_quality)?)?;

    let table = if met.is_empty() {
        aq.clone()
    } else {
        left_join(&met, &aq)?
    };
    Ok(AlignedHistory {
        pollutants: split_pollutants(&aq)?,
        table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    fn series(hours: &[i64], field: &str, values: &[Option<f64>]) -> TimeSeries {
        TimeSeries::with_index(hours.iter().map(|h| t(*h)).collect())
            .unwrap()
            .with_field(field, values.to_vec())
            .unwrap()
    }

    #[test]
    fn test_concat_overlapping_chunks_keep_last() -> Result<(), Box<dyn std::error::Error>> {
        let a = series(&[0, 1, 2], "pm2_5", &[Some(1.0), Some(2.0), Some(3.0)]);
        let b = series(&[2, 3], "pm2_5", &[Some(30.0), Some(4.0)]);
        let merged = concat([&a, &b])?;
        assert_eq!(merged.index(), vec![t(0), t(1), t(2), t(3)]);
        assert_eq!(
            merged.field("pm2_5"),
            Some(vec![Some(1.0), Some(2.0), Some(30.0), Some(4.0)])
        );
        Ok(())
    }

    #[test]
    fn test_concat_last_row_replaces_whole_row() -> Result<(), Box<dyn std::error::Error>> {
        let a = series(&[0, 1], "pm2_5", &[Some(1.0), Some(2.0)])
            .with_field("ozone", vec![Some(50.0), Some(60.0)])?;
        let b = series(&[1], "pm2_5", &[Some(20.0)]);
        let merged = concat([&a, &b])?;
        assert_eq!(merged.field("pm2_5"), Some(vec![Some(1.0), Some(20.0)]));
        // the later chunk has no ozone column, so its row carries none
        assert_eq!(merged.field("ozone"), Some(vec![Some(50.0), None]));
        Ok(())
    }

    #[test]
    fn test_concat_out_of_order_parts() -> Result<(), Box<dyn std::error::Error>> {
        let later = series(&[5, 6], "x", &[Some(5.0), Some(6.0)]);
        let earlier = series(&[0], "x", &[Some(0.0)]);
        let merged = concat([&later, &TimeSeries::empty(), &earlier])?;
        assert_eq!(merged.index(), vec![t(0), t(5), t(6)]);
        assert!(concat([&TimeSeries::empty()])?.is_empty());
        Ok(())
    }

    #[test]
    fn test_left_join_primary_wins_and_gaps_are_missing() -> Result<(), Box<dyn std::error::Error>> {
        let met = series(&[0, 1, 2], "temperature_2m", &[Some(10.0), Some(11.0), Some(12.0)])
            .with_field("pm25", vec![Some(-1.0), Some(-1.0), Some(-1.0)])?;
        let aq = series(&[1, 2, 9], "pm25", &[Some(7.0), Some(8.0), Some(9.0)])
            .with_field("o3", vec![Some(40.0), None, Some(1.0)])?;
        let joined = left_join(&met, &aq)?;
        assert_eq!(joined.index(), met.index());
        assert_eq!(joined.field("pm25"), Some(vec![Some(-1.0); 3]));
        assert_eq!(joined.field("o3"), Some(vec![None, Some(40.0), None]));
        assert!(!joined.has_field("pm25_right"));
        Ok(())
    }

    #[test]
    fn test_canonical_names_and_split() -> Result<(), Box<dyn std::error::Error>> {
        let aq = series(&[0], "pm2_5", &[Some(5.0)])
            .with_field("nitrogen_dioxide", vec![Some(20.0)])?
            .with_field("european_aqi", vec![Some(1.0)])?;
        let aligned = align_hourly(&[], &[aq])?;
        assert!(aligned.table.has_field("pm25"));
        assert!(aligned.table.has_field("no2"));
        assert!(aligned.table.has_field("european_aqi"));
        let keys: Vec<Pollutant> = aligned.pollutants.pollutants().collect();
        assert_eq!(keys, vec![Pollutant::Pm25, Pollutant::No2]);
        assert_eq!(aligned.pollutants.values(Pollutant::No2), vec![(t(0), 20.0)]);
        Ok(())
    }

    #[test]
    fn test_empty_inputs() -> Result<(), Box<dyn std::error::Error>> {
        let aligned = align_hourly(&[], &[])?;
        assert!(aligned.table.is_empty());
        assert!(aligned.pollutants.0.is_empty());
        Ok(())
    }
}
