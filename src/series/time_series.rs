//! An hourly, UTC-indexed table of optional numeric fields, backed by a polars frame.

use crate::frame::datetime_column;
use crate::series::error::SeriesError;
use crate::utils::is_hour_aligned;
use chrono::{DateTime, Utc};
use polars::prelude::*;

/// Name of the index column.
pub const DATETIME_COLUMN: &str = "datetime";

pub(crate) fn datetime_dtype() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Whole-hour UTC timestamps mapped to named numeric fields.
///
/// The frame holds a `datetime` column (`Datetime(Milliseconds)`) and one `Float64` column
/// per field. The index is strictly increasing and every timestamp sits on a whole hour.
/// A missing value is a null; NaN is stored as null.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    frame: DataFrame,
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::empty()
    }
}

fn validate_index(index: &[DateTime<Utc>]) -> Result<(), SeriesError> {
    if let Some(bad) = index.iter().find(|ts| !is_hour_aligned(ts)) {
        return Err(SeriesError::NotHourAligned(*bad));
    }
    if let Some(pair) = index.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(SeriesError::NotIncreasing {
            previous: pair[0],
            current: pair[1],
        });
    }
    Ok(())
}

fn check_field(name: &str, expected: usize, found: usize) -> Result<(), SeriesError> {
    if name == DATETIME_COLUMN {
        return Err(SeriesError::ReservedField(name.to_string()));
    }
    if expected != found {
        return Err(SeriesError::LengthMismatch {
            field: name.to_string(),
            expected,
            found,
        });
    }
    Ok(())
}

fn clean(values: Vec<Option<f64>>) -> Vec<Option<f64>> {
    values
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect()
}

impl TimeSeries {
    pub fn empty() -> Self {
        let schema = Schema::from_iter([Field::new(DATETIME_COLUMN.into(), datetime_dtype())]);
        Self {
            frame: DataFrame::empty_with_schema(&schema),
        }
    }

    /// Creates a series with the given index and no fields.
    pub fn with_index(index: Vec<DateTime<Utc>>) -> Result<Self, SeriesError> {
        validate_index(&index)?;
        let frame = DataFrame::new(vec![datetime_column(DATETIME_COLUMN, &index)?])?;
        Ok(Self { frame })
    }

    /// Builds a series from unordered timestamps and equally long field columns.
    ///
    /// Rows are sorted by timestamp. When the same timestamp occurs more than once the
    /// last row wins as a whole.
    pub fn from_columns<I, S>(timestamps: &[DateTime<Utc>], fields: I) -> Result<Self, SeriesError>
    where
        I: IntoIterator<Item = (S, Vec<Option<f64>>)>,
        S: Into<String>,
    {
        if let Some(bad) = timestamps.iter().find(|ts| !is_hour_aligned(ts)) {
            return Err(SeriesError::NotHourAligned(*bad));
        }
        let mut columns = vec![datetime_column(DATETIME_COLUMN, timestamps)?];
        for (name, values) in fields {
            let name: String = name.into();
            check_field(&name, timestamps.len(), values.len())?;
            columns.push(Column::new(name.into(), clean(values)));
        }
        Self::from_frame(DataFrame::new(columns)?)
    }

    /// Wraps a frame holding a `datetime` column and numeric fields.
    ///
    /// Fields are cast to `Float64`, rows without a timestamp are dropped, duplicated
    /// timestamps keep their last row and the result is sorted.
    pub fn from_frame(frame: DataFrame) -> Result<Self, SeriesError> {
        SeriesLazyFrame::new(frame.lazy()).collect()
    }

    /// Adds (or replaces) a field. The value vector must match the index length.
    pub fn insert_field(
        &mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<(), SeriesError> {
        let name: String = name.into();
        check_field(&name, self.len(), values.len())?;
        self.frame
            .with_column(Column::new(name.into(), clean(values)))?;
        Ok(())
    }

    /// Builder flavoured [`TimeSeries::insert_field`].
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, SeriesError> {
        self.insert_field(name, values)?;
        Ok(self)
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn into_frame(self) -> DataFrame {
        self.frame
    }

    pub fn lazy(&self) -> SeriesLazyFrame {
        SeriesLazyFrame::new(self.frame.clone().lazy())
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    fn millis(&self) -> Vec<i64> {
        match self
            .frame
            .column(DATETIME_COLUMN)
            .and_then(|c| c.datetime())
        {
            Ok(ca) => ca.physical().into_iter().flatten().collect(),
            // every constructor creates the index column
            Err(_) => Vec::new(),
        }
    }

    pub fn index(&self) -> Vec<DateTime<Utc>> {
        self.millis()
            .into_iter()
            .filter_map(DateTime::from_timestamp_millis)
            .collect()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.millis()
            .first()
            .copied()
            .and_then(DateTime::from_timestamp_millis)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.millis()
            .last()
            .copied()
            .and_then(DateTime::from_timestamp_millis)
    }

    fn values(&self, name: &str) -> Option<&Float64Chunked> {
        if name == DATETIME_COLUMN {
            return None;
        }
        self.frame.column(name).ok()?.f64().ok()
    }

    pub fn field(&self, name: &str) -> Option<Vec<Option<f64>>> {
        self.values(name).map(|ca| ca.into_iter().collect())
    }

    pub fn has_field(&self, name: &str) -> bool {
        name != DATETIME_COLUMN && self.frame.get_column_index(name).is_some()
    }

    /// `true` when the field exists and holds at least one defined value.
    pub fn has_data(&self, name: &str) -> bool {
        self.values(name)
            .map(|ca| ca.null_count() < ca.len())
            .unwrap_or(false)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.frame
            .get_columns()
            .iter()
            .map(|c| c.name().as_str())
            .filter(|name| *name != DATETIME_COLUMN)
    }

    /// Position of `ts` in the index.
    pub fn position(&self, ts: &DateTime<Utc>) -> Option<usize> {
        self.millis().binary_search(&ts.timestamp_millis()).ok()
    }

    pub fn value_at(&self, name: &str, ts: &DateTime<Utc>) -> Option<f64> {
        let pos = self.position(ts)?;
        self.values(name)?.get(pos)
    }

    /// `(timestamp, value)` pairs of the defined values of a field.
    pub fn defined_values(&self, name: &str) -> Vec<(DateTime<Utc>, f64)> {
        match self.values(name) {
            Some(values) => self
                .index()
                .into_iter()
                .zip(values)
                .filter_map(|(ts, v)| v.map(|v| (ts, v)))
                .collect(),
            None => Vec::new(),
        }
    }

    /// A copy holding only the named fields that exist.
    pub fn select(&self, names: &[&str]) -> Result<TimeSeries, SeriesError> {
        let keep: Vec<&str> = std::iter::once(DATETIME_COLUMN)
            .chain(self.field_names().filter(|n| names.contains(n)))
            .collect();
        Ok(TimeSeries {
            frame: self.frame.select(keep)?,
        })
    }

    /// Renames a field, replacing any field already carrying the new name.
    pub fn rename_field(&mut self, from: &str, to: &str) -> Result<(), SeriesError> {
        if from == to || !self.has_field(from) {
            return Ok(());
        }
        if to == DATETIME_COLUMN {
            return Err(SeriesError::ReservedField(to.to_string()));
        }
        if self.has_field(to) {
            self.frame = self.frame.drop(to)?;
        }
        self.frame.rename(from, to.into())?;
        Ok(())
    }

    /// Rows with `start <= ts <= end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeSeries, SeriesError> {
        self.lazy().between(start, end).collect()
    }

    /// Left-outer join of `other` onto this index. Fields of `other` missing at a
    /// timestamp are null; on a name collision this series' field is kept.
    pub fn left_join(&self, other: &TimeSeries) -> Result<TimeSeries, SeriesError> {
        let incoming: Vec<Expr> = std::iter::once(col(DATETIME_COLUMN))
            .chain(
                other
                    .field_names()
                    .filter(|name| !self.has_field(name))
                    .map(|name| col(name)),
            )
            .collect();
        SeriesLazyFrame::new(self.frame.clone().lazy().left_join(
            other.frame.clone().lazy().select(incoming),
            col(DATETIME_COLUMN),
            col(DATETIME_COLUMN),
        ))
        .collect()
    }

    /// Re-expresses the series on another hourly grid. Grid timestamps absent from the
    /// series get missing values; rows outside the grid are dropped.
    pub fn reindex(&self, grid: &[DateTime<Utc>]) -> Result<TimeSeries, SeriesError> {
        TimeSeries::with_index(grid.to_vec())?.left_join(self)
    }

    /// Propagates the last defined value of every field forward across at most `limit`
    /// consecutive missing rows. Longer gaps keep their tail missing.
    pub fn forward_fill(&self, limit: usize) -> Result<TimeSeries, SeriesError> {
        let filled: Vec<Expr> = self
            .field_names()
            .map(|name| col(name).forward_fill(Some(limit as IdxSize)))
            .collect();
        if filled.is_empty() {
            return Ok(self.clone());
        }
        SeriesLazyFrame::new(self.frame.clone().lazy().with_columns(filled)).collect()
    }
}

/// A lazy view of a [`TimeSeries`] frame.
#[derive(Clone)]
pub struct SeriesLazyFrame {
    pub frame: LazyFrame,
}

impl SeriesLazyFrame {
    pub fn new(frame: LazyFrame) -> Self {
        Self { frame }
    }

    pub fn filter(&self, predicate: Expr) -> SeriesLazyFrame {
        SeriesLazyFrame::new(self.frame.clone().filter(predicate))
    }

    /// Rows with `start <= datetime <= end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> SeriesLazyFrame {
        self.filter(
            col(DATETIME_COLUMN)
                .gt_eq(lit(start.naive_utc()))
                .and(col(DATETIME_COLUMN).lt_eq(lit(end.naive_utc()))),
        )
    }

    /// Executes the plan and restores the series invariants: `Float64` fields with NaN as
    /// null, one row per timestamp (the last one) in ascending order.
    pub fn collect(self) -> Result<TimeSeries, SeriesError> {
        let mut frame = self.frame;
        let schema = frame.collect_schema()?;
        let fields: Vec<Expr> = schema
            .iter_names()
            .filter(|name| name.as_str() != DATETIME_COLUMN)
            .map(|name| {
                col(name.clone())
                    .cast(DataType::Float64)
                    .fill_nan(lit(NULL))
            })
            .collect();
        let mut frame = frame.with_column(col(DATETIME_COLUMN).cast(datetime_dtype()));
        if !fields.is_empty() {
            frame = frame.with_columns(fields);
        }
        let frame = frame
            .drop_nulls(Some(vec![col(DATETIME_COLUMN)]))
            .unique_stable(Some(vec![DATETIME_COLUMN.into()]), UniqueKeepStrategy::Last)
            .sort([DATETIME_COLUMN], SortMultipleOptions::default())
            .collect()?;
        let series = TimeSeries { frame };
        validate_index(&series.index())?;
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t(h: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap() + Duration::hours(h)
    }

    #[test]
    fn test_rejects_unaligned_and_unsorted_index() {
        let unaligned = t(1) + Duration::minutes(30);
        assert!(matches!(
            TimeSeries::with_index(vec![t(0), unaligned]),
            Err(SeriesError::NotHourAligned(ts)) if ts == unaligned
        ));
        assert!(matches!(
            TimeSeries::with_index(vec![t(1), t(1)]),
            Err(SeriesError::NotIncreasing { .. })
        ));
    }

    #[test]
    fn test_length_mismatch_and_reserved_name() {
        let ts = TimeSeries::with_index(vec![t(0), t(1)]).unwrap();
        let err = ts.clone().with_field("pm25", vec![Some(1.0)]).unwrap_err();
        assert!(matches!(err, SeriesError::LengthMismatch { expected: 2, found: 1, .. }));
        let err = ts.with_field(DATETIME_COLUMN, vec![None, None]).unwrap_err();
        assert!(matches!(err, SeriesError::ReservedField(_)));
    }

    #[test]
    fn test_from_columns_sorts_and_keeps_last_row() -> Result<(), Box<dyn std::error::Error>> {
        let ts = TimeSeries::from_columns(
            &[t(2), t(0), t(0)],
            [
                ("a", vec![Some(3.0), Some(1.0), Some(5.0)]),
                ("b", vec![None, Some(9.0), None]),
            ],
        )?;
        assert_eq!(ts.index(), vec![t(0), t(2)]);
        assert_eq!(ts.field("a"), Some(vec![Some(5.0), Some(3.0)]));
        // whole-row replacement: b from the first t(0) row is gone
        assert_eq!(ts.field("b"), Some(vec![None, None]));
        Ok(())
    }

    #[test]
    fn test_frame_layout() -> Result<(), Box<dyn std::error::Error>> {
        let ts = TimeSeries::with_index(vec![t(0)])?.with_field("x", vec![Some(1.0)])?;
        assert!(matches!(
            ts.frame().column(DATETIME_COLUMN)?.dtype(),
            DataType::Datetime(TimeUnit::Milliseconds, None)
        ));
        assert_eq!(ts.frame().column("x")?.dtype(), &DataType::Float64);
        assert_eq!(TimeSeries::empty().len(), 0);
        assert!(TimeSeries::empty().frame().column(DATETIME_COLUMN).is_ok());
        Ok(())
    }

    #[test]
    fn test_nan_becomes_missing() {
        let ts = TimeSeries::with_index(vec![t(0)])
            .unwrap()
            .with_field("x", vec![Some(f64::NAN)])
            .unwrap();
        assert_eq!(ts.field("x"), Some(vec![None]));
        assert!(!ts.has_data("x"));
    }

    #[test]
    fn test_reindex_and_between() -> Result<(), Box<dyn std::error::Error>> {
        let ts = TimeSeries::with_index(vec![t(0), t(1), t(2)])?
            .with_field("x", vec![Some(0.0), Some(1.0), Some(2.0)])?;
        let re = ts.reindex(&[t(1), t(2), t(3)])?;
        assert_eq!(re.index(), vec![t(1), t(2), t(3)]);
        assert_eq!(re.field("x"), Some(vec![Some(1.0), Some(2.0), None]));

        let mid = ts.between(t(1), t(5))?;
        assert_eq!(mid.index(), vec![t(1), t(2)]);
        assert_eq!(ts.value_at("x", &t(2)), Some(2.0));
        assert_eq!(ts.value_at("x", &t(7)), None);
        assert_eq!(ts.last_timestamp(), Some(t(2)));
        Ok(())
    }

    #[test]
    fn test_forward_fill_limit() -> Result<(), Box<dyn std::error::Error>> {
        let ts = TimeSeries::with_index((0..6).map(t).collect())?
            .with_field("x", vec![Some(1.0), None, None, None, Some(5.0), None])?
            .with_field("y", vec![None, Some(2.0), None, None, None, None])?;
        let filled = ts.forward_fill(2)?;
        assert_eq!(
            filled.field("x"),
            Some(vec![Some(1.0), Some(1.0), Some(1.0), None, Some(5.0), Some(5.0)])
        );
        assert_eq!(
            filled.field("y"),
            Some(vec![None, Some(2.0), Some(2.0), Some(2.0), None, None])
        );
        Ok(())
    }

    #[test]
    fn test_rename_and_select() -> Result<(), Box<dyn std::error::Error>> {
        let mut ts = TimeSeries::with_index(vec![t(0)])?
            .with_field("pm2_5", vec![Some(4.0)])?
            .with_field("pm25", vec![Some(1.0)])?
            .with_field("ozone", vec![Some(8.0)])?;
        ts.rename_field("pm2_5", "pm25")?;
        assert!(!ts.has_field("pm2_5"));
        assert_eq!(ts.value_at("pm25", &t(0)), Some(4.0));
        let only = ts.select(&["ozone"])?;
        assert_eq!(only.field_names().collect::<Vec<_>>(), vec!["ozone"]);
        assert_eq!(only.len(), 1);
        Ok(())
    }

    #[test]
    fn test_lazy_filter_collects_back() -> Result<(), Box<dyn std::error::Error>> {
        let ts = TimeSeries::with_index((0..4).map(t).collect())?
            .with_field("x", vec![Some(1.0), Some(7.0), None, Some(9.0)])?;
        let high = ts.lazy().filter(col("x").gt(lit(5.0))).collect()?;
        assert_eq!(high.index(), vec![t(1), t(3)]);
        Ok(())
    }
}
