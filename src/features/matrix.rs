use crate::features::builder::FeatureSet;
use crate::features::row::FeatureRow;
use crate::series::error::SeriesError;
use crate::series::time_series::TimeSeries;
use chrono::{DateTime, Utc};
use log::debug;

/// Column-ordered model input: one row per grid timestamp, one column per feature name.
///
/// Undefined cells are `f64::NAN`; the model decides how to treat them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub names: Vec<String>,
    pub timestamps: Vec<DateTime<Utc>>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Arranges `set` on `grid` in the order of `names`.
    ///
    /// Columns the set cannot produce at all are filled with `0.0`. Every column is then
    /// forward filled over at most `ffill_limit` missing hours; longer gaps stay NaN.
    pub fn build(
        set: &FeatureSet,
        names: &[String],
        grid: &[DateTime<Utc>],
        ffill_limit: usize,
    ) -> Result<Self, SeriesError> {
        let by_time: Vec<Option<&FeatureRow>> = grid
            .iter()
            .map(|ts| {
                set.rows
                    .binary_search_by_key(ts, |r| r.timestamp)
                    .ok()
                    .map(|i| &set.rows[i])
            })
            .collect();

        // Positional keys: model feature names may repeat or clash with the index.
        let key = |j: usize| format!("f{j}");
        let mut table = TimeSeries::with_index(grid.to_vec())?;
        for (j, name) in names.iter().enumerate() {
            let column: Vec<Option<f64>> = if set.supplies(name) {
                by_time
                    .iter()
                    .map(|row| row.and_then(|r| set.lookup(r, name).flatten()))
                    .collect()
            } else {
                debug!("Feature '{}' not available for {}, using 0.0", name, set.target);
                vec![Some(0.0); grid.len()]
            };
            table.insert_field(key(j), column)?;
        }
        let filled = table.forward_fill(ffill_limit)?;
        let columns: Vec<Vec<Option<f64>>> = (0..names.len())
            .map(|j| filled.field(&key(j)).unwrap_or_else(|| vec![None; grid.len()]))
            .collect();

        let rows = (0..grid.len())
            .map(|i| {
                columns
                    .iter()
                    .map(|col| col[i].unwrap_or(f64::NAN))
                    .collect()
            })
            .collect();

        Ok(Self {
            names: names.to_vec(),
            timestamps: grid.to_vec(),
            rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.names.len()
    }

    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let j = self.names.iter().position(|n| n == name)?;
        Some(self.rows.iter().map(|row| row[j]).collect())
    }
}
