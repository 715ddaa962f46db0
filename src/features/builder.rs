use crate::features::row::{CalendarFeatures, FeatureRow, RollingStats, WindComponents};
use crate::series::error::SeriesError;
use crate::series::time_series::{SeriesLazyFrame, TimeSeries, DATETIME_COLUMN};
use crate::utils::hour_grid;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::collections::BTreeMap;

pub const LAG_HOURS: [i64; 6] = [1, 2, 3, 6, 12, 24];
pub const ROLLING_WINDOWS: [i64; 3] = [6, 12, 24];
pub const ROLLING_MIN_PERIODS: usize = 3;

pub const WIND_SPEED_FIELD: &str = "wind_speed_10m";
pub const WIND_DIRECTION_FIELD: &str = "wind_direction_10m";

/// Features derived for one target pollutant over one hourly index.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub target: String,
    pub has_wind: bool,
    pub meteorology_fields: Vec<String>,
    pub rows: Vec<FeatureRow>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows carrying an observed target value.
    pub fn history_len(&self) -> usize {
        self.rows.iter().filter(|r| r.has_target()).count()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    /// Whether this set can produce the named feature at all.
    pub fn supplies(&self, name: &str) -> bool {
        self.rows
            .first()
            .map(|row| self.lookup(row, name).is_some())
            .unwrap_or_else(|| self.feature_kind(name).is_some())
    }

    /// Value of a named feature in `row`.
    ///
    /// The outer `Option` is `None` when this set cannot produce the feature; the inner
    /// one is `None` when the feature exists but is undefined for this row.
    pub fn lookup(&self, row: &FeatureRow, name: &str) -> Option<Option<f64>> {
        let value = match self.feature_kind(name)? {
            FeatureKind::Target => row.target,
            FeatureKind::Lag(i) => row.lags[i],
            FeatureKind::RollingMean(i) => row.rolling[i].mean,
            FeatureKind::RollingMax(i) => row.rolling[i].max,
            FeatureKind::U10 => row.wind?.u10,
            FeatureKind::V10 => row.wind?.v10,
            FeatureKind::Hour => Some(row.calendar.hour as f64),
            FeatureKind::DayOfWeek => Some(row.calendar.day_of_week as f64),
            FeatureKind::DayOfYear => Some(row.calendar.day_of_year as f64),
            FeatureKind::SinDoy => Some(row.calendar.sin_doy),
            FeatureKind::CosDoy => Some(row.calendar.cos_doy),
            FeatureKind::Meteorology => row.meteorology.get(name).copied().flatten(),
        };
        Some(value)
    }

    fn feature_kind(&self, name: &str) -> Option<FeatureKind> {
        match name {
            "u10" if self.has_wind => return Some(FeatureKind::U10),
            "v10" if self.has_wind => return Some(FeatureKind::V10),
            "hour" => return Some(FeatureKind::Hour),
            "dow" => return Some(FeatureKind::DayOfWeek),
            "doy" => return Some(FeatureKind::DayOfYear),
            "sin_doy" => return Some(FeatureKind::SinDoy),
            "cos_doy" => return Some(FeatureKind::CosDoy),
            _ => {}
        }
        if name == self.target {
            return Some(FeatureKind::Target);
        }
        if let Some(rest) = name.strip_prefix(self.target.as_str()) {
            if let Some(lag) = rest
                .strip_prefix("_lag")
                .and_then(|r| r.strip_suffix('h'))
                .and_then(|r| r.parse::<i64>().ok())
            {
                return LAG_HOURS
                    .iter()
                    .position(|l| *l == lag)
                    .map(FeatureKind::Lag);
            }
            if let Some(window) = rest.strip_prefix("_roll") {
                let (w, stat) = window.split_once('_')?;
                let i = ROLLING_WINDOWS
                    .iter()
                    .position(|x| Some(*x) == w.parse::<i64>().ok())?;
                return match stat {
                    "mean" => Some(FeatureKind::RollingMean(i)),
                    "max" => Some(FeatureKind::RollingMax(i)),
                    _ => None,
                };
            }
        }
        if self.meteorology_fields.iter().any(|f| f == name) {
            return Some(FeatureKind::Meteorology);
        }
        None
    }
}

#[derive(Debug, Clone, Copy)]
enum FeatureKind {
    Target,
    Lag(usize),
    RollingMean(usize),
    RollingMax(usize),
    U10,
    V10,
    Hour,
    DayOfWeek,
    DayOfYear,
    SinDoy,
    CosDoy,
    Meteorology,
}

const TARGET_COLUMN: &str = "__target";
const ROW_COLUMN: &str = "__row";

fn lag_column(hours: i64) -> String {
    format!("__lag{hours}")
}

fn rolling_columns(window: i64) -> (String, String) {
    (format!("__mean{window}"), format!("__max{window}"))
}

// Mean and max of the target over (t - w, t], null below the minimum number of points.
fn rolling_window(frame: LazyFrame, window: i64) -> LazyFrame {
    let (mean, max) = rolling_columns(window);
    let period = polars::prelude::Duration::parse(&format!("{window}h"));
    let offset = polars::prelude::Duration::parse(&format!("-{window}h"));
    let enough = col("count").gt_eq(lit(ROLLING_MIN_PERIODS as u32));
    frame
        .rolling(
            col(DATETIME_COLUMN),
            Vec::<Expr>::new(),
            RollingGroupOptions {
                index_column: DATETIME_COLUMN.into(),
                period,
                offset,
                closed_window: ClosedWindow::Right,
            },
        )
        .agg([
            col(TARGET_COLUMN).count().alias("count"),
            col(TARGET_COLUMN).mean().alias(mean.as_str()),
            col(TARGET_COLUMN).max().alias(max.as_str()),
        ])
        .select([
            col(DATETIME_COLUMN),
            when(enough.clone())
                .then(col(mean.as_str()))
                .otherwise(lit(NULL))
                .alias(mean.as_str()),
            when(enough)
                .then(col(max.as_str()))
                .otherwise(lit(NULL))
                .alias(max.as_str()),
        ])
}

/// Builds lag, rolling, wind and calendar features for `target_field`.
///
/// Rows follow the meteorology index (or the target's own index when there is no
/// meteorology). Lags and rolling windows are time based: they are computed on a gap-free
/// hourly grid spanning both inputs, so hours absent from the target contribute nothing.
pub fn build_features(
    meteorology: &TimeSeries,
    target: &TimeSeries,
    target_field: &str,
) -> Result<FeatureSet, SeriesError> {
    let rows_from = if meteorology.is_empty() {
        target
    } else {
        meteorology
    };
    let has_wind =
        meteorology.has_field(WIND_SPEED_FIELD) && meteorology.has_field(WIND_DIRECTION_FIELD);
    let meteorology_fields: Vec<String> = meteorology.field_names().map(String::from).collect();

    let bounds: Vec<DateTime<Utc>> = [rows_from, target]
        .iter()
        .flat_map(|s| [s.first_timestamp(), s.last_timestamp()])
        .flatten()
        .collect();
    let (Some(start), Some(end)) = (bounds.iter().min().copied(), bounds.iter().max().copied()) else {
        return Ok(FeatureSet {
            target: target_field.to_string(),
            has_wind,
            meteorology_fields,
            rows: Vec::new(),
        });
    };
    let span = (end - start).num_hours() as usize + 1;
    let grid = TimeSeries::with_index(hour_grid(start, span))?;

    let observed = if target.has_field(target_field) {
        target
            .lazy()
            .frame
            .select([col(DATETIME_COLUMN), col(target_field).alias(TARGET_COLUMN)])
    } else {
        target
            .lazy()
            .frame
            .select([col(DATETIME_COLUMN), lit(NULL).cast(DataType::Float64).alias(TARGET_COLUMN)])
    };
    let marked = rows_from
        .lazy()
        .frame
        .select([col(DATETIME_COLUMN), lit(true).alias(ROW_COLUMN)]);

    let base = grid
        .lazy()
        .frame
        .left_join(observed, col(DATETIME_COLUMN), col(DATETIME_COLUMN))
        .sort([DATETIME_COLUMN], SortMultipleOptions::default())
        .with_columns(
            LAG_HOURS
                .iter()
                .map(|l| col(TARGET_COLUMN).shift(lit(*l)).alias(lag_column(*l).as_str()))
                .collect::<Vec<_>>(),
        );
    let mut frame = base.clone();
    for window in ROLLING_WINDOWS {
        let stats = rolling_window(base.clone(), window);
        frame = frame.left_join(stats, col(DATETIME_COLUMN), col(DATETIME_COLUMN));
    }
    let frame = frame
        .left_join(marked, col(DATETIME_COLUMN), col(DATETIME_COLUMN))
        .filter(col(ROW_COLUMN).is_not_null())
        .select([col("*").exclude([ROW_COLUMN])]);
    let table = SeriesLazyFrame::new(frame).collect()?;
    let table = if meteorology.is_empty() {
        table
    } else {
        table.left_join(meteorology)?
    };

    let column = |name: &str| table.field(name).unwrap_or_else(|| vec![None; table.len()]);
    let targets = column(TARGET_COLUMN);
    let lags = LAG_HOURS.map(|l| column(&lag_column(l)));
    let rolling = ROLLING_WINDOWS.map(|w| {
        let (mean, max) = rolling_columns(w);
        (column(&mean), column(&max))
    });
    let met: Vec<(String, Vec<Option<f64>>)> = meteorology_fields
        .iter()
        .map(|f| (f.clone(), column(f)))
        .collect();
    let met_value = |field: &str, i: usize| {
        met.iter()
            .find(|(name, _)| name == field)
            .and_then(|(_, values)| values[i])
    };

    let rows = table
        .index()
        .into_iter()
        .enumerate()
        .map(|(i, ts)| FeatureRow {
            timestamp: ts,
            target: targets[i],
            lags: std::array::from_fn(|j| lags[j][i]),
            rolling: std::array::from_fn(|j| RollingStats {
                mean: rolling[j].0[i],
                max: rolling[j].1[i],
            }),
            wind: has_wind.then(|| {
                WindComponents::from_speed_direction(
                    met_value(WIND_SPEED_FIELD, i),
                    met_value(WIND_DIRECTION_FIELD, i),
                )
            }),
            calendar: CalendarFeatures::from_timestamp(&ts),
            meteorology: met
                .iter()
                .map(|(name, values)| (name.clone(), values[i]))
                .collect::<BTreeMap<_, _>>(),
        })
        .collect();

    Ok(FeatureSet {
        target: target_field.to_string(),
        has_wind,
        meteorology_fields,
        rows,
    })
}
