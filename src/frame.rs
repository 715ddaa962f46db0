//! Tabular export of forecasts and nowcasts as polars frames.

use crate::error::AircastError;
use crate::pipeline::forecast::Forecast;
use crate::types::forecast_point::{ForecastPoint, NowcastWindow};
use crate::types::pollutant::Pollutant;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::path::Path;

pub(crate) fn datetime_column(name: &str, timestamps: &[DateTime<Utc>]) -> PolarsResult<Column> {
    let millis: Vec<i64> = timestamps.iter().map(|t| t.timestamp_millis()).collect();
    let series = Series::new(name.into(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    Ok(Column::from(series))
}

fn point_columns<'a, I>(points: I) -> PolarsResult<Vec<Column>>
where
    I: Iterator<Item = &'a ForecastPoint> + Clone,
{
    let timestamps: Vec<DateTime<Utc>> = points.clone().map(|p| p.timestamp).collect();
    let mut columns = vec![
        datetime_column("timestamp", &timestamps)?,
        Column::new(
            "aqi".into(),
            points.clone().map(|p| p.aqi.value as u32).collect::<Vec<_>>(),
        ),
        Column::new(
            "dominant".into(),
            points
                .clone()
                .map(|p| p.aqi.dominant.map(|d| d.label()))
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "category".into(),
            points
                .clone()
                .map(|p| p.category.name())
                .collect::<Vec<_>>(),
        ),
        Column::new(
            "confidence".into(),
            points.clone().map(|p| p.confidence).collect::<Vec<_>>(),
        ),
    ];

    for pollutant in Pollutant::ALL {
        if !points.clone().any(|p| p.reading(pollutant).is_some()) {
            continue;
        }
        let values: Vec<Option<f64>> = points
            .clone()
            .map(|p| p.reading(pollutant).and_then(|r| r.value))
            .collect();
        columns.push(Column::new(pollutant.key().into(), values));
        if Pollutant::WITH_AQI.contains(&pollutant) {
            let aqi: Vec<Option<u32>> = points
                .clone()
                .map(|p| p.aqi_of(pollutant).map(u32::from))
                .collect();
            columns.push(Column::new(format!("aqi_{}", pollutant.key()).into(), aqi));
        }
    }
    Ok(columns)
}

impl Forecast {
    /// One row per forecast hour: timestamp, overall AQI, dominant pollutant, category,
    /// confidence, then a concentration and AQI column per pollutant.
    pub fn to_frame(&self) -> Result<DataFrame, AircastError> {
        Ok(DataFrame::new(point_columns(self.points.iter())?)?)
    }

    pub fn to_lazy(&self) -> Result<ForecastFrame, AircastError> {
        Ok(ForecastFrame::new(self.to_frame()?.lazy()))
    }
}

impl NowcastWindow {
    /// Like [`Forecast::to_frame`], plus a `{pollutant}_state` column per pollutant.
    pub fn to_frame(&self) -> Result<DataFrame, AircastError> {
        let mut columns = point_columns(self.points.iter().map(|p| &p.point))?;
        for pollutant in Pollutant::WITH_AQI {
            let states: Vec<Option<String>> = self
                .points
                .iter()
                .map(|p| p.states.get(&pollutant).map(|s| format!("{:?}", s)))
                .collect();
            columns.push(Column::new(
                format!("{}_state", pollutant.key()).into(),
                states,
            ));
        }
        Ok(DataFrame::new(columns)?)
    }
}

/// A lazy view of a forecast table.
#[derive(Clone)]
pub struct ForecastFrame {
    pub frame: LazyFrame,
}

impl ForecastFrame {
    pub fn new(frame: LazyFrame) -> Self {
        Self { frame }
    }

    /// Applies an arbitrary polars predicate.
    ///
    /// # Examples
    ///
    /// ```
    /// # use aircast::{Forecast, ForecastFrame, LatLon};
    /// # use polars::prelude::*;
    /// # fn run(forecast: &Forecast) -> Result<(), Box<dyn std::error::Error>> {
    /// let confident = forecast.to_lazy()?.filter(col("confidence").gt(lit(0.9)));
    /// let df = confident.frame.collect()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn filter(&self, predicate: Expr) -> ForecastFrame {
        ForecastFrame::new(self.frame.clone().filter(predicate))
    }

    /// Hours whose overall AQI is at or above `threshold`.
    pub fn exceeding(&self, threshold: u16) -> ForecastFrame {
        self.filter(col("aqi").gt_eq(lit(threshold as u32)))
    }

    /// Hours with `start <= timestamp <= end`.
    pub fn between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> ForecastFrame {
        self.filter(
            col("timestamp")
                .gt_eq(lit(start.naive_utc()))
                .and(col("timestamp").lt_eq(lit(end.naive_utc()))),
        )
    }
}

/// Writes a frame as CSV with a header row.
pub async fn write_csv(mut df: DataFrame, path: &Path) -> Result<(), AircastError> {
    let path_buf = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = std::fs::File::create(&path_buf)
            .map_err(|e| AircastError::Write(path_buf.clone(), e))?;
        CsvWriter::new(&mut file)
            .include_header(true)
            .finish(&mut df)?;
        Ok::<(), AircastError>(())
    })
    .await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nowcast::{blend, NowcastInputs, SmoothingFactors, NOWCAST_HISTORY_HOURS};
    use crate::series::align::PollutantHistory;
    use crate::series::time_series::TimeSeries;
    use crate::types::location::LatLon;
    use crate::types::reading::PollutantReading;
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn forecast() -> Forecast {
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let points: Vec<ForecastPoint> = [5.0, 40.0, 80.0]
            .iter()
            .enumerate()
            .map(|(i, pm)| {
                ForecastPoint::from_readings(
                    t0 + Duration::hours(i as i64),
                    vec![
                        PollutantReading::ugm3(Pollutant::Pm25, Some(*pm)),
                        PollutantReading::ppb(Pollutant::O3, Some(10.0)),
                    ],
                    0.9,
                )
            })
            .collect();
        Forecast {
            location: LatLon(0.0, 0.0),
            generated_at: t0,
            current: points.first().cloned(),
            points,
            model_info: BTreeMap::new(),
        }
    }

    #[test]
    fn test_forecast_frame_columns() -> Result<(), Box<dyn std::error::Error>> {
        let df = forecast().to_frame()?;
        assert_eq!(df.height(), 3);
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "timestamp", "aqi", "dominant", "category", "confidence", "pm25", "aqi_pm25",
                "o3", "aqi_o3"
            ]
        );
        assert!(matches!(
            df.column("timestamp")?.dtype(),
            DataType::Datetime(TimeUnit::Milliseconds, None)
        ));
        Ok(())
    }

    #[test]
    fn test_exceeding_and_between() -> Result<(), Box<dyn std::error::Error>> {
        let forecast = forecast();
        let lazy = forecast.to_lazy()?;
        // pm 40 -> 112, pm 80 -> 163
        assert_eq!(lazy.exceeding(100).frame.collect()?.height(), 2);
        assert_eq!(lazy.exceeding(150).frame.collect()?.height(), 1);
        let t0 = forecast.generated_at;
        assert_eq!(
            lazy.between(t0, t0 + Duration::hours(1))
                .frame
                .collect()?
                .height(),
            2
        );
        Ok(())
    }

    #[test]
    fn test_nowcast_frame_has_states() -> Result<(), Box<dyn std::error::Error>> {
        let empty = PollutantHistory::default();
        let inputs = NowcastInputs {
            short_range: &TimeSeries::empty(),
            history: &empty,
            ground: &empty,
            history_hours: NOWCAST_HISTORY_HOURS,
        };
        let window = blend(LatLon(0.0, 0.0), Utc::now(), &inputs, &SmoothingFactors::default())?;
        let df = window.to_frame()?;
        assert_eq!(df.height(), 2);
        assert!(df.column("pm25_state").is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn test_write_csv() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("forecast.csv");
        write_csv(forecast().to_frame()?, &path).await?;
        let text = std::fs::read_to_string(&path)?;
        let mut lines = text.lines();
        assert!(lines.next().unwrap_or_default().starts_with("timestamp,aqi,dominant"));
        assert_eq!(lines.count(), 3);
        Ok(())
    }
}
