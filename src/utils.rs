use chrono::{DateTime, Duration, DurationRound, Timelike, Utc};
use log::info;
use std::io;
use std::path::{Path, PathBuf};

const MODEL_DIR_NAME: &str = "aircast_models";

/// Default location of model bundles: `<data dir>/aircast_models`.
pub fn get_model_dir() -> io::Result<PathBuf> {
    dirs::data_dir()
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine system data directory",
            )
        })
        .map(|p| p.join(MODEL_DIR_NAME))
}

pub async fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Path exists but is not a directory: {}", path.display()),
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("Creating directory: {}", path.display());
            tokio::fs::create_dir_all(path).await
        }
        Err(e) => Err(e),
    }
}

pub fn is_hour_aligned(ts: &DateTime<Utc>) -> bool {
    ts.minute() == 0 && ts.second() == 0 && ts.nanosecond() == 0
}

/// Floors a timestamp to the start of its hour.
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.duration_trunc(Duration::hours(1)).unwrap_or(ts)
}

/// `n` consecutive whole hours starting at `start` (floored to the hour).
pub fn hour_grid(start: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
    let start = truncate_to_hour(start);
    (0..n as i64).map(|i| start + Duration::hours(i)).collect()
}

/// Number of whole days needed to cover `hours`, at least one.
pub fn forecast_days(hours: usize) -> usize {
    hours.div_ceil(24).max(1)
}
