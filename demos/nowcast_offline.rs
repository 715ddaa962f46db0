use aircast::{Aircast, AircastError, LatLon, MemorySource, TimeSeries};
use chrono::{Duration, Utc};

#[tokio::main]
async fn main() -> Result<(), AircastError> {
    let now = Utc::now();
    let last_hour = aircast::truncate_to_hour(now);
    let hours = aircast::hour_grid(last_hour - Duration::hours(5), 6);

    let history = TimeSeries::with_index(hours)?.with_field(
        "pm2_5",
        vec![Some(8.0), Some(9.5), Some(12.0), Some(15.0), Some(14.0), Some(13.5)],
    )?;
    let source = MemorySource::builder()
        .air_quality_history(vec![history])
        .build();

    let client = Aircast::from_source().source(source).call();
    let report = client
        .nowcast_report()
        .location(LatLon(51.5072, -0.1276))
        .now(now)
        .call()
        .await;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).unwrap_or_else(|e| e.to_string())
    );
    Ok(())
}
