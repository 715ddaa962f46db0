use aircast::{Aircast, AircastError, LatLon};

#[tokio::main]
async fn main() -> Result<(), AircastError> {
    let client = Aircast::new().await?;

    let forecast = client
        .forecast()
        .location(LatLon(40.7128, -74.0060))
        .hours(24)
        .call()
        .await?;

    for point in &forecast.points {
        println!(
            "{}  AQI {:>3}  {:<30} dominant: {}",
            point.timestamp.format("%Y-%m-%d %H:%M"),
            point.aqi.value,
            point.category.name(),
            point
                .aqi
                .dominant
                .map(|p| p.label())
                .unwrap_or("-"),
        );
    }

    let threshold = client.config().alert_threshold;
    let alerts = forecast.alerts(threshold).count();
    println!("{} hours at or above AQI {}", alerts, threshold);
    println!("{:#?}", forecast.model_info);

    Ok(())
}
