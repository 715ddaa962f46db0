use aircast::{write_csv, Aircast, LatLon};
use std::path::Path;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Aircast::new().await?;
    let forecast = client
        .forecast()
        .location(LatLon(48.8566, 2.3522))
        .hours(72)
        .call()
        .await?;

    let unhealthy = forecast
        .to_lazy()?
        .exceeding(client.config().alert_threshold)
        .frame
        .collect()?;
    println!("{}", unhealthy);

    write_csv(forecast.to_frame()?, Path::new("paris_forecast.csv")).await?;
    Ok(())
}
