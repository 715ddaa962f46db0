use crate::error::AircastError;
use crate::pipeline::forecast::{Forecast, ForecastRequest};
use crate::utils::truncate_to_hour;
use log::debug;
use ordered_float::OrderedFloat;
use std::collections::{hash_map::Entry, HashMap};
use std::future::Future;
use tokio::sync::Mutex;

/// Identifies a forecast request within one hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lat: OrderedFloat<f64>,
    lon: OrderedFloat<f64>,
    hour_bucket: i64,
    hours: usize,
    hist_hours: usize,
}

impl From<&ForecastRequest> for CacheKey {
    fn from(request: &ForecastRequest) -> Self {
        Self {
            lat: OrderedFloat(request.location.lat()),
            lon: OrderedFloat(request.location.lon()),
            hour_bucket: truncate_to_hour(request.now).timestamp(),
            hours: request.hours,
            hist_hours: request.hist_hours,
        }
    }
}

/// Read-through cache of successful forecasts. Failures are never cached, and storing a
/// forecast drops those of earlier hours.
#[derive(Default)]
pub struct ForecastCache {
    entries: Mutex<HashMap<CacheKey, Forecast>>,
}

impl ForecastCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Returns the cached forecast for `request`, computing and storing it on a miss.
    pub async fn get_or_compute<F, Fut>(
        &self,
        request: &ForecastRequest,
        compute: F,
    ) -> Result<Forecast, AircastError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Forecast, AircastError>>,
    {
        let key = CacheKey::from(request);

        {
            let cache = self.entries.lock().await;
            if let Some(hit) = cache.get(&key) {
                debug!("Forecast cache hit for {:?}", key);
                return Ok(hit.clone());
            }
        }

        // The lock is not held while computing.
        let forecast = compute().await?;

        let mut cache = self.entries.lock().await;
        let before = cache.len();
        cache.retain(|cached, _| cached.hour_bucket >= key.hour_bucket);
        if cache.len() < before {
            debug!("Evicted {} forecasts from earlier hours", before - cache.len());
        }
        match cache.entry(key) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                entry.insert(forecast.clone());
                Ok(forecast)
            }
        }
    }
}
