use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
///
/// # Examples
///
/// ```
/// use aircast::LatLon;
///
/// let new_york = LatLon(40.7128, -74.0060);
/// assert_eq!(new_york.0, 40.7128); // Latitude
/// assert_eq!(new_york.1, -74.0060); // Longitude
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lon(&self) -> f64 {
        self.1
    }
}

// Serialized as `{"lat": .., "lon": ..}` rather than a two element array.
impl Serialize for LatLon {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LatLon", 2)?;
        state.serialize_field("lat", &self.0)?;
        state.serialize_field("lon", &self.1)?;
        state.end()
    }
}
