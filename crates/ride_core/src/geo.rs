//! Geographic points and great-circle distance.

use serde::{Deserialize, Serialize};

use crate::error::RideError;

/// Mean Earth radius (km) used for every haversine computation.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Rejects non-finite or out-of-range coordinates.
    pub fn validate(&self, field: &str) -> Result<(), RideError> {
        if !self.lat.is_finite() || !self.lng.is_finite() {
            return Err(RideError::validation(format!(
                "{field}: coordinates must be finite"
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(RideError::validation(format!(
                "{field}: latitude {} out of range",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return Err(RideError::validation(format!(
                "{field}: longitude {} out of range",
                self.lng
            )));
        }
        Ok(())
    }

    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other)
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        haversine_km(*self, *other) * 1000.0
    }
}

/// Great-circle distance between two points in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.lat.to_radians(), a.lng.to_radians());
    let (lat2, lon2) = (b.lat.to_radians(), b.lng.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let sin_dlat = (dlat * 0.5).sin();
    let sin_dlon = (dlon * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}
