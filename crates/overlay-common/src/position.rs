//! Geographic positions.
//!
//! Positions are stored in human order (latitude first). GeoJSON stores the
//! same pair as `[longitude, latitude]`, so every conversion from GeoJSON
//! goes through [`Position::from_lng_lat`].

use serde::{Deserialize, Serialize};

/// A WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Build a position from a GeoJSON `[lng, lat]` coordinate pair.
    pub fn from_lng_lat(pair: [f64; 2]) -> Self {
        Self {
            lat: pair[1],
            lng: pair[0],
        }
    }

    /// Both components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// `(0, 0)` is the upstream convention for "coordinates not set".
    pub fn is_unset(&self) -> bool {
        self.lat == 0.0 && self.lng == 0.0
    }

    /// Finite and not the unset sentinel.
    pub fn is_usable(&self) -> bool {
        self.is_finite() && !self.is_unset()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}
