//! Geographic value types used by geo-containment criteria.

use serde::{Deserialize, Serialize};

use crate::error::BadInputError;

/// Mean Earth radius, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub lat: f64,
    pub lon: f64,
}

impl GeoLocation {
    pub fn new(lat: f64, lon: f64) -> Result<Self, BadInputError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(BadInputError::new(format!("invalid latitude {lat}")));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(BadInputError::new(format!("invalid longitude {lon}")));
        }
        Ok(Self { lat, lon })
    }

    /// Great-circle distance in meters (haversine formula).
    pub fn distance_to(&self, other: &GeoLocation) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.lon - self.lon).to_radians();
        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_METERS * a.sqrt().min(1.0).asin()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoCircle {
    pub center: GeoLocation,
    pub radius_meters: f64,
}

impl GeoCircle {
    pub fn new(center: GeoLocation, radius_meters: f64) -> Result<Self, BadInputError> {
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(BadInputError::new(format!(
                "geocircle radius must be a non-negative number of meters, got {radius_meters}"
            )));
        }
        Ok(Self {
            center,
            radius_meters,
        })
    }

    pub fn contains(&self, location: &GeoLocation) -> bool {
        self.center.distance_to(location) <= self.radius_meters
    }
}

/// Latitude/longitude rectangle. When `left > right` the box crosses the
/// antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

impl GeoBox {
    pub fn new(top: f64, right: f64, bottom: f64, left: f64) -> Result<Self, BadInputError> {
        // Validates ranges
        GeoLocation::new(top, right)?;
        GeoLocation::new(bottom, left)?;
        if bottom > top {
            return Err(BadInputError::new(format!(
                "geobox bottom {bottom} is above top {top}"
            )));
        }
        Ok(Self {
            top,
            right,
            bottom,
            left,
        })
    }

    pub fn contains(&self, location: &GeoLocation) -> bool {
        if location.lat < self.bottom || location.lat > self.top {
            return false;
        }
        if self.left <= self.right {
            location.lon >= self.left && location.lon <= self.right
        } else {
            location.lon >= self.left || location.lon <= self.right
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoArea {
    Circle(GeoCircle),
    Box(GeoBox),
}

impl GeoArea {
    pub fn contains(&self, location: &GeoLocation) -> bool {
        match self {
            GeoArea::Circle(circle) => circle.contains(location),
            GeoArea::Box(area) => area.contains(location),
        }
    }
}
