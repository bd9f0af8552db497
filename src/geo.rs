//! Great-circle distances between map coordinates.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;
/// Mean Earth radius in miles
pub const EARTH_RADIUS_MILES: f64 = 3959.0;

/// A WGS84 position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values.
    pub fn try_new(lat: f64, lng: f64) -> Option<Self> {
        if !lat.is_finite() || !lng.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
            return None;
        }
        Some(Self { lat, lng })
    }

    /// Distance to another coordinate in the given unit
    pub fn distance_to(&self, other: &Coordinate, unit: DistanceUnit) -> f64 {
        distance(self, other, unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    Kilometers,
    #[default]
    Miles,
}

impl DistanceUnit {
    pub fn earth_radius(&self) -> f64 {
        match self {
            DistanceUnit::Kilometers => EARTH_RADIUS_KM,
            DistanceUnit::Miles => EARTH_RADIUS_MILES,
        }
    }
}

/// Maximum distance between a viewer and a record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DistanceCutoff {
    pub max: f64,
    pub unit: DistanceUnit,
}

impl DistanceCutoff {
    pub fn miles(max: f64) -> Self {
        Self {
            max,
            unit: DistanceUnit::Miles,
        }
    }

    pub fn kilometers(max: f64) -> Self {
        Self {
            max,
            unit: DistanceUnit::Kilometers,
        }
    }

    /// True when `b` lies within the cutoff of `a`.
    ///
    /// A non-finite distance never falls inside the cutoff.
    pub fn contains(&self, a: &Coordinate, b: &Coordinate) -> bool {
        let d = distance(a, b, self.unit);
        d.is_finite() && d <= self.max
    }
}

/// Haversine great-circle distance.
///
/// Non-finite input yields a non-finite result; callers skip such records.
pub fn distance(a: &Coordinate, b: &Coordinate, unit: DistanceUnit) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push h marginally above 1 for antipodal points; NaN passes
    // through unclamped
    let root = h.sqrt();
    let root = if root > 1.0 { 1.0 } else { root };
    let c = 2.0 * root.asin();
    unit.earth_radius() * c
}
