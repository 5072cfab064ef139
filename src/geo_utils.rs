//! Geographic utilities: great-circle distance, bearing and coordinate checks.
//!
//! Everything here is a pure function. Callers validate coordinates before
//! relying on the results; [`validate_coordinates`] is the shared check.

use crate::{Position, ProximityError, Result};

/// Earth's mean radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle (haversine) distance in kilometers.
///
/// Symmetric in its two points and exactly 0 for identical coordinates.
///
/// # Example
/// ```
/// use proximity_engine::geo_utils::distance_km;
///
/// let d = distance_km(51.5074, -0.1278, 48.8566, 2.3522); // London -> Paris
/// assert!((d - 343.5).abs() < 2.0);
/// ```
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair outside [0, 1] for antipodal points
    let a = a.clamp(0.0, 1.0);

    EARTH_RADIUS_KM * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Initial compass bearing from point 1 toward point 2, in [0, 360).
///
/// Not symmetric: the bearing back is generally not the reverse heading.
pub fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();

    let bearing = (y.atan2(x).to_degrees() + 360.0) % 360.0;
    if bearing >= 360.0 || bearing.is_nan() {
        0.0
    } else {
        bearing
    }
}

/// Haversine distance between two positions in meters.
pub fn haversine_distance(p1: &Position, p2: &Position) -> f64 {
    distance_km(p1.latitude, p1.longitude, p2.latitude, p2.longitude) * 1000.0
}

/// Bearing from one position toward another.
pub fn position_bearing(from: &Position, to: &Position) -> f64 {
    bearing_degrees(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Approximate conversion of a ground distance to degrees of latitude.
///
/// Longitude degrees shrink with latitude; use [`meters_to_degrees_lng`] there.
pub fn meters_to_degrees(meters: f64) -> f64 {
    (meters / 1000.0 / EARTH_RADIUS_KM).to_degrees()
}

/// Degrees of longitude spanned by `meters` at the given latitude.
///
/// Returns `None` close to the poles, where the span is unbounded.
pub fn meters_to_degrees_lng(meters: f64, latitude: f64) -> Option<f64> {
    let cos_lat = latitude.to_radians().cos();
    if cos_lat < 1e-6 {
        return None;
    }
    Some(meters_to_degrees(meters) / cos_lat)
}

/// Check that a coordinate pair is finite and inside the valid ranges.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ProximityError::invalid_argument(format!(
            "latitude {} outside [-90, 90]",
            latitude
        )));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ProximityError::invalid_argument(format!(
            "longitude {} outside [-180, 180]",
            longitude
        )));
    }
    Ok(())
}
