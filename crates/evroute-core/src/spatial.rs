//! Spatial math for path sampling and distance calculations.

use crate::models::LatLng;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
///
/// # Returns
/// Distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Total great-circle length of a vertex path in meters.
pub fn path_length_m(path: &[LatLng]) -> f64 {
    path.windows(2)
        .map(|pair| pair[0].distance_to(&pair[1]))
        .sum()
}

/// Linear interpolation in degree space, `ratio` in [0, 1].
pub fn interpolate(start: LatLng, end: LatLng, ratio: f64) -> LatLng {
    LatLng {
        lat: start.lat + ratio * (end.lat - start.lat),
        lng: start.lng + ratio * (end.lng - start.lng),
    }
}

/// Offset a position by distance and bearing.
///
/// # Arguments
/// * `origin` - Starting position in degrees
/// * `distance_m` - Distance in meters
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
pub fn offset_by_bearing(origin: LatLng, distance_m: f64, bearing_rad: f64) -> LatLng {
    if distance_m.abs() <= f64::EPSILON {
        return origin;
    }

    let lat1 = origin.lat.to_radians();
    let lon1 = origin.lng.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    LatLng::new(lat2.to_degrees(), lon2.to_degrees())
}
