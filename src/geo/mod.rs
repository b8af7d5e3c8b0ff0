use crate::models::official::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;
const FEET_PER_METER: f64 = 3.28084;
const FEET_PER_MILE: f64 = 5_280.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Great-circle miles rounded to two decimals, or `None` when either end has
/// no coordinates.
pub fn distance_miles(a: Option<&GeoPoint>, b: Option<&GeoPoint>) -> Option<f64> {
    let (a, b) = (a?, b?);
    let miles = haversine_km(a, b) * 1_000.0 * FEET_PER_METER / FEET_PER_MILE;
    Some((miles * 100.0).round() / 100.0)
}
