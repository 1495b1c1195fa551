/// Utility functions
use crate::domain::GeoPoint;
use chrono::{DateTime, Utc};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Calculate distance between two coordinates using Haversine formula
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let rlat1 = lat1.to_radians();
    let rlat2 = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + rlat1.cos() * rlat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    haversine_km(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Wrap a longitude in degrees into [-180, 180]
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Greenwich Mean Sidereal Time in radians
pub fn gmst_rad(t: DateTime<Utc>) -> f64 {
    // Julian date at Unix epoch (1970-01-01 00:00:00 UTC)
    const JD_UNIX_EPOCH: f64 = 2440587.5;
    const JD_J2000: f64 = 2451545.0;

    let unix_seconds = t.timestamp() as f64 + t.timestamp_subsec_nanos() as f64 * 1e-9;
    let jd = JD_UNIX_EPOCH + unix_seconds / 86400.0;
    let d = jd - JD_J2000;
    let centuries = d / 36525.0;

    let gmst_deg = 280.46061837 + 360.98564736629 * d + 0.000387933 * centuries * centuries
        - centuries * centuries * centuries / 38710000.0;

    gmst_deg.rem_euclid(360.0).to_radians()
}
