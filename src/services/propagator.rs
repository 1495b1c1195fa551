//! Sub-satellite point from orbital elements at an absolute instant.

use super::tle_store::OrbitalElementSet;
use crate::domain::GeodeticPosition;
use crate::utils::{gmst_rad, normalize_longitude};
use chrono::{DateTime, Utc};
use sgp4::MinutesSinceEpoch;
use tracing::trace;

// WGS84
const EQUATORIAL_RADIUS_KM: f64 = 6378.137;
const FLATTENING: f64 = 1.0 / 298.257223563;

/// Pure function of (elements, time); `None` marks a sample the model cannot produce
pub trait Propagator: Send + Sync {
    fn propagate(&self, elements: &OrbitalElementSet, at: DateTime<Utc>)
        -> Option<GeodeticPosition>;
}

/// SGP4/SDP4 propagation through the `sgp4` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct Sgp4Propagator;

impl Propagator for Sgp4Propagator {
    fn propagate(
        &self,
        elements: &OrbitalElementSet,
        at: DateTime<Utc>,
    ) -> Option<GeodeticPosition> {
        let minutes = (at - elements.epoch()).num_milliseconds() as f64 / 60_000.0;

        let prediction = match elements.constants().propagate(MinutesSinceEpoch(minutes)) {
            Ok(p) => p,
            Err(e) => {
                trace!("SGP4 gap at {}: {}", at, e);
                return None;
            }
        };

        let geodetic = teme_to_geodetic(prediction.position, gmst_rad(at));
        let valid = geodetic.latitude.is_finite()
            && geodetic.longitude.is_finite()
            && geodetic.altitude_km.is_finite()
            && geodetic.altitude_km >= 0.0;
        valid.then_some(geodetic)
    }
}

/// Rotate a TEME position by GMST and solve WGS84 geodetic coordinates
pub fn teme_to_geodetic(position_km: [f64; 3], gmst: f64) -> GeodeticPosition {
    let [x, y, z] = position_km;
    let (sin_g, cos_g) = gmst.sin_cos();
    let x_ecef = x * cos_g + y * sin_g;
    let y_ecef = -x * sin_g + y * cos_g;

    let e2 = FLATTENING * (2.0 - FLATTENING);
    let p = x_ecef.hypot(y_ecef);

    let mut latitude = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let sin_lat = latitude.sin();
        let n = EQUATORIAL_RADIUS_KM / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        latitude = (z + e2 * n * sin_lat).atan2(p);
    }

    let sin_lat = latitude.sin();
    let cos_lat = latitude.cos();
    let n = EQUATORIAL_RADIUS_KM / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    let altitude_km = if cos_lat.abs() > 1e-10 {
        p / cos_lat - n
    } else {
        z.abs() - n * (1.0 - e2)
    };

    GeodeticPosition {
        latitude: latitude.to_degrees(),
        longitude: normalize_longitude(y_ecef.atan2(x_ecef).to_degrees()),
        altitude_km,
    }
}
