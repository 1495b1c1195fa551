//! Closest-approach search over a fixed sampling horizon.
//!
//! The horizon is scanned exhaustively: one propagation every
//! [`PREDICTION_INTERVAL_SEC`] until [`MAX_SEARCH_DURATION_SEC`]. Samples the
//! propagator cannot produce are skipped and counted as gaps.

use super::propagator::Propagator;
use super::tle_store::OrbitalElementSet;
use crate::domain::{ClosestApproach, GeoPoint, PassWindow, PredictionOutcome, SamplePoint};
use crate::utils::distance_km;
use chrono::{DateTime, Utc};

pub const PREDICTION_INTERVAL_SEC: u32 = 10;
pub const MAX_SEARCH_DURATION_SEC: u32 = 36 * 3600;

/// Result of one full horizon scan, anchored at the instant the scan started
#[derive(Debug, Clone)]
pub struct Prediction {
    pub anchored_at: DateTime<Utc>,
    pub target: GeoPoint,
    pub radius_km: f64,
    pub full_path: Vec<SamplePoint>,
    pub first_entry_offset_sec: Option<u32>,
    pub first_pass: Option<PassWindow>,
    pub closest_approach: Option<ClosestApproach>,
    pub gaps: usize,
}

impl Prediction {
    pub fn outcome(&self) -> PredictionOutcome {
        if self.full_path.is_empty() {
            PredictionOutcome::NoData
        } else if self.first_entry_offset_sec.is_some() {
            PredictionOutcome::PassFound
        } else {
            PredictionOutcome::NoPass
        }
    }

    /// Prefix of the path up to and including `duration_sec`
    pub fn displayed_path(&self, duration_sec: u32) -> &[SamplePoint] {
        let end = self
            .full_path
            .partition_point(|s| s.offset_seconds <= duration_sec);
        &self.full_path[..end]
    }
}

enum PassTracker {
    Waiting,
    Inside(PassWindow),
    Done(PassWindow),
}

impl PassTracker {
    fn observe(self, sample: &SamplePoint, distance: f64, inside: bool) -> Self {
        match (self, inside) {
            (PassTracker::Waiting, true) => PassTracker::Inside(PassWindow {
                entry_offset_seconds: sample.offset_seconds,
                exit_offset_seconds: sample.offset_seconds,
                closest: ClosestApproach::from_sample(sample, distance),
            }),
            (PassTracker::Inside(mut window), true) => {
                window.exit_offset_seconds = sample.offset_seconds;
                if distance < window.closest.distance_km {
                    window.closest = ClosestApproach::from_sample(sample, distance);
                }
                PassTracker::Inside(window)
            }
            (PassTracker::Inside(window), false) => PassTracker::Done(window),
            (state, _) => state,
        }
    }

    fn window(self) -> Option<PassWindow> {
        match self {
            PassTracker::Waiting => None,
            PassTracker::Inside(w) | PassTracker::Done(w) => Some(w),
        }
    }
}

/// Scan the horizon from `anchored_at` and locate the closest approach to `target`
pub fn compute_full_prediction(
    propagator: &dyn Propagator,
    elements: &OrbitalElementSet,
    anchored_at: DateTime<Utc>,
    target: GeoPoint,
    radius_km: f64,
) -> Prediction {
    let capacity = (MAX_SEARCH_DURATION_SEC / PREDICTION_INTERVAL_SEC) as usize;
    let mut full_path = Vec::with_capacity(capacity);
    let mut gaps = 0;
    let mut first_entry_offset_sec = None;
    let mut closest_approach: Option<ClosestApproach> = None;
    let mut pass = PassTracker::Waiting;

    for offset in (0..MAX_SEARCH_DURATION_SEC).step_by(PREDICTION_INTERVAL_SEC as usize) {
        let at = anchored_at + chrono::Duration::seconds(offset as i64);
        let Some(position) = propagator.propagate(elements, at) else {
            gaps += 1;
            continue;
        };

        let sample = SamplePoint::at_offset(offset, position);
        let distance = distance_km(sample.point(), target);
        let inside = distance < radius_km;

        if closest_approach.map_or(true, |c| distance < c.distance_km) {
            closest_approach = Some(ClosestApproach::from_sample(&sample, distance));
        }
        if inside && first_entry_offset_sec.is_none() {
            first_entry_offset_sec = Some(offset);
        }
        pass = pass.observe(&sample, distance, inside);

        full_path.push(sample);
    }

    Prediction {
        anchored_at,
        target,
        radius_km,
        full_path,
        first_entry_offset_sec,
        first_pass: pass.window(),
        closest_approach,
        gaps,
    }
}
