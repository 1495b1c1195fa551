//! Prediction session: observer configuration, TLE lifecycle and the cached
//! horizon scan.
//!
//! Every recomputation takes a generation number while holding the state
//! lock. Only the newest generation is allowed to commit, so a slow scan that
//! finishes after a newer request can never overwrite that request's result.

use super::predictor::{compute_full_prediction, Prediction, MAX_SEARCH_DURATION_SEC};
use super::propagator::Propagator;
use super::tle_store::{OrbitalElementSet, TleStore};
use crate::clients::TleSource;
use crate::domain::{
    ClosestApproach, ClosestApproachDetails, GeoPoint, PredictionConfig, PredictionOutcome,
    PredictionSnapshot, SamplePoint, SessionState, TleStatus,
};
use crate::errors::{ApiError, ApiResult};
use crate::repo::TleCache;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};

pub const DEFAULT_DISPLAY_DURATION_SEC: u32 = 90 * 60;
pub const MIN_DISPLAY_DURATION_SEC: u32 = 5 * 60;

const EVENT_CAPACITY: usize = 16;

/// Published to subscribers whenever the session's visible result changes
#[derive(Debug, Clone)]
pub enum PredictionEvent {
    Updated {
        generation: u64,
        outcome: PredictionOutcome,
        display_duration_sec: u32,
        closest: Option<ClosestApproach>,
    },
    Unavailable {
        reason: String,
    },
}

struct SessionInner {
    state: SessionState,
    config: PredictionConfig,
    elements: Option<Arc<OrbitalElementSet>>,
    prediction: Option<Arc<Prediction>>,
    /// Bumped by every user display change
    display_revision: u64,
}

pub struct PredictionSession<S, C> {
    store: TleStore<S, C>,
    propagator: Arc<dyn Propagator>,
    inner: RwLock<SessionInner>,
    generation: AtomicU64,
    events: broadcast::Sender<PredictionEvent>,
}

/// Display window applied after each completed scan
fn default_display_duration(prediction: &Prediction) -> u32 {
    prediction
        .first_entry_offset_sec
        .unwrap_or(DEFAULT_DISPLAY_DURATION_SEC)
        .clamp(MIN_DISPLAY_DURATION_SEC, MAX_SEARCH_DURATION_SEC)
}

impl<S: TleSource, C: TleCache> PredictionSession<S, C> {
    pub fn new(
        store: TleStore<S, C>,
        propagator: Arc<dyn Propagator>,
        target: GeoPoint,
        radius_km: f64,
    ) -> ApiResult<Self> {
        let radius_km = PredictionConfig::validate_radius(radius_km)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            store,
            propagator,
            inner: RwLock::new(SessionInner {
                state: SessionState::Uninitialized,
                config: PredictionConfig {
                    target,
                    radius_km,
                    display_duration_sec: DEFAULT_DISPLAY_DURATION_SEC,
                },
                elements: None,
                prediction: None,
                display_revision: 0,
            }),
            generation: AtomicU64::new(0),
            events,
        })
    }

    /// Observer interface for recompute completion
    pub fn subscribe(&self) -> broadcast::Receiver<PredictionEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn config(&self) -> PredictionConfig {
        self.inner.read().await.config
    }

    /// Load elements (cache allowed) and run the first scan
    pub async fn initialize(&self) -> ApiResult<Option<Arc<Prediction>>> {
        self.load_elements(false).await?;
        self.recompute().await
    }

    /// Force a TLE download, then rescan
    pub async fn refresh_tle(&self) -> ApiResult<Option<Arc<Prediction>>> {
        self.load_elements(true).await?;
        self.recompute().await
    }

    async fn load_elements(&self, force_refresh: bool) -> ApiResult<()> {
        self.inner.write().await.state = SessionState::FetchingTle;

        match self.store.fetch_orbital_elements(force_refresh).await {
            Ok(elements) => {
                let mut inner = self.inner.write().await;
                inner.elements = Some(elements);
                inner.state = SessionState::TleReady;
                Ok(())
            }
            Err(e) => {
                {
                    let mut inner = self.inner.write().await;
                    // invalidate any scan still running on the old elements
                    self.generation.fetch_add(1, Ordering::SeqCst);
                    inner.elements = None;
                    inner.prediction = None;
                    inner.state = SessionState::Unavailable;
                }
                error!("TLE unavailable, prediction disabled: {}", e);
                let _ = self.events.send(PredictionEvent::Unavailable {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn set_target(&self, lat: f64, lon: f64) -> ApiResult<Option<Arc<Prediction>>> {
        let target = GeoPoint::new(lat, lon)?;
        let ready = {
            let mut inner = self.inner.write().await;
            inner.config.target = target;
            inner.elements.is_some()
        };
        if !ready {
            return Ok(None);
        }
        self.recompute().await
    }

    pub async fn set_radius_km(&self, radius_km: f64) -> ApiResult<Option<Arc<Prediction>>> {
        let radius_km = PredictionConfig::validate_radius(radius_km)?;
        let ready = {
            let mut inner = self.inner.write().await;
            inner.config.radius_km = radius_km;
            inner.elements.is_some()
        };
        if !ready {
            return Ok(None);
        }
        self.recompute().await
    }

    /// Changes only the visible prefix, no propagation
    pub async fn set_display_duration_sec(&self, duration_sec: f64) -> ApiResult<Vec<SamplePoint>> {
        let duration_sec = PredictionConfig::validate_duration(duration_sec)?;
        {
            let mut inner = self.inner.write().await;
            inner.config.display_duration_sec = duration_sec;
            inner.display_revision += 1;
        }
        Ok(self.displayed_path().await)
    }

    /// Run a full horizon scan with the current configuration.
    ///
    /// Returns `None` when a newer request superseded this one before it finished.
    pub async fn recompute(&self) -> ApiResult<Option<Arc<Prediction>>> {
        let (generation, elements, config, display_revision) = {
            let mut inner = self.inner.write().await;
            let elements = inner.elements.clone().ok_or_else(|| {
                ApiError::Unavailable("no orbital elements loaded".to_string())
            })?;
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            inner.state = SessionState::Predicting;
            (generation, elements, inner.config, inner.display_revision)
        };

        let propagator = Arc::clone(&self.propagator);
        let anchored_at = Utc::now();
        let started = Instant::now();
        debug!(generation, "prediction started");

        let prediction = tokio::task::spawn_blocking(move || {
            compute_full_prediction(
                propagator.as_ref(),
                &elements,
                anchored_at,
                config.target,
                config.radius_km,
            )
        })
        .await
        .map_err(|e| ApiError::Internal(format!("prediction task failed: {}", e)))?;

        let mut inner = self.inner.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "superseded prediction discarded");
            return Ok(None);
        }

        let prediction = Arc::new(prediction);
        let outcome = prediction.outcome();
        // a display window chosen while the scan ran takes precedence
        if inner.display_revision == display_revision {
            inner.config.display_duration_sec = default_display_duration(&prediction);
        }
        inner.prediction = Some(Arc::clone(&prediction));
        inner.state = SessionState::Predicted;

        info!(
            generation,
            samples = prediction.full_path.len(),
            gaps = prediction.gaps,
            outcome = ?outcome,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "prediction complete"
        );
        if outcome == PredictionOutcome::NoData {
            warn!("every propagation in the horizon failed, no path available");
        }

        let _ = self.events.send(PredictionEvent::Updated {
            generation,
            outcome,
            display_duration_sec: inner.config.display_duration_sec,
            closest: prediction.closest_approach,
        });

        Ok(Some(prediction))
    }

    /// Latest committed scan, if any
    #[cfg(test)]
    pub async fn prediction(&self) -> Option<Arc<Prediction>> {
        self.inner.read().await.prediction.clone()
    }

    pub async fn displayed_path(&self) -> Vec<SamplePoint> {
        let inner = self.inner.read().await;
        inner
            .prediction
            .as_ref()
            .map(|p| p.displayed_path(inner.config.display_duration_sec).to_vec())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub async fn closest_approach(&self) -> Option<ClosestApproach> {
        self.inner
            .read()
            .await
            .prediction
            .as_ref()
            .and_then(|p| p.closest_approach)
    }

    /// Closest approach with `anchored_at + offset` as a calendar instant
    pub async fn closest_approach_details(&self) -> Option<ClosestApproachDetails> {
        let inner = self.inner.read().await;
        let prediction = inner.prediction.as_ref()?;
        prediction
            .closest_approach
            .as_ref()
            .map(|c| ClosestApproachDetails::anchored(c, prediction.anchored_at))
    }

    pub async fn snapshot(&self) -> PredictionSnapshot {
        let inner = self.inner.read().await;
        let prediction = inner.prediction.as_deref();
        PredictionSnapshot {
            state: inner.state,
            config: inner.config,
            satellite: inner.elements.as_ref().map(|e| e.name().to_string()),
            tle_epoch: inner.elements.as_ref().map(|e| e.epoch()),
            anchored_at: prediction.map(|p| p.anchored_at),
            predicted_target: prediction.map(|p| p.target),
            predicted_radius_km: prediction.map(|p| p.radius_km),
            outcome: prediction.map(Prediction::outcome),
            first_entry_offset_sec: prediction.and_then(|p| p.first_entry_offset_sec),
            first_pass: prediction.and_then(|p| p.first_pass),
            closest_overall_km: prediction
                .and_then(|p| p.closest_approach)
                .map(|c| c.distance_km),
            samples: prediction.map_or(0, |p| p.full_path.len()),
            gaps: prediction.map_or(0, |p| p.gaps),
            generation: self.generation.load(Ordering::SeqCst),
        }
    }

    pub async fn tle_status(&self) -> ApiResult<Option<TleStatus>> {
        self.store.cache_status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GeodeticPosition;
    use crate::repo::MemoryTleCache;
    use crate::services::predictor::PREDICTION_INTERVAL_SEC;
    use crate::services::testing::{
        equator_sweep, stations_catalog, ScriptedPropagator, ScriptedSource,
    };
    use chrono::DateTime;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    type TestSession = PredictionSession<ScriptedSource, MemoryTleCache>;

    fn session_with(source: ScriptedSource, propagator: Arc<dyn Propagator>) -> TestSession {
        session_with_cache_window(source, propagator, chrono::Duration::hours(2))
    }

    fn session_with_cache_window(
        source: ScriptedSource,
        propagator: Arc<dyn Propagator>,
        cache_window: chrono::Duration,
    ) -> TestSession {
        let store = TleStore::new(
            source,
            MemoryTleCache::default(),
            "ISS".to_string(),
            cache_window,
        );
        PredictionSession::new(
            store,
            propagator,
            GeoPoint::new(46.8139, -71.2080).unwrap(),
            1500.0,
        )
        .unwrap()
    }

    fn sweeping_session() -> (TestSession, Arc<ScriptedPropagator>) {
        // anchored in the past: offsets seen by the track are all >= 0
        let propagator = Arc::new(ScriptedPropagator::new(
            Utc::now() - chrono::Duration::days(1),
            equator_sweep,
        ));
        let session = session_with(ScriptedSource::ok(stations_catalog()), propagator.clone());
        (session, propagator)
    }

    #[tokio::test]
    async fn test_initialize_reaches_predicted() {
        let (session, _) = sweeping_session();
        assert_eq!(session.state().await, SessionState::Uninitialized);

        let prediction = session.initialize().await.unwrap().unwrap();

        assert_eq!(session.state().await, SessionState::Predicted);
        assert!(!prediction.full_path.is_empty());
        assert!(session.closest_approach().await.is_some());
    }

    #[tokio::test]
    async fn test_display_duration_filters_without_propagating() {
        let (session, propagator) = sweeping_session();
        session.initialize().await.unwrap();
        let calls_before = propagator.calls();

        let shown = session.set_display_duration_sec(600.0).await.unwrap();

        assert!(!shown.is_empty());
        assert!(shown.iter().all(|s| s.offset_seconds <= 600));
        assert_eq!(
            session.displayed_path().await.last().unwrap().offset_seconds,
            600
        );
        assert_eq!(propagator.calls(), calls_before);
    }

    #[tokio::test]
    async fn test_fetch_failure_with_empty_cache_is_unavailable() {
        let propagator = Arc::new(ScriptedPropagator::new(Utc::now(), equator_sweep));
        let session = session_with(ScriptedSource::failing(), propagator.clone());
        let mut events = session.subscribe();

        let err = session.initialize().await.unwrap_err();

        assert!(err.is_fetch_failure());
        assert_eq!(session.state().await, SessionState::Unavailable);
        assert!(session.closest_approach().await.is_none());
        assert!(session.closest_approach_details().await.is_none());
        assert!(session.displayed_path().await.is_empty());
        assert_eq!(propagator.calls(), 0);
        assert!(matches!(
            events.try_recv().unwrap(),
            PredictionEvent::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_failed_refresh_drops_committed_prediction() {
        let propagator = Arc::new(ScriptedPropagator::new(
            Utc::now() - chrono::Duration::days(1),
            equator_sweep,
        ));
        let source = ScriptedSource::new(vec![
            Ok(stations_catalog()),
            Err(ApiError::Upstream("HTTP 503".into())),
        ]);
        // zero window: nothing cached is fresh enough to fall back on
        let session = session_with_cache_window(source, propagator, chrono::Duration::zero());
        session.initialize().await.unwrap();
        assert_eq!(session.state().await, SessionState::Predicted);
        assert!(session.closest_approach_details().await.is_some());
        let mut events = session.subscribe();

        assert!(session.refresh_tle().await.unwrap_err().is_fetch_failure());

        assert_eq!(session.state().await, SessionState::Unavailable);
        assert!(session.prediction().await.is_none());
        assert!(session.closest_approach_details().await.is_none());
        assert!(session.displayed_path().await.is_empty());
        assert!(session.snapshot().await.satellite.is_none());
        assert!(matches!(
            events.try_recv().unwrap(),
            PredictionEvent::Unavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_refresh_recovers_from_unavailable() {
        let propagator = Arc::new(ScriptedPropagator::new(
            Utc::now() - chrono::Duration::days(1),
            equator_sweep,
        ));
        let source = ScriptedSource::new(vec![
            Err(ApiError::Upstream("timeout".into())),
            Ok(stations_catalog()),
        ]);
        let session = session_with(source, propagator);

        assert!(session.initialize().await.is_err());
        assert!(matches!(
            session.set_radius_km(800.0).await,
            Ok(None)
        ));
        assert_eq!(session.state().await, SessionState::Unavailable);

        session.refresh_tle().await.unwrap();

        assert_eq!(session.state().await, SessionState::Predicted);
        assert_eq!(session.prediction().await.unwrap().radius_km, 800.0);
    }

    #[tokio::test]
    async fn test_invalid_setters_keep_previous_state() {
        let (session, propagator) = sweeping_session();
        session.initialize().await.unwrap();
        let before = session.config().await;
        let calls = propagator.calls();

        assert!(matches!(
            session.set_target(91.0, 0.0).await,
            Err(ApiError::InvalidInput(_))
        ));
        assert!(session.set_target(f64::NAN, 10.0).await.is_err());
        assert!(session.set_radius_km(0.0).await.is_err());
        assert!(session.set_radius_km(f64::INFINITY).await.is_err());
        assert!(session.set_display_duration_sec(-60.0).await.is_err());

        assert_eq!(session.config().await, before);
        assert_eq!(propagator.calls(), calls);
    }

    #[tokio::test]
    async fn test_setters_trigger_full_recompute() {
        let (session, propagator) = sweeping_session();
        session.initialize().await.unwrap();
        let per_scan = propagator.calls();

        session.set_target(10.0, 20.0).await.unwrap();
        session.set_radius_km(250.0).await.unwrap();

        assert_eq!(propagator.calls(), per_scan * 3);
        let prediction = session.prediction().await.unwrap();
        assert_eq!(prediction.target, GeoPoint::new(10.0, 20.0).unwrap());
        assert_eq!(prediction.radius_km, 250.0);

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.predicted_radius_km, Some(250.0));
        assert_eq!(snapshot.predicted_target, Some(GeoPoint::new(10.0, 20.0).unwrap()));
    }

    #[tokio::test]
    async fn test_display_snaps_to_first_pass() {
        let (session, _) = sweeping_session();
        session.initialize().await.unwrap();

        // equator target well inside the sweep
        let prediction = session.set_target(0.0, 0.0).await.unwrap().unwrap();
        let entry = prediction.first_entry_offset_sec.unwrap();

        let expected = entry.clamp(MIN_DISPLAY_DURATION_SEC, MAX_SEARCH_DURATION_SEC);
        assert_eq!(session.config().await.display_duration_sec, expected);
    }

    #[tokio::test]
    async fn test_display_falls_back_without_pass() {
        let (session, _) = sweeping_session();
        session.initialize().await.unwrap();

        // Quebec is never within 1500 km of the equator
        assert_eq!(
            session.snapshot().await.outcome,
            Some(PredictionOutcome::NoPass)
        );
        assert_eq!(
            session.config().await.display_duration_sec,
            DEFAULT_DISPLAY_DURATION_SEC
        );
        let shown = session.displayed_path().await;
        assert_eq!(
            shown.len() as u32,
            DEFAULT_DISPLAY_DURATION_SEC / PREDICTION_INTERVAL_SEC + 1
        );
    }

    #[test]
    fn test_default_display_duration_is_clamped() {
        let mut prediction = Prediction {
            anchored_at: Utc::now(),
            target: GeoPoint::new(0.0, 0.0).unwrap(),
            radius_km: 100.0,
            full_path: Vec::new(),
            first_entry_offset_sec: Some(30),
            first_pass: None,
            closest_approach: None,
            gaps: 0,
        };
        assert_eq!(default_display_duration(&prediction), MIN_DISPLAY_DURATION_SEC);

        prediction.first_entry_offset_sec = Some(4 * 3600);
        assert_eq!(default_display_duration(&prediction), 4 * 3600);

        prediction.first_entry_offset_sec = None;
        assert_eq!(
            default_display_duration(&prediction),
            DEFAULT_DISPLAY_DURATION_SEC
        );
    }

    #[tokio::test]
    async fn test_subscribers_receive_updates() {
        let (session, _) = sweeping_session();
        let mut events = session.subscribe();

        session.initialize().await.unwrap();

        match events.try_recv().unwrap() {
            PredictionEvent::Updated {
                generation,
                outcome,
                closest,
                ..
            } => {
                assert_eq!(generation, 1);
                assert_eq!(outcome, PredictionOutcome::NoPass);
                assert!(closest.is_some());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_closest_details_use_wall_clock() {
        let (session, _) = sweeping_session();
        session.initialize().await.unwrap();

        let prediction = session.prediction().await.unwrap();
        let details = session.closest_approach_details().await.unwrap();

        assert_eq!(
            details.at,
            prediction.anchored_at + chrono::Duration::seconds(details.time as i64)
        );
    }

    /// Blocks its first armed call until released
    struct GatedPropagator {
        armed: AtomicBool,
        entered: Arc<Notify>,
        release: Mutex<mpsc::Receiver<()>>,
        t0: DateTime<Utc>,
    }

    impl Propagator for GatedPropagator {
        fn propagate(
            &self,
            _elements: &OrbitalElementSet,
            at: DateTime<Utc>,
        ) -> Option<GeodeticPosition> {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.notify_one();
                let _ = self.release.lock().unwrap().recv();
            }
            equator_sweep((at - self.t0).num_seconds())
        }
    }

    #[tokio::test]
    async fn test_superseded_result_never_overwrites_newer() {
        let (propagator, entered, release_tx) = gated_propagator();
        let session = Arc::new(session_with(
            ScriptedSource::ok(stations_catalog()),
            propagator.clone(),
        ));
        session.initialize().await.unwrap();

        propagator.armed.store(true, Ordering::SeqCst);
        let slow = {
            let session = session.clone();
            tokio::spawn(async move { session.set_radius_km(100.0).await })
        };
        entered.notified().await;

        let fast = session.set_radius_km(2000.0).await.unwrap();
        assert!(fast.is_some());

        release_tx.send(()).unwrap();
        let slow = slow.await.unwrap().unwrap();

        assert!(slow.is_none());
        let committed = session.prediction().await.unwrap();
        assert_eq!(committed.radius_km, 2000.0);
        assert_eq!(session.config().await.radius_km, 2000.0);
        assert_eq!(session.state().await, SessionState::Predicted);
    }

    fn gated_propagator() -> (Arc<GatedPropagator>, Arc<Notify>, mpsc::Sender<()>) {
        let (release_tx, release_rx) = mpsc::channel();
        let entered = Arc::new(Notify::new());
        let propagator = Arc::new(GatedPropagator {
            armed: AtomicBool::new(false),
            entered: entered.clone(),
            release: Mutex::new(release_rx),
            t0: Utc::now() - chrono::Duration::days(1),
        });
        (propagator, entered, release_tx)
    }

    #[tokio::test]
    async fn test_display_set_during_scan_survives_commit() {
        let (propagator, entered, release_tx) = gated_propagator();
        let session = Arc::new(session_with(
            ScriptedSource::ok(stations_catalog()),
            propagator.clone(),
        ));
        session.initialize().await.unwrap();

        propagator.armed.store(true, Ordering::SeqCst);
        let scan = {
            let session = session.clone();
            tokio::spawn(async move { session.set_radius_km(100.0).await })
        };
        entered.notified().await;

        session.set_display_duration_sec(600.0).await.unwrap();

        release_tx.send(()).unwrap();
        let committed = scan.await.unwrap().unwrap();

        assert!(committed.is_some());
        assert_eq!(session.config().await.display_duration_sec, 600);
        assert_eq!(
            session.displayed_path().await.last().unwrap().offset_seconds,
            600
        );

        // the next scan without a user change applies the default again
        session.set_radius_km(1500.0).await.unwrap();
        assert_eq!(
            session.config().await.display_duration_sec,
            DEFAULT_DISPLAY_DURATION_SEC
        );
    }

    #[tokio::test]
    async fn test_load_failure_cancels_scan_in_flight() {
        let (propagator, entered, release_tx) = gated_propagator();
        let source = ScriptedSource::new(vec![
            Ok(stations_catalog()),
            Err(ApiError::Upstream("timeout".into())),
        ]);
        let session = Arc::new(session_with_cache_window(
            source,
            propagator.clone(),
            chrono::Duration::zero(),
        ));
        session.initialize().await.unwrap();

        propagator.armed.store(true, Ordering::SeqCst);
        let scan = {
            let session = session.clone();
            tokio::spawn(async move { session.set_radius_km(100.0).await })
        };
        entered.notified().await;

        assert!(session.refresh_tle().await.is_err());

        release_tx.send(()).unwrap();
        let stale = scan.await.unwrap().unwrap();

        assert!(stale.is_none());
        assert_eq!(session.state().await, SessionState::Unavailable);
        assert!(session.prediction().await.is_none());
        assert!(session.closest_approach_details().await.is_none());
        assert!(session.displayed_path().await.is_empty());
    }
}
