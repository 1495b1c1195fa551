/// ISS pass predictor service entry point
mod clients;
mod config;
mod domain;
mod errors;
mod handlers;
mod repo;
mod routes;
mod services;
mod utils;

use crate::clients::TleClient;
use crate::config::AppConfig;
use crate::domain::GeoPoint;
use crate::handlers::{AppState, LiveSession};
use crate::repo::{init_db, TleCacheRepo};
use crate::routes::build_router;
use crate::services::{PredictionEvent, PredictionSession, Sgp4Propagator, TleStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    // Load configuration
    let config = AppConfig::from_env()?;
    info!("Configuration loaded successfully");

    // Initialize database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    info!("Database connection pool established");

    // Initialize database schema
    init_db(&pool).await?;
    info!("Database schema initialized");

    let tle_client = TleClient::new(config.tle.url.clone(), config.tle.fetch_timeout())?;
    info!(
        "Tracking '{}' from {} (timeout {:?})",
        config.tle.satellite_name,
        tle_client.base_url(),
        tle_client.timeout()
    );
    let store = TleStore::new(
        tle_client,
        TleCacheRepo::new(pool.clone()),
        config.tle.satellite_name.clone(),
        config.tle.cache_duration(),
    );

    let target = GeoPoint::new(config.defaults.target_lat, config.defaults.target_lon)?;
    let session = Arc::new(PredictionSession::new(
        store,
        Arc::new(Sgp4Propagator),
        target,
        config.defaults.radius_km,
    )?);

    let state = AppState {
        session: session.clone(),
    };

    // Start background tasks
    start_background_tasks(&config, session);

    // Build router
    let app = build_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("iss_pass_predictor listening on {}", config.bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

/// Start the TLE lifecycle and event logging tasks
fn start_background_tasks(config: &AppConfig, session: Arc<LiveSession>) {
    // Background task: prediction event log
    {
        let mut events = session.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PredictionEvent::Updated {
                        generation,
                        outcome,
                        display_duration_sec,
                        closest,
                    }) => info!(
                        generation,
                        ?outcome,
                        display_duration_sec,
                        closest_km = ?closest.map(|c| c.distance_km),
                        "Prediction updated"
                    ),
                    Ok(PredictionEvent::Unavailable { reason }) => {
                        warn!("Prediction unavailable: {}", reason)
                    }
                    Err(RecvError::Lagged(n)) => warn!("Prediction event log lagged by {}", n),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }

    // Background task: initial prediction, then periodic forced TLE refresh
    {
        let interval = config.tle.refresh_seconds;
        tokio::spawn(async move {
            info!("Starting TLE refresh task (interval: {}s)", interval);
            if let Err(e) = session.initialize().await {
                error!("Initial prediction failed: {:?}", e);
            }
            loop {
                tokio::time::sleep(Duration::from_secs(interval)).await;
                if let Err(e) = session.refresh_tle().await {
                    error!("TLE refresh error: {:?}", e);
                }
            }
        });
    }

    info!("All background tasks started successfully");
}
