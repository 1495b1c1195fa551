/// Application configuration module
use anyhow::Context;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub tle: TleSettings,
    pub defaults: PredictionDefaults,
}

#[derive(Clone, Debug)]
pub struct TleSettings {
    pub url: String,
    pub satellite_name: String,
    pub cache_seconds: u64,
    pub fetch_timeout_seconds: u64,
    pub refresh_seconds: u64,
}

impl TleSettings {
    pub fn cache_duration(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_seconds as i64)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }
}

/// Initial observer configuration for the prediction session
#[derive(Clone, Debug)]
pub struct PredictionDefaults {
    pub target_lat: f64,
    pub target_lon: f64,
    pub radius_km: f64,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL is required")?;

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let tle = TleSettings {
            url: env::var("TLE_URL").unwrap_or_else(|_| {
                "https://celestrak.org/NORAD/elements/gp.php?GROUP=stations&FORMAT=tle".to_string()
            }),
            satellite_name: env::var("SATELLITE_NAME").unwrap_or_else(|_| "ISS".to_string()),
            cache_seconds: env_u64("TLE_CACHE_SECONDS", 7200), // 2h
            fetch_timeout_seconds: env_u64("TLE_FETCH_TIMEOUT_SECONDS", 20),
            refresh_seconds: env_u64("TLE_REFRESH_SECONDS", 7200),
        };

        // Quebec City
        let defaults = PredictionDefaults {
            target_lat: env_f64("TARGET_LAT", 46.8139),
            target_lon: env_f64("TARGET_LON", -71.2080),
            radius_km: env_f64("RADIUS_KM", 1500.0),
        };

        Ok(Self {
            database_url,
            bind_addr,
            tle,
            defaults,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}
