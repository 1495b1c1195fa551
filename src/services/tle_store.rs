//! TLE acquisition and caching.
//!
//! Orbital elements come from a plain-text catalog. The last good catalog text
//! is persisted with its download time and reused until it ages past the cache
//! window. Text that does not yield a valid element set is never written.

use crate::clients::TleSource;
use crate::domain::{CacheEntry, TleStatus};
use crate::errors::{ApiError, ApiResult};
use crate::repo::TleCache;
use chrono::{DateTime, Utc};
use sgp4::{Constants, Elements};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parsed TLE pair with its SGP4 initialisation
pub struct OrbitalElementSet {
    name: String,
    elements: Elements,
    constants: Constants,
}

impl OrbitalElementSet {
    /// Locate `satellite_name` in catalog text and parse its element lines
    pub fn parse(satellite_name: &str, text: &str) -> ApiResult<Self> {
        let (line1, line2) = locate_tle_lines(text, satellite_name).ok_or_else(|| {
            ApiError::TleParse(format!("no TLE block for '{}' in catalog", satellite_name))
        })?;

        let elements = Elements::from_tle(
            Some(satellite_name.to_string()),
            line1.as_bytes(),
            line2.as_bytes(),
        )
        .map_err(|e| ApiError::TleParse(format!("{}: {}", satellite_name, e)))?;

        let constants = Constants::from_elements(&elements)
            .map_err(|e| ApiError::TleParse(format!("{}: {}", satellite_name, e)))?;

        Ok(Self {
            name: satellite_name.to_string(),
            elements,
            constants,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn norad_id(&self) -> u64 {
        self.elements.norad_id
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.elements.datetime.and_utc()
    }

    pub fn constants(&self) -> &Constants {
        &self.constants
    }
}

impl fmt::Debug for OrbitalElementSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrbitalElementSet")
            .field("name", &self.name)
            .field("norad_id", &self.elements.norad_id)
            .field("epoch", &self.elements.datetime)
            .finish()
    }
}

fn is_element_line(line: &str) -> bool {
    line.starts_with("1 ") || line.starts_with("2 ")
}

/// Find the header line naming the satellite and return the two lines after it
pub fn locate_tle_lines(text: &str, satellite_name: &str) -> Option<(String, String)> {
    let needle = satellite_name.trim().to_ascii_uppercase();
    if needle.is_empty() {
        return None;
    }

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let header = lines
        .iter()
        .position(|l| !is_element_line(l) && l.to_ascii_uppercase().contains(&needle))?;

    let line1 = lines.get(header + 1)?;
    let line2 = lines.get(header + 2)?;
    if !line1.starts_with("1 ") || !line2.starts_with("2 ") {
        return None;
    }

    Some((line1.to_string(), line2.to_string()))
}

/// Element set source with a persisted, time-limited cache in front of the network
pub struct TleStore<S, C> {
    source: S,
    cache: C,
    satellite_name: String,
    cache_duration: chrono::Duration,
}

impl<S: TleSource, C: TleCache> TleStore<S, C> {
    pub fn new(
        source: S,
        cache: C,
        satellite_name: String,
        cache_duration: chrono::Duration,
    ) -> Self {
        Self {
            source,
            cache,
            satellite_name,
            cache_duration,
        }
    }

    fn cache_key(&self) -> String {
        format!("tle:{}", self.satellite_name)
    }

    /// Return orbital elements from a fresh cache entry, or from the network
    pub async fn fetch_orbital_elements(
        &self,
        force_refresh: bool,
    ) -> ApiResult<Arc<OrbitalElementSet>> {
        let key = self.cache_key();
        let now = Utc::now();

        let cached = match self.cache.load(&key).await {
            Ok(entry) => entry.filter(|e| e.is_fresh(now, self.cache_duration)),
            Err(e) => {
                warn!("TLE cache read failed, going to network: {}", e);
                None
            }
        };

        let mut fallback = None;
        if let Some(entry) = cached {
            match OrbitalElementSet::parse(&self.satellite_name, &entry.raw_text) {
                Ok(set) if !force_refresh => {
                    debug!(
                        "TLE cache hit for {} (age {}s)",
                        self.satellite_name,
                        (now - entry.fetched_at).num_seconds()
                    );
                    return Ok(Arc::new(set));
                }
                Ok(set) => fallback = Some(set),
                Err(e) => {
                    warn!("Discarding malformed TLE cache entry: {}", e);
                    if let Err(e) = self.cache.clear(&key).await {
                        warn!("Failed to clear TLE cache entry: {}", e);
                    }
                }
            }
        } else {
            debug!("TLE cache miss for {}", self.satellite_name);
        }

        let text = match self.source.fetch_text().await {
            Ok(text) => text,
            Err(e) if e.is_fetch_failure() => {
                return match fallback {
                    Some(set) => {
                        warn!("TLE fetch failed, keeping cached elements: {}", e);
                        Ok(Arc::new(set))
                    }
                    None => Err(e),
                };
            }
            Err(e) => return Err(e),
        };

        let set = OrbitalElementSet::parse(&self.satellite_name, &text).map_err(|e| {
            warn!("Fetched TLE text rejected, cache left untouched: {}", e);
            e
        })?;

        let entry = CacheEntry {
            fetched_at: Utc::now(),
            raw_text: text,
        };
        if let Err(e) = self.cache.save(&key, &entry).await {
            warn!("Failed to persist TLE cache entry: {}", e);
        }

        info!(
            "Loaded TLE for {} (NORAD {}, epoch {})",
            set.name(),
            set.norad_id(),
            set.epoch()
        );
        Ok(Arc::new(set))
    }

    /// Age of the persisted entry, if any
    pub async fn cache_status(&self) -> ApiResult<Option<TleStatus>> {
        let now = Utc::now();
        let entry = self.cache.load(&self.cache_key()).await?;
        Ok(entry.map(|e| TleStatus {
            fetched_at: e.fetched_at,
            age_sec: (now - e.fetched_at).num_seconds(),
            stale: !e.is_fresh(now, self.cache_duration),
        }))
    }
}
