//! Two-tier travel-time cache
//!
//! - fast tier: short TTL (24 h), consulted first
//! - durable tier: long TTL (7 d), backfills the fast tier on hit and can be
//!   snapshotted to a JSON file between runs
//!
//! Expiry is checked lazily on read; there is no background sweep. Both tiers
//! are cleared together only when a start location changes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::services::clock::Clock;
use crate::services::travel::TravelTime;
use crate::types::Coordinates;

pub const FAST_TIER_TTL_HOURS: i64 = 24;
pub const DURABLE_TIER_TTL_DAYS: i64 = 7;

/// Direction-sensitive key over coordinates rounded to 4 decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    origin: (i64, i64),
    destination: (i64, i64),
}

impl CacheKey {
    pub fn new(origin: &Coordinates, destination: &Coordinates) -> Self {
        Self {
            origin: origin.rounded_e4(),
            destination: destination.rounded_e4(),
        }
    }

    /// Origin and destination round to the same point.
    pub fn is_same_point(&self) -> bool {
        self.origin == self.destination
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let e4 = |v: i64| v as f64 / 10_000.0;
        write!(
            f,
            "{:.4},{:.4}->{:.4},{:.4}",
            e4(self.origin.0),
            e4(self.origin.1),
            e4(self.destination.0),
            e4(self.destination.1)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub duration_minutes: f64,
    pub distance_km: f64,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.timestamp < ttl
    }

    fn to_travel_time(&self) -> TravelTime {
        TravelTime {
            duration_minutes: self.duration_minutes,
            distance_km: self.distance_km,
            provider: self.provider.clone(),
        }
    }
}

/// Serialized form of the durable tier
#[derive(Debug, Default, Serialize, Deserialize)]
struct DurableSnapshot {
    entries: Vec<(CacheKey, CacheEntry)>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub fast_hits: u64,
    pub durable_hits: u64,
    pub misses: u64,
    pub fast_entries: usize,
    pub durable_entries: usize,
}

pub struct TravelTimeCache {
    clock: Arc<dyn Clock>,
    fast: Mutex<HashMap<CacheKey, CacheEntry>>,
    durable: Mutex<HashMap<CacheKey, CacheEntry>>,
    fast_ttl: Duration,
    durable_ttl: Duration,
    snapshot_path: Option<PathBuf>,
    fast_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
}

impl TravelTimeCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            fast: Mutex::new(HashMap::new()),
            durable: Mutex::new(HashMap::new()),
            fast_ttl: Duration::hours(FAST_TIER_TTL_HOURS),
            durable_ttl: Duration::days(DURABLE_TIER_TTL_DAYS),
            snapshot_path: None,
            fast_hits: AtomicU64::new(0),
            durable_hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Back the durable tier with a JSON file, loading whatever is still fresh.
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match load_snapshot(&path) {
            Ok(entries) => {
                let now = self.clock.now();
                let mut durable = self.durable.lock();
                let before = entries.len();
                durable.extend(
                    entries
                        .into_iter()
                        .filter(|(_, e)| e.is_fresh(now, self.durable_ttl) && e.to_travel_time().check().is_ok()),
                );
                info!(
                    "Loaded {} travel-time entries from {} ({} expired or invalid)",
                    durable.len(),
                    path.display(),
                    before - durable.len()
                );
            }
            Err(e) => warn!("Travel-time snapshot {} not loaded: {:#}", path.display(), e),
        }
        self.snapshot_path = Some(path);
        self
    }

    pub fn get(&self, origin: &Coordinates, destination: &Coordinates) -> Option<TravelTime> {
        let key = CacheKey::new(origin, destination);
        let now = self.clock.now();

        if let Some(entry) = self.fast.lock().get(&key) {
            if entry.is_fresh(now, self.fast_ttl) {
                self.fast_hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.to_travel_time());
            }
        }

        let durable_hit = self
            .durable
            .lock()
            .get(&key)
            .filter(|e| e.is_fresh(now, self.durable_ttl))
            .cloned();

        match durable_hit {
            Some(entry) => {
                debug!("Durable tier hit for {}, backfilling fast tier", key);
                self.durable_hits.fetch_add(1, Ordering::Relaxed);
                let travel = entry.to_travel_time();
                // Backfilled entry keeps its original timestamp so the fast TTL
                // never outlives the durable one.
                self.fast.lock().insert(key, entry);
                Some(travel)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, origin: &Coordinates, destination: &Coordinates, travel: &TravelTime) {
        let key = CacheKey::new(origin, destination);
        let entry = CacheEntry {
            duration_minutes: travel.duration_minutes,
            distance_km: travel.distance_km,
            provider: travel.provider.clone(),
            timestamp: self.clock.now(),
        };
        self.fast.lock().insert(key, entry.clone());
        self.durable.lock().insert(key, entry);
    }

    /// Drop both tiers. Called only on an explicit start-location change.
    pub fn invalidate_all(&self) {
        let fast = std::mem::take(&mut *self.fast.lock()).len();
        let durable = std::mem::take(&mut *self.durable.lock()).len();
        info!("Travel-time cache invalidated ({} fast, {} durable entries)", fast, durable);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            fast_hits: self.fast_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fast_entries: self.fast.lock().len(),
            durable_entries: self.durable.lock().len(),
        }
    }

    /// Write the durable tier to its snapshot file (no-op without one).
    pub fn flush(&self) -> Result<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let now = self.clock.now();
        let snapshot = DurableSnapshot {
            entries: self
                .durable
                .lock()
                .iter()
                .filter(|(_, e)| e.is_fresh(now, self.durable_ttl))
                .map(|(k, e)| (*k, e.clone()))
                .collect(),
        };

        let tmp = path.with_extension("tmp");
        let json = serde_json::to_vec(&snapshot)?;
        std::fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        debug!("Flushed {} travel-time entries to {}", snapshot.entries.len(), path.display());
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> Result<Vec<(CacheKey, CacheEntry)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let snapshot: DurableSnapshot = serde_json::from_slice(&bytes).context("parsing snapshot")?;
    Ok(snapshot.entries)
}
