//! In-memory cache for charging station lookups.
//!
//! Replanning from a charger often re-queries Places around points already
//! searched, so results are kept per rounded location and radius.

use async_trait::async_trait;
use dashmap::DashMap;
use evroute_core::{ChargingStation, LatLng, PlacesProvider, ProviderError};
use std::time::{Duration, Instant};

/// Roughly 1.1 m at the equator.
const KEY_SCALE: f64 = 1e5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct StationKey {
    lat_e5: i64,
    lng_e5: i64,
    radius_m: u64,
}

impl StationKey {
    fn new(location: LatLng, radius_m: f64) -> Self {
        Self {
            lat_e5: (location.lat * KEY_SCALE).round() as i64,
            lng_e5: (location.lng * KEY_SCALE).round() as i64,
            radius_m: radius_m.round().max(0.0) as u64,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedStations {
    stations: Vec<ChargingStation>,
    fetched_at: Instant,
}

/// Places provider wrapper with a TTL and an entry cap.
pub struct CachedPlaces<P> {
    inner: P,
    entries: DashMap<StationKey, CachedStations>,
    ttl: Duration,
    max_entries: usize,
}

impl<P> CachedPlaces<P> {
    pub fn new(inner: P, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &StationKey) -> Option<Vec<ChargingStation>> {
        let entry = self.entries.get(key)?;
        if entry.fetched_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.stations.clone())
    }

    /// Drop expired entries, then the oldest ones until under the cap.
    fn prune(&self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, cached| cached.fetched_at.elapsed() <= ttl);
        if self.entries.len() <= self.max_entries {
            return;
        }

        let mut by_age: Vec<(StationKey, Instant)> = self
            .entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().fetched_at))
            .collect();
        by_age.sort_by_key(|(_, fetched_at)| *fetched_at);
        let excess = self.entries.len().saturating_sub(self.max_entries);
        for (key, _) in by_age.into_iter().take(excess) {
            self.entries.remove(&key);
        }
    }
}

#[async_trait]
impl<P: PlacesProvider> PlacesProvider for CachedPlaces<P> {
    async fn charging_stations(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<Vec<ChargingStation>, ProviderError> {
        let key = StationKey::new(location, radius_m);
        if let Some(stations) = self.lookup(&key) {
            tracing::trace!(%location, "station cache hit");
            return Ok(stations);
        }

        let stations = self.inner.charging_stations(location, radius_m).await?;
        self.entries.insert(
            key,
            CachedStations {
                stations: stations.clone(),
                fetched_at: Instant::now(),
            },
        );
        self.prune();
        Ok(stations)
    }
}
