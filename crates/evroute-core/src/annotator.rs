//! Attach the nearest usable charging station to each sampled waypoint.

use crate::models::{LatLng, StationInfo, Waypoint};
use crate::providers::{ChargingStation, DirectionsProvider, PlacesProvider, ProviderError};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_SEARCH_RADIUS_M: f64 = 10_000.0;
pub const DEFAULT_CANDIDATES: usize = 3;
pub const DEFAULT_CONCURRENCY: usize = 4;

/// How to pick one station out of a Places result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StationSelection {
    /// Among the first `candidates` results, the one with the shortest drive
    /// to the trip destination.
    NearestToDestination { candidates: usize },
    /// The first result as returned by the provider.
    FirstCandidate,
}

impl Default for StationSelection {
    fn default() -> Self {
        StationSelection::NearestToDestination {
            candidates: DEFAULT_CANDIDATES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    pub search_radius_m: f64,
    pub selection: StationSelection,
    /// Upper bound on waypoints annotated at the same time.
    pub concurrency: usize,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
            selection: StationSelection::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

pub struct StationAnnotator {
    places: Arc<dyn PlacesProvider>,
    directions: Arc<dyn DirectionsProvider>,
    config: AnnotatorConfig,
}

impl StationAnnotator {
    pub fn new(
        places: Arc<dyn PlacesProvider>,
        directions: Arc<dyn DirectionsProvider>,
        config: AnnotatorConfig,
    ) -> Self {
        Self {
            places,
            directions,
            config,
        }
    }

    /// Annotate every waypoint, keeping path order.
    ///
    /// Waypoints without stations or without a drivable route to any
    /// candidate are returned un-annotated. Any other provider failure aborts.
    pub async fn annotate(
        &self,
        waypoints: Vec<Waypoint>,
        destination: LatLng,
    ) -> Result<Vec<Waypoint>, ProviderError> {
        let concurrency = self.config.concurrency.max(1);
        stream::iter(
            waypoints
                .into_iter()
                .map(|waypoint| self.annotate_one(waypoint, destination)),
        )
        .buffered(concurrency)
        .try_collect()
        .await
    }

    async fn annotate_one(
        &self,
        waypoint: Waypoint,
        destination: LatLng,
    ) -> Result<Waypoint, ProviderError> {
        let stations = self
            .places
            .charging_stations(waypoint.position, self.config.search_radius_m)
            .await?;
        if stations.is_empty() {
            tracing::debug!(position = %waypoint.position, "no charging stations nearby");
            return Ok(waypoint);
        }

        let candidates = self.rank_candidates(stations, destination).await?;
        for station in candidates {
            match self
                .directions
                .directions(waypoint.position, station.position)
                .await
            {
                Ok(route) => {
                    let info = StationInfo {
                        position: station.position,
                        name: station.name,
                        route_distance_m: route.distance_m(),
                        route_steps: route.steps(),
                    };
                    return Ok(waypoint.with_station(info));
                }
                Err(ProviderError::NoRoute) => {
                    tracing::warn!(
                        from = %waypoint.position,
                        station = %station.position,
                        "no drivable route to charging station, skipping"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        tracing::warn!(position = %waypoint.position, "no reachable charging station");
        Ok(waypoint)
    }

    /// Candidates in preference order.
    async fn rank_candidates(
        &self,
        stations: Vec<ChargingStation>,
        destination: LatLng,
    ) -> Result<Vec<ChargingStation>, ProviderError> {
        let limit = match self.config.selection {
            StationSelection::FirstCandidate => return Ok(stations.into_iter().take(1).collect()),
            StationSelection::NearestToDestination { candidates } => candidates.max(1),
        };

        let mut ranked = Vec::new();
        for station in stations.into_iter().take(limit) {
            match self.directions.directions(station.position, destination).await {
                Ok(route) => ranked.push((route.distance_m(), station)),
                Err(ProviderError::NoRoute) => {
                    tracing::warn!(
                        station = %station.position,
                        "charging station has no route to destination, skipping"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        Ok(ranked.into_iter().map(|(_, station)| station).collect())
    }
}
