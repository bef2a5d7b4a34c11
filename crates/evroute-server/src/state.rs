//! Shared application state.

use anyhow::{Context, Result};
use evroute_core::RoutePlanner;
use evroute_maps::{CachedPlaces, GoogleMapsClient, PowerPlantDataset, Retrying};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

pub struct AppState {
    planner: RoutePlanner,
    /// Cancelled on shutdown; each plan runs under a child token.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(planner: RoutePlanner) -> Self {
        Self {
            planner,
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire the Google and power plant providers described by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        let google = GoogleMapsClient::new(
            config.maps_base_url.clone(),
            api_key,
            config.provider_timeout(),
        )?;
        let retry = config.retry_policy();

        let directions = Arc::new(Retrying::new(google.clone(), retry));
        let places = Arc::new(CachedPlaces::new(
            Retrying::new(google, retry),
            config.station_cache_ttl(),
            config.station_cache_max,
        ));
        let grid = Arc::new(
            PowerPlantDataset::from_path(&config.power_plant_csv).with_context(|| {
                format!(
                    "loading power plant dataset {}",
                    config.power_plant_csv.display()
                )
            })?,
        );
        let policy = config.policy.build().context("loading charge policy")?;

        let planner = RoutePlanner::new(directions, places, grid, policy, config.planner_config());
        tracing::info!(
            policy = planner.policy_name(),
            maps = %config.maps_base_url,
            "planner ready"
        );
        Ok(Self::new(planner))
    }

    pub fn planner(&self) -> &RoutePlanner {
        &self.planner
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
