//! evroute CLI - command line tools for the EV route planner.
//!
//! Binaries:
//! - plan_route: plan one trip against Google Maps and print the result
//! - train_policy: simulate trips and fit the learned charge policy

use anyhow::{Context, Result};
use clap::Args;
use evroute_core::spatial::offset_by_bearing;
use evroute_core::{
    DirectionsProvider, LatLng, PlacesProvider, RouteStep, StationInfo, Waypoint,
};
use evroute_maps::google::DEFAULT_BASE_URL;
use evroute_maps::{GoogleMapsClient, RetryPolicy, Retrying};
use std::f64::consts::FRAC_PI_2;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Parse a `"lat,lng"` pair for clap.
pub fn parse_lat_lng(text: &str) -> Result<LatLng, String> {
    let (lat, lng) = text
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got {text:?}"))?;
    let point = LatLng::new(
        lat.trim().parse().map_err(|_| format!("bad latitude {lat:?}"))?,
        lng.trim().parse().map_err(|_| format!("bad longitude {lng:?}"))?,
    );
    if !point.is_valid() {
        return Err(format!("{point} is out of range"));
    }
    Ok(point)
}

/// Google Maps connection settings shared by the binaries.
#[derive(Args, Debug, Clone)]
pub struct MapsArgs {
    /// Maps API key; falls back to GOOGLE_MAPS_API_KEY, then the key file
    #[arg(long)]
    pub api_key: Option<String>,

    #[arg(long, default_value = "APIKey.txt")]
    pub api_key_file: PathBuf,

    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub maps_url: String,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_s: u64,

    #[arg(long, default_value_t = 3)]
    pub max_attempts: u32,
}

impl MapsArgs {
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        if let Ok(key) = std::env::var("GOOGLE_MAPS_API_KEY") {
            if !key.trim().is_empty() {
                return Ok(key.trim().to_string());
            }
        }
        let raw = std::fs::read_to_string(&self.api_key_file).with_context(|| {
            format!(
                "no API key given and {} unreadable",
                self.api_key_file.display()
            )
        })?;
        let key = raw.trim();
        anyhow::ensure!(!key.is_empty(), "{} is empty", self.api_key_file.display());
        Ok(key.to_string())
    }

    /// Directions and places clients with retries.
    pub fn providers(&self) -> Result<(Arc<dyn DirectionsProvider>, Arc<dyn PlacesProvider>)> {
        let google = GoogleMapsClient::new(
            self.maps_url.clone(),
            self.resolve_api_key()?,
            Duration::from_secs(self.timeout_s.max(1)),
        )?;
        let retry = RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            ..RetryPolicy::default()
        };
        Ok((
            Arc::new(Retrying::new(google.clone(), retry)),
            Arc::new(Retrying::new(google, retry)),
        ))
    }
}

/// Stderr logging, `RUST_LOG` overrides the default `info`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Shape of an offline training corridor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corridor {
    pub length_km: f64,
    pub interval_km: f64,
    /// Annotate every n-th waypoint with a station.
    pub station_every: usize,
    pub detour_km: f64,
}

impl Corridor {
    /// Annotated waypoints east along the equator, stations north of the road.
    ///
    /// The origin never carries a station.
    pub fn waypoints(&self) -> Vec<Waypoint> {
        let origin = LatLng::new(0.0, 0.0);
        let interval_m = self.interval_km.max(0.1) * 1000.0;
        let length_m = self.length_km.max(0.0) * 1000.0;
        let detour_m = self.detour_km.max(0.0) * 1000.0;
        let every = self.station_every.max(1);

        let mut marks = Vec::new();
        let mut at = 0.0;
        while at < length_m {
            marks.push(at);
            at += interval_m;
        }
        marks.push(length_m);

        let mut previous = 0.0;
        marks
            .into_iter()
            .enumerate()
            .map(|(index, mark)| {
                let position = offset_by_bearing(origin, mark, FRAC_PI_2);
                let waypoint = Waypoint::new(position, mark - previous);
                previous = mark;
                if index == 0 || index % every != 0 {
                    return waypoint;
                }
                let station = offset_by_bearing(position, detour_m, 0.0);
                waypoint.with_station(StationInfo {
                    position: station,
                    name: Some(format!("Corridor station {index}")),
                    route_distance_m: detour_m,
                    route_steps: vec![RouteStep {
                        start: position,
                        end: station,
                        distance_m: detour_m,
                    }],
                })
            })
            .collect()
    }
}
