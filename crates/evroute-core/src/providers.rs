//! Interfaces to the external map, places and grid-data services.

use crate::emissions::GenerationMix;
use crate::models::{LatLng, RouteStep};
use crate::polyline::{self, PolylineError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error("no route found")]
    NoRoute,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether repeating the same read-only call could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport(_) => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            ProviderError::NoRoute | ProviderError::Malformed(_) => false,
        }
    }
}

impl From<PolylineError> for ProviderError {
    fn from(err: PolylineError) -> Self {
        ProviderError::Malformed(format!("polyline: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub distance_m: f64,
    pub steps: Vec<RouteStep>,
}

/// A single driving route between two coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directions {
    /// Encoded overview polyline.
    pub polyline: String,
    pub legs: Vec<Leg>,
}

impl Directions {
    pub fn path(&self) -> Result<Vec<LatLng>, PolylineError> {
        polyline::decode(&self.polyline)
    }

    pub fn distance_m(&self) -> f64 {
        self.legs.iter().map(|leg| leg.distance_m).sum()
    }

    pub fn steps(&self) -> Vec<RouteStep> {
        self.legs
            .iter()
            .flat_map(|leg| leg.steps.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingStation {
    pub position: LatLng,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub place_id: Option<String>,
}

#[async_trait]
pub trait DirectionsProvider: Send + Sync {
    /// Driving directions; `ProviderError::NoRoute` when none exist.
    async fn directions(
        &self,
        origin: LatLng,
        destination: LatLng,
    ) -> Result<Directions, ProviderError>;
}

#[async_trait]
pub trait PlacesProvider: Send + Sync {
    /// Charging stations within `radius_m`, in provider order. Empty when none.
    async fn charging_stations(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<Vec<ChargingStation>, ProviderError>;
}

#[async_trait]
pub trait GridMixProvider: Send + Sync {
    /// Share of installed generation capacity per fuel within `radius_m`.
    async fn generation_mix(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<GenerationMix, ProviderError>;
}
