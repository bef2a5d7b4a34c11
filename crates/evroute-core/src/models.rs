//! Core data models for EV trip planning.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A geographic coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    #[serde(alias = "lon")]
    pub lng: f64,
}

impl LatLng {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to another coordinate in meters.
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        crate::spatial::haversine_distance(self.lat, self.lng, other.lat, other.lng)
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6},{:.6}", self.lat, self.lng)
    }
}

/// One turn-by-turn step of a provider route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteStep {
    pub start: LatLng,
    pub end: LatLng,
    pub distance_m: f64,
}

/// Reachability information for the charging station chosen at a waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationInfo {
    pub position: LatLng,
    #[serde(default)]
    pub name: Option<String>,
    /// Driving distance from the waypoint to the station.
    pub route_distance_m: f64,
    pub route_steps: Vec<RouteStep>,
}

impl StationInfo {
    /// Where the vehicle ends up after driving the station route.
    pub fn arrival_position(&self) -> LatLng {
        self.route_steps
            .last()
            .map(|step| step.end)
            .unwrap_or(self.position)
    }
}

/// A sampled point along the driving path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub position: LatLng,
    /// Distance driven from the previous waypoint of the same sampled path.
    pub distance_from_previous_m: f64,
    #[serde(default)]
    pub nearest_station: Option<StationInfo>,
}

impl Waypoint {
    pub fn new(position: LatLng, distance_from_previous_m: f64) -> Self {
        Self {
            position,
            distance_from_previous_m,
            nearest_station: None,
        }
    }

    pub fn with_station(mut self, station: StationInfo) -> Self {
        self.nearest_station = Some(station);
        self
    }

    pub fn has_station(&self) -> bool {
        self.nearest_station.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VehicleError {
    #[error("range capacity must be positive, got {0} m")]
    InvalidRange(f64),
    #[error("efficiency must be positive, got {0} Wh/m")]
    InvalidEfficiency(f64),
    #[error("battery capacity must be positive, got {0} kWh")]
    InvalidBattery(f64),
}

/// Static vehicle characteristics, fixed for a planning run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleProfile {
    range_capacity_m: f64,
    efficiency_wh_per_m: f64,
}

/// Tesla Model 3 consumption (139 Wh/km).
pub const DEFAULT_EFFICIENCY_WH_PER_M: f64 = 0.139;

impl VehicleProfile {
    pub fn new(range_capacity_m: f64, efficiency_wh_per_m: f64) -> Result<Self, VehicleError> {
        if !(range_capacity_m.is_finite() && range_capacity_m > 0.0) {
            return Err(VehicleError::InvalidRange(range_capacity_m));
        }
        if !(efficiency_wh_per_m.is_finite() && efficiency_wh_per_m > 0.0) {
            return Err(VehicleError::InvalidEfficiency(efficiency_wh_per_m));
        }
        Ok(Self {
            range_capacity_m,
            efficiency_wh_per_m,
        })
    }

    /// Derive a profile from battery size and, optionally, the advertised range.
    ///
    /// Without a range the default efficiency is assumed and the range follows
    /// from the battery capacity.
    pub fn from_battery(
        battery_capacity_kwh: f64,
        total_range_km: Option<f64>,
    ) -> Result<Self, VehicleError> {
        if !(battery_capacity_kwh.is_finite() && battery_capacity_kwh > 0.0) {
            return Err(VehicleError::InvalidBattery(battery_capacity_kwh));
        }
        let battery_wh = battery_capacity_kwh * 1000.0;
        match total_range_km {
            Some(range_km) => {
                let range_m = range_km * 1000.0;
                if !(range_m.is_finite() && range_m > 0.0) {
                    return Err(VehicleError::InvalidRange(range_m));
                }
                Self::new(range_m, battery_wh / range_m)
            }
            None => Self::new(
                battery_wh / DEFAULT_EFFICIENCY_WH_PER_M,
                DEFAULT_EFFICIENCY_WH_PER_M,
            ),
        }
    }

    pub fn range_capacity_m(&self) -> f64 {
        self.range_capacity_m
    }

    pub fn efficiency_wh_per_m(&self) -> f64 {
        self.efficiency_wh_per_m
    }
}

/// Mutable vehicle state during a planning run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleState {
    pub remaining_range_m: f64,
}

impl VehicleState {
    pub fn full(profile: &VehicleProfile) -> Self {
        Self {
            remaining_range_m: profile.range_capacity_m(),
        }
    }

    /// Distance driven since the last charge.
    pub fn consumed_m(&self, profile: &VehicleProfile) -> f64 {
        profile.range_capacity_m() - self.remaining_range_m
    }

    pub fn is_full(&self, profile: &VehicleProfile) -> bool {
        self.consumed_m(profile) <= f64::EPSILON
    }

    pub fn consume(&mut self, distance_m: f64) {
        self.remaining_range_m -= distance_m.max(0.0);
    }

    pub fn recharge(&mut self, profile: &VehicleProfile) {
        self.remaining_range_m = profile.range_capacity_m();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaypointKind {
    /// Sampled from the directions polyline toward the destination.
    Sampled,
    /// Part of a spliced charging detour.
    Detour,
}

/// A waypoint the vehicle has committed to driving through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedWaypoint {
    pub position: LatLng,
    pub distance_from_previous_m: f64,
    /// Range left on arrival.
    pub remaining_range_m: f64,
    pub kind: WaypointKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargingStop {
    pub position: LatLng,
    #[serde(default)]
    pub name: Option<String>,
    pub detour_distance_m: f64,
    /// Range left when pulling into the station.
    pub arrival_range_m: f64,
}

/// The committed route so far: waypoints in driving order plus charging stops.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteSegment {
    pub waypoints: Vec<CommittedWaypoint>,
    pub charging_stops: Vec<ChargingStop>,
}

impl RouteSegment {
    pub fn last_position(&self) -> Option<LatLng> {
        self.waypoints.last().map(|wp| wp.position)
    }

    pub fn total_distance_m(&self) -> f64 {
        self.waypoints
            .iter()
            .map(|wp| wp.distance_from_previous_m)
            .sum()
    }

    pub fn positions(&self) -> Vec<LatLng> {
        self.waypoints.iter().map(|wp| wp.position).collect()
    }
}
