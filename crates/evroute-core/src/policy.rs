//! Charge decision policies.
//!
//! A policy answers one question at each waypoint: keep driving, or divert to
//! the waypoint's charging station now. The planner owns everything else
//! (station reachability, splicing, range bookkeeping).

use crate::classifier::{LearnedPolicy, ModelError};
use crate::models::{VehicleProfile, VehicleState, Waypoint};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Continue,
    Charge,
}

pub trait ChargeDecisionPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decide at `waypoints[index]`, with `state` reflecting arrival there.
    fn decide(
        &self,
        vehicle: &VehicleProfile,
        state: &VehicleState,
        waypoints: &[Waypoint],
        index: usize,
    ) -> Decision;
}

/// Which policy implementation a planner should use.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PolicyKind {
    #[default]
    Lookahead,
    Learned {
        model_path: PathBuf,
    },
}

impl PolicyKind {
    /// Instantiate the policy, loading the model file for `Learned`.
    pub fn build(&self) -> Result<Arc<dyn ChargeDecisionPolicy>, ModelError> {
        match self {
            PolicyKind::Lookahead => Ok(Arc::new(LookaheadPolicy)),
            PolicyKind::Learned { model_path } => {
                Ok(Arc::new(LearnedPolicy::load(model_path)?))
            }
        }
    }
}

/// Greedy lookahead: charge here if continuing would leave the next charging
/// opportunity out of range.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookaheadPolicy;

impl LookaheadPolicy {
    /// Distance driven since the last charge once the next charging
    /// opportunity after `index` is reached. Without an annotated waypoint
    /// ahead the destination counts as that opportunity.
    pub fn projected_distance_m(
        vehicle: &VehicleProfile,
        state: &VehicleState,
        waypoints: &[Waypoint],
        index: usize,
    ) -> f64 {
        let mut projected = state.consumed_m(vehicle);
        for waypoint in waypoints.iter().skip(index + 1) {
            projected += waypoint.distance_from_previous_m;
            if let Some(station) = &waypoint.nearest_station {
                return projected + station.route_distance_m;
            }
        }
        projected
    }
}

impl ChargeDecisionPolicy for LookaheadPolicy {
    fn name(&self) -> &'static str {
        "lookahead"
    }

    fn decide(
        &self,
        vehicle: &VehicleProfile,
        state: &VehicleState,
        waypoints: &[Waypoint],
        index: usize,
    ) -> Decision {
        let Some(current) = waypoints.get(index) else {
            return Decision::Continue;
        };
        if !current.has_station() {
            return Decision::Continue;
        }

        let projected = Self::projected_distance_m(vehicle, state, waypoints, index);
        if projected > vehicle.range_capacity_m() {
            Decision::Charge
        } else {
            Decision::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LatLng, StationInfo};

    fn station(route_distance_m: f64) -> StationInfo {
        StationInfo {
            position: LatLng::new(0.0, 0.0),
            name: None,
            route_distance_m,
            route_steps: Vec::new(),
        }
    }

    fn waypoint(distance: f64, station_distance: Option<f64>) -> Waypoint {
        let wp = Waypoint::new(LatLng::new(0.0, 0.0), distance);
        match station_distance {
            Some(d) => wp.with_station(station(d)),
            None => wp,
        }
    }

    fn arrived(vehicle: &VehicleProfile, consumed: f64) -> VehicleState {
        let mut state = VehicleState::full(vehicle);
        state.consume(consumed);
        state
    }

    #[test]
    fn continues_without_station_at_current_waypoint() {
        let vehicle = VehicleProfile::new(10_000.0, 0.15).unwrap();
        let waypoints = vec![waypoint(0.0, None), waypoint(50_000.0, Some(1.0))];
        let state = arrived(&vehicle, 9_000.0);
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &state, &waypoints, 0),
            Decision::Continue
        );
    }

    #[test]
    fn charges_when_next_station_out_of_range() {
        let vehicle = VehicleProfile::new(50_000.0, 0.15).unwrap();
        // consumed 20 km, next annotated waypoint 25 km + 10 km more, station detour 6 km.
        let waypoints = vec![
            waypoint(0.0, Some(1_000.0)),
            waypoint(25_000.0, None),
            waypoint(10_000.0, Some(6_000.0)),
        ];
        let state = arrived(&vehicle, 20_000.0);
        assert_eq!(
            LookaheadPolicy::projected_distance_m(&vehicle, &state, &waypoints, 0),
            61_000.0
        );
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &state, &waypoints, 0),
            Decision::Charge
        );
    }

    #[test]
    fn exactly_at_capacity_continues() {
        let vehicle = VehicleProfile::new(50_000.0, 0.15).unwrap();
        let waypoints = vec![
            waypoint(0.0, Some(1_000.0)),
            waypoint(20_000.0, Some(5_000.0)),
        ];
        let state = arrived(&vehicle, 25_000.0);
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &state, &waypoints, 0),
            Decision::Continue
        );

        let state = arrived(&vehicle, 25_000.5);
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &state, &waypoints, 0),
            Decision::Charge
        );
    }

    #[test]
    fn stops_at_first_annotated_waypoint() {
        let vehicle = VehicleProfile::new(50_000.0, 0.15).unwrap();
        let waypoints = vec![
            waypoint(0.0, Some(1_000.0)),
            waypoint(10_000.0, Some(2_000.0)),
            waypoint(90_000.0, Some(2_000.0)),
        ];
        let state = arrived(&vehicle, 0.0);
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &state, &waypoints, 0),
            Decision::Continue
        );
    }

    #[test]
    fn destination_counts_when_nothing_annotated_ahead() {
        let vehicle = VehicleProfile::new(50_000.0, 0.15).unwrap();
        let waypoints = vec![
            waypoint(0.0, Some(1_000.0)),
            waypoint(30_000.0, None),
            waypoint(10_000.0, None),
        ];
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &arrived(&vehicle, 5_000.0), &waypoints, 0),
            Decision::Continue
        );
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &arrived(&vehicle, 15_000.0), &waypoints, 0),
            Decision::Charge
        );
    }

    #[test]
    fn builds_lookahead_by_default() {
        let policy = PolicyKind::default().build().unwrap();
        assert_eq!(policy.name(), "lookahead");
    }

    #[test]
    fn missing_model_file_is_an_error() {
        let kind = PolicyKind::Learned {
            model_path: PathBuf::from("/nonexistent/evroute-policy.json"),
        };
        assert!(matches!(kind.build(), Err(ModelError::Io(_))));
    }

    #[test]
    fn out_of_bounds_index_continues() {
        let vehicle = VehicleProfile::new(50_000.0, 0.15).unwrap();
        let state = VehicleState::full(&vehicle);
        assert_eq!(
            LookaheadPolicy.decide(&vehicle, &state, &[], 3),
            Decision::Continue
        );
    }
}
