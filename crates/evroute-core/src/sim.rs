//! Randomized trip replays used to harvest training data for the learned policy.
//!
//! An episode drives an annotated waypoint list with the planner's arrive /
//! decide / charge cycle, flipping a seeded coin at every waypoint that has a
//! station. After a charge the vehicle drives the station route back and
//! rejoins the path at the same waypoint.

use crate::classifier::{LabelledSample, PolicyFeatures};
use crate::models::{VehicleProfile, VehicleState, Waypoint};
use crate::policy::Decision;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub episodes: usize,
    /// Chance of charging at an annotated waypoint.
    pub charge_probability: f64,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            episodes: 200,
            charge_probability: 0.3,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EpisodeOutcome {
    Completed { charges: u32, detour_m: f64 },
    Stranded { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub features: PolicyFeatures,
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub steps: Vec<Step>,
    pub outcome: EpisodeOutcome,
}

impl Episode {
    /// Training samples for this episode.
    ///
    /// Decisions of a completed trip are kept as labels. When the vehicle got
    /// stranded, the last time it passed on a station is relabelled Charge.
    pub fn labelled_samples(&self) -> Vec<LabelledSample> {
        let relabel = match self.outcome {
            EpisodeOutcome::Completed { .. } => None,
            EpisodeOutcome::Stranded { .. } => self
                .steps
                .iter()
                .rposition(|step| step.decision == Decision::Continue),
        };

        self.steps
            .iter()
            .enumerate()
            .map(|(i, step)| LabelledSample {
                features: step.features,
                label: if Some(i) == relabel {
                    Decision::Charge
                } else {
                    step.decision
                },
            })
            .collect()
    }
}

/// Replay `config.episodes` random trips over `waypoints`.
pub fn simulate_episodes(
    waypoints: &[Waypoint],
    vehicle: &VehicleProfile,
    config: &SimulationConfig,
) -> Vec<Episode> {
    let probability = if config.charge_probability.is_finite() {
        config.charge_probability.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut rng = StdRng::seed_from_u64(config.seed);
    (0..config.episodes)
        .map(|_| run_episode(waypoints, vehicle, probability, &mut rng))
        .collect()
}

/// Flatten episodes into a training set.
pub fn training_samples(episodes: &[Episode]) -> Vec<LabelledSample> {
    episodes.iter().flat_map(Episode::labelled_samples).collect()
}

fn run_episode(
    waypoints: &[Waypoint],
    vehicle: &VehicleProfile,
    charge_probability: f64,
    rng: &mut StdRng,
) -> Episode {
    let mut state = VehicleState::full(vehicle);
    let mut steps = Vec::new();
    let mut charges = 0;
    let mut detour_m = 0.0;

    for (index, waypoint) in waypoints.iter().enumerate() {
        state.consume(waypoint.distance_from_previous_m);
        if state.remaining_range_m < 0.0 {
            return Episode {
                steps,
                outcome: EpisodeOutcome::Stranded { index },
            };
        }
        if index + 1 == waypoints.len() {
            break;
        }
        let Some(station) = &waypoint.nearest_station else {
            continue;
        };

        let decision = if rng.random_bool(charge_probability) {
            Decision::Charge
        } else {
            Decision::Continue
        };
        steps.push(Step {
            index,
            features: PolicyFeatures::observe(&state, waypoint),
            decision,
        });

        if decision == Decision::Charge {
            state.consume(station.route_distance_m);
            if state.remaining_range_m < 0.0 {
                return Episode {
                    steps,
                    outcome: EpisodeOutcome::Stranded { index },
                };
            }
            state.recharge(vehicle);
            state.consume(station.route_distance_m);
            charges += 1;
            detour_m += 2.0 * station.route_distance_m;
        }
    }

    Episode {
        steps,
        outcome: EpisodeOutcome::Completed { charges, detour_m },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LatLng, StationInfo};

    fn path(hops: &[f64], station_every: usize) -> Vec<Waypoint> {
        hops.iter()
            .enumerate()
            .map(|(i, &d)| {
                let wp = Waypoint::new(LatLng::new(0.0, i as f64 * 0.1), d);
                if i % station_every == 0 {
                    let position = wp.position;
                    wp.with_station(StationInfo {
                        position,
                        name: None,
                        route_distance_m: 1_000.0,
                        route_steps: Vec::new(),
                    })
                } else {
                    wp
                }
            })
            .collect()
    }

    #[test]
    fn same_seed_same_episodes() {
        let vehicle = VehicleProfile::new(40_000.0, 0.15).unwrap();
        let waypoints = path(&[0.0, 15_000.0, 15_000.0, 15_000.0, 15_000.0], 1);
        let config = SimulationConfig {
            episodes: 20,
            charge_probability: 0.5,
            seed: 42,
        };
        assert_eq!(
            simulate_episodes(&waypoints, &vehicle, &config),
            simulate_episodes(&waypoints, &vehicle, &config)
        );
    }

    #[test]
    fn never_charging_strands_on_long_trip() {
        let vehicle = VehicleProfile::new(40_000.0, 0.15).unwrap();
        let waypoints = path(&[0.0, 15_000.0, 15_000.0, 15_000.0, 15_000.0], 1);
        let config = SimulationConfig {
            episodes: 1,
            charge_probability: 0.0,
            seed: 1,
        };
        let episodes = simulate_episodes(&waypoints, &vehicle, &config);
        assert_eq!(episodes[0].outcome, EpisodeOutcome::Stranded { index: 3 });

        let samples = episodes[0].labelled_samples();
        // Decisions at waypoints 0, 1, 2; the last pass is relabelled.
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0].label, Decision::Continue);
        assert_eq!(samples[1].label, Decision::Continue);
        assert_eq!(samples[2].label, Decision::Charge);
    }

    #[test]
    fn always_charging_completes_and_tracks_detours() {
        let vehicle = VehicleProfile::new(40_000.0, 0.15).unwrap();
        let waypoints = path(&[0.0, 15_000.0, 15_000.0, 15_000.0, 15_000.0], 1);
        let config = SimulationConfig {
            episodes: 1,
            charge_probability: 1.0,
            seed: 1,
        };
        let episode = &simulate_episodes(&waypoints, &vehicle, &config)[0];
        assert_eq!(
            episode.outcome,
            EpisodeOutcome::Completed {
                charges: 4,
                detour_m: 8_000.0
            }
        );
        assert!(episode
            .labelled_samples()
            .iter()
            .all(|s| s.label == Decision::Charge));
    }

    #[test]
    fn only_annotated_waypoints_produce_samples() {
        let vehicle = VehicleProfile::new(100_000.0, 0.15).unwrap();
        let waypoints = path(&[0.0, 10_000.0, 10_000.0, 10_000.0, 10_000.0], 2);
        let config = SimulationConfig {
            episodes: 3,
            charge_probability: 0.5,
            seed: 9,
        };
        for episode in simulate_episodes(&waypoints, &vehicle, &config) {
            assert!(episode.steps.iter().all(|s| s.index % 2 == 0 && s.index < 4));
        }
    }

    #[test]
    fn missing_station_feature_uses_sentinel() {
        let mut state = VehicleState::full(&VehicleProfile::new(1.0, 1.0).unwrap());
        state.consume(0.5);
        let features = PolicyFeatures::observe(&state, &Waypoint::new(LatLng::new(0.0, 0.0), 0.0));
        assert_eq!(
            features.station_distance_m,
            crate::classifier::NO_STATION_SENTINEL_M
        );
    }
}
