//! Route assembly: drive sampled waypoints, divert to chargers, replan.
//!
//! The planner is a small state machine. `Advancing` fetches and annotates a
//! fresh path from the current origin and walks it until the policy (or the
//! next hop) demands a charge; `Charging` splices the station detour into the
//! committed route and restarts from the station; `Done` settles the last
//! emissions and returns.

use crate::annotator::{AnnotatorConfig, StationAnnotator};
use crate::emissions::{kg_co2_per_meter, EmissionsLedger, DEFAULT_GRID_RADIUS_M};
use crate::error::{PlanError, PlanErrorKind};
use crate::models::{
    ChargingStop, CommittedWaypoint, LatLng, RouteSegment, VehicleProfile, VehicleState,
    Waypoint, WaypointKind,
};
use crate::policy::{ChargeDecisionPolicy, Decision};
use crate::polyline;
use crate::providers::{DirectionsProvider, GridMixProvider, PlacesProvider, ProviderError};
use crate::sampler::{PathSampler, DEFAULT_INTERVAL_M};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MAX_REPLANS: u32 = 25;
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(120);

/// A waypoint this close to the last committed one (with nothing driven in
/// between) is the same place.
const DUPLICATE_TOLERANCE_M: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlannerConfig {
    pub sample_interval_m: f64,
    pub annotator: AnnotatorConfig,
    pub grid_radius_m: f64,
    pub max_replans: u32,
    /// Wall-clock budget for one plan, unlimited when `None`.
    pub deadline: Option<Duration>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            sample_interval_m: DEFAULT_INTERVAL_M,
            annotator: AnnotatorConfig::default(),
            grid_radius_m: DEFAULT_GRID_RADIUS_M,
            max_replans: DEFAULT_MAX_REPLANS,
            deadline: Some(DEFAULT_DEADLINE),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanRequest {
    pub origin: LatLng,
    pub destination: LatLng,
    pub vehicle: VehicleProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub route: RouteSegment,
    pub emissions: EmissionsLedger,
    pub replans: u32,
    pub warnings: Vec<String>,
}

impl PlanOutcome {
    pub fn total_emissions_kg_co2(&self) -> f64 {
        self.emissions.total_kg_co2
    }

    /// Committed route as an encoded polyline.
    pub fn encoded_polyline(&self) -> String {
        polyline::encode(&self.route.positions())
    }
}

pub struct RoutePlanner {
    directions: Arc<dyn DirectionsProvider>,
    grid: Arc<dyn GridMixProvider>,
    annotator: StationAnnotator,
    sampler: PathSampler,
    policy: Arc<dyn ChargeDecisionPolicy>,
    config: PlannerConfig,
}

impl RoutePlanner {
    pub fn new(
        directions: Arc<dyn DirectionsProvider>,
        places: Arc<dyn PlacesProvider>,
        grid: Arc<dyn GridMixProvider>,
        policy: Arc<dyn ChargeDecisionPolicy>,
        config: PlannerConfig,
    ) -> Self {
        Self {
            annotator: StationAnnotator::new(places, directions.clone(), config.annotator),
            sampler: PathSampler::new(config.sample_interval_m),
            directions,
            grid,
            policy,
            config,
        }
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Plan a trip with charging stops.
    ///
    /// On failure the error carries everything committed up to that point.
    pub async fn plan(
        &self,
        request: &PlanRequest,
        cancel: &CancellationToken,
    ) -> Result<PlanOutcome, PlanError> {
        for (label, point) in [("origin", request.origin), ("destination", request.destination)] {
            if !point.is_valid() {
                return Err(PlanError::without_progress(PlanErrorKind::InvalidRequest(
                    format!("{label} {point} is not a valid coordinate"),
                )));
            }
        }

        tracing::info!(
            origin = %request.origin,
            destination = %request.destination,
            range_m = request.vehicle.range_capacity_m(),
            policy = self.policy.name(),
            "planning route"
        );

        let mut run = Run {
            planner: self,
            request,
            cancel,
            deadline: self.config.deadline.map(|budget| Instant::now() + budget),
            state: VehicleState::full(&request.vehicle),
            outcome: PlanOutcome::default(),
        };

        match run.run().await {
            Ok(()) => {
                tracing::info!(
                    waypoints = run.outcome.route.waypoints.len(),
                    stops = run.outcome.route.charging_stops.len(),
                    kg_co2 = run.outcome.emissions.total_kg_co2,
                    "route planned"
                );
                Ok(run.outcome)
            }
            Err(kind) => {
                tracing::warn!(error = %kind, replans = run.outcome.replans, "planning failed");
                Err(PlanError::new(kind, run.outcome))
            }
        }
    }
}

enum Phase {
    Advancing { origin: LatLng },
    Charging { at: Waypoint },
    Done { at: LatLng },
}

/// Mutable state of one planning run.
struct Run<'a> {
    planner: &'a RoutePlanner,
    request: &'a PlanRequest,
    cancel: &'a CancellationToken,
    deadline: Option<Instant>,
    state: VehicleState,
    outcome: PlanOutcome,
}

impl Run<'_> {
    async fn run(&mut self) -> Result<(), PlanErrorKind> {
        let mut phase = Phase::Advancing {
            origin: self.request.origin,
        };
        loop {
            self.check_interrupted()?;
            phase = match phase {
                Phase::Advancing { origin } => self.advance(origin).await?,
                Phase::Charging { at } => self.charge(at).await?,
                Phase::Done { at } => {
                    self.flush_emissions(at).await?;
                    return Ok(());
                }
            };
        }
    }

    async fn advance(&mut self, origin: LatLng) -> Result<Phase, PlanErrorKind> {
        let destination = self.request.destination;
        let directions = guarded(
            self.cancel,
            self.deadline,
            self.planner.directions.directions(origin, destination),
        )
        .await?
        .map_err(|err| match err {
            ProviderError::NoRoute => PlanErrorKind::NoRouteFound {
                origin,
                destination,
            },
            other => external(other),
        })?;

        let path = directions.path().map_err(|err| external(err.into()))?;
        let sampled = self.planner.sampler.waypoints(&path);
        let waypoints = guarded(
            self.cancel,
            self.deadline,
            self.planner.annotator.annotate(sampled, destination),
        )
        .await?
        .map_err(external)?;

        tracing::debug!(
            %origin,
            waypoints = waypoints.len(),
            annotated = waypoints.iter().filter(|wp| wp.has_station()).count(),
            "sampled path"
        );

        let request = self.request;
        let vehicle = &request.vehicle;
        for (index, waypoint) in waypoints.iter().enumerate() {
            self.arrive(
                waypoint.position,
                waypoint.distance_from_previous_m,
                WaypointKind::Sampled,
            )?;

            let Some(next) = waypoints.get(index + 1) else {
                return Ok(Phase::Done {
                    at: waypoint.position,
                });
            };

            let decision = self
                .planner
                .policy
                .decide(vehicle, &self.state, &waypoints, index);
            let full = self.state.is_full(vehicle);
            tracing::debug!(
                index,
                position = %waypoint.position,
                remaining_m = self.state.remaining_range_m,
                ?decision,
                "policy decision"
            );

            if decision == Decision::Charge && !full {
                return Ok(Phase::Charging {
                    at: waypoint.clone(),
                });
            }

            // Charging at full range cannot help; the next arrival strands.
            if !full && next.distance_from_previous_m > self.state.remaining_range_m {
                if !waypoint.has_station() {
                    return Err(PlanErrorKind::StationUnavailable {
                        position: waypoint.position,
                    });
                }
                tracing::debug!(index, "next hop out of range, charging here");
                return Ok(Phase::Charging {
                    at: waypoint.clone(),
                });
            }
        }

        Err(PlanErrorKind::ExternalService(format!(
            "directions from {origin} to {destination} returned an empty path"
        )))
    }

    async fn charge(&mut self, at: Waypoint) -> Result<Phase, PlanErrorKind> {
        let Some(station) = at.nearest_station else {
            return Err(PlanErrorKind::StationUnavailable {
                position: at.position,
            });
        };
        let remaining = self.state.remaining_range_m;
        if station.route_distance_m > remaining {
            return Err(PlanErrorKind::Stranded {
                position: at.position,
                deficit_m: station.route_distance_m - remaining,
            });
        }

        let detour_m = if station.route_steps.is_empty() {
            self.arrive(station.position, station.route_distance_m, WaypointKind::Detour)?;
            station.route_distance_m
        } else {
            for step in &station.route_steps {
                self.arrive(step.end, step.distance_m, WaypointKind::Detour)?;
            }
            station.route_steps.iter().map(|step| step.distance_m).sum()
        };

        self.flush_emissions(at.position).await?;

        let resume_at = station.arrival_position();
        self.outcome.route.charging_stops.push(ChargingStop {
            position: resume_at,
            name: station.name.clone(),
            detour_distance_m: detour_m,
            arrival_range_m: self.state.remaining_range_m,
        });
        self.state.recharge(&self.request.vehicle);
        self.outcome.replans += 1;

        tracing::info!(
            station = %resume_at,
            name = station.name.as_deref().unwrap_or("unnamed"),
            detour_m,
            replans = self.outcome.replans,
            "charging stop"
        );

        let limit = self.planner.config.max_replans;
        if self.outcome.replans > limit {
            return Err(PlanErrorKind::ReplanLimitExceeded { limit });
        }

        Ok(Phase::Advancing { origin: resume_at })
    }

    /// Drive `distance_m` to `position` and commit it.
    fn arrive(
        &mut self,
        position: LatLng,
        distance_m: f64,
        kind: WaypointKind,
    ) -> Result<(), PlanErrorKind> {
        self.state.consume(distance_m);
        self.outcome.emissions.add_distance(distance_m);
        if self.state.remaining_range_m < 0.0 {
            return Err(PlanErrorKind::Stranded {
                position,
                deficit_m: -self.state.remaining_range_m,
            });
        }

        let route = &mut self.outcome.route;
        let duplicate = distance_m <= 0.0
            && route
                .last_position()
                .is_some_and(|last| last.distance_to(&position) < DUPLICATE_TOLERANCE_M);
        if !duplicate {
            route.waypoints.push(CommittedWaypoint {
                position,
                distance_from_previous_m: distance_m.max(0.0),
                remaining_range_m: self.state.remaining_range_m,
                kind,
            });
        }
        Ok(())
    }

    /// Charge the distance driven since the last flush at `at`'s grid mix.
    async fn flush_emissions(&mut self, at: LatLng) -> Result<(), PlanErrorKind> {
        let distance_m = self.outcome.emissions.take_uncharged();
        if distance_m <= 0.0 {
            return Ok(());
        }

        let radius_m = self.planner.config.grid_radius_m;
        let mix = guarded(
            self.cancel,
            self.deadline,
            self.planner.grid.generation_mix(at, radius_m),
        )
        .await?
        .map_err(external)?;

        match mix.emission_factor_kg_per_mwh() {
            Some(factor) => {
                let per_m = kg_co2_per_meter(factor, self.request.vehicle.efficiency_wh_per_m());
                self.outcome.emissions.record(per_m * distance_m);
            }
            None => {
                tracing::warn!(
                    location = %at,
                    radius_m,
                    distance_m,
                    "no generation capacity near location, counting zero emissions"
                );
                self.outcome.warnings.push(format!(
                    "no generation data within {radius_m:.0} m of {at}; \
                     {distance_m:.0} m counted as zero emissions"
                ));
            }
        }
        Ok(())
    }

    fn check_interrupted(&self) -> Result<(), PlanErrorKind> {
        if self.cancel.is_cancelled() {
            return Err(PlanErrorKind::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(PlanErrorKind::DeadlineExceeded);
        }
        Ok(())
    }
}

/// Await `fut` unless the run is cancelled or out of time first.
async fn guarded<F: Future>(
    cancel: &CancellationToken,
    deadline: Option<Instant>,
    fut: F,
) -> Result<F::Output, PlanErrorKind> {
    let expiry = async {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlanErrorKind::Cancelled),
        _ = expiry => Err(PlanErrorKind::DeadlineExceeded),
        out = fut => Ok(out),
    }
}

fn external(err: ProviderError) -> PlanErrorKind {
    PlanErrorKind::ExternalService(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emissions::GenerationMix;
    use crate::policy::LookaheadPolicy;
    use crate::providers::{ChargingStation, Directions, Leg};
    use async_trait::async_trait;

    struct Unroutable;

    #[async_trait]
    impl DirectionsProvider for Unroutable {
        async fn directions(&self, _: LatLng, _: LatLng) -> Result<Directions, ProviderError> {
            Err(ProviderError::NoRoute)
        }
    }

    struct Hanging;

    #[async_trait]
    impl DirectionsProvider for Hanging {
        async fn directions(&self, _: LatLng, _: LatLng) -> Result<Directions, ProviderError> {
            std::future::pending().await
        }
    }

    struct SinglePoint;

    #[async_trait]
    impl DirectionsProvider for SinglePoint {
        async fn directions(
            &self,
            origin: LatLng,
            _: LatLng,
        ) -> Result<Directions, ProviderError> {
            Ok(Directions {
                polyline: polyline::encode(&[origin]),
                legs: vec![Leg {
                    distance_m: 0.0,
                    steps: Vec::new(),
                }],
            })
        }
    }

    struct NoPlaces;

    #[async_trait]
    impl PlacesProvider for NoPlaces {
        async fn charging_stations(
            &self,
            _: LatLng,
            _: f64,
        ) -> Result<Vec<ChargingStation>, ProviderError> {
            Ok(Vec::new())
        }
    }

    struct EmptyGrid;

    #[async_trait]
    impl GridMixProvider for EmptyGrid {
        async fn generation_mix(&self, _: LatLng, _: f64) -> Result<GenerationMix, ProviderError> {
            Ok(GenerationMix::new())
        }
    }

    fn planner(directions: Arc<dyn DirectionsProvider>, deadline: Option<Duration>) -> RoutePlanner {
        RoutePlanner::new(
            directions,
            Arc::new(NoPlaces),
            Arc::new(EmptyGrid),
            Arc::new(LookaheadPolicy),
            PlannerConfig {
                deadline,
                ..PlannerConfig::default()
            },
        )
    }

    fn request() -> PlanRequest {
        PlanRequest {
            origin: LatLng::new(0.0, 0.0),
            destination: LatLng::new(0.0, 0.5),
            vehicle: VehicleProfile::new(100_000.0, 0.15).unwrap(),
        }
    }

    #[tokio::test]
    async fn rejects_invalid_coordinates() {
        let planner = planner(Arc::new(Unroutable), None);
        let mut req = request();
        req.destination = LatLng::new(91.0, 0.0);
        let err = planner
            .plan(&req, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err.kind, PlanErrorKind::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn no_route_is_reported_with_endpoints() {
        let planner = planner(Arc::new(Unroutable), None);
        let err = planner
            .plan(&request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err.kind,
            PlanErrorKind::NoRouteFound {
                origin: request().origin,
                destination: request().destination,
            }
        );
        assert!(err.partial.route.waypoints.is_empty());
    }

    #[tokio::test]
    async fn cancelled_token_stops_planning() {
        let planner = planner(Arc::new(Hanging), None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = planner.plan(&request(), &cancel).await.unwrap_err();
        assert_eq!(err.kind, PlanErrorKind::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_slow_providers() {
        let planner = planner(Arc::new(Hanging), Some(Duration::from_secs(5)));
        let err = planner
            .plan(&request(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, PlanErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn degenerate_trip_commits_single_waypoint() {
        let planner = planner(Arc::new(SinglePoint), None);
        let mut req = request();
        req.destination = req.origin;
        let outcome = planner.plan(&req, &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.route.waypoints.len(), 1);
        assert_eq!(outcome.total_emissions_kg_co2(), 0.0);
        assert!(outcome.warnings.is_empty());
    }
}
