pub mod annotator;
pub mod classifier;
pub mod emissions;
pub mod error;
pub mod models;
pub mod planner;
pub mod policy;
pub mod polyline;
pub mod providers;
pub mod sampler;
pub mod sim;
pub mod spatial;

pub use annotator::{AnnotatorConfig, StationAnnotator, StationSelection};
pub use classifier::{LabelledSample, LearnedPolicy, ModelError, PolicyFeatures, TrainingConfig};
pub use emissions::{EmissionsLedger, GenerationMix};
pub use error::{PlanError, PlanErrorKind};
pub use models::{
    ChargingStop, CommittedWaypoint, LatLng, RouteSegment, RouteStep, StationInfo,
    VehicleError, VehicleProfile, VehicleState, Waypoint, WaypointKind,
};
pub use planner::{PlanOutcome, PlanRequest, PlannerConfig, RoutePlanner};
pub use policy::{ChargeDecisionPolicy, Decision, LookaheadPolicy, PolicyKind};
pub use providers::{
    ChargingStation, Directions, DirectionsProvider, GridMixProvider, Leg, PlacesProvider,
    ProviderError,
};
pub use sampler::PathSampler;
pub use sim::{simulate_episodes, training_samples, Episode, EpisodeOutcome, SimulationConfig};
pub use spatial::haversine_distance;
