//! Planning failures.

use crate::models::LatLng;
use crate::planner::PlanOutcome;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanErrorKind {
    #[error("no route found from {origin} to {destination}")]
    NoRouteFound { origin: LatLng, destination: LatLng },
    /// A charge is required but no station is reachable from here.
    #[error("destination unreachable: no charging station available near {position}")]
    StationUnavailable { position: LatLng },
    #[error("vehicle stranded near {position}, short by {deficit_m:.0} m")]
    Stranded { position: LatLng, deficit_m: f64 },
    #[error("replan limit of {limit} exceeded")]
    ReplanLimitExceeded { limit: u32 },
    #[error("external service error: {0}")]
    ExternalService(String),
    #[error("planning cancelled")]
    Cancelled,
    #[error("planning deadline exceeded")]
    DeadlineExceeded,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PlanErrorKind {
    /// Stable machine-readable name.
    pub fn code(&self) -> &'static str {
        match self {
            PlanErrorKind::NoRouteFound { .. } => "no_route_found",
            PlanErrorKind::StationUnavailable { .. } => "destination_unreachable",
            PlanErrorKind::Stranded { .. } => "stranded",
            PlanErrorKind::ReplanLimitExceeded { .. } => "replan_limit_exceeded",
            PlanErrorKind::ExternalService(_) => "external_service",
            PlanErrorKind::Cancelled => "cancelled",
            PlanErrorKind::DeadlineExceeded => "deadline_exceeded",
            PlanErrorKind::InvalidRequest(_) => "invalid_request",
        }
    }
}

/// A failed plan together with whatever route had been committed.
#[derive(Debug, Clone, Error)]
#[error("{kind}")]
pub struct PlanError {
    pub kind: PlanErrorKind,
    pub partial: Box<PlanOutcome>,
}

impl PlanError {
    pub fn new(kind: PlanErrorKind, partial: PlanOutcome) -> Self {
        Self {
            kind,
            partial: Box::new(partial),
        }
    }

    pub fn without_progress(kind: PlanErrorKind) -> Self {
        Self::new(kind, PlanOutcome::default())
    }
}
