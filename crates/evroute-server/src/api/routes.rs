//! REST API routes.

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use evroute_core::{
    ChargingStop, CommittedWaypoint, LatLng, PlanError, PlanErrorKind, PlanOutcome, PlanRequest,
    VehicleProfile,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::api::rate_limit::{self, RateLimiter};
use crate::config::Config;
use crate::state::AppState;

/// Create the API router.
pub fn create_router(config: &Config) -> Router<Arc<AppState>> {
    let plan_limiter = RateLimiter::new(
        config.rate_limit_rps,
        config.rate_limit_enabled,
        config.trust_proxy,
    );

    // Each plan fans out into many Maps calls
    let plan_routes = Router::new()
        .route("/v1/routes/plan", post(plan_route))
        .layer(middleware::from_fn_with_state(
            plan_limiter,
            rate_limit::rate_limit,
        ));

    Router::new()
        .route("/health", get(health))
        .merge(plan_routes)
}

/// A location given as `{"lat": .., "lng": ..}` or as a `"lat,lng"` string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LocationInput {
    Point(LatLng),
    Text(String),
}

impl LocationInput {
    fn resolve(&self, field: &str) -> Result<LatLng, String> {
        match self {
            LocationInput::Point(point) => Ok(*point),
            LocationInput::Text(text) => parse_lat_lng(text).ok_or_else(|| {
                format!("{field} must be an object with lat/lng or a \"lat,lng\" string")
            }),
        }
    }
}

fn parse_lat_lng(text: &str) -> Option<LatLng> {
    let (lat, lng) = text.split_once(',')?;
    Some(LatLng::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?))
}

#[derive(Debug, Deserialize)]
pub struct PlanRouteRequest {
    #[serde(alias = "ev_battery_capacity")]
    pub battery_capacity_kwh: f64,
    #[serde(default)]
    pub total_range_km: Option<f64>,
    #[serde(alias = "starting_location")]
    pub start_location: LocationInput,
    #[serde(alias = "destination_location")]
    pub end_location: LocationInput,
}

/// Route geometry as plain coordinates, with per-point records alongside.
#[derive(Debug, Serialize)]
pub struct RouteBody {
    pub waypoints: Vec<LatLng>,
    /// Where the vehicle charges, in driving order.
    pub charging_stops: Vec<LatLng>,
    pub total_emissions_kg_co2: f64,
    pub total_distance_m: f64,
    /// Distance and remaining range at each entry of `waypoints`.
    pub route_detail: Vec<CommittedWaypoint>,
    pub stop_detail: Vec<ChargingStop>,
}

#[derive(Debug, Serialize)]
pub struct PlanRouteResponse {
    #[serde(flatten)]
    pub route: RouteBody,
    /// Encoded polyline of the committed route.
    pub polyline: String,
    pub replans: u32,
    pub policy: &'static str,
    pub warnings: Vec<String>,
    pub planned_at: DateTime<Utc>,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

impl From<&PlanOutcome> for RouteBody {
    fn from(outcome: &PlanOutcome) -> Self {
        let route = &outcome.route;
        Self {
            waypoints: route.positions(),
            charging_stops: route.charging_stops.iter().map(|stop| stop.position).collect(),
            total_emissions_kg_co2: round3(outcome.total_emissions_kg_co2()),
            total_distance_m: round3(route.total_distance_m()),
            route_detail: route.waypoints.clone(),
            stop_detail: route.charging_stops.clone(),
        }
    }
}

impl PlanRouteResponse {
    fn from_outcome(outcome: PlanOutcome, policy: &'static str) -> Self {
        Self {
            route: RouteBody::from(&outcome),
            polyline: outcome.encoded_polyline(),
            replans: outcome.replans,
            policy,
            warnings: outcome.warnings,
            planned_at: Utc::now(),
        }
    }
}

fn status_for(kind: &PlanErrorKind) -> StatusCode {
    match kind {
        PlanErrorKind::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        PlanErrorKind::NoRouteFound { .. } => StatusCode::NOT_FOUND,
        PlanErrorKind::StationUnavailable { .. }
        | PlanErrorKind::Stranded { .. }
        | PlanErrorKind::ReplanLimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        PlanErrorKind::ExternalService(_) => StatusCode::BAD_GATEWAY,
        PlanErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        PlanErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn plan_error_response(err: PlanError) -> Response {
    let status = status_for(&err.kind);
    let partial = RouteBody::from(err.partial.as_ref());
    (
        status,
        Json(json!({
            "error": err.kind.to_string(),
            "kind": err.kind.code(),
            "partial_route": partial,
        })),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    plan_error_response(PlanError::without_progress(PlanErrorKind::InvalidRequest(
        message,
    )))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "policy": state.planner().policy_name(),
    }))
}

async fn plan_route(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PlanRouteRequest>,
) -> Response {
    let origin = match payload.start_location.resolve("start_location") {
        Ok(point) => point,
        Err(message) => return bad_request(message),
    };
    let destination = match payload.end_location.resolve("end_location") {
        Ok(point) => point,
        Err(message) => return bad_request(message),
    };
    let vehicle =
        match VehicleProfile::from_battery(payload.battery_capacity_kwh, payload.total_range_km) {
            Ok(vehicle) => vehicle,
            Err(err) => return bad_request(err.to_string()),
        };

    let request = PlanRequest {
        origin,
        destination,
        vehicle,
    };
    let cancel = state.shutdown_token().child_token();
    let planner = state.planner();

    match planner.plan(&request, &cancel).await {
        Ok(outcome) => {
            Json(PlanRouteResponse::from_outcome(outcome, planner.policy_name())).into_response()
        }
        Err(err) => plan_error_response(err),
    }
}
