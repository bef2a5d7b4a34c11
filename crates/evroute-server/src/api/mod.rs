//! API routes for the route planning server.

pub mod rate_limit;
pub mod request_id;
mod routes;

pub use routes::{LocationInput, PlanRouteRequest, PlanRouteResponse, RouteBody};

use crate::config::Config;
use axum::Router;

pub fn routes(config: &Config) -> Router<std::sync::Arc<crate::state::AppState>> {
    routes::create_router(config)
}

#[cfg(test)]
mod tests;
