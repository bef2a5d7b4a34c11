//! Per-client rate limiting for the planning endpoint.
//!
//! A plan fans out into dozens of Maps calls, so clients are held to a small
//! number of plans per second.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct RateLimiter {
    hits: Arc<DashMap<String, Vec<Instant>>>,
    last_sweep: Arc<Mutex<Instant>>,
    max_per_window: u32,
    enabled: bool,
    trust_proxy: bool,
}

impl RateLimiter {
    pub fn new(max_rps: u32, enabled: bool, trust_proxy: bool) -> Self {
        Self {
            hits: Arc::new(DashMap::new()),
            last_sweep: Arc::new(Mutex::new(Instant::now())),
            max_per_window: max_rps.max(1),
            enabled,
            trust_proxy,
        }
    }

    /// Record a request from `client`; false when it is over the limit.
    pub fn allow(&self, client: &str) -> bool {
        if !self.enabled {
            return true;
        }

        let now = Instant::now();
        if self.sweep_due(now) {
            self.hits
                .retain(|_, stamps| stamps.iter().any(|t| now.duration_since(*t) < WINDOW));
        }

        let mut entry = self.hits.entry(client.to_string()).or_default();
        let stamps = entry.value_mut();
        stamps.retain(|t| now.duration_since(*t) < WINDOW);
        if stamps.len() < self.max_per_window as usize {
            stamps.push(now);
            true
        } else {
            false
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }

    fn sweep_due(&self, now: Instant) -> bool {
        let mut last = self
            .last_sweep
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if now.duration_since(*last) >= SWEEP_INTERVAL {
            *last = now;
            true
        } else {
            false
        }
    }

    fn client_key(&self, request: &Request) -> String {
        let forwarded = if self.trust_proxy {
            request
                .headers()
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.split(',').next())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        } else {
            None
        };
        forwarded
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip().to_string())
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = limiter.client_key(&request);
    if limiter.allow(&client) {
        return next.run(request).await;
    }

    tracing::warn!(%client, "plan rate limit exceeded");
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": "Rate limit exceeded",
            "kind": "rate_limited",
            "retry_after": "1 second"
        })),
    )
        .into_response()
}
