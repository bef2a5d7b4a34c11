use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use evroute_core::polyline;
use evroute_core::spatial::offset_by_bearing;
use evroute_core::{
    ChargingStation, Directions, DirectionsProvider, GenerationMix, GridMixProvider, LatLng, Leg,
    LookaheadPolicy, PlacesProvider, ProviderError, RoutePlanner, RouteStep,
};
use serde_json::{json, Value};
use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;
use tower::ServiceExt;

use crate::{api, config::Config, state::AppState};

fn equator_km(km: f64) -> LatLng {
    offset_by_bearing(LatLng::new(0.0, 0.0), km * 1000.0, FRAC_PI_2)
}

struct StraightLine;

#[async_trait]
impl DirectionsProvider for StraightLine {
    async fn directions(
        &self,
        origin: LatLng,
        destination: LatLng,
    ) -> Result<Directions, ProviderError> {
        let distance_m = origin.distance_to(&destination);
        Ok(Directions {
            polyline: polyline::encode(&[origin, destination]),
            legs: vec![Leg {
                distance_m,
                steps: vec![RouteStep {
                    start: origin,
                    end: destination,
                    distance_m,
                }],
            }],
        })
    }
}

struct Unroutable;

#[async_trait]
impl DirectionsProvider for Unroutable {
    async fn directions(
        &self,
        _origin: LatLng,
        _destination: LatLng,
    ) -> Result<Directions, ProviderError> {
        Err(ProviderError::NoRoute)
    }
}

struct Stations(Vec<LatLng>);

#[async_trait]
impl PlacesProvider for Stations {
    async fn charging_stations(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<Vec<ChargingStation>, ProviderError> {
        Ok(self
            .0
            .iter()
            .filter(|position| position.distance_to(&location) <= radius_m)
            .map(|&position| ChargingStation {
                position,
                name: Some("Test Charger".into()),
                place_id: None,
            })
            .collect())
    }
}

struct GasGrid;

#[async_trait]
impl GridMixProvider for GasGrid {
    async fn generation_mix(
        &self,
        _location: LatLng,
        _radius_m: f64,
    ) -> Result<GenerationMix, ProviderError> {
        Ok(GenerationMix::from_capacities([("Gas", 100.0)]))
    }
}

fn test_config() -> Config {
    let mut config = Config::from_env();
    config.sample_interval_m = 30_000.0;
    config.station_radius_m = 10_000.0;
    config.max_replans = 25;
    config.plan_timeout_s = 0;
    config.rate_limit_enabled = false;
    config
}

fn setup_app_with(
    directions: Arc<dyn DirectionsProvider>,
    stations: &[f64],
    config: Config,
) -> axum::Router {
    let planner = RoutePlanner::new(
        directions,
        Arc::new(Stations(stations.iter().map(|&km| equator_km(km)).collect())),
        Arc::new(GasGrid),
        Arc::new(LookaheadPolicy),
        config.planner_config(),
    );
    let state = Arc::new(AppState::new(planner));
    api::routes(&config).with_state(state)
}

fn setup_app(stations: &[f64]) -> axum::Router {
    setup_app_with(Arc::new(StraightLine), stations, test_config())
}

fn point(p: LatLng) -> Value {
    json!({"lat": p.lat, "lng": p.lng})
}

/// 100 km east along the equator with 70 km of range.
fn trip_body() -> Value {
    json!({
        "battery_capacity_kwh": 15.0,
        "total_range_km": 70.0,
        "start_location": point(equator_km(0.0)),
        "end_location": point(equator_km(100.0)),
    })
}

fn plan_request(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/routes/plan")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

#[tokio::test]
async fn plans_a_route_with_one_charging_stop() {
    let app = setup_app(&[38.0]);

    let response = app.oneshot(plan_request(&trip_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;

    // Waypoints and stops are plain coordinates; details sit alongside.
    let waypoints = body["waypoints"].as_array().unwrap();
    assert_eq!(waypoints.len(), 6);
    assert_eq!(waypoints[0]["lat"].as_f64(), Some(0.0));
    assert_eq!(waypoints[0]["lng"].as_f64(), Some(0.0));
    assert!(waypoints[0].get("position").is_none());

    let stops = body["charging_stops"].as_array().unwrap();
    assert_eq!(stops.len(), 1);
    let stop_lng = stops[0]["lng"].as_f64().unwrap();
    assert!((stop_lng - equator_km(38.0).lng).abs() < 1e-4);

    let detail = body["route_detail"].as_array().unwrap();
    assert_eq!(detail.len(), 6);
    for (waypoint, record) in waypoints.iter().zip(detail) {
        assert_eq!(&record["position"], waypoint);
    }
    assert_eq!(body["stop_detail"][0]["name"], "Test Charger");
    assert_eq!(body["policy"], "lookahead");
    assert!(body["total_emissions_kg_co2"].as_f64().unwrap() > 0.0);
    assert!(!body["polyline"].as_str().unwrap().is_empty());
    assert!(body["planned_at"].is_string());
    assert!(body["warnings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn accepts_legacy_field_names_and_text_locations() {
    let app = setup_app(&[38.0]);
    let end = equator_km(100.0);
    let body = json!({
        "ev_battery_capacity": 15.0,
        "total_range_km": 150.0,
        "starting_location": "0,0",
        "destination_location": format!("{},{}", end.lat, end.lng),
    });

    let response = app.oneshot(plan_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert!(body["charging_stops"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn unparseable_location_is_bad_request() {
    let app = setup_app(&[]);
    let mut body = trip_body();
    body["start_location"] = json!("somewhere nice");

    let response = app.oneshot(plan_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "invalid_request");
    assert!(body["partial_route"]["waypoints"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn non_positive_battery_is_bad_request() {
    let app = setup_app(&[]);
    let mut body = trip_body();
    body["battery_capacity_kwh"] = json!(0.0);

    let response = app.oneshot(plan_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn out_of_range_coordinate_is_bad_request() {
    let app = setup_app(&[]);
    let mut body = trip_body();
    body["end_location"] = json!({"lat": 95.0, "lng": 0.0});

    let response = app.oneshot(plan_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(response).await["kind"], "invalid_request");
}

#[tokio::test]
async fn missing_station_returns_partial_route() {
    let app = setup_app(&[]);

    let response = app.oneshot(plan_request(&trip_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "destination_unreachable");
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("destination unreachable"));
    assert_eq!(
        body["partial_route"]["waypoints"].as_array().unwrap().len(),
        3
    );
    assert!(body["partial_route"]["waypoints"][2]["lat"].is_number());
}

#[tokio::test]
async fn unroutable_trip_is_not_found() {
    let app = setup_app_with(Arc::new(Unroutable), &[], test_config());

    let response = app.oneshot(plan_request(&trip_body())).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(response).await["kind"], "no_route_found");
}

#[tokio::test]
async fn plan_endpoint_is_rate_limited() {
    let mut config = test_config();
    config.rate_limit_enabled = true;
    config.rate_limit_rps = 1;
    let app = setup_app_with(Arc::new(StraightLine), &[38.0], config);

    let first = app
        .clone()
        .oneshot(plan_request(&trip_body()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(plan_request(&trip_body())).await.unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(read_json(second).await["kind"], "rate_limited");
}

#[tokio::test]
async fn health_reports_policy() {
    let app = setup_app(&[]);
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["policy"], "lookahead");
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let app = setup_app(&[]).layer(axum::middleware::from_fn(
        api::request_id::ensure_request_id,
    ));

    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "abc-123")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "abc-123");

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let generated = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(generated).is_ok());
}
