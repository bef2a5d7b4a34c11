//! Google Directions and Places HTTP client.

use async_trait::async_trait;
use evroute_core::{
    ChargingStation, Directions, DirectionsProvider, LatLng, Leg, PlacesProvider, ProviderError,
    RouteStep,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";
const CHARGING_STATION_TYPE: &str = "electric_vehicle_charging_station";

#[derive(Clone)]
pub struct GoogleMapsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<RouteDto>,
}

#[derive(Debug, Deserialize)]
struct RouteDto {
    overview_polyline: PolylineDto,
    #[serde(default)]
    legs: Vec<LegDto>,
}

#[derive(Debug, Deserialize)]
struct PolylineDto {
    points: String,
}

#[derive(Debug, Deserialize)]
struct LegDto {
    distance: ValueDto,
    #[serde(default)]
    steps: Vec<StepDto>,
}

#[derive(Debug, Deserialize)]
struct StepDto {
    start_location: LatLng,
    end_location: LatLng,
    distance: ValueDto,
}

#[derive(Debug, Deserialize)]
struct ValueDto {
    value: f64,
}

#[derive(Debug, Deserialize)]
struct PlacesResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    results: Vec<PlaceDto>,
}

#[derive(Debug, Deserialize)]
struct PlaceDto {
    geometry: GeometryDto,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    place_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeometryDto {
    location: LatLng,
}

impl GoogleMapsClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProviderError::Transport(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|err| ProviderError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message: body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| ProviderError::Malformed(err.to_string()))
    }
}

/// Map a non-OK API status to an error. `None` means "no results".
fn api_status_error(status: &str, message: Option<String>) -> Option<ProviderError> {
    let message = message.unwrap_or_else(|| status.to_string());
    match status {
        "ZERO_RESULTS" | "NOT_FOUND" => None,
        "OVER_QUERY_LIMIT" | "OVER_DAILY_LIMIT" => Some(ProviderError::Status {
            status: 429,
            message,
        }),
        "REQUEST_DENIED" => Some(ProviderError::Status {
            status: 403,
            message,
        }),
        "INVALID_REQUEST" | "MAX_WAYPOINTS_EXCEEDED" | "MAX_ROUTE_LENGTH_EXCEEDED" => {
            Some(ProviderError::Status {
                status: 400,
                message,
            })
        }
        "UNKNOWN_ERROR" => Some(ProviderError::Status {
            status: 503,
            message,
        }),
        other => Some(ProviderError::Malformed(format!("unexpected status {other}"))),
    }
}

#[async_trait]
impl DirectionsProvider for GoogleMapsClient {
    async fn directions(
        &self,
        origin: LatLng,
        destination: LatLng,
    ) -> Result<Directions, ProviderError> {
        let response: DirectionsResponse = self
            .get_json(
                "/maps/api/directions/json",
                &[
                    ("origin", origin.to_string()),
                    ("destination", destination.to_string()),
                    ("mode", "driving".to_string()),
                ],
            )
            .await?;

        if response.status != "OK" {
            return Err(api_status_error(&response.status, response.error_message)
                .unwrap_or(ProviderError::NoRoute));
        }

        let route = response
            .routes
            .into_iter()
            .next()
            .ok_or(ProviderError::NoRoute)?;
        let legs = route
            .legs
            .into_iter()
            .map(|leg| Leg {
                distance_m: leg.distance.value,
                steps: leg
                    .steps
                    .into_iter()
                    .map(|step| RouteStep {
                        start: step.start_location,
                        end: step.end_location,
                        distance_m: step.distance.value,
                    })
                    .collect(),
            })
            .collect();

        Ok(Directions {
            polyline: route.overview_polyline.points,
            legs,
        })
    }
}

#[async_trait]
impl PlacesProvider for GoogleMapsClient {
    async fn charging_stations(
        &self,
        location: LatLng,
        radius_m: f64,
    ) -> Result<Vec<ChargingStation>, ProviderError> {
        let response: PlacesResponse = self
            .get_json(
                "/maps/api/place/nearbysearch/json",
                &[
                    ("location", location.to_string()),
                    ("radius", format!("{:.0}", radius_m)),
                    ("type", CHARGING_STATION_TYPE.to_string()),
                ],
            )
            .await?;

        if response.status != "OK" {
            return match api_status_error(&response.status, response.error_message) {
                Some(err) => Err(err),
                None => Ok(Vec::new()),
            };
        }

        Ok(response
            .results
            .into_iter()
            .map(|place| ChargingStation {
                position: place.geometry.location,
                name: place.name,
                place_id: place.place_id,
            })
            .collect())
    }
}
