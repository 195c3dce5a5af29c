use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use ridepool_core::routing::{RoutingClient, RoutingError};
use ridepool_shared::{Masked, Waypoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Road distances from the OpenRouteService directions API.
#[derive(Clone)]
pub struct OpenRouteServiceClient {
    client: Client,
    base_url: String,
    profile: String,
    api_key: Masked<String>,
}

#[derive(Serialize)]
struct DirectionsRequest {
    /// `[lon, lat]` pairs.
    coordinates: [[f64; 2]; 2],
}

#[derive(Deserialize)]
struct DirectionsResponse {
    routes: Vec<Route>,
}

#[derive(Deserialize)]
struct Route {
    summary: RouteSummary,
}

#[derive(Deserialize)]
struct RouteSummary {
    /// Meters.
    distance: f64,
}

impl OpenRouteServiceClient {
    pub fn new(
        base_url: impl Into<String>,
        profile: impl Into<String>,
        api_key: Masked<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            profile: profile.into(),
            api_key,
        })
    }

    async fn request(&self, coordinates: [[f64; 2]; 2]) -> Result<f64, RoutingError> {
        let response = self
            .client
            .post(format!("{}/v2/directions/{}", self.base_url, self.profile))
            .header("Authorization", self.api_key.expose())
            .json(&DirectionsRequest { coordinates })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RoutingError::Timeout
                } else {
                    RoutingError::Unavailable(e.to_string())
                }
            })?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .json::<DirectionsResponse>()
                    .await
                    .map_err(|e| RoutingError::InvalidResponse(e.to_string()))?;
                let meters = body
                    .routes
                    .first()
                    .map(|r| r.summary.distance)
                    .ok_or_else(|| RoutingError::InvalidResponse("no routes".into()))?;
                Ok(meters_to_km(meters))
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(RoutingError::Unavailable(format!("{}: {}", status.as_u16(), body)))
            }
        }
    }
}

fn meters_to_km(meters: f64) -> f64 {
    (meters / 10.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn coordinates(from: &Waypoint, to: &Waypoint, precise: bool) -> [[f64; 2]; 2] {
    if precise {
        [[from.lon, from.lat], [to.lon, to.lat]]
    } else {
        [[round4(from.lon), round4(from.lat)], [round4(to.lon), round4(to.lat)]]
    }
}

#[async_trait]
impl RoutingClient for OpenRouteServiceClient {
    async fn distance_km(&self, from: &Waypoint, to: &Waypoint) -> Result<f64, RoutingError> {
        match self.request(coordinates(from, to, true)).await {
            Ok(km) => {
                debug!("Routed {} -> {}: {} km", from.name, to.name, km);
                Ok(km)
            }
            Err(RoutingError::Timeout) => Err(RoutingError::Timeout),
            // Points off the road network sometimes route once snapped to a coarser grid.
            Err(first) => {
                warn!("Routing {} -> {} failed ({}), retrying with rounded coordinates", from.name, to.name, first);
                self.request(coordinates(from, to, false)).await
            }
        }
    }
}

/// Stands in when no routing credentials are configured, so every quote
/// uses the great-circle estimate.
pub struct OfflineRouting;

#[async_trait]
impl RoutingClient for OfflineRouting {
    async fn distance_km(&self, _from: &Waypoint, _to: &Waypoint) -> Result<f64, RoutingError> {
        Err(RoutingError::Unavailable("no routing credentials configured".to_string()))
    }
}
