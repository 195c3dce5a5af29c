use async_trait::async_trait;
use ridepool_shared::Waypoint;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RoutingError {
    #[error("Routing service unavailable: {0}")]
    Unavailable(String),
    #[error("Routing request timed out")]
    Timeout,
    #[error("Invalid routing response: {0}")]
    InvalidResponse(String),
}

/// Road-distance provider.
#[async_trait]
pub trait RoutingClient: Send + Sync {
    async fn distance_km(&self, from: &Waypoint, to: &Waypoint) -> Result<f64, RoutingError>;
}
