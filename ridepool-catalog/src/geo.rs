use crate::pricing::PricingEngine;
use ridepool_core::locality::LocalityDirectory;
use ridepool_core::routing::RoutingClient;
use ridepool_core::CoreResult;
use ridepool_shared::{DistanceProvenance, Waypoint};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two waypoints in kilometres.
pub fn haversine_km(a: &Waypoint, b: &Waypoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RouteDistance {
    pub km: f64,
    pub provenance: DistanceProvenance,
}

impl RouteDistance {
    pub fn is_estimate(&self) -> bool {
        self.provenance == DistanceProvenance::GreatCircle
    }
}

/// Distance plus the suggested per-seat price for it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub distance: RouteDistance,
    pub price_per_seat_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub timeout_ms: u64,
    /// Road distance is longer than the straight line; scale the fallback.
    pub great_circle_multiplier: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            great_circle_multiplier: 1.2,
        }
    }
}

/// Resolves place names and turns a pair of waypoints into a priced distance.
pub struct RouteResolver {
    directory: Arc<dyn LocalityDirectory>,
    routing: Arc<dyn RoutingClient>,
    pricing: PricingEngine,
    config: ResolverConfig,
}

impl RouteResolver {
    pub fn new(
        directory: Arc<dyn LocalityDirectory>,
        routing: Arc<dyn RoutingClient>,
        pricing: PricingEngine,
        config: ResolverConfig,
    ) -> Self {
        Self {
            directory,
            routing,
            pricing,
            config,
        }
    }

    pub fn pricing(&self) -> &PricingEngine {
        &self.pricing
    }

    pub fn lookup_locality(&self, query: &str) -> Vec<Waypoint> {
        self.directory.lookup(query)
    }

    /// Routed distance, or a scaled great-circle estimate when the routing
    /// service fails or exceeds the timeout. Never fails.
    pub async fn route_distance(&self, from: &Waypoint, to: &Waypoint) -> RouteDistance {
        let call = self.routing.distance_km(from, to);
        match tokio::time::timeout(Duration::from_millis(self.config.timeout_ms), call).await {
            Ok(Ok(km)) if km.is_finite() && km >= 0.0 => RouteDistance {
                km,
                provenance: DistanceProvenance::Routed,
            },
            Ok(Ok(km)) => {
                tracing::warn!("Routing returned unusable distance {}, estimating", km);
                self.great_circle(from, to)
            }
            Ok(Err(e)) => {
                tracing::warn!("Routing failed ({}), falling back to great-circle", e);
                self.great_circle(from, to)
            }
            Err(_) => {
                tracing::warn!("Routing timed out after {}ms, falling back to great-circle", self.config.timeout_ms);
                self.great_circle(from, to)
            }
        }
    }

    fn great_circle(&self, from: &Waypoint, to: &Waypoint) -> RouteDistance {
        RouteDistance {
            km: haversine_km(from, to) * self.config.great_circle_multiplier,
            provenance: DistanceProvenance::GreatCircle,
        }
    }

    pub async fn quote(&self, from: &Waypoint, to: &Waypoint) -> CoreResult<PriceQuote> {
        let distance = self.route_distance(from, to).await;
        let price = self.pricing.compute_price(distance.km)?;
        tracing::debug!(
            "Quoted {} -> {}: {:.1} km ({:?}), {} cents",
            from.name,
            to.name,
            distance.km,
            distance.provenance,
            price
        );
        Ok(PriceQuote {
            distance,
            price_per_seat_cents: price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gazetteer::Gazetteer;
    use async_trait::async_trait;
    use ridepool_core::routing::RoutingError;

    struct FixedRouting(f64);

    #[async_trait]
    impl RoutingClient for FixedRouting {
        async fn distance_km(&self, _: &Waypoint, _: &Waypoint) -> Result<f64, RoutingError> {
            Ok(self.0)
        }
    }

    struct DownRouting;

    #[async_trait]
    impl RoutingClient for DownRouting {
        async fn distance_km(&self, _: &Waypoint, _: &Waypoint) -> Result<f64, RoutingError> {
            Err(RoutingError::Unavailable("connection refused".into()))
        }
    }

    struct SlowRouting;

    #[async_trait]
    impl RoutingClient for SlowRouting {
        async fn distance_km(&self, _: &Waypoint, _: &Waypoint) -> Result<f64, RoutingError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(1.0)
        }
    }

    fn resolver(routing: Arc<dyn RoutingClient>) -> RouteResolver {
        RouteResolver::new(
            Arc::new(Gazetteer::swiss_default()),
            routing,
            PricingEngine::default(),
            ResolverConfig {
                timeout_ms: 50,
                great_circle_multiplier: 1.2,
            },
        )
    }

    fn city(r: &RouteResolver, name: &str) -> Waypoint {
        r.lookup_locality(name).remove(0)
    }

    #[test]
    fn test_haversine_bern_zurich() {
        let g = Gazetteer::swiss_default();
        let bern = g.lookup("Bern").remove(0);
        let zurich = g.lookup("Zurich").remove(0);
        let km = haversine_km(&bern, &zurich);
        assert!((km - 95.5).abs() < 2.0, "got {}", km);
        assert_eq!(haversine_km(&bern, &bern), 0.0);
    }

    #[tokio::test]
    async fn test_routed_distance() {
        let r = resolver(Arc::new(FixedRouting(50.0)));
        let (a, b) = (city(&r, "Lausanne"), city(&r, "Fribourg"));
        let quote = r.quote(&a, &b).await.unwrap();
        assert_eq!(quote.distance.provenance, DistanceProvenance::Routed);
        assert_eq!(quote.price_per_seat_cents, 2850);
    }

    #[tokio::test]
    async fn test_falls_back_when_routing_down() {
        let r = resolver(Arc::new(DownRouting));
        let (a, b) = (city(&r, "Bern"), city(&r, "Zurich"));
        let quote = r.quote(&a, &b).await.unwrap();
        assert!(quote.distance.is_estimate());
        let expected = haversine_km(&a, &b) * 1.2;
        assert!((quote.distance.km - expected).abs() < 1e-9);
        assert!(quote.price_per_seat_cents > 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_timeout() {
        let r = resolver(Arc::new(SlowRouting));
        let (a, b) = (city(&r, "Sion"), city(&r, "Thun"));
        let d = r.route_distance(&a, &b).await;
        assert_eq!(d.provenance, DistanceProvenance::GreatCircle);
    }
}
