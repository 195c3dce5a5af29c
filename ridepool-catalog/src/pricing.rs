use ridepool_core::CoreError;
use ridepool_shared::money;
use serde::{Deserialize, Serialize};

/// One band of the progressive tariff. `up_to_km = None` is the open-ended
/// last band.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceTier {
    pub up_to_km: Option<f64>,
    pub cents_per_km: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Ordered by ascending `up_to_km`.
    pub tiers: Vec<PriceTier>,
    pub max_price_per_seat_cents: i64,
    pub rounding_step_cents: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tiers: vec![
                PriceTier {
                    up_to_km: Some(24.0),
                    cents_per_km: 75,
                },
                PriceTier {
                    up_to_km: Some(40.0),
                    cents_per_km: 50,
                },
                PriceTier {
                    up_to_km: None,
                    cents_per_km: 25,
                },
            ],
            max_price_per_seat_cents: 100_000,
            rounding_step_cents: money::DEFAULT_STEP_CENTS,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PricingError {
    #[error("Price cannot be negative")]
    Negative,
    #[error("Price exceeds maximum of {max_cents} cents")]
    AboveMaximum { max_cents: i64 },
    #[error("Invalid distance: {0}")]
    InvalidDistance(f64),
}

impl From<PricingError> for CoreError {
    fn from(err: PricingError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// Tiered distance tariff.
#[derive(Debug, Clone)]
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Suggested per-seat price for a distance, in cents.
    pub fn compute_price(&self, distance_km: f64) -> Result<i64, PricingError> {
        if !distance_km.is_finite() {
            return Err(PricingError::InvalidDistance(distance_km));
        }
        if distance_km <= 0.0 {
            return Ok(0);
        }

        let mut total = 0.0_f64;
        let mut lower = 0.0_f64;
        for tier in &self.config.tiers {
            let upper = tier.up_to_km.unwrap_or(f64::INFINITY);
            let span = distance_km.min(upper) - lower;
            if span <= 0.0 {
                break;
            }
            total += span * tier.cents_per_km as f64;
            lower = upper;
        }

        Ok(money::round_to_step(total, self.config.rounding_step_cents))
    }

    /// Validates an owner-entered price and snaps it to the rounding step.
    pub fn validate_override(&self, cents: i64) -> Result<i64, PricingError> {
        if cents < 0 {
            return Err(PricingError::Negative);
        }
        if cents > self.config.max_price_per_seat_cents {
            return Err(PricingError::AboveMaximum {
                max_cents: self.config.max_price_per_seat_cents,
            });
        }
        let rounded = money::round_to_step(cents as f64, self.config.rounding_step_cents);
        Ok(rounded.min(self.config.max_price_per_seat_cents))
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}
