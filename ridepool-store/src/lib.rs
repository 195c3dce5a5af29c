pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod paypal;
pub mod redis_repo;
pub mod routing_client;
pub mod trip_repo;
pub mod user_repo;

pub use app_config::{run_mode, Config, PaymentBackend};
pub use booking_repo::PgBookingRepository;
pub use database::DbClient;
pub use events::KafkaEventPublisher;
pub use paypal::PayPalProvider;
pub use redis_repo::RedisSessionStore;
pub use routing_client::{OfflineRouting, OpenRouteServiceClient};
pub use trip_repo::PgTripRepository;
pub use user_repo::PgUserRepository;

use ridepool_core::CoreError;

pub(crate) fn storage_err(err: impl std::fmt::Display) -> CoreError {
    CoreError::Storage(err.to_string())
}

/// Maps a stored enum column back to its domain value.
pub(crate) fn decode<T>(column: &'static str, raw: &str, parse: impl Fn(&str) -> Option<T>) -> Result<T, CoreError> {
    parse(raw).ok_or_else(|| CoreError::Storage(format!("unexpected {} value '{}'", column, raw)))
}
