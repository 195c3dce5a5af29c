pub mod cancellation;
pub mod finance;
pub mod manager;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock_provider;
pub mod orchestrator;
pub mod reaper;
pub mod repricing;
pub mod service;
pub mod trips;

#[cfg(test)]
pub(crate) mod testing;

pub use cancellation::{CancellationOutcome, CancellationSaga};
pub use finance::{CommissionSplit, FinancialManager};
pub use manager::BookingManager;
pub use orchestrator::{PaymentOrchestrator, PaymentSettings};
pub use reaper::{ReapReport, StaleBookingReaper};
pub use repricing::RepricingService;
pub use service::BookingService;
pub use trips::{TripCancellation, TripManager};

use ridepool_catalog::SeatInventory;
use ridepool_core::events::EventPublisher;
use ridepool_core::repository::BookingRepository;
use ridepool_core::CoreResult;
use ridepool_shared::models::events::{DomainEvent, SeatsReleasedEvent};
use ridepool_shared::Booking;

/// Conditional booking writes tried before giving up with a conflict.
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 5;

/// Writes `booking` only if nobody stored a newer version since it was
/// loaded. Tracks the new version on success.
pub(crate) async fn save_if_unchanged(bookings: &dyn BookingRepository, booking: &mut Booking) -> CoreResult<bool> {
    let expected = booking.version;
    if bookings.update_booking_if(booking, expected).await? {
        booking.version = expected + 1;
        return Ok(true);
    }
    Ok(false)
}

/// Announces seats handed back by `booking`. Skipped when the current
/// count cannot be read.
pub(crate) async fn emit_seats_released(publisher: &dyn EventPublisher, inventory: &SeatInventory, booking: &Booking) {
    let available = match inventory.available(booking.trip_id).await {
        Ok(available) => available,
        Err(e) => {
            tracing::warn!(
                "Seats of booking {} released but trip {} count unreadable, event skipped: {}",
                booking.id,
                booking.trip_id,
                e
            );
            return;
        }
    };
    emit(
        publisher,
        DomainEvent::SeatsReleased(SeatsReleasedEvent {
            trip_id: booking.trip_id,
            booking_id: booking.id,
            seats: booking.seats_booked,
            seats_available: available,
            timestamp: timestamp(),
        }),
    )
    .await;
}

/// Publishes an event without letting broker trouble fail the operation.
pub(crate) async fn emit(publisher: &dyn EventPublisher, event: DomainEvent) {
    if let Err(e) = publisher.publish(&event).await {
        tracing::warn!("Failed to publish {} event: {}", event.topic(), e);
    }
}

pub(crate) fn timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use ridepool_core::repository::TripRepository;

    #[tokio::test]
    async fn test_release_event_carries_current_count() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.reserve(2).await;
        assert!(fx.inventory.release(fx.trip_id, 2, booking.id).await.unwrap());

        emit_seats_released(fx.publisher.as_ref(), &fx.inventory, &booking).await;
        let released: Vec<_> = fx
            .publisher
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DomainEvent::SeatsReleased(ev) => Some(ev),
                _ => None,
            })
            .collect();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].seats, 2);
        assert_eq!(released[0].seats_available, 3);
    }

    #[tokio::test]
    async fn test_release_event_skipped_when_trip_unreadable() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.reserve(1).await;
        fx.trips.delete_trip(fx.trip_id).await.unwrap();
        let before = fx.publisher.events().len();

        emit_seats_released(fx.publisher.as_ref(), &fx.inventory, &booking).await;
        assert_eq!(fx.publisher.events().len(), before);
        assert!(!fx.publisher.topics().contains(&"booking.released"));
    }
}
