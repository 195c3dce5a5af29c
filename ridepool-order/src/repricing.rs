use crate::orchestrator::PaymentOrchestrator;
use crate::{emit, save_if_unchanged, timestamp, MAX_WRITE_ATTEMPTS};
use chrono::Utc;
use ridepool_catalog::repricing::{paying_passengers, refund_instructions, RepricingPolicy};
use ridepool_core::events::EventPublisher;
use ridepool_core::repository::{BookingRepository, TripRepository};
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::models::events::{DomainEvent, TripRepricedEvent};
use ridepool_shared::{Booking, BookingStatus, RepricingRecord};
use std::sync::Arc;
use uuid::Uuid;

/// Applies the configured repricing policy to a trip: audit record first,
/// then the new price, then lowered `amount_due` and refunds per booking.
/// This is the only code path that changes a booking's `amount_due`.
pub struct RepricingService {
    trips: Arc<dyn TripRepository>,
    bookings: Arc<dyn BookingRepository>,
    policy: Arc<dyn RepricingPolicy>,
    orchestrator: Arc<PaymentOrchestrator>,
    publisher: Arc<dyn EventPublisher>,
}

impl RepricingService {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        policy: Arc<dyn RepricingPolicy>,
        orchestrator: Arc<PaymentOrchestrator>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            trips,
            bookings,
            policy,
            orchestrator,
            publisher,
        }
    }

    pub async fn apply(&self, trip_id: Uuid) -> CoreResult<Option<RepricingRecord>> {
        let mut trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
        let bookings = self.bookings.list_by_trip(trip_id).await?;

        let Some(new_price) = self.policy.reprice(&trip, &bookings) else {
            return Ok(None);
        };
        let passengers = paying_passengers(&trip, &bookings);
        let booked_seats: i32 = bookings
            .iter()
            .filter(|b| b.booking_status == BookingStatus::Confirmed && b.holds_seats())
            .map(|b| b.seats_booked)
            .sum();

        let record = RepricingRecord {
            id: Uuid::new_v4(),
            trip_id,
            old_price_cents: trip.price_per_seat_cents,
            new_price_cents: new_price,
            booked_seats,
            reason: format!("cost split across {} passengers", passengers),
            created_at: Utc::now(),
        };
        self.trips.record_repricing(&record).await?;

        trip.price_per_seat_cents = new_price;
        trip.updated_at = Utc::now();
        self.trips.update_trip(&trip).await?;
        tracing::info!(
            "Trip {} repriced {} -> {} cents per seat ({} passengers, {} seats)",
            trip_id,
            record.old_price_cents,
            new_price,
            passengers,
            booked_seats
        );

        for booking in bookings {
            if let Err(e) = self.settle_booking(booking, new_price).await {
                tracing::warn!("Repricing trip {} left a booking unsettled: {}", trip_id, e);
            }
        }

        emit(
            self.publisher.as_ref(),
            DomainEvent::TripRepriced(TripRepricedEvent {
                trip_id,
                old_price_cents: record.old_price_cents,
                new_price_cents: new_price,
                booked_seats,
                timestamp: timestamp(),
            }),
        )
        .await;

        Ok(Some(record))
    }

    /// Lowers one booking's `amount_due` to the new price and refunds what it
    /// paid above that. Recomputed from the stored copy when another write
    /// got in between.
    async fn settle_booking(&self, mut booking: Booking, new_price: i64) -> CoreResult<()> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let instructions = refund_instructions(
                std::slice::from_ref(&booking),
                new_price,
                self.policy.min_refund_cents(),
            );
            let Some(instruction) = instructions.first() else {
                return Ok(());
            };
            booking.amount_due_cents = instruction.new_amount_due_cents;
            booking.updated_at = Utc::now();
            if save_if_unchanged(self.bookings.as_ref(), &mut booking).await? {
                if instruction.refund_cents > 0 {
                    if let Err(e) = self.orchestrator.refund(&mut booking, instruction.refund_cents).await {
                        tracing::warn!("Repricing refund for booking {} failed: {}", booking.id, e);
                    }
                }
                return Ok(());
            }
            let id = booking.id;
            booking = self
                .bookings
                .get_booking(id)
                .await?
                .ok_or_else(|| CoreError::not_found("booking", id))?;
        }
        Err(CoreError::BookingConflict(booking.id))
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::Fixture;
    use ridepool_catalog::SplitCostPolicy;
    use ridepool_core::repository::{BookingRepository, TripRepository};
    use ridepool_shared::PaymentStatus;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_second_passenger_splits_price_and_refunds_first() {
        let fx = Fixture::with_policy(4, 2000, Arc::new(SplitCostPolicy::default())).await;
        let first = fx.paid(1).await;
        // one seat booked: nothing to split yet
        assert_eq!(fx.trip().await.price_per_seat_cents, 2000);

        let second = fx.paid(1).await;
        let trip = fx.trip().await;
        assert_eq!(trip.price_per_seat_cents, 1000);
        assert_eq!(trip.base_price_per_seat_cents, 2000);

        for id in [first.id, second.id] {
            let b = fx.bookings.get_booking(id).await.unwrap().unwrap();
            assert_eq!(b.amount_due_cents, 1000);
            assert_eq!(b.refunded_cents, 1000);
            assert_eq!(b.payment_status, PaymentStatus::Captured);
        }

        let audit = fx.trips.list_repricings(fx.trip_id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].old_price_cents, 2000);
        assert_eq!(audit[0].new_price_cents, 1000);
    }

    #[tokio::test]
    async fn test_third_passenger_pays_split_price() {
        let fx = Fixture::with_policy(4, 2000, Arc::new(SplitCostPolicy::default())).await;
        fx.paid(1).await;
        fx.paid(1).await;
        let third = fx.paid(1).await;

        // 20.00 / 3 rounded up to 6.70
        assert_eq!(fx.trip().await.price_per_seat_cents, 670);
        let b = fx.bookings.get_booking(third.id).await.unwrap().unwrap();
        // booked at 10.00, refunded down to 6.70
        assert_eq!(b.amount_due_cents, 670);
        assert_eq!(b.refunded_cents, 330);
        assert_eq!(fx.trips.list_repricings(fx.trip_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lone_passenger_with_two_seats_pays_solo_price() {
        let fx = Fixture::with_policy(3, 2000, Arc::new(SplitCostPolicy::default())).await;
        let booking = fx.paid(2).await;
        assert_eq!(booking.amount_due_cents, 4000);
        assert_eq!(booking.refunded_cents, 0);
        assert_eq!(fx.trip().await.price_per_seat_cents, 2000);
        assert!(fx.trips.list_repricings(fx.trip_id).await.unwrap().is_empty());

        let outcome = fx.saga.cancel_booking(booking.id, "passenger").await.unwrap();
        assert_eq!(outcome.refunded_cents, 4000);
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_split_is_per_passenger_for_multi_seat_bookings() {
        let fx = Fixture::with_policy(4, 2000, Arc::new(SplitCostPolicy::default())).await;
        let family = fx.paid(2).await;
        let single = fx.paid(1).await;

        // two passengers: 10.00 per seat
        assert_eq!(fx.trip().await.price_per_seat_cents, 1000);
        let family = fx.booking(family.id).await;
        assert_eq!(family.amount_due_cents, 2000);
        assert_eq!(family.refunded_cents, 2000);
        let single = fx.booking(single.id).await;
        assert_eq!(single.amount_due_cents, 1000);
        assert_eq!(single.captured_cents - single.refunded_cents, 1000);
        assert!(fx.trips.list_repricings(fx.trip_id).await.unwrap()[0].reason.contains("2 passengers"));
    }

    #[tokio::test]
    async fn test_booking_repriced_before_capture_pays_only_its_share() {
        let fx = Fixture::with_policy(4, 2000, Arc::new(SplitCostPolicy::default())).await;
        let first = fx.paid(1).await;
        let late = fx.reserve(1).await;
        fx.service.start_payment(late.id).await.unwrap();
        fx.service.authorize(late.id).await.unwrap();
        let third = fx.paid(1).await;
        assert_eq!(fx.booking(late.id).await.amount_due_cents, 1000);

        // the order was created at 20.00 and the provider takes all of it
        let late = fx.service.capture(late.id).await.unwrap();
        assert_eq!(late.captured_cents, 2000);
        assert_eq!(late.refunded_cents, 1330);

        for id in [first.id, late.id, third.id] {
            let b = fx.booking(id).await;
            assert_eq!(b.amount_due_cents, 670);
            assert_eq!(b.captured_cents - b.refunded_cents, b.amount_due_cents);
        }
    }
}
