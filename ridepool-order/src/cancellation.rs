use crate::manager::BookingManager;
use crate::orchestrator::PaymentOrchestrator;
use crate::{emit, emit_seats_released, save_if_unchanged, timestamp, MAX_WRITE_ATTEMPTS};
use ridepool_catalog::SeatInventory;
use ridepool_core::events::EventPublisher;
use ridepool_core::repository::BookingRepository;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::models::events::{BookingCancelledEvent, DomainEvent};
use ridepool_shared::{Booking, BookingStatus, PaymentStatus};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking: Booking,
    pub already_cancelled: bool,
    pub seats_released: bool,
    pub refunded_cents: i64,
    pub refund_failed: bool,
}

impl CancellationOutcome {
    fn already_cancelled(booking: Booking) -> Self {
        Self {
            booking,
            already_cancelled: true,
            seats_released: false,
            refunded_cents: 0,
            refund_failed: false,
        }
    }
}

/// Cancels a booking: release seats, then refund what was captured.
///
/// The release is never rolled back. A refund that fails leaves the booking
/// cancelled with payment status `RefundFailed`.
pub struct CancellationSaga {
    bookings: Arc<dyn BookingRepository>,
    inventory: Arc<SeatInventory>,
    orchestrator: Arc<PaymentOrchestrator>,
    publisher: Arc<dyn EventPublisher>,
    manager: BookingManager,
}

impl CancellationSaga {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        inventory: Arc<SeatInventory>,
        orchestrator: Arc<PaymentOrchestrator>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            bookings,
            inventory,
            orchestrator,
            publisher,
            manager: BookingManager::new(),
        }
    }

    async fn load(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("booking", booking_id))
    }

    pub async fn cancel_booking(&self, booking_id: Uuid, reason: &str) -> CoreResult<CancellationOutcome> {
        let mut booking = self.load(booking_id).await?;
        if booking.booking_status == BookingStatus::Cancelled {
            return Ok(CancellationOutcome::already_cancelled(booking));
        }
        tracing::info!("Cancelling booking {} ({})", booking.id, reason);

        // step 1: seats. Release is keyed by booking, so repeating it after
        // a conflicting write gives nothing back twice.
        let mut seats_released = false;
        let mut cancelled = false;
        for _ in 0..MAX_WRITE_ATTEMPTS {
            if booking.booking_status == BookingStatus::Cancelled {
                return Ok(CancellationOutcome::already_cancelled(booking));
            }
            if booking.seats_held {
                seats_released |= self
                    .inventory
                    .release(booking.trip_id, booking.seats_booked, booking.id)
                    .await?;
            }
            self.manager.cancel(&mut booking)?;
            if matches!(booking.payment_status, PaymentStatus::None | PaymentStatus::Pending | PaymentStatus::Authorized) {
                // abandon the open provider order
                booking.transition_payment(PaymentStatus::Failed)?;
            }
            if save_if_unchanged(self.bookings.as_ref(), &mut booking).await? {
                cancelled = true;
                break;
            }
            tracing::warn!("Booking {} changed while cancelling, reloading", booking.id);
            booking = self.load(booking_id).await?;
        }
        if !cancelled {
            return Err(CoreError::BookingConflict(booking_id));
        }

        if seats_released {
            emit_seats_released(self.publisher.as_ref(), &self.inventory, &booking).await;
        }

        // step 2: money
        let mut refunded_cents = 0;
        let mut refund_failed = false;
        let refundable = booking.refundable_cents();
        if matches!(booking.payment_status, PaymentStatus::Captured | PaymentStatus::RefundFailed) && refundable > 0 {
            match self.orchestrator.refund(&mut booking, refundable).await {
                Ok(refund) => refunded_cents = refund.amount_cents,
                Err(e) => {
                    tracing::warn!("Booking {} cancelled but refund failed: {}", booking.id, e);
                    refund_failed = true;
                }
            }
        }

        emit(
            self.publisher.as_ref(),
            DomainEvent::BookingCancelled(BookingCancelledEvent {
                booking_id: booking.id,
                trip_id: booking.trip_id,
                refund_cents: refunded_cents,
                timestamp: timestamp(),
            }),
        )
        .await;

        Ok(CancellationOutcome {
            booking,
            already_cancelled: false,
            seats_released,
            refunded_cents,
            refund_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::mock_provider::MockOutcome;
    use crate::orchestrator::PaymentSettings;
    use crate::testing::Fixture;
    use ridepool_core::payment::ProviderError;
    use ridepool_core::repository::BookingRepository;
    use ridepool_core::CoreError;
    use ridepool_shared::{BookingStatus, PaymentStatus};
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_unpaid_booking() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.reserve(2).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();

        let outcome = fx.saga.cancel_booking(booking.id, "passenger").await.unwrap();
        assert!(outcome.seats_released);
        assert_eq!(outcome.refunded_cents, 0);
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Failed);
        assert_eq!(fx.available().await, 3);
    }

    #[tokio::test]
    async fn test_cancel_paid_booking_refunds_everything() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.paid(2).await;

        let outcome = fx.saga.cancel_booking(booking.id, "passenger").await.unwrap();
        assert_eq!(outcome.refunded_cents, 4000);
        assert_eq!(outcome.booking.booking_status, BookingStatus::Cancelled);
        assert_eq!(outcome.booking.payment_status, PaymentStatus::Refunded);
        assert_eq!(fx.available().await, 3);
    }

    #[tokio::test]
    async fn test_second_cancel_is_noop() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.paid(1).await;
        fx.saga.cancel_booking(booking.id, "passenger").await.unwrap();

        let again = fx.saga.cancel_booking(booking.id, "passenger").await.unwrap();
        assert!(again.already_cancelled);
        assert_eq!(fx.provider.call_count("refund"), 1);
        assert_eq!(fx.available().await, 3);
    }

    #[tokio::test]
    async fn test_refund_failure_keeps_seats_released() {
        let fx = Fixture::with_settings(
            3,
            2000,
            PaymentSettings {
                max_retries: 0,
                ..PaymentSettings::default()
            },
        )
        .await;
        let booking = fx.paid(2).await;
        fx.provider
            .script_refund(MockOutcome::Fail(ProviderError::ProviderDown("503".into())));

        let outcome = fx.saga.cancel_booking(booking.id, "driver").await.unwrap();
        assert!(outcome.refund_failed);
        assert_eq!(outcome.booking.booking_status, BookingStatus::Cancelled);
        assert_eq!(outcome.booking.payment_status, PaymentStatus::RefundFailed);
        assert_eq!(fx.available().await, 3);
    }

    #[tokio::test]
    async fn test_cancel_during_capture_keeps_seats_consistent() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.reserve(2).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();
        fx.orchestrator.mark_authorized(booking.id).await.unwrap();
        fx.provider.script_capture(MockOutcome::Delay(Duration::from_millis(100)));

        let (captured, cancelled) = tokio::join!(fx.orchestrator.capture(booking.id), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fx.saga.cancel_booking(booking.id, "passenger").await
        });
        let cancelled = cancelled.unwrap();
        assert!(cancelled.seats_released);
        assert!(matches!(captured, Err(CoreError::InvalidTransition { .. })));

        let stored = fx.booking(booking.id).await;
        assert_eq!(stored.booking_status, BookingStatus::Cancelled);
        assert!(!stored.seats_held);
        let held: i32 = fx
            .bookings
            .list_by_trip(fx.trip_id)
            .await
            .unwrap()
            .iter()
            .filter(|b| b.holds_seats())
            .map(|b| b.seats_booked)
            .sum();
        assert_eq!(fx.available().await + held, 3);

        // the capture that landed late went straight back
        assert_eq!(stored.captured_cents, 4000);
        assert_eq!(stored.refunded_cents, 4000);
        assert_eq!(stored.payment_status, PaymentStatus::Refunded);
    }

    #[tokio::test]
    async fn test_cancel_right_after_capture_refunds_it() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.reserve(1).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();
        fx.orchestrator.mark_authorized(booking.id).await.unwrap();
        // capture is recorded first; cancel must see it, not overwrite it
        fx.provider.script_capture(MockOutcome::Delay(Duration::from_millis(10)));
        let (captured, cancelled) = tokio::join!(fx.orchestrator.capture(booking.id), async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            fx.saga.cancel_booking(booking.id, "passenger").await
        });
        assert_eq!(captured.unwrap().booking_status, BookingStatus::Confirmed);
        let cancelled = cancelled.unwrap();
        assert_eq!(cancelled.refunded_cents, 2000);
        assert_eq!(fx.available().await, 3);
    }
}
