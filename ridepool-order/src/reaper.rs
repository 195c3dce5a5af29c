use crate::cancellation::CancellationSaga;
use ridepool_core::clock::Clock;
use ridepool_core::repository::BookingRepository;
use ridepool_core::CoreResult;
use ridepool_shared::PaymentStatus;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct ReapReport {
    pub expired: usize,
    pub refunded: usize,
    pub errors: usize,
}

/// Cancels bookings that stayed pending past the confirmation timeout so
/// their seats return to the trip. Captured-but-unconfirmed ones are
/// refunded on the way.
pub struct StaleBookingReaper {
    bookings: Arc<dyn BookingRepository>,
    saga: Arc<CancellationSaga>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl StaleBookingReaper {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        saga: Arc<CancellationSaga>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            bookings,
            saga,
            clock,
            timeout,
        }
    }

    pub async fn sweep(&self) -> CoreResult<ReapReport> {
        let cutoff = self.clock.now() - chrono::Duration::from_std(self.timeout).unwrap_or_else(|_| chrono::Duration::zero());
        let stale = self.bookings.list_pending_before(cutoff).await?;
        let mut report = ReapReport::default();

        for booking in stale {
            let captured = booking.payment_status == PaymentStatus::Captured;
            match self.saga.cancel_booking(booking.id, "confirmation timeout").await {
                Ok(outcome) => {
                    report.expired += 1;
                    if captured && outcome.refunded_cents > 0 {
                        report.refunded += 1;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to reap booking {}: {}", booking.id, e);
                    report.errors += 1;
                }
            }
        }

        if report.expired > 0 || report.errors > 0 {
            tracing::info!(
                "Reaped {} stale booking(s), {} refunded, {} error(s)",
                report.expired,
                report.refunded,
                report.errors
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use ridepool_core::clock::FixedClock;
    use ridepool_core::payment::CaptureState;
    use ridepool_shared::BookingStatus;

    #[tokio::test]
    async fn test_reaps_only_stale_pending() {
        let fx = Fixture::new(4, 2000).await;
        fx.provider.set_capture_state(CaptureState::Pending);
        let unpaid = fx.reserve(1).await;
        let unconfirmed = fx.paid(1).await;
        assert_eq!(unconfirmed.booking_status, BookingStatus::Pending);

        let now = chrono::Utc::now().naive_utc();
        let clock = Arc::new(FixedClock::new(now));
        let reaper = StaleBookingReaper::new(fx.bookings.clone(), fx.saga.clone(), clock.clone(), Duration::from_secs(3600));

        assert_eq!(reaper.sweep().await.unwrap().expired, 0);
        assert_eq!(fx.available().await, 2);

        clock.advance(chrono::Duration::hours(2));
        let report = reaper.sweep().await.unwrap();
        assert_eq!(report.expired, 2);
        assert_eq!(report.refunded, 1);
        assert_eq!(fx.available().await, 4);
        assert_eq!(fx.booking(unpaid.id).await.booking_status, BookingStatus::Cancelled);
        assert_eq!(fx.booking(unconfirmed.id).await.refunded_cents, 2000);

        // nothing left to do
        assert_eq!(reaper.sweep().await.unwrap(), ReapReport::default());
    }
}
