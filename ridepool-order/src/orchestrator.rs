use crate::finance::FinancialManager;
use crate::manager::BookingManager;
use crate::{emit, emit_seats_released, save_if_unchanged, timestamp, MAX_WRITE_ATTEMPTS};
use ridepool_catalog::SeatInventory;
use ridepool_core::events::EventPublisher;
use ridepool_core::payment::{
    capture_key, create_key, refund_key, CaptureResult, CaptureState, CreateOrderRequest, PaymentProvider,
    ProviderError, ProviderOrder, RefundResult,
};
use ridepool_core::repository::BookingRepository;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::models::events::{BookingConfirmedEvent, DomainEvent, RefundFailedEvent, RefundIssuedEvent};
use ridepool_shared::{Booking, BookingStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentSettings {
    pub currency: String,
    pub fee_rate: f64,
    pub call_timeout_ms: u64,
    /// Extra attempts for idempotent calls (create, refund).
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub confirmation_timeout_seconds: u64,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: "CHF".to_string(),
            fee_rate: 0.12,
            call_timeout_ms: 10_000,
            max_retries: 3,
            backoff_base_ms: 200,
            confirmation_timeout_seconds: 3_600,
        }
    }
}

/// Drives one booking's payment through the provider:
/// create order, approval, capture, refunds.
pub struct PaymentOrchestrator {
    provider: Arc<dyn PaymentProvider>,
    bookings: Arc<dyn BookingRepository>,
    inventory: Arc<SeatInventory>,
    publisher: Arc<dyn EventPublisher>,
    manager: BookingManager,
    finance: FinancialManager,
    settings: PaymentSettings,
}

impl PaymentOrchestrator {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        bookings: Arc<dyn BookingRepository>,
        inventory: Arc<SeatInventory>,
        publisher: Arc<dyn EventPublisher>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            provider,
            bookings,
            inventory,
            publisher,
            manager: BookingManager::new(),
            finance: FinancialManager::new(settings.fee_rate),
            settings,
        }
    }

    pub fn settings(&self) -> &PaymentSettings {
        &self.settings
    }

    async fn load(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("booking", booking_id))
    }

    fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.settings.call_timeout_ms)
    }

    /// Runs an idempotent provider call under the call timeout, retrying
    /// transient failures with exponential backoff.
    async fn with_retries<T, F, Fut>(&self, op: &str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut retry = 0u32;
        loop {
            let result = match tokio::time::timeout(self.call_timeout(), call()).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout),
            };
            match result {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && retry < self.settings.max_retries => {
                    let delay = self.settings.backoff_base_ms.saturating_mul(1u64 << retry.min(16));
                    tracing::warn!("{} failed ({}), retrying in {}ms", op, e, delay);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Applies `change` and writes the booking back. When another writer got
    /// there first the stored copy is reloaded and `change` applied again.
    async fn commit<F>(&self, booking: &mut Booking, mut change: F) -> CoreResult<()>
    where
        F: FnMut(&mut Booking) -> CoreResult<()>,
    {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            change(booking)?;
            if save_if_unchanged(self.bookings.as_ref(), booking).await? {
                return Ok(());
            }
            tracing::debug!("Booking {} changed underneath, reloading", booking.id);
            *booking = self.load(booking.id).await?;
        }
        Err(CoreError::BookingConflict(booking.id))
    }

    /// Creates the provider order for a booking and returns where the payer
    /// approves it. Calling again while the order is pending returns the
    /// same order.
    pub async fn start_payment(&self, booking_id: Uuid) -> CoreResult<ProviderOrder> {
        let mut booking = self.load(booking_id).await?;
        if booking.booking_status == BookingStatus::Cancelled {
            return Err(CoreError::invalid_transition(booking.booking_status, PaymentStatus::Pending));
        }
        if booking.payment_status == PaymentStatus::Pending {
            if let (Some(order_id), Some(approval_url)) = (&booking.provider_order_id, &booking.approval_url) {
                return Ok(ProviderOrder {
                    order_id: order_id.clone(),
                    approval_url: approval_url.clone(),
                });
            }
        }
        if !booking.seats_held {
            return Err(CoreError::Validation(
                "seats are no longer held for this booking, retry the booking first".to_string(),
            ));
        }

        booking.transition_payment(PaymentStatus::Pending)?;
        booking.attempt += 1;
        if !save_if_unchanged(self.bookings.as_ref(), &mut booking).await? {
            return Err(CoreError::BookingConflict(booking.id));
        }
        let attempt = booking.attempt;

        let request = CreateOrderRequest {
            booking_id: booking.id,
            amount_cents: booking.amount_due_cents,
            currency: booking.currency.clone(),
            description: format!("{} seat(s), booking {}", booking.seats_booked, booking.id),
            idempotency_key: create_key(booking.id, attempt),
        };

        match self.with_retries("create_order", || self.provider.create_order(&request)).await {
            Ok(order) => {
                self.commit(&mut booking, |b| {
                    if b.attempt != attempt || b.payment_status != PaymentStatus::Pending {
                        return Err(CoreError::invalid_transition(b.payment_status, PaymentStatus::Pending));
                    }
                    b.provider_order_id = Some(order.order_id.clone());
                    b.approval_url = Some(order.approval_url.clone());
                    Ok(())
                })
                .await?;
                tracing::info!("Payment order {} created for booking {}", order.order_id, booking.id);
                Ok(order)
            }
            Err(e) => {
                tracing::error!("Creating payment order for booking {} failed: {}", booking.id, e);
                self.fail_and_release(&mut booking).await?;
                Err(e.into())
            }
        }
    }

    /// The payer approved the order (provider webhook or return URL).
    pub async fn mark_authorized(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let mut booking = self.load(booking_id).await?;
        if booking.payment_status == PaymentStatus::Authorized {
            return Ok(booking);
        }
        self.commit(&mut booking, |b| {
            if b.booking_status == BookingStatus::Cancelled {
                return Err(CoreError::invalid_transition(b.booking_status, PaymentStatus::Authorized));
            }
            if b.payment_status != PaymentStatus::Authorized {
                b.transition_payment(PaymentStatus::Authorized)?;
            }
            Ok(())
        })
        .await?;
        tracing::info!("Booking {} payment authorized", booking.id);
        Ok(booking)
    }

    /// Captures an authorized order. Exactly one provider call: a failure or
    /// timeout fails the attempt and gives the seats back.
    pub async fn capture(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let mut booking = self.load(booking_id).await?;
        if booking.booking_status == BookingStatus::Cancelled {
            return Err(CoreError::invalid_transition(booking.booking_status, PaymentStatus::Captured));
        }
        if booking.payment_status == PaymentStatus::Captured {
            return Ok(booking);
        }
        if !booking.payment_status.can_transition_to(PaymentStatus::Captured) {
            return Err(CoreError::invalid_transition(booking.payment_status, PaymentStatus::Captured));
        }
        let order_id = booking
            .provider_order_id
            .clone()
            .ok_or_else(|| CoreError::Internal(format!("booking {} has no provider order", booking.id)))?;

        let key = capture_key(booking.id, booking.attempt);
        let outcome = match tokio::time::timeout(self.call_timeout(), self.provider.capture(&order_id, &key)).await {
            Ok(r) => r,
            Err(_) => Err(ProviderError::Timeout),
        };

        match outcome {
            Ok(capture) => self.settle_capture(booking, &capture).await,
            Err(e) => {
                if matches!(e, ProviderError::Timeout) {
                    tracing::warn!("Capture for booking {} timed out, outcome unknown", booking.id);
                }
                tracing::error!("Capture for booking {} failed: {}", booking.id, e);
                self.fail_and_release(&mut booking).await?;
                Err(e.into())
            }
        }
    }

    /// Records a capture the provider completed. The booking may have moved
    /// while the call was in flight: another capture already recorded it,
    /// repricing lowered `amount_due`, or a cancellation gave the seats back.
    async fn settle_capture(&self, mut booking: Booking, capture: &CaptureResult) -> CoreResult<Booking> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            if booking.booking_status == BookingStatus::Cancelled || booking.payment_status == PaymentStatus::Failed {
                return self.refund_late_capture(booking, capture).await;
            }
            if matches!(
                booking.payment_status,
                PaymentStatus::Captured | PaymentStatus::Refunded | PaymentStatus::RefundFailed
            ) {
                return Ok(booking);
            }
            self.apply_capture(&mut booking, capture)?;
            if save_if_unchanged(self.bookings.as_ref(), &mut booking).await? {
                if booking.booking_status == BookingStatus::Confirmed {
                    self.publish_confirmed(&booking).await;
                }
                self.refund_overcharge(&mut booking).await;
                return Ok(booking);
            }
            tracing::warn!("Booking {} changed while its capture was in flight, reloading", booking.id);
            booking = self.load(booking.id).await?;
        }
        Err(CoreError::BookingConflict(booking.id))
    }

    fn apply_capture(&self, booking: &mut Booking, capture: &CaptureResult) -> CoreResult<()> {
        booking.transition_payment(PaymentStatus::Captured)?;
        booking.capture_id = Some(capture.capture_id.clone());
        booking.captured_cents = if capture.amount_cents > 0 {
            capture.amount_cents
        } else {
            booking.amount_due_cents
        };
        let split = self.finance.split(booking.captured_cents.min(booking.amount_due_cents));
        booking.platform_fee_cents = split.platform_fee_cents;
        booking.payee_cents = split.payee_cents;

        match capture.state {
            CaptureState::Completed => {
                self.manager.confirm(booking)?;
                tracing::info!(
                    "Booking {} captured {} cents (fee {}), confirmed",
                    booking.id,
                    booking.captured_cents,
                    booking.platform_fee_cents
                );
            }
            CaptureState::Pending => {
                tracing::info!("Booking {} captured, awaiting provider confirmation", booking.id);
            }
        }
        Ok(())
    }

    /// The order was created before repricing lowered `amount_due`, so the
    /// provider took the old amount. The difference goes straight back.
    async fn refund_overcharge(&self, booking: &mut Booking) {
        let excess = booking.refundable_cents() - booking.amount_due_cents;
        if excess <= 0 {
            return;
        }
        tracing::info!(
            "Booking {} captured {} cents over its amount due, refunding",
            booking.id,
            excess
        );
        if let Err(e) = self.refund(booking, excess).await {
            tracing::warn!("Overcharge refund for booking {} failed: {}", booking.id, e);
        }
    }

    /// The attempt was given up (cancelled or failed) while the provider
    /// was still capturing. Records the money and refunds all of it.
    async fn refund_late_capture(&self, mut booking: Booking, capture: &CaptureResult) -> CoreResult<Booking> {
        let rejected = if booking.booking_status == BookingStatus::Cancelled {
            CoreError::invalid_transition(booking.booking_status, PaymentStatus::Captured)
        } else {
            CoreError::invalid_transition(booking.payment_status, PaymentStatus::Captured)
        };
        let amount = if capture.amount_cents > 0 {
            capture.amount_cents
        } else {
            booking.amount_due_cents
        };
        tracing::warn!(
            "Booking {} was given up while capturing {} cents, refunding the capture",
            booking.id,
            amount
        );
        self.commit(&mut booking, |b| {
            if b.capture_id.as_deref() == Some(capture.capture_id.as_str()) {
                return Ok(());
            }
            b.record_late_capture(capture.capture_id.clone(), amount)?;
            Ok(())
        })
        .await?;
        let refundable = booking.refundable_cents();
        if refundable > 0 {
            self.refund(&mut booking, refundable).await?;
        }
        Err(rejected)
    }

    /// Provider confirmed a capture that was reported as pending.
    pub async fn confirm_capture(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let mut booking = self.load(booking_id).await?;
        if booking.booking_status == BookingStatus::Confirmed {
            return Ok(booking);
        }
        let manager = self.manager;
        self.commit(&mut booking, |b| {
            if b.booking_status == BookingStatus::Confirmed {
                return Ok(());
            }
            manager.confirm(b)
        })
        .await?;
        tracing::info!("Booking {} confirmed by provider", booking.id);
        self.publish_confirmed(&booking).await;
        Ok(booking)
    }

    /// Refunds part or all of the captured amount. On failure the booking is
    /// parked in `RefundFailed` for manual reconciliation.
    ///
    /// `refund_seq` only advances once the provider answers, so retrying a
    /// failed refund reuses its idempotency key.
    pub async fn refund(&self, booking: &mut Booking, amount_cents: i64) -> CoreResult<RefundResult> {
        if !matches!(booking.payment_status, PaymentStatus::Captured | PaymentStatus::RefundFailed) {
            return Err(CoreError::invalid_transition(booking.payment_status, PaymentStatus::Refunded));
        }
        if amount_cents <= 0 || amount_cents > booking.refundable_cents() {
            return Err(CoreError::Validation(format!(
                "refund of {} cents outside refundable {} cents",
                amount_cents,
                booking.refundable_cents()
            )));
        }
        let capture_id = booking
            .capture_id
            .clone()
            .ok_or_else(|| CoreError::Internal(format!("booking {} has no capture", booking.id)))?;

        let seq = booking.refund_seq + 1;
        let key = refund_key(booking.id, seq);
        let currency = booking.currency.clone();
        let result = self
            .with_retries("refund", || self.provider.refund(&capture_id, amount_cents, &currency, &key))
            .await;

        match result {
            Ok(refund) => {
                // a replayed key answers with what was refunded the first time
                let refunded = if refund.amount_cents > 0 { refund.amount_cents } else { amount_cents };
                self.commit(booking, |b| {
                    if b.refund_seq >= seq {
                        return Ok(());
                    }
                    b.refund_seq = seq;
                    b.refunded_cents += refunded;
                    if b.refundable_cents() == 0 {
                        b.transition_payment(PaymentStatus::Refunded)?;
                    }
                    b.updated_at = chrono::Utc::now();
                    Ok(())
                })
                .await?;
                if booking.payment_status == PaymentStatus::RefundFailed {
                    // partial success after an earlier failure leaves it for reconciliation
                    tracing::warn!("Booking {} still has an unreconciled refund", booking.id);
                }
                tracing::info!("Refunded {} cents on booking {} ({})", refunded, booking.id, refund.refund_id);
                emit(
                    self.publisher.as_ref(),
                    DomainEvent::RefundIssued(RefundIssuedEvent {
                        booking_id: booking.id,
                        refund_id: refund.refund_id.clone(),
                        amount_cents: refunded,
                        timestamp: timestamp(),
                    }),
                )
                .await;
                Ok(refund)
            }
            Err(e) => {
                self.commit(booking, |b| {
                    if matches!(b.payment_status, PaymentStatus::Captured | PaymentStatus::RefundFailed) {
                        b.transition_payment(PaymentStatus::RefundFailed)?;
                    }
                    Ok(())
                })
                .await?;
                tracing::error!(
                    "Refund of {} cents for booking {} failed, needs manual reconciliation: {}",
                    amount_cents,
                    booking.id,
                    e
                );
                emit(
                    self.publisher.as_ref(),
                    DomainEvent::RefundFailed(RefundFailedEvent {
                        booking_id: booking.id,
                        amount_cents,
                        reason: e.to_string(),
                        timestamp: timestamp(),
                    }),
                )
                .await;
                Err(e.into())
            }
        }
    }

    /// Fails the current attempt and releases the seat hold. If the release
    /// itself fails the hold stays flagged and the stale-booking reaper
    /// picks it up.
    async fn fail_and_release(&self, booking: &mut Booking) -> CoreResult<()> {
        let mut released = false;
        if booking.seats_held {
            match self
                .inventory
                .release(booking.trip_id, booking.seats_booked, booking.id)
                .await
            {
                Ok(moved) => {
                    released = true;
                    if moved {
                        emit_seats_released(self.publisher.as_ref(), &self.inventory, booking).await;
                    }
                }
                Err(e) => {
                    tracing::error!("Could not release seats for failed booking {}: {}", booking.id, e);
                }
            }
        }
        let manager = self.manager;
        self.commit(booking, |b| {
            // a cancellation already settled seats and status
            if b.booking_status == BookingStatus::Cancelled {
                return Ok(());
            }
            if b.payment_status != PaymentStatus::Failed {
                manager.fail_attempt(b)?;
            }
            if released {
                b.seats_held = false;
            }
            Ok(())
        })
        .await
    }

    async fn publish_confirmed(&self, booking: &Booking) {
        emit(
            self.publisher.as_ref(),
            DomainEvent::BookingConfirmed(BookingConfirmedEvent {
                booking_id: booking.id,
                trip_id: booking.trip_id,
                passenger_id: booking.passenger_id,
                amount_cents: booking.captured_cents,
                timestamp: timestamp(),
            }),
        )
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_provider::MockOutcome;
    use crate::testing::Fixture;
    use ridepool_core::PaymentErrorKind;

    #[tokio::test]
    async fn test_full_payment_flow() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.reserve(2).await;

        let order = fx.orchestrator.start_payment(booking.id).await.unwrap();
        assert!(order.approval_url.contains(&order.order_id));
        // asking again returns the same pending order
        let again = fx.orchestrator.start_payment(booking.id).await.unwrap();
        assert_eq!(order, again);
        assert_eq!(fx.provider.call_count("create"), 1);

        fx.orchestrator.mark_authorized(booking.id).await.unwrap();
        let captured = fx.orchestrator.capture(booking.id).await.unwrap();
        assert_eq!(captured.payment_status, PaymentStatus::Captured);
        assert_eq!(captured.booking_status, BookingStatus::Confirmed);
        assert_eq!(captured.captured_cents, 4000);
        assert_eq!(captured.platform_fee_cents, 480);
        assert_eq!(captured.payee_cents, 3520);
    }

    #[tokio::test]
    async fn test_capture_failure_releases_seats() {
        let fx = Fixture::new(3, 2000).await;
        let booking = fx.reserve(2).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();
        fx.orchestrator.mark_authorized(booking.id).await.unwrap();
        fx.provider
            .script_capture(MockOutcome::Fail(ProviderError::Transient("502".into())));

        let err = fx.orchestrator.capture(booking.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Payment { kind: PaymentErrorKind::Transient, .. }));
        // capture is not retried
        assert_eq!(fx.provider.call_count("capture"), 1);

        let stored = fx.booking(booking.id).await;
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
        assert_eq!(stored.booking_status, BookingStatus::Pending);
        assert!(!stored.seats_held);
        assert_eq!(fx.available().await, 3);
    }

    #[tokio::test]
    async fn test_capture_timeout_is_a_failure() {
        let fx = Fixture::with_settings(
            2,
            1500,
            PaymentSettings {
                call_timeout_ms: 20,
                ..PaymentSettings::default()
            },
        )
        .await;
        let booking = fx.reserve(1).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();
        fx.orchestrator.mark_authorized(booking.id).await.unwrap();
        fx.provider.script_capture(MockOutcome::Delay(Duration::from_millis(500)));

        assert!(fx.orchestrator.capture(booking.id).await.is_err());
        assert_eq!(fx.available().await, 2);
    }

    #[tokio::test]
    async fn test_create_retries_with_same_key() {
        let fx = Fixture::with_settings(
            2,
            1500,
            PaymentSettings {
                backoff_base_ms: 1,
                ..PaymentSettings::default()
            },
        )
        .await;
        let booking = fx.reserve(1).await;
        fx.provider
            .script_create(MockOutcome::Fail(ProviderError::Transient("reset".into())));
        fx.provider
            .script_create(MockOutcome::Fail(ProviderError::ProviderDown("503".into())));

        fx.orchestrator.start_payment(booking.id).await.unwrap();
        let calls = fx.provider.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c == &calls[0]));
    }

    #[tokio::test]
    async fn test_declined_create_is_not_retried() {
        let fx = Fixture::new(2, 1500).await;
        let booking = fx.reserve(2).await;
        fx.provider
            .script_create(MockOutcome::Fail(ProviderError::Declined("limit".into())));

        assert!(fx.orchestrator.start_payment(booking.id).await.is_err());
        assert_eq!(fx.provider.call_count("create"), 1);
        assert_eq!(fx.booking(booking.id).await.payment_status, PaymentStatus::Failed);
        assert_eq!(fx.available().await, 2);
    }

    #[tokio::test]
    async fn test_pending_capture_waits_for_confirmation() {
        let fx = Fixture::new(2, 1500).await;
        fx.provider.set_capture_state(CaptureState::Pending);
        let booking = fx.reserve(1).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();
        fx.orchestrator.mark_authorized(booking.id).await.unwrap();

        let captured = fx.orchestrator.capture(booking.id).await.unwrap();
        assert_eq!(captured.payment_status, PaymentStatus::Captured);
        assert_eq!(captured.booking_status, BookingStatus::Pending);

        let confirmed = fx.orchestrator.confirm_capture(booking.id).await.unwrap();
        assert_eq!(confirmed.booking_status, BookingStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_refund_failure_parks_booking() {
        let fx = Fixture::with_settings(
            2,
            1500,
            PaymentSettings {
                max_retries: 1,
                backoff_base_ms: 1,
                ..PaymentSettings::default()
            },
        )
        .await;
        let mut booking = fx.paid(1).await;
        fx.provider
            .script_refund(MockOutcome::Fail(ProviderError::ProviderDown("503".into())));
        fx.provider
            .script_refund(MockOutcome::Fail(ProviderError::ProviderDown("503".into())));

        assert!(fx.orchestrator.refund(&mut booking, 1500).await.is_err());
        assert_eq!(booking.payment_status, PaymentStatus::RefundFailed);
        assert_eq!(fx.provider.call_count("refund"), 2);

        // reconciliation succeeds later
        fx.orchestrator.refund(&mut booking, 1500).await.unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);
        assert!(fx.publisher.topics().contains(&"payment.refund_failed"));
    }

    #[tokio::test]
    async fn test_partial_refund_keeps_captured() {
        let fx = Fixture::new(2, 2000).await;
        let mut booking = fx.paid(2).await;
        fx.orchestrator.refund(&mut booking, 1000).await.unwrap();
        assert_eq!(booking.payment_status, PaymentStatus::Captured);
        assert_eq!(booking.refundable_cents(), 3000);
        assert!(fx.orchestrator.refund(&mut booking, 5000).await.is_err());
    }

    #[tokio::test]
    async fn test_capture_rejected_after_cancel() {
        let fx = Fixture::new(2, 1500).await;
        let booking = fx.reserve(1).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();
        fx.orchestrator.mark_authorized(booking.id).await.unwrap();
        let mut stored = fx.booking(booking.id).await;
        stored.booking_status = BookingStatus::Cancelled;
        fx.bookings.update_booking(&stored).await.unwrap();

        assert!(matches!(
            fx.orchestrator.capture(booking.id).await,
            Err(CoreError::InvalidTransition { .. })
        ));
        assert_eq!(fx.provider.call_count("capture"), 0);
    }

    #[tokio::test]
    async fn test_refund_retry_reuses_idempotency_key() {
        let fx = Fixture::with_settings(
            2,
            1500,
            PaymentSettings {
                call_timeout_ms: 20,
                max_retries: 0,
                ..PaymentSettings::default()
            },
        )
        .await;
        let mut booking = fx.paid(1).await;
        fx.provider.script_refund(MockOutcome::Delay(Duration::from_millis(500)));

        assert!(fx.orchestrator.refund(&mut booking, 1500).await.is_err());
        assert_eq!(booking.payment_status, PaymentStatus::RefundFailed);
        assert_eq!(booking.refund_seq, 0);

        fx.orchestrator.refund(&mut booking, 1500).await.unwrap();
        let calls = fx.provider.calls();
        let refunds: Vec<_> = calls.iter().filter(|c| c.starts_with("refund:")).collect();
        assert_eq!(refunds.len(), 2);
        assert_eq!(refunds[0], refunds[1]);
        assert_eq!(booking.refund_seq, 1);
        assert_eq!(booking.payment_status, PaymentStatus::Refunded);

        // the next refund gets a fresh key
        let stored = fx.booking(booking.id).await;
        assert_eq!(stored.refund_seq, 1);
        assert_eq!(stored.refunded_cents, 1500);
    }

    #[tokio::test]
    async fn test_capture_refunds_amount_lowered_before_capture() {
        let fx = Fixture::new(2, 2000).await;
        let booking = fx.reserve(1).await;
        fx.orchestrator.start_payment(booking.id).await.unwrap();
        fx.orchestrator.mark_authorized(booking.id).await.unwrap();
        let mut lowered = fx.booking(booking.id).await;
        lowered.amount_due_cents = 1200;
        fx.bookings.update_booking(&lowered).await.unwrap();

        let captured = fx.orchestrator.capture(booking.id).await.unwrap();
        assert_eq!(captured.captured_cents, 2000);
        assert_eq!(captured.refunded_cents, 800);
        assert_eq!(captured.payment_status, PaymentStatus::Captured);
        assert_eq!(captured.booking_status, BookingStatus::Confirmed);
        assert_eq!(fx.booking(booking.id).await.refundable_cents(), 1200);
    }
}
