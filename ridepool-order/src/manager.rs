use chrono::Utc;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::{Booking, BookingStatus, PaymentStatus};

/// Booking-status transitions. Payment-status moves live on `Booking` itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct BookingManager;

impl BookingManager {
    pub fn new() -> Self {
        Self
    }

    /// Pending -> Confirmed, only once funds are captured.
    pub fn confirm(&self, booking: &mut Booking) -> CoreResult<()> {
        if booking.booking_status != BookingStatus::Pending {
            return Err(CoreError::invalid_transition(booking.booking_status, BookingStatus::Confirmed));
        }
        if booking.payment_status != PaymentStatus::Captured {
            return Err(CoreError::invalid_transition(booking.payment_status, BookingStatus::Confirmed));
        }
        let now = Utc::now();
        booking.booking_status = BookingStatus::Confirmed;
        booking.confirmed_at = Some(now);
        booking.updated_at = now;
        Ok(())
    }

    /// Pending | Confirmed -> Cancelled.
    pub fn cancel(&self, booking: &mut Booking) -> CoreResult<()> {
        if booking.booking_status == BookingStatus::Cancelled {
            return Err(CoreError::invalid_transition(booking.booking_status, BookingStatus::Cancelled));
        }
        booking.booking_status = BookingStatus::Cancelled;
        booking.seats_held = false;
        booking.updated_at = Utc::now();
        Ok(())
    }

    /// Marks the current attempt failed. The booking stays pending so the
    /// passenger can retry; releasing the seats is up to the caller.
    pub fn fail_attempt(&self, booking: &mut Booking) -> CoreResult<()> {
        booking.transition_payment(PaymentStatus::Failed)?;
        booking.booking_status = BookingStatus::Pending;
        Ok(())
    }

    /// Starts a fresh payment attempt after a failure.
    pub fn restart_attempt(&self, booking: &mut Booking) -> CoreResult<()> {
        if booking.booking_status != BookingStatus::Pending {
            return Err(CoreError::invalid_transition(booking.booking_status, "retry"));
        }
        if booking.payment_status != PaymentStatus::Failed {
            return Err(CoreError::invalid_transition(booking.payment_status, PaymentStatus::None));
        }
        booking.payment_status = PaymentStatus::None;
        booking.provider_order_id = None;
        booking.approval_url = None;
        booking.capture_id = None;
        booking.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn booking() -> Booking {
        let mut b = Booking::new(Uuid::new_v4(), Uuid::new_v4(), 1, 1500, "CHF");
        b.seats_held = true;
        b
    }

    #[test]
    fn test_confirm_requires_capture() {
        let manager = BookingManager::new();
        let mut b = booking();
        assert!(manager.confirm(&mut b).is_err());

        b.payment_status = PaymentStatus::Captured;
        manager.confirm(&mut b).unwrap();
        assert_eq!(b.booking_status, BookingStatus::Confirmed);
        assert!(b.confirmed_at.is_some());
    }

    #[test]
    fn test_cancel_only_once() {
        let manager = BookingManager::new();
        let mut b = booking();
        manager.cancel(&mut b).unwrap();
        assert!(!b.seats_held);
        assert!(matches!(manager.cancel(&mut b), Err(CoreError::InvalidTransition { .. })));
    }

    #[test]
    fn test_failed_attempt_can_restart() {
        let manager = BookingManager::new();
        let mut b = booking();
        b.payment_status = PaymentStatus::Pending;
        manager.fail_attempt(&mut b).unwrap();
        assert_eq!(b.payment_status, PaymentStatus::Failed);
        assert_eq!(b.booking_status, BookingStatus::Pending);

        manager.restart_attempt(&mut b).unwrap();
        assert_eq!(b.payment_status, PaymentStatus::None);
    }

    #[test]
    fn test_captured_cannot_fail() {
        let manager = BookingManager::new();
        let mut b = booking();
        b.payment_status = PaymentStatus::Captured;
        assert!(manager.fail_attempt(&mut b).is_err());
    }
}
