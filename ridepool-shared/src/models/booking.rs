use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(BookingStatus::Pending),
            "CONFIRMED" => Some(BookingStatus::Confirmed),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }
}

/// Payment lifecycle of a single booking.
///
/// ```text
/// None -> Pending -> Authorized -> Captured -> Refunded
///   \        \           \            \
///    +--------+-----------+-> Failed   +-> RefundFailed -> Refunded
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    None,
    Pending,
    Authorized,
    Captured,
    Refunded,
    Failed,
    RefundFailed,
}

impl PaymentStatus {
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (None, Pending)
                | (None, Failed)
                | (Pending, Authorized)
                | (Pending, Failed)
                | (Authorized, Captured)
                | (Authorized, Failed)
                | (Captured, Refunded)
                | (Captured, RefundFailed)
                | (RefundFailed, Refunded)
                | (RefundFailed, RefundFailed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Refunded | PaymentStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::None => "NONE",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Captured => "CAPTURED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::RefundFailed => "REFUND_FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(PaymentStatus::None),
            "PENDING" => Some(PaymentStatus::Pending),
            "AUTHORIZED" => Some(PaymentStatus::Authorized),
            "CAPTURED" => Some(PaymentStatus::Captured),
            "REFUNDED" => Some(PaymentStatus::Refunded),
            "FAILED" => Some(PaymentStatus::Failed),
            "REFUND_FAILED" => Some(PaymentStatus::RefundFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid payment transition from {from:?} to {to:?}")]
pub struct PaymentTransitionError {
    pub from: PaymentStatus,
    pub to: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub passenger_id: Uuid,
    pub seats_booked: i32,
    pub amount_due_cents: i64,
    pub currency: String,
    pub booking_status: BookingStatus,
    pub payment_status: PaymentStatus,
    /// True while this booking's seats are counted against the trip.
    pub seats_held: bool,
    /// Payment attempt counter; part of every idempotency key.
    pub attempt: u32,
    pub provider_order_id: Option<String>,
    pub approval_url: Option<String>,
    pub capture_id: Option<String>,
    pub captured_cents: i64,
    pub refunded_cents: i64,
    pub refund_seq: u32,
    pub platform_fee_cents: i64,
    pub payee_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    /// Bumped by every stored write; conditional writes compare against it.
    #[serde(default)]
    pub version: i64,
}

impl Booking {
    pub fn new(
        trip_id: Uuid,
        passenger_id: Uuid,
        seats_booked: i32,
        price_per_seat_cents: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            trip_id,
            passenger_id,
            seats_booked,
            amount_due_cents: price_per_seat_cents * seats_booked as i64,
            currency: currency.into(),
            booking_status: BookingStatus::Pending,
            payment_status: PaymentStatus::None,
            seats_held: false,
            attempt: 0,
            provider_order_id: None,
            approval_url: None,
            capture_id: None,
            captured_cents: 0,
            refunded_cents: 0,
            refund_seq: 0,
            platform_fee_cents: 0,
            payee_cents: 0,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            version: 0,
        }
    }

    /// Whether this booking currently counts against the trip's seats.
    pub fn holds_seats(&self) -> bool {
        self.seats_held && self.booking_status != BookingStatus::Cancelled
    }

    /// Captured money not yet refunded.
    pub fn refundable_cents(&self) -> i64 {
        (self.captured_cents - self.refunded_cents).max(0)
    }

    pub fn transition_payment(&mut self, next: PaymentStatus) -> Result<(), PaymentTransitionError> {
        if !self.payment_status.can_transition_to(next) {
            return Err(PaymentTransitionError {
                from: self.payment_status,
                to: next,
            });
        }
        self.payment_status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a capture the provider completed after this attempt was
    /// already given up, so the money can be refunded.
    pub fn record_late_capture(&mut self, capture_id: String, amount_cents: i64) -> Result<(), PaymentTransitionError> {
        if !matches!(self.payment_status, PaymentStatus::Failed | PaymentStatus::Authorized) {
            return Err(PaymentTransitionError {
                from: self.payment_status,
                to: PaymentStatus::Captured,
            });
        }
        self.payment_status = PaymentStatus::Captured;
        self.capture_id = Some(capture_id);
        self.captured_cents = amount_cents;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut b = Booking::new(Uuid::new_v4(), Uuid::new_v4(), 2, 1500, "CHF");
        assert_eq!(b.amount_due_cents, 3000);
        b.transition_payment(PaymentStatus::Pending).unwrap();
        b.transition_payment(PaymentStatus::Authorized).unwrap();
        b.transition_payment(PaymentStatus::Captured).unwrap();
        b.transition_payment(PaymentStatus::Refunded).unwrap();
        assert!(b.payment_status.is_terminal());
    }

    #[test]
    fn test_rejects_skipping_states() {
        let mut b = Booking::new(Uuid::new_v4(), Uuid::new_v4(), 1, 1000, "CHF");
        let err = b.transition_payment(PaymentStatus::Captured).unwrap_err();
        assert_eq!(err.from, PaymentStatus::None);
        assert_eq!(err.to, PaymentStatus::Captured);

        b.payment_status = PaymentStatus::Failed;
        assert!(b.transition_payment(PaymentStatus::Pending).is_err());
        b.payment_status = PaymentStatus::Refunded;
        assert!(b.transition_payment(PaymentStatus::Captured).is_err());
    }

    #[test]
    fn test_refund_failed_can_recover() {
        assert!(PaymentStatus::Captured.can_transition_to(PaymentStatus::RefundFailed));
        assert!(PaymentStatus::RefundFailed.can_transition_to(PaymentStatus::Refunded));
        assert!(!PaymentStatus::RefundFailed.can_transition_to(PaymentStatus::Captured));
    }

    #[test]
    fn test_late_capture_only_on_abandoned_attempt() {
        let mut b = Booking::new(Uuid::new_v4(), Uuid::new_v4(), 1, 1000, "CHF");
        b.payment_status = PaymentStatus::Failed;
        b.record_late_capture("CAP-1".into(), 1000).unwrap();
        assert_eq!(b.payment_status, PaymentStatus::Captured);
        assert_eq!(b.refundable_cents(), 1000);

        b.payment_status = PaymentStatus::Refunded;
        assert!(b.record_late_capture("CAP-2".into(), 1000).is_err());
    }
}
