//! Price-split policy for shared trips.
//!
//! The policy only decides the new per-seat price. Applying it (audit record,
//! amount updates, refunds) happens in the booking layer.

use ridepool_shared::{money, Booking, BookingStatus, PaymentStatus, Trip};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub trait RepricingPolicy: Send + Sync {
    /// New per-seat price for `trip` given its bookings, or `None` to keep
    /// the current one.
    fn reprice(&self, trip: &Trip, bookings: &[Booking]) -> Option<i64>;

    /// Refunds below this amount are not issued.
    fn min_refund_cents(&self) -> i64;
}

/// Never changes prices.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRepricing;

impl RepricingPolicy for NoRepricing {
    fn reprice(&self, _trip: &Trip, _bookings: &[Booking]) -> Option<i64> {
        None
    }

    fn min_refund_cents(&self) -> i64 {
        i64::MAX
    }
}

/// Splits the listed per-seat price across the paying passengers (distinct
/// confirmed bookings) once there are at least `min_passengers` of them.
/// A booking with several seats counts once. Prices only go down.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitCostPolicy {
    pub min_passengers: i32,
    pub min_refund_cents: i64,
    pub rounding_step_cents: i64,
}

impl Default for SplitCostPolicy {
    fn default() -> Self {
        Self {
            min_passengers: 2,
            min_refund_cents: 5,
            rounding_step_cents: money::DEFAULT_STEP_CENTS,
        }
    }
}

/// Confirmed bookings of `trip` that still hold their seats.
pub fn paying_passengers(trip: &Trip, bookings: &[Booking]) -> i32 {
    bookings
        .iter()
        .filter(|b| b.trip_id == trip.id && b.booking_status == BookingStatus::Confirmed && b.holds_seats())
        .count() as i32
}

impl RepricingPolicy for SplitCostPolicy {
    fn reprice(&self, trip: &Trip, bookings: &[Booking]) -> Option<i64> {
        let passengers = paying_passengers(trip, bookings);
        if passengers < self.min_passengers.max(1) {
            return None;
        }
        let split = money::split_ceil(trip.base_price_per_seat_cents, passengers as i64, self.rounding_step_cents);
        if split < trip.price_per_seat_cents {
            Some(split)
        } else {
            None
        }
    }

    fn min_refund_cents(&self) -> i64 {
        self.min_refund_cents
    }
}

/// Money owed back to one booking after a price drop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefundInstruction {
    pub booking_id: Uuid,
    pub new_amount_due_cents: i64,
    pub refund_cents: i64,
}

/// Lowers `amount_due` to `new_price * seats` for every booking that still
/// holds seats. Captured bookings get back what they paid net of earlier
/// refunds above the new amount; pending ones just have `amount_due`
/// lowered and settle the difference at capture.
pub fn refund_instructions(bookings: &[Booking], new_price_cents: i64, min_refund_cents: i64) -> Vec<RefundInstruction> {
    bookings
        .iter()
        .filter(|b| b.holds_seats() && b.seats_booked > 0)
        .filter_map(|b| {
            let new_amount = new_price_cents * b.seats_booked as i64;
            let refund = if b.payment_status == PaymentStatus::Captured {
                let excess = b.refundable_cents() - new_amount;
                if excess <= 0 || excess < min_refund_cents {
                    return None;
                }
                excess
            } else if new_amount >= b.amount_due_cents {
                return None;
            } else {
                0
            };
            Some(RefundInstruction {
                booking_id: b.id,
                new_amount_due_cents: new_amount.min(b.amount_due_cents),
                refund_cents: refund,
            })
        })
        .collect()
}
