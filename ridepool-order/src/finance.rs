use ridepool_shared::{Booking, BookingStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommissionSplit {
    pub platform_fee_cents: i64,
    pub payee_cents: i64,
}

/// Commission and payout arithmetic.
#[derive(Debug, Clone)]
pub struct FinancialManager {
    fee_rate: f64,
}

impl FinancialManager {
    pub fn new(fee_rate: f64) -> Self {
        Self {
            fee_rate: fee_rate.clamp(0.0, 1.0),
        }
    }

    pub fn fee_rate(&self) -> f64 {
        self.fee_rate
    }

    pub fn split(&self, amount_cents: i64) -> CommissionSplit {
        let fee = (amount_cents as f64 * self.fee_rate).round() as i64;
        CommissionSplit {
            platform_fee_cents: fee,
            payee_cents: amount_cents - fee,
        }
    }

    /// Net amount owed to the driver across confirmed bookings, after refunds.
    pub fn driver_payout(&self, bookings: &[Booking]) -> i64 {
        bookings
            .iter()
            .filter(|b| b.booking_status == BookingStatus::Confirmed)
            .map(|b| self.split(b.captured_cents - b.refunded_cents).payee_cents)
            .sum()
    }
}

impl Default for FinancialManager {
    fn default() -> Self {
        Self::new(0.12)
    }
}
