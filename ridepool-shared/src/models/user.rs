use crate::pii::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    /// Identifier on the chat surface the user talks through.
    pub external_id: String,
    pub display_name: Option<String>,
    pub is_driver: bool,
    pub is_passenger: bool,
    /// Payout account (PayPal email) for drivers.
    pub payment_account: Option<Masked<String>>,
    pub rating_sum: i64,
    pub rating_count: i64,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(external_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            display_name: None,
            is_driver: false,
            is_passenger: true,
            payment_account: None,
            rating_sum: 0,
            rating_count: 0,
            disabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn average_rating(&self) -> Option<f64> {
        if self.rating_count == 0 {
            None
        } else {
            Some(self.rating_sum as f64 / self.rating_count as f64)
        }
    }

    pub fn can_receive_payouts(&self) -> bool {
        self.is_driver && self.payment_account.is_some() && !self.disabled
    }
}
