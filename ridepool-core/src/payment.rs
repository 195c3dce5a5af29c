use crate::{CoreError, PaymentErrorKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub description: String,
    /// Forwarded to the provider so a replayed call returns the same order.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderOrder {
    pub order_id: String,
    /// Where the payer approves the order.
    pub approval_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureState {
    Completed,
    /// Funds captured but the provider has not settled yet.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureResult {
    pub capture_id: String,
    pub state: CaptureState,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RefundResult {
    pub refund_id: String,
    pub amount_cents: i64,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Transient provider failure: {0}")]
    Transient(String),
    #[error("Payment declined: {0}")]
    Declined(String),
    #[error("Payment provider unavailable: {0}")]
    ProviderDown(String),
    #[error("Payment provider call timed out")]
    Timeout,
}

impl ProviderError {
    pub fn kind(&self) -> PaymentErrorKind {
        match self {
            ProviderError::Transient(_) => PaymentErrorKind::Transient,
            ProviderError::Declined(_) => PaymentErrorKind::Declined,
            ProviderError::ProviderDown(_) | ProviderError::Timeout => PaymentErrorKind::ProviderDown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Declined(_))
    }
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        CoreError::Payment {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// External payment provider (PayPal-style orders API).
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<ProviderOrder, ProviderError>;

    async fn capture(&self, order_id: &str, idempotency_key: &str) -> Result<CaptureResult, ProviderError>;

    async fn refund(
        &self,
        capture_id: &str,
        amount_cents: i64,
        currency: &str,
        idempotency_key: &str,
    ) -> Result<RefundResult, ProviderError>;
}

pub fn create_key(booking_id: Uuid, attempt: u32) -> String {
    format!("{}:{}:create", booking_id, attempt)
}

pub fn capture_key(booking_id: Uuid, attempt: u32) -> String {
    format!("{}:{}:capture", booking_id, attempt)
}

pub fn refund_key(booking_id: Uuid, seq: u32) -> String {
    format!("{}:refund:{}", booking_id, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(ProviderError::Timeout.kind(), PaymentErrorKind::ProviderDown);
        assert!(!ProviderError::Declined("card".into()).is_retryable());
        let core: CoreError = ProviderError::Transient("502".into()).into();
        assert!(core.is_retryable());
    }

    #[test]
    fn test_keys_are_scoped_to_attempt() {
        let id = Uuid::new_v4();
        assert_ne!(create_key(id, 1), create_key(id, 2));
        assert_eq!(refund_key(id, 3), format!("{}:refund:3", id));
    }
}
