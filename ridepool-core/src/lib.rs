pub mod clock;
pub mod events;
pub mod locality;
pub mod memory;
pub mod payment;
pub mod repository;
pub mod routing;

use serde::Serialize;
use uuid::Uuid;

/// Coarse classification of a failed payment-provider interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorKind {
    /// Network ambiguity or a 5xx the provider asks us to retry.
    Transient,
    /// The provider refused the instrument or the amount.
    Declined,
    /// Provider unreachable or timing out.
    ProviderDown,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Insufficient seats: requested {requested}, available {available}")]
    InsufficientSeats { requested: i32, available: i32 },
    #[error("Payment error ({kind:?}): {message}")]
    Payment { kind: PaymentErrorKind, message: String },
    #[error("Inventory conflict on trip {0}")]
    InventoryConflict(Uuid),
    #[error("Booking {0} was changed concurrently")]
    BookingConflict(Uuid),
    #[error("Session expired")]
    SessionExpired,
    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Internal service error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        CoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        CoreError::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    /// Whether the caller may retry the same operation unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            CoreError::InventoryConflict(_) | CoreError::BookingConflict(_) => true,
            CoreError::Payment { kind, .. } => {
                matches!(kind, PaymentErrorKind::Transient | PaymentErrorKind::ProviderDown)
            }
            _ => false,
        }
    }
}

impl From<ridepool_shared::PaymentTransitionError> for CoreError {
    fn from(err: ridepool_shared::PaymentTransitionError) -> Self {
        CoreError::invalid_transition(err.from, err.to)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(CoreError::InventoryConflict(Uuid::new_v4()).is_retryable());
        assert!(CoreError::BookingConflict(Uuid::new_v4()).is_retryable());
        assert!(CoreError::Payment {
            kind: PaymentErrorKind::ProviderDown,
            message: "down".into()
        }
        .is_retryable());
        assert!(!CoreError::Payment {
            kind: PaymentErrorKind::Declined,
            message: "no".into()
        }
        .is_retryable());
        assert!(!CoreError::InsufficientSeats { requested: 2, available: 1 }.is_retryable());
        assert!(!CoreError::Validation("bad".into()).is_retryable());
    }
}
