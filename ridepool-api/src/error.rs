use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ridepool_core::{CoreError, PaymentErrorKind};
use ridepool_wizard::WizardError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Wizard(#[from] WizardError),
}

fn core_status(err: &CoreError) -> (StatusCode, &'static str) {
    match err {
        CoreError::Validation(_) => (StatusCode::BAD_REQUEST, "validation"),
        CoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        CoreError::InsufficientSeats { .. } => (StatusCode::CONFLICT, "insufficient_seats"),
        CoreError::InventoryConflict(_) => (StatusCode::CONFLICT, "inventory_conflict"),
        CoreError::BookingConflict(_) => (StatusCode::CONFLICT, "booking_conflict"),
        CoreError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        CoreError::Payment {
            kind: PaymentErrorKind::Declined,
            ..
        } => (StatusCode::PAYMENT_REQUIRED, "payment_declined"),
        CoreError::Payment { .. } => (StatusCode::SERVICE_UNAVAILABLE, "payment_unavailable"),
        CoreError::SessionExpired => (StatusCode::GONE, "session_expired"),
        CoreError::Storage(_) | CoreError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, retryable) = match &self {
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "validation", false),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", false),
            AppError::Wizard(WizardError::DuplicateEvent { .. }) => (StatusCode::CONFLICT, "duplicate_event", false),
            AppError::Wizard(WizardError::Disabled(_)) => (StatusCode::FORBIDDEN, "user_disabled", false),
            AppError::Wizard(WizardError::Core(e)) | AppError::Core(e) => {
                let (status, code) = core_status(e);
                (status, code, e.is_retryable())
            }
        };

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal Server Error: {}", self);
            "Internal Server Error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "retryable": retryable,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn status(err: impl Into<AppError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status(CoreError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status(CoreError::not_found("trip", Uuid::nil())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(CoreError::InsufficientSeats {
                requested: 3,
                available: 1
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(CoreError::InventoryConflict(Uuid::nil())), StatusCode::CONFLICT);
        assert_eq!(status(CoreError::BookingConflict(Uuid::nil())), StatusCode::CONFLICT);
        assert_eq!(
            status(CoreError::Payment {
                kind: PaymentErrorKind::Declined,
                message: "card".into()
            }),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            status(CoreError::Payment {
                kind: PaymentErrorKind::ProviderDown,
                message: "down".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(status(CoreError::SessionExpired), StatusCode::GONE);
        assert_eq!(status(CoreError::Storage("pool".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status(WizardError::DuplicateEvent { expected: 2, got: 1 }),
            StatusCode::CONFLICT
        );
        assert_eq!(status(WizardError::Disabled("u".into())), StatusCode::FORBIDDEN);
        assert_eq!(
            status(WizardError::Core(CoreError::Validation("x".into()))),
            StatusCode::BAD_REQUEST
        );
    }
}
