use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::State, routing::post, Json, Router};
use ridepool_core::CoreError;
use ridepool_shared::{Booking, BookingStatus, PaymentStatus};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    pub event_type: String,
    pub resource: WebhookResource,
}

#[derive(Debug, Deserialize)]
pub struct WebhookResource {
    pub id: String,
    pub custom_id: Option<String>,
    #[serde(default)]
    pub purchase_units: Vec<PurchaseUnitRef>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseUnitRef {
    pub reference_id: Option<String>,
    pub custom_id: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WebhookStatus {
    Processed,
    /// Already applied, or an event type we do not act on.
    Ignored,
    /// The provider call failed; the booking records the failed attempt.
    PaymentFailed,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: WebhookStatus,
    pub booking_id: Uuid,
    pub payment_status: PaymentStatus,
}

impl WebhookResource {
    /// Orders carry the booking id as `custom_id` (captures) or on the
    /// purchase unit (orders).
    fn booking_id(&self) -> Result<Uuid, AppError> {
        let unit = self.purchase_units.first();
        let raw = self
            .custom_id
            .as_deref()
            .or_else(|| unit.and_then(|u| u.custom_id.as_deref()))
            .or_else(|| unit.and_then(|u| u.reference_id.as_deref()))
            .ok_or_else(|| AppError::BadRequest(format!("resource {} carries no booking reference", self.id)))?;
        Uuid::parse_str(raw).map_err(|_| AppError::BadRequest(format!("invalid booking reference '{}'", raw)))
    }
}

fn ack(status: WebhookStatus, booking: &Booking) -> Json<WebhookAck> {
    Json(WebhookAck {
        status,
        booking_id: booking.id,
        payment_status: booking.payment_status,
    })
}

/// POST /v1/webhooks/payments
/// Approval and capture notifications from the payment provider. Replays
/// are acknowledged without side effects.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<WebhookAck>, AppError> {
    let booking_id = payload.resource.booking_id()?;
    info!(
        "Received webhook {} ({}) for booking {}",
        payload.id, payload.event_type, booking_id
    );
    let booking = state.bookings.get_booking(booking_id).await?;

    let result = match payload.event_type.as_str() {
        "CHECKOUT.ORDER.APPROVED" => match booking.payment_status {
            PaymentStatus::Pending => match state.bookings.authorize(booking_id).await {
                Ok(_) => state.bookings.capture(booking_id).await,
                Err(e) => Err(e),
            },
            PaymentStatus::Authorized => state.bookings.capture(booking_id).await,
            _ => return Ok(ack(WebhookStatus::Ignored, &booking)),
        },
        "PAYMENT.CAPTURE.COMPLETED" => {
            if booking.booking_status == BookingStatus::Pending && booking.payment_status == PaymentStatus::Captured {
                state.bookings.confirm_capture(booking_id).await
            } else {
                return Ok(ack(WebhookStatus::Ignored, &booking));
            }
        }
        other => {
            warn!("Ignoring payment webhook type {}", other);
            return Ok(ack(WebhookStatus::Ignored, &booking));
        }
    };

    match result {
        Ok(updated) => Ok(ack(WebhookStatus::Processed, &updated)),
        // Acknowledge so the provider stops redelivering; the attempt is recorded.
        Err(CoreError::Payment { message, .. }) => {
            warn!("Payment step for booking {} failed: {}", booking_id, message);
            let current = state.bookings.get_booking(booking_id).await?;
            Ok(ack(WebhookStatus::PaymentFailed, &current))
        }
        Err(e) => Err(e.into()),
    }
}
