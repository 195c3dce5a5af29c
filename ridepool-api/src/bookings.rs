use crate::error::AppError;
use crate::state::AppState;
use crate::trips::{actor, ActorRequest};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use ridepool_core::payment::ProviderOrder;
use ridepool_order::CancellationOutcome;
use ridepool_shared::{Booking, PaymentStatus};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/{id}", get(get_booking))
        .route("/v1/bookings/{id}/pay", post(pay))
        .route("/v1/bookings/{id}/capture", post(capture))
        .route("/v1/bookings/{id}/cancel", post(cancel))
}

#[derive(Debug, Serialize)]
pub struct PaymentView {
    pub booking_id: Uuid,
    pub attempt: u32,
    #[serde(flatten)]
    pub order: ProviderOrder,
}

async fn get_booking(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Booking>, AppError> {
    Ok(Json(state.bookings.get_booking(id).await?))
}

/// Opens a provider order for the booking. A booking whose last attempt
/// failed starts a fresh attempt first.
async fn pay(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PaymentView>, AppError> {
    let booking = state.bookings.get_booking(id).await?;
    if booking.payment_status == PaymentStatus::Failed {
        info!("Booking {} retrying payment after failed attempt {}", id, booking.attempt);
        state.bookings.retry_payment(id).await?;
    }
    let order = state.bookings.start_payment(id).await?;
    let booking = state.bookings.get_booking(id).await?;
    Ok(Json(PaymentView {
        booking_id: id,
        attempt: booking.attempt,
        order,
    }))
}

/// Captures after the payer approved. Approval is recorded first when the
/// provider's webhook has not arrived yet.
async fn capture(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.get_booking(id).await?;
    if booking.payment_status == PaymentStatus::Pending {
        state.bookings.authorize(id).await?;
    }
    Ok(Json(state.bookings.capture(id).await?))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<CancellationOutcome>, AppError> {
    let user = actor(&state, &request.user).await?;
    Ok(Json(state.bookings.cancel(id, user.id).await?))
}
