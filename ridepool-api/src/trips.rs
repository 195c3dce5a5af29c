use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ridepool_order::TripCancellation;
use ridepool_shared::{Booking, Trip, User};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/trips/{id}", get(get_trip))
        .route("/v1/trips/{id}/publish", post(publish))
        .route("/v1/trips/{id}/cancel", post(cancel))
        .route("/v1/trips/{id}/bookings", post(book).get(list_bookings))
}

/// Identifies the acting user by their chat-surface key.
#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub user: String,
}

#[derive(Debug, Deserialize)]
pub struct BookRequest {
    pub user: String,
    pub seats: i32,
}

#[derive(Debug, Serialize)]
pub struct TripView {
    #[serde(flatten)]
    pub trip: Trip,
    pub seats_booked: i32,
    pub summary: String,
}

impl From<Trip> for TripView {
    fn from(trip: Trip) -> Self {
        Self {
            seats_booked: trip.seats_booked(),
            summary: trip.summary(),
            trip,
        }
    }
}

/// Resolves an acting user, refusing disabled accounts.
pub(crate) async fn actor(state: &AppState, user: &str) -> Result<User, AppError> {
    if user.trim().is_empty() {
        return Err(AppError::BadRequest("user is required".to_string()));
    }
    let user = state.users.get_or_create(user).await?;
    if user.disabled {
        return Err(ridepool_wizard::WizardError::Disabled(user.external_id).into());
    }
    Ok(user)
}

async fn get_trip(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<TripView>, AppError> {
    Ok(Json(state.trips.get(id).await?.into()))
}

async fn publish(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<TripView>, AppError> {
    let owner = actor(&state, &request.user).await?;
    let trip = state.trips.publish(id, owner.id).await?;
    Ok(Json(trip.into()))
}

async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ActorRequest>,
) -> Result<Json<TripCancellation>, AppError> {
    let owner = actor(&state, &request.user).await?;
    let outcome = state.trips.cancel_trip(id, owner.id).await?;
    info!("Trip {} cancelled with {} bookings", id, outcome.bookings.len());
    Ok(Json(outcome))
}

async fn book(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<BookRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let passenger = actor(&state, &request.user).await?;
    let booking = state.bookings.reserve(id, passenger.id, request.seats).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.list_for_trip(id).await?))
}
