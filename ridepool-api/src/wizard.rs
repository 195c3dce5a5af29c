use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use ridepool_wizard::{Reply, UserEvent};
use serde::Deserialize;
use uuid::Uuid;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/wizard/{user}", get(current).delete(abandon))
        .route("/v1/wizard/{user}/start", post(start))
        .route("/v1/wizard/{user}/events", post(event))
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Present for the booking flow.
    pub trip_id: Option<Uuid>,
}

/// One user input. `token` is a button token such as `seats:3`; `text` is
/// whatever the user typed.
#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub seq: u64,
    pub token: Option<String>,
    pub text: Option<String>,
}

impl EventRequest {
    fn into_event(self) -> Result<UserEvent, AppError> {
        match (self.token, self.text) {
            (Some(token), _) => UserEvent::selection(&token).map_err(|e| AppError::BadRequest(e.to_string())),
            (None, Some(text)) => Ok(UserEvent::FreeText(text)),
            (None, None) => Err(AppError::BadRequest("either token or text is required".to_string())),
        }
    }
}

async fn start(
    State(state): State<AppState>,
    Path(user): Path<String>,
    body: Option<Json<StartRequest>>,
) -> Result<Json<Reply>, AppError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let reply = match request.trip_id {
        Some(trip_id) => state.wizard.start_booking(&user, trip_id).await?,
        None => state.wizard.start_trip(&user).await?,
    };
    Ok(Json(reply))
}

async fn event(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(request): Json<EventRequest>,
) -> Result<Json<Reply>, AppError> {
    let seq = request.seq;
    let event = request.into_event()?;
    let reply = state.wizard.advance(&user, seq, event).await?;
    Ok(Json(reply))
}

async fn current(State(state): State<AppState>, Path(user): Path<String>) -> Result<Json<Reply>, AppError> {
    state
        .wizard
        .current(&user)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no wizard session for {}", user)))
}

async fn abandon(State(state): State<AppState>, Path(user): Path<String>) -> Result<StatusCode, AppError> {
    state.wizard.abandon(&user).await?;
    Ok(StatusCode::NO_CONTENT)
}
