use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use ridepool_catalog::geo::PriceQuote;
use ridepool_shared::Waypoint;
use serde::{Deserialize, Serialize};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/localities", get(search))
        .route("/v1/quotes", get(quote))
}

#[derive(Debug, Deserialize)]
pub struct LocalityQuery {
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct LocalityView {
    pub label: String,
    #[serde(flatten)]
    pub waypoint: Waypoint,
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Serialize)]
pub struct QuoteView {
    pub origin: String,
    pub destination: String,
    #[serde(flatten)]
    pub quote: PriceQuote,
}

async fn search(
    State(state): State<AppState>,
    Query(query): Query<LocalityQuery>,
) -> Result<Json<Vec<LocalityView>>, AppError> {
    if query.q.trim().is_empty() {
        return Err(AppError::BadRequest("query must not be empty".to_string()));
    }
    let matches = state
        .resolver
        .lookup_locality(&query.q)
        .into_iter()
        .map(|waypoint| LocalityView {
            label: waypoint.label(),
            waypoint,
        })
        .collect();
    Ok(Json(matches))
}

fn unique(state: &AppState, query: &str) -> Result<Waypoint, AppError> {
    let mut matches = state.resolver.lookup_locality(query);
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err(AppError::NotFound(format!("no locality matches '{}'", query))),
        n => Err(AppError::BadRequest(format!("'{}' matches {} localities", query, n))),
    }
}

/// Suggested per-seat price between two localities.
async fn quote(State(state): State<AppState>, Query(query): Query<QuoteQuery>) -> Result<Json<QuoteView>, AppError> {
    let origin = unique(&state, &query.from)?;
    let destination = unique(&state, &query.to)?;
    if origin == destination {
        return Err(AppError::BadRequest("origin and destination must differ".to_string()));
    }
    let quote = state.resolver.quote(&origin, &destination).await?;
    Ok(Json(QuoteView {
        origin: origin.label(),
        destination: destination.label(),
        quote,
    }))
}
