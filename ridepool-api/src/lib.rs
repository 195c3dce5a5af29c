use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod bookings;
pub mod error;
pub mod localities;
pub mod state;
pub mod trips;
pub mod webhooks;
pub mod wizard;
pub mod worker;

pub use state::{AppState, Backends};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::USER_AGENT]);

    Router::new()
        .route("/health", get(health))
        .merge(wizard::routes())
        .merge(localities::routes())
        .merge(trips::routes())
        .merge(bookings::routes())
        .merge(webhooks::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    database: Option<bool>,
    redis: Option<bool>,
}

/// Backends that are not wired in (in-memory mode) report `null`.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<Health>) {
    let database = match &state.db {
        Some(db) => Some(db.health().await),
        None => None,
    };
    let redis = match &state.redis {
        Some(redis) => Some(redis.ping().await),
        None => None,
    };
    let healthy = database.unwrap_or(true) && redis.unwrap_or(true);
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (
        status,
        Json(Health {
            status: if healthy { "ok" } else { "degraded" },
            database,
            redis,
        }),
    )
}
