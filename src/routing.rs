//! Application router configuration wiring the auth, transaction, and stats
//! handlers to their routes.

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tower_http::cors::CorsLayer;

use crate::{
    AppState, endpoints,
    auth::{get_me, log_in, register_user},
    logging::logging_middleware,
    stats::get_transaction_stats,
    transaction::{create_transaction, delete_transaction, update_transaction},
    transaction_query::{get_all_transactions, get_recent_transactions, get_transactions},
};

/// Return a router with all the app's routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(get_health))
        .route(endpoints::REGISTER, post(register_user))
        .route(endpoints::LOG_IN, post(log_in))
        .route(endpoints::ME, get(get_me))
        .route(
            endpoints::TRANSACTIONS,
            get(get_transactions).post(create_transaction),
        )
        .route(endpoints::TRANSACTION_STATS, get(get_transaction_stats))
        .route(endpoints::TRANSACTIONS_RECENT, get(get_recent_transactions))
        .route(endpoints::TRANSACTIONS_ALL, get(get_all_transactions))
        .route(
            endpoints::TRANSACTION,
            put(update_transaction).delete(delete_transaction),
        )
        .fallback(get_unknown_route)
        .layer(middleware::from_fn(logging_middleware))
        // The browser client is served from another origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// A route handler that reports the server is up.
async fn get_health() -> impl IntoResponse {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();

    Json(json!({ "status": "ok", "timestamp": timestamp }))
}

/// The fallback for requests that match no route.
async fn get_unknown_route() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Route not found" })),
    )
}
