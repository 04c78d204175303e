mod callback;
mod checkout;
mod status;

pub use callback::*;
pub use checkout::*;
pub use status::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(rate_limit: RateLimitConfig) -> Router<AppState> {
    // Strict tier: endpoints that call out to the gateway.
    let strict = Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}/retry", post(retry_payment))
        .route_layer(rate_limit::strict_layer(rate_limit.strict_rpm));

    // Standard tier: read-only status and return flows.
    let standard = Router::new()
        .route("/orders/{id}", get(get_order_status))
        .route("/payments/return", get(payment_return))
        .route_layer(rate_limit::standard_layer(rate_limit.standard_rpm));

    Router::new()
        .route("/health", get(health))
        .merge(strict)
        .merge(standard)
}

/// Router without rate limiting, for tests driving handlers directly.
pub fn router_unlimited() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/orders", post(create_order))
        .route("/orders/{id}/retry", post(retry_payment))
        .route("/orders/{id}", get(get_order_status))
        .route("/payments/return", get(payment_return))
}
