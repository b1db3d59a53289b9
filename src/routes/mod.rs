mod health;
mod predict;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

/// Deployed frontends differ in which upload path they call, so both are
/// mounted.
pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/predict", post(predict::predict))
        .route("/api/predict", post(predict::predict))
}
