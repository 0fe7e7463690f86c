//! Defines the HTTP surface of the thumbnail worker.
//!
//! - `POST /api/events`: event deliveries (arrays of events)
//! - `GET  /healthz`: liveness
//! - `GET  /readyz`: readiness

use crate::{
    handlers::{
        event_handlers::receive_events,
        health_handlers::{healthz, readyz},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router. State is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/events", post(receive_events))
}
