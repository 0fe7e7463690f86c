//! Webhook endpoint for the event-delivery collaborator.
//!
//! Deliveries are JSON arrays of events. A subscription validation event is
//! answered with its handshake code; everything else is handed to the
//! thumbnail pipeline. Per-event failures never change the HTTP status, so
//! the sender does not redeliver.

use crate::{
    errors::AppError,
    models::event::{EventBatch, SubscriptionValidationResponse},
    state::AppState,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use futures::future::join_all;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct DeliveryReport {
    pub received: usize,
    pub completed: usize,
}

/// `POST /api/events`
pub async fn receive_events(
    State(state): State<AppState>,
    payload: Result<Json<EventBatch>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(batch) = payload?;
    let events = batch.into_events();

    if let Some(code) = events.iter().find_map(|event| event.validation_code()) {
        info!("Answering subscription validation handshake");
        return Ok(Json(SubscriptionValidationResponse {
            validation_response: code,
        })
        .into_response());
    }

    let outcomes = join_all(
        events
            .iter()
            .map(|event| state.events.handle(event, &state.shutdown)),
    )
    .await;

    let report = DeliveryReport {
        received: events.len(),
        completed: outcomes.iter().filter(|o| o.is_completed()).count(),
    };
    info!(
        "Delivery handled: {} received, {} completed",
        report.received, report.completed
    );

    Ok(Json(report).into_response())
}
