//! Shared application state handed to every axum handler.

use crate::services::{event_handler::ThumbnailEventHandler, storage_service::LocalBlobStore};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    /// Event pipeline; collaborators are bound once at startup.
    pub events: ThumbnailEventHandler,

    /// Concrete store, used by the readiness probe.
    pub store: LocalBlobStore,

    /// Cancelled on shutdown so in-flight storage calls return promptly.
    pub shutdown: CancellationToken,
}
