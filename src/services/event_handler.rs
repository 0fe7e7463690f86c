//! src/services/event_handler.rs
//!
//! ThumbnailEventHandler: turns one object-created notification into a
//! download → generate → upload run. Stages hand `Result`s to each other;
//! `handle` is the only place an error is turned into a log line, and it
//! never returns one to the caller.

use crate::{
    models::event::{EventError, InboundEvent},
    services::{
        blob_path::BlobPathResolver,
        storage_service::{BlobStore, StorageError, StorageResult},
        thumbnail_service::{Thumbnail, ThumbnailError, ThumbnailGenerator},
    },
};
use std::{fmt, future::Future, sync::Arc};
use thiserror::Error;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where processing of one event ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Ignored,
    ParseFailed,
    DownloadFailed,
    GenerateFailed,
    UploadFailed,
    Completed { destination: String },
}

impl EventOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, EventOutcome::Completed { .. })
    }
}

/// Pipeline stage names used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Parse,
    Download,
    Generate,
    Upload,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Parse => "parse",
            Stage::Download => "download",
            Stage::Generate => "generate",
            Stage::Upload => "upload",
        })
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] EventError),
    #[error("download failed: {0}")]
    Download(#[source] StorageError),
    #[error(transparent)]
    Generate(#[from] ThumbnailError),
    #[error("thumbnail worker stopped: {0}")]
    Worker(#[from] JoinError),
    #[error("upload failed: {0}")]
    Upload(#[source] StorageError),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Parse(_) => Stage::Parse,
            PipelineError::Download(_) => Stage::Download,
            PipelineError::Generate(_) | PipelineError::Worker(_) => Stage::Generate,
            PipelineError::Upload(_) => Stage::Upload,
        }
    }

    fn outcome(&self) -> EventOutcome {
        match self.stage() {
            Stage::Parse => EventOutcome::ParseFailed,
            Stage::Download => EventOutcome::DownloadFailed,
            Stage::Generate => EventOutcome::GenerateFailed,
            Stage::Upload => EventOutcome::UploadFailed,
        }
    }

    fn is_transient(&self) -> bool {
        match self {
            PipelineError::Download(err) | PipelineError::Upload(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Event pipeline with its collaborators bound at startup.
///
/// Holds no mutable state, so one instance serves concurrent events.
#[derive(Clone)]
pub struct ThumbnailEventHandler {
    store: Arc<dyn BlobStore>,
    generator: Arc<ThumbnailGenerator>,
    paths: BlobPathResolver,
}

impl ThumbnailEventHandler {
    pub fn new(
        store: Arc<dyn BlobStore>,
        generator: Arc<ThumbnailGenerator>,
        paths: BlobPathResolver,
    ) -> Self {
        Self {
            store,
            generator,
            paths,
        }
    }

    /// Process one event to completion. Failures are logged with the event
    /// subject and failing stage, then dropped.
    pub async fn handle(&self, event: &InboundEvent, cancel: &CancellationToken) -> EventOutcome {
        let event_id = event.id.as_deref().unwrap_or("-");
        info!(subject = %event.subject, event_id, "Received event");

        if !event.is_object_created() {
            warn!(
                subject = %event.subject,
                event_id,
                event_type = %event.event_type,
                "Unhandled event type"
            );
            return EventOutcome::Ignored;
        }

        match self.process(event, cancel).await {
            Ok(destination) => {
                info!(
                    subject = %event.subject,
                    event_id,
                    destination = %destination,
                    "Thumbnail created and uploaded"
                );
                EventOutcome::Completed { destination }
            }
            Err(err @ PipelineError::Parse(_)) => {
                warn!(subject = %event.subject, event_id, stage = %err.stage(), error = %err, "Dropping event");
                err.outcome()
            }
            Err(err) => {
                error!(
                    subject = %event.subject,
                    event_id,
                    stage = %err.stage(),
                    transient = err.is_transient(),
                    error = %err,
                    "Failed to process image"
                );
                err.outcome()
            }
        }
    }

    async fn process(
        &self,
        event: &InboundEvent,
        cancel: &CancellationToken,
    ) -> Result<String, PipelineError> {
        let payload = event.object_created_payload()?;
        let url = payload.location();
        let source = self.paths.source(url)?;
        let (destination_url, destination) = self.paths.destination(url)?;
        // Thumbnail writes raise their own object-created events.
        if !self.paths.is_under_originals(url) {
            return Err(EventError::OutsideOriginals {
                url: url.to_string(),
                originals: self.paths.originals().to_string(),
            }
            .into());
        }
        debug!(
            url,
            content_type = payload.content_type.as_deref().unwrap_or("-"),
            content_length = ?payload.content_length,
            source = %source,
            destination = %destination,
            "Resolved blob locations"
        );

        let original = cancellable(cancel, self.store.download(&source.container, &source.name))
            .await
            .map_err(PipelineError::Download)?;

        let thumbnail = self.generate(original).await?;
        debug!(
            "generated {} thumbnail ({} bytes)",
            thumbnail.spec.target,
            thumbnail.bytes.len()
        );

        cancellable(
            cancel,
            self.store.upload(
                &destination.container,
                &destination.name,
                thumbnail.bytes.clone(),
                Some(thumbnail.content_type()),
                true,
            ),
        )
        .await
        .map_err(PipelineError::Upload)?;

        Ok(destination_url)
    }

    /// Run the CPU-bound generator off the async workers.
    async fn generate(&self, source: bytes::Bytes) -> Result<Thumbnail, PipelineError> {
        let generator = Arc::clone(&self.generator);
        let thumbnail = tokio::task::spawn_blocking(move || generator.generate(&source)).await??;
        Ok(thumbnail)
    }
}

/// Race a storage call against the shutdown token.
async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: impl Future<Output = StorageResult<T>>,
) -> StorageResult<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        result = operation => result,
    }
}
