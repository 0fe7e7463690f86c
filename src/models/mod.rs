//! Core data models for the thumbnail service.
//!
//! Event envelopes arrive as JSON via `serde`; blob metadata maps to the
//! SQLite `blobs` table via `sqlx::FromRow`.

pub mod blob;
pub mod dimensions;
pub mod event;
