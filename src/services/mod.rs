//! Thumbnail pipeline services, leaf-first: sizing, image generation, path
//! mapping, blob storage and the event orchestrator that ties them together.

pub mod blob_path;
pub mod dimensions;
pub mod event_handler;
pub mod storage_service;
pub mod thumbnail_service;
