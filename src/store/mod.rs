//! Versioned, read-optimized package storage
//!
//! # Architecture
//!
//! - `IngestionBuffer`: staging area filled during one rebuild cycle
//! - `RecordStore`: immutable table frozen from a closed buffer
//! - `SnapshotPublisher`: atomically swaps the store readers see
//! - `SnapshotFile`: optional on-disk copy of the published store

mod types;
mod record_store;
mod buffer;
mod publisher;
mod persistence;

pub use types::*;
pub use record_store::*;
pub use buffer::*;
pub use publisher::*;
pub use persistence::*;
