//! Atomic holder for the currently visible record store

use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use tracing::info;

use super::record_store::RecordStore;
use super::types::Generation;
use crate::error::{PkgDbError, Result};

/// Thread-safe snapshot pointer with atomic replacement.
///
/// Readers take an `Arc` to the live store and keep it for as long as they
/// need; a replaced store is dropped once its last holder lets go. The
/// publisher assumes a single writer: publishes are serialized by the
/// rebuild coordinator.
pub struct SnapshotPublisher {
    inner: ArcSwap<RecordStore>,
}

impl SnapshotPublisher {
    pub fn new(store: RecordStore) -> Self {
        Self {
            inner: ArcSwap::from_pointee(store),
        }
    }

    /// Get an owned reference to the live snapshot
    pub fn current(&self) -> Arc<RecordStore> {
        self.inner.load_full()
    }

    /// Borrow the live snapshot for a short, single-shot read
    pub fn load(&self) -> Guard<Arc<RecordStore>> {
        self.inner.load()
    }

    /// Get generation of the live snapshot
    pub fn generation(&self) -> Generation {
        self.inner.load().generation()
    }

    /// Atomically install `store` as the live snapshot.
    ///
    /// The store's generation must be strictly greater than the live one.
    /// Returns the store that was replaced.
    pub fn publish(&self, store: Arc<RecordStore>) -> Result<Arc<RecordStore>> {
        let current = self.generation();
        if store.generation() <= current {
            return Err(PkgDbError::StaleGeneration {
                current: current.as_u64(),
                attempted: store.generation().as_u64(),
            });
        }

        info!(
            generation = store.generation().as_u64(),
            records = store.size(),
            "publishing package snapshot"
        );
        Ok(self.inner.swap(store))
    }
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new(RecordStore::empty())
    }
}
