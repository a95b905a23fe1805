//! Append-only staging area for one rebuild cycle
//!
//! Records arrive from the enumeration stream and are held here until the
//! cycle either closes the buffer into a `RecordStore` or aborts it. Nothing
//! in a buffer is ever visible to queries.

use std::collections::HashSet;

use super::record_store::RecordStore;
use super::types::Generation;
use crate::error::{PkgDbError, Result};
use crate::models::{PackageKey, PackageRecord};

/// Limits applied while staging records
#[derive(Clone, Debug, Default)]
pub struct BufferConfig {
    /// Abort the cycle once more than this many records were staged
    pub max_records: Option<usize>,
}

/// Staging buffer for the next record store
#[derive(Debug)]
pub struct IngestionBuffer {
    /// Generation the closed store will carry
    generation: Generation,
    records: Vec<PackageRecord>,
    keys: HashSet<PackageKey>,
    /// Approximate size in bytes
    size_bytes: usize,
    config: BufferConfig,
}

impl IngestionBuffer {
    /// Create an empty buffer destined to become `generation`
    pub fn new(generation: Generation) -> Self {
        Self::with_config(generation, BufferConfig::default())
    }

    pub fn with_config(generation: Generation, config: BufferConfig) -> Self {
        Self {
            generation,
            records: Vec::new(),
            keys: HashSet::new(),
            size_bytes: 0,
            config,
        }
    }

    /// Append a record.
    ///
    /// Fails with `DuplicateRecord` if the identity is already staged; the
    /// buffer keeps its prior contents in that case.
    pub fn add(&mut self, record: PackageRecord) -> Result<()> {
        if self.keys.contains(&record.key) {
            return Err(PkgDbError::DuplicateRecord(record.key));
        }

        if let Some(max) = self.config.max_records {
            if self.records.len() >= max {
                return Err(PkgDbError::StreamFailure(format!(
                    "enumeration exceeded {} records",
                    max
                )));
            }
        }

        self.size_bytes += record.approx_size_bytes();
        self.keys.insert(record.key.clone());
        self.records.push(record);
        Ok(())
    }

    /// Check whether an identity is already staged
    pub fn contains(&self, key: &PackageKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Consume the buffer and freeze its records into a store.
    ///
    /// Identity uniqueness is re-verified here, so a buffer can never yield a
    /// store with colliding keys.
    pub fn close(self) -> Result<RecordStore> {
        if self.keys.len() != self.records.len() {
            let mut seen = HashSet::with_capacity(self.records.len());
            for record in &self.records {
                if !seen.insert(&record.key) {
                    return Err(PkgDbError::DuplicateRecord(record.key.clone()));
                }
            }
        }

        Ok(RecordStore::from_records(self.generation, self.records))
    }

    /// Discard all staged records without producing a store
    pub fn abort(self) -> usize {
        self.records.len()
    }
}
