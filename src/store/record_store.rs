//! Immutable, generation-stamped table of package records
//!
//! A `RecordStore` is produced once per rebuild cycle by closing an
//! `IngestionBuffer` and is never mutated afterwards. Readers share it
//! through `Arc`, so any number of threads may query it while the next
//! store is being collected.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::{Generation, RecordNo};
use crate::models::{current_timestamp, Filter, PackageKey, PackageRecord};

/// Frozen package table for one generation
#[derive(Debug)]
pub struct RecordStore {
    generation: Generation,
    /// Records in ingestion order
    records: Vec<Arc<PackageRecord>>,
    /// Package name to positions in `records`
    by_name: HashMap<String, Vec<RecordNo>>,
    /// Unix timestamp (seconds) when the store was frozen
    built_at: u64,
}

impl RecordStore {
    /// The empty store a database starts with before its first rebuild
    pub fn empty() -> Self {
        Self {
            generation: Generation::INITIAL,
            records: Vec::new(),
            by_name: HashMap::new(),
            built_at: 0,
        }
    }

    /// Freeze a set of records. Identity uniqueness is the caller's job.
    pub(crate) fn from_records(generation: Generation, records: Vec<PackageRecord>) -> Self {
        Self::from_parts(generation, records, current_timestamp())
    }

    pub(crate) fn from_parts(
        generation: Generation,
        records: Vec<PackageRecord>,
        built_at: u64,
    ) -> Self {
        let mut by_name: HashMap<String, Vec<RecordNo>> = HashMap::new();
        for (no, record) in records.iter().enumerate() {
            by_name
                .entry(record.name().to_string())
                .or_default()
                .push(no as RecordNo);
        }

        Self {
            generation,
            records: records.into_iter().map(Arc::new).collect(),
            by_name,
            built_at,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn built_at(&self) -> u64 {
        self.built_at
    }

    /// Number of records in the store
    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records carrying `name`, optionally restricted to one architecture.
    ///
    /// An empty name yields an empty result.
    pub fn lookup(&self, name: &str, arch: Option<&str>) -> Vec<Arc<PackageRecord>> {
        if name.is_empty() {
            return Vec::new();
        }

        self.by_name
            .get(name)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&no| &self.records[no as usize])
                    .filter(|record| arch.map_or(true, |a| record.arch() == a))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Find the record with exactly this identity
    pub fn get(&self, key: &PackageKey) -> Option<Arc<PackageRecord>> {
        self.by_name.get(&key.name).and_then(|positions| {
            positions
                .iter()
                .map(|&no| &self.records[no as usize])
                .find(|record| &record.key == key)
                .cloned()
        })
    }

    /// Lazily walk the records matching `filter`.
    ///
    /// The walk covers frozen data, so running it again yields the same sequence.
    pub fn filter<'a>(&'a self, filter: &'a Filter) -> impl Iterator<Item = &'a Arc<PackageRecord>> + 'a {
        self.records.iter().filter(move |record| {
            let record: &PackageRecord = record;
            filter.matches(record)
        })
    }

    /// Lazily walk the records matching an arbitrary predicate
    pub fn filter_by<'a, F>(&'a self, predicate: F) -> impl Iterator<Item = &'a Arc<PackageRecord>> + 'a
    where
        F: Fn(&PackageRecord) -> bool + 'a,
    {
        self.records.iter().filter(move |record| {
            let record: &PackageRecord = record;
            predicate(record)
        })
    }

    /// Record at position `no` in ingestion order
    pub fn record_at(&self, no: usize) -> Option<&Arc<PackageRecord>> {
        self.records.get(no)
    }

    /// Iterate over all records in ingestion order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<PackageRecord>> {
        self.records.iter()
    }

    /// Distinct package names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Summary statistics for this store
    pub fn statistics(&self) -> StoreStatistics {
        let mut per_repository: BTreeMap<String, usize> = BTreeMap::new();
        let mut installed = 0;
        let mut total_size = 0u64;

        for record in &self.records {
            *per_repository
                .entry(record.repository().to_string())
                .or_insert(0) += 1;
            if record.is_installed() {
                installed += 1;
            }
            total_size = total_size.saturating_add(record.size);
        }

        StoreStatistics {
            generation: self.generation,
            record_count: self.records.len(),
            distinct_names: self.by_name.len(),
            installed_count: installed,
            total_size,
            per_repository,
            built_at: self.built_at,
        }
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::empty()
    }
}

/// Summary of a record store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStatistics {
    pub generation: Generation,
    pub record_count: usize,
    pub distinct_names: usize,
    pub installed_count: usize,
    pub total_size: u64,
    pub per_repository: BTreeMap<String, usize>,
    pub built_at: u64,
}
