//! One logical package database: publisher, coordinator and query handle
//! wired together.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{PkgDbError, Result};
use crate::metrics::DatabaseMetrics;
use crate::models::PackageRecord;
use crate::query::PackageQuery;
use crate::rebuild::{
    run_after_transaction, EnumerationReceiver, PackageBackend, ProgressSink, RebuildCoordinator,
    RebuildReport, TransactionRole, TriggerOutcome,
};
use crate::store::{RecordStore, SnapshotFile, SnapshotPublisher};

pub struct PackageDatabase {
    publisher: Arc<SnapshotPublisher>,
    coordinator: RebuildCoordinator,
    query: PackageQuery,
    metrics: Option<DatabaseMetrics>,
    /// Set when a snapshot file existed but had to be discarded
    restore_failed: bool,
}

impl PackageDatabase {
    /// Open a database, restoring the last persisted snapshot if one exists.
    ///
    /// The snapshot is only a cache of what the backend can enumerate again,
    /// so an unreadable file is discarded and the database starts empty.
    /// I/O errors other than a missing file still fail the open.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        let mut restore_failed = false;
        let store = match &config.snapshot_path {
            Some(path) => match SnapshotFile::new(path).load() {
                Ok(Some(store)) => {
                    info!(
                        path = %path.display(),
                        generation = store.generation().as_u64(),
                        records = store.size(),
                        "restored package snapshot"
                    );
                    store
                }
                Ok(None) => RecordStore::empty(),
                Err(
                    e @ (PkgDbError::CorruptSnapshot(_)
                    | PkgDbError::IncompatibleSnapshot { .. }
                    | PkgDbError::Serialization(_)),
                ) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "discarding unreadable package snapshot, starting empty"
                    );
                    restore_failed = true;
                    RecordStore::empty()
                }
                Err(e) => return Err(e),
            },
            None => RecordStore::empty(),
        };

        let publisher = Arc::new(SnapshotPublisher::new(store));
        Ok(Self {
            coordinator: RebuildCoordinator::new(publisher.clone(), config),
            query: PackageQuery::new(publisher.clone()),
            publisher,
            metrics: None,
            restore_failed,
        })
    }

    /// In-memory database with default configuration
    pub fn in_memory() -> Self {
        let publisher = Arc::new(SnapshotPublisher::default());
        Self {
            coordinator: RebuildCoordinator::new(publisher.clone(), DatabaseConfig::default()),
            query: PackageQuery::new(publisher.clone()),
            publisher,
            metrics: None,
            restore_failed: false,
        }
    }

    /// Attach metrics to rebuilds and queries
    pub fn with_metrics(mut self, metrics: DatabaseMetrics) -> Self {
        let current = self.publisher.current();
        metrics.published_generation.set(current.generation().as_u64() as f64);
        metrics.snapshot_records.set(current.size() as f64);
        if self.restore_failed {
            metrics.record_restore_failure();
        }

        self.coordinator = self.coordinator.with_metrics(metrics.clone());
        self.query = self.query.with_metrics(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.coordinator = self.coordinator.with_progress(sink);
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        self.coordinator.config()
    }

    pub fn query(&self) -> &PackageQuery {
        &self.query
    }

    pub fn coordinator(&self) -> &RebuildCoordinator {
        &self.coordinator
    }

    pub fn publisher(&self) -> &Arc<SnapshotPublisher> {
        &self.publisher
    }

    pub fn metrics(&self) -> Option<&DatabaseMetrics> {
        self.metrics.as_ref()
    }

    /// Whether `open` found a snapshot file it could not read
    pub fn restore_failed(&self) -> bool {
        self.restore_failed
    }

    /// Rebuild from an enumeration stream
    pub fn rebuild_from(&self, receiver: EnumerationReceiver) -> Result<RebuildReport> {
        self.coordinator.rebuild_from(receiver)
    }

    /// Rebuild from an in-memory record sequence
    pub fn rebuild_from_records<I>(&self, records: I) -> Result<RebuildReport>
    where
        I: IntoIterator<Item = PackageRecord>,
    {
        self.coordinator.rebuild_from_records(records)
    }

    /// Host hook: called when a transaction finished
    pub fn transaction_finished(
        &self,
        role: TransactionRole,
        backend: &dyn PackageBackend,
    ) -> Result<TriggerOutcome> {
        run_after_transaction(&self.coordinator, role, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Generation;
    use tempfile::TempDir;

    #[test]
    fn test_reopen_restores_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = DatabaseConfig::default().with_snapshot_path(dir.path().join("pkgs.snapshot"));

        {
            let db = PackageDatabase::open(config.clone()).unwrap();
            assert_eq!(db.query().size(), 0);
            db.rebuild_from_records(vec![PackageRecord::new("a", "1.0", "x86_64", "main")])
                .unwrap();
            db.rebuild_from_records(vec![
                PackageRecord::new("a", "1.1", "x86_64", "main"),
                PackageRecord::new("b", "2.0", "x86_64", "main"),
            ])
            .unwrap();
        }

        let db = PackageDatabase::open(config).unwrap();
        assert_eq!(db.query().generation(), Generation::new(2));
        assert_eq!(db.query().size(), 2);
        assert_eq!(db.query().lookup("a", None)[0].version(), "1.1");

        // Generations continue after a restart
        let report = db
            .rebuild_from_records(vec![PackageRecord::new("c", "1.0", "x86_64", "main")])
            .unwrap();
        assert_eq!(report.generation, Generation::new(3));
    }

    #[test]
    fn test_metrics_track_rebuilds() {
        let db = PackageDatabase::in_memory().with_metrics(DatabaseMetrics::new().unwrap());
        db.rebuild_from_records(vec![PackageRecord::new("a", "1.0", "x86_64", "main")])
            .unwrap();

        let metrics = db.metrics().unwrap();
        assert_eq!(metrics.published_generation.get(), 1.0);
        assert_eq!(metrics.snapshot_records.get(), 1.0);
        assert_eq!(metrics.records_ingested.get(), 1.0);
    }

    #[test]
    fn test_unreadable_snapshot_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkgs.snapshot");
        std::fs::write(&path, b"PKDB garbage").unwrap();
        let config = DatabaseConfig::default().with_snapshot_path(&path);

        let db = PackageDatabase::open(config.clone())
            .unwrap()
            .with_metrics(DatabaseMetrics::new().unwrap());
        assert!(db.restore_failed());
        assert_eq!(db.query().size(), 0);
        assert_eq!(db.query().generation(), Generation::INITIAL);
        assert_eq!(db.metrics().unwrap().restore_failures.get(), 1.0);

        // The next publish overwrites the bad file
        db.rebuild_from_records(vec![PackageRecord::new("a", "1.0", "x86_64", "main")])
            .unwrap();
        let reopened = PackageDatabase::open(config).unwrap();
        assert!(!reopened.restore_failed());
        assert_eq!(reopened.query().size(), 1);
    }

    #[test]
    fn test_newer_snapshot_version_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pkgs.snapshot");
        let store = RecordStore::from_records(
            Generation::new(3),
            vec![PackageRecord::new("a", "1.0", "x86_64", "main")],
        );
        let mut data = crate::store::encode_store(&store).unwrap();
        data[4..8].copy_from_slice(&(crate::store::SNAPSHOT_VERSION + 1).to_le_bytes());
        std::fs::write(&path, data).unwrap();

        let db = PackageDatabase::open(DatabaseConfig::default().with_snapshot_path(&path)).unwrap();
        assert!(db.restore_failed());
        assert!(db.query().lookup("a", None).is_empty());
    }
}
