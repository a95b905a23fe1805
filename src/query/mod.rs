//! Read-only query entry point
//!
//! Every call fetches the currently published snapshot once and answers
//! entirely from it, so a single call never mixes two generations. Callers
//! that need several answers from the same generation take `snapshot()` and
//! query the store directly.

mod filtered;

pub use filtered::FilteredRecords;

use std::sync::Arc;

use crate::metrics::DatabaseMetrics;
use crate::models::{Filter, InstallState, PackageKey, PackageRecord};
use crate::store::{Generation, RecordStore, SnapshotPublisher, StoreStatistics};

/// Query handle over a snapshot publisher
#[derive(Clone)]
pub struct PackageQuery {
    publisher: Arc<SnapshotPublisher>,
    metrics: Option<DatabaseMetrics>,
}

impl PackageQuery {
    pub fn new(publisher: Arc<SnapshotPublisher>) -> Self {
        Self {
            publisher,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: DatabaseMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pin the live snapshot
    pub fn snapshot(&self) -> Arc<RecordStore> {
        self.publisher.current()
    }

    pub fn generation(&self) -> Generation {
        self.publisher.generation()
    }

    /// Whether the live snapshot is newer than `seen`
    pub fn is_newer_than(&self, seen: Generation) -> bool {
        self.generation() > seen
    }

    /// Records named `name`, optionally restricted to an architecture
    pub fn lookup(&self, name: &str, arch: Option<&str>) -> Vec<Arc<PackageRecord>> {
        self.count("lookup");
        self.publisher.load().lookup(name, arch)
    }

    /// Resolve a `name;version;arch;repository` id. Malformed ids resolve to nothing.
    pub fn resolve(&self, package_id: &str) -> Option<Arc<PackageRecord>> {
        self.count("resolve");
        let key = PackageKey::parse_package_id(package_id).ok()?;
        self.publisher.load().get(&key)
    }

    /// Lazily walk records matching `filter` in the live snapshot
    pub fn filter(&self, filter: Filter) -> FilteredRecords {
        self.count("filter");
        FilteredRecords::new(self.snapshot(), filter)
    }

    /// Records whose name contains `needle`, case-insensitively
    pub fn search_names(&self, needle: &str) -> Vec<Arc<PackageRecord>> {
        self.filter(Filter::name_contains(needle)).collect()
    }

    /// Records whose name matches a `*`/`?` glob
    pub fn glob(&self, pattern: &str) -> Vec<Arc<PackageRecord>> {
        self.filter(Filter::name_glob(pattern)).collect()
    }

    /// Installed packages
    pub fn installed(&self) -> Vec<Arc<PackageRecord>> {
        self.filter(Filter::InstallState(InstallState::Installed))
            .collect()
    }

    /// Distinct repository tags, sorted
    pub fn repositories(&self) -> Vec<String> {
        self.count("repositories");
        self.publisher
            .load()
            .statistics()
            .per_repository
            .into_keys()
            .collect()
    }

    /// Number of records in the live snapshot
    pub fn size(&self) -> usize {
        self.count("size");
        self.publisher.load().size()
    }

    pub fn stats(&self) -> StoreStatistics {
        self.count("stats");
        self.publisher.load().statistics()
    }

    fn count(&self, kind: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_query(kind);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publisher_with(generation: u64, records: Vec<PackageRecord>) -> Arc<SnapshotPublisher> {
        let publisher = Arc::new(SnapshotPublisher::default());
        publisher
            .publish(Arc::new(RecordStore::from_records(
                Generation::new(generation),
                records,
            )))
            .unwrap();
        publisher
    }

    fn sample() -> Vec<PackageRecord> {
        vec![
            PackageRecord::new("openssl", "3.2.0", "x86_64", "core")
                .with_install_state(InstallState::Installed),
            PackageRecord::new("openssl", "3.2.0", "i686", "multilib"),
            PackageRecord::new("libressl", "3.8", "x86_64", "extra"),
            PackageRecord::new("python-pyopenssl", "24.0", "any", "extra"),
        ]
    }

    #[test]
    fn test_lookup_and_resolve() {
        let query = PackageQuery::new(publisher_with(1, sample()));

        assert_eq!(query.lookup("openssl", None).len(), 2);
        assert_eq!(query.lookup("openssl", Some("i686")).len(), 1);
        assert!(query.lookup("", None).is_empty());

        let found = query.resolve("libressl;3.8;x86_64;extra").unwrap();
        assert_eq!(found.repository(), "extra");
        assert!(query.resolve("libressl;3.9;x86_64;extra").is_none());
        assert!(query.resolve("garbage").is_none());
    }

    #[test]
    fn test_name_searches() {
        let query = PackageQuery::new(publisher_with(1, sample()));

        let hits: Vec<_> = query
            .search_names("SSL")
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(hits.len(), 4);

        assert_eq!(query.glob("*ssl").len(), 4);
        assert_eq!(query.glob("open*").len(), 2);
        assert_eq!(query.glob("python-*").len(), 1);
        assert!(query.glob("").is_empty());
        assert!(query.search_names("").is_empty());
    }

    #[test]
    fn test_aggregates() {
        let query = PackageQuery::new(publisher_with(4, sample()));

        assert_eq!(query.size(), 4);
        assert_eq!(query.installed().len(), 1);
        assert_eq!(query.repositories(), vec!["core", "extra", "multilib"]);
        assert_eq!(query.stats().generation, Generation::new(4));
        assert!(query.is_newer_than(Generation::new(3)));
        assert!(!query.is_newer_than(Generation::new(4)));
    }

    #[test]
    fn test_filter_pins_snapshot() {
        let publisher = publisher_with(1, sample());
        let query = PackageQuery::new(publisher.clone());

        let walk = query.filter(Filter::All);
        publisher
            .publish(Arc::new(RecordStore::from_records(Generation::new(2), vec![])))
            .unwrap();

        assert_eq!(walk.generation(), Generation::new(1));
        assert_eq!(walk.count(), 4);
        assert_eq!(query.size(), 0);
    }

    #[test]
    fn test_query_metrics() {
        let metrics = DatabaseMetrics::new().unwrap();
        let query = PackageQuery::new(publisher_with(1, sample())).with_metrics(metrics.clone());

        query.lookup("openssl", None);
        query.resolve("openssl;3.2.0;x86_64;core");
        query.search_names("ssl");

        assert_eq!(metrics.queries_total.with_label_values(&["lookup"]).get(), 1);
        assert_eq!(metrics.queries_total.with_label_values(&["resolve"]).get(), 1);
        assert_eq!(metrics.queries_total.with_label_values(&["filter"]).get(), 1);
    }
}
