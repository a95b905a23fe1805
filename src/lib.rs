pub mod config;
pub mod database;
pub mod error;
pub mod metrics;
pub mod models;
pub mod query;
pub mod rebuild;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::DatabaseConfig;
pub use database::PackageDatabase;
pub use error::{PkgDbError, Result};
pub use metrics::DatabaseMetrics;
pub use models::*;
pub use query::{FilteredRecords, PackageQuery};
pub use rebuild::{RebuildCoordinator, RebuildReport, RebuildState};
pub use store::{Generation, IngestionBuffer, RecordStore, SnapshotPublisher, StoreStatistics};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
