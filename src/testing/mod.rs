//! Testing infrastructure for snapshot consistency checks
//!
//! This module provides:
//! - Event capture and history tracking
//! - Invariant checking over captured histories
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pkgdb::testing::prelude::*;
//! use pkgdb::rebuild::InstrumentedDatabase;
//!
//! let db = InstrumentedDatabase::new(Arc::new(PackageDatabase::in_memory()));
//!
//! let cycle = db.start()?;
//! db.ingest(cycle, record)?;
//! db.finish(cycle)?;
//! db.lookup("reader-1", "bash", None);
//!
//! let violations = db.check_invariants(&default_invariants());
//! assert!(violations.is_empty());
//! ```
//!
//! # Invariants
//!
//! - **GenerationsMonotonic**: generations never go backwards
//! - **NoMixedSnapshot**: every read matches exactly one published generation
//! - **AbortedCycleInvisible**: aborted cycles are never observed
//! - **ReadAfterPublish**: reads started after a publish see it

pub mod events;
pub mod history;
pub mod invariants;

pub use events::{Event, OperationId, OperationResult, OperationType, Timestamp};
pub use history::EventLog;
pub use invariants::{
    check_all_invariants, default_invariants, AbortedCycleInvisible, GenerationsMonotonic,
    Invariant, NoMixedSnapshot, ReadAfterPublish, Violation,
};

/// Prelude for easy imports
pub mod prelude {
    pub use super::events::*;
    pub use super::history::EventLog;
    pub use super::invariants::{check_all_invariants, default_invariants, Invariant, Violation};
}
