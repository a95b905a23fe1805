//! Instrumented database wrapper for testing
//!
//! Wraps a [`PackageDatabase`] and captures every rebuild step and read
//! into an [`EventLog`] for invariant verification.

use std::sync::Arc;

use crate::database::PackageDatabase;
use crate::error::{PkgDbError, Result};
use crate::models::PackageRecord;
use crate::store::Generation;
use crate::testing::prelude::*;

/// Wrapper around `PackageDatabase` that captures events for testing
#[derive(Clone)]
pub struct InstrumentedDatabase {
    inner: Arc<PackageDatabase>,
    event_log: EventLog,
}

impl InstrumentedDatabase {
    pub fn new(inner: Arc<PackageDatabase>) -> Self {
        Self {
            inner,
            event_log: EventLog::new(),
        }
    }

    /// Create with a pre-existing event log (for continuation testing)
    pub fn with_event_log(inner: Arc<PackageDatabase>, event_log: EventLog) -> Self {
        Self { inner, event_log }
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn database(&self) -> &Arc<PackageDatabase> {
        &self.inner
    }

    /// Open a rebuild cycle with event capture
    pub fn start(&self) -> Result<Generation> {
        let op_id = self.event_log.record_invoke(OperationType::StartRebuild);

        match self.inner.coordinator().start() {
            Ok(generation) => {
                self.event_log.record_return(
                    op_id,
                    OperationResult::Started {
                        generation: generation.as_u64(),
                    },
                );
                Ok(generation)
            }
            Err(e) => {
                let result = match &e {
                    PkgDbError::AlreadyRunning { .. } => OperationResult::Rejected,
                    other => OperationResult::Error {
                        message: other.to_string(),
                    },
                };
                self.event_log.record_return(op_id, result);
                Err(e)
            }
        }
    }

    /// Stage a record in cycle `cycle` with event capture
    pub fn ingest(&self, cycle: Generation, record: PackageRecord) -> Result<()> {
        let op_id = self.event_log.record_invoke(OperationType::Ingest {
            package_id: record.key.to_package_id(),
        });

        match self.inner.coordinator().ingest(cycle, record) {
            Ok(()) => {
                self.event_log.record_return(op_id, OperationResult::Ingested);
                Ok(())
            }
            Err(e) => {
                self.record_failure(op_id, &e);
                Err(e)
            }
        }
    }

    /// Complete cycle `cycle` with event capture
    pub fn finish(&self, cycle: Generation) -> Result<Generation> {
        let op_id = self.event_log.record_invoke(OperationType::FinishRebuild);

        match self.inner.coordinator().finish(cycle) {
            Ok(report) => {
                self.event_log.record_return(
                    op_id,
                    OperationResult::Published {
                        generation: report.generation.as_u64(),
                        records: report.record_count,
                    },
                );
                Ok(report.generation)
            }
            Err(e) => {
                self.record_failure(op_id, &e);
                Err(e)
            }
        }
    }

    /// Abort cycle `cycle` with event capture
    pub fn fail(&self, cycle: Generation, reason: &str) -> Result<()> {
        let op_id = self.event_log.record_invoke(OperationType::FailRebuild {
            reason: reason.to_string(),
        });

        let result = self.inner.coordinator().fail(cycle, reason);
        let recorded = match &result {
            Ok(()) => OperationResult::Aborted {
                reason: reason.to_string(),
            },
            Err(e) => OperationResult::Error {
                message: e.to_string(),
            },
        };
        self.event_log.record_return(op_id, recorded);
        result
    }

    /// Run one full cycle over `records`
    pub fn rebuild<I>(&self, records: I) -> Result<Generation>
    where
        I: IntoIterator<Item = PackageRecord>,
    {
        let cycle = self.start()?;
        for record in records {
            self.ingest(cycle, record)?;
        }
        self.finish(cycle)
    }

    /// Look up a name from one pinned snapshot, tagging the result with its generation
    pub fn lookup(&self, client: &str, name: &str, arch: Option<&str>) -> Vec<Arc<PackageRecord>> {
        let op_id = self.event_log.record_invoke_from(
            client,
            OperationType::Lookup {
                name: name.to_string(),
            },
        );

        let snapshot = self.inner.query().snapshot();
        let found = snapshot.lookup(name, arch);
        self.event_log.record_return(
            op_id,
            OperationResult::LookupSuccess {
                generation: snapshot.generation().as_u64(),
                package_ids: found.iter().map(|r| r.key.to_package_id()).collect(),
            },
        );
        found
    }

    /// Count records in one pinned snapshot
    pub fn size(&self, client: &str) -> usize {
        let op_id = self.event_log.record_invoke_from(client, OperationType::Size);

        let snapshot = self.inner.query().snapshot();
        let size = snapshot.size();
        self.event_log.record_return(
            op_id,
            OperationResult::SizeSuccess {
                generation: snapshot.generation().as_u64(),
                size,
            },
        );
        size
    }

    /// Check invariants against the captured history
    pub fn check_invariants(&self, invariants: &[Box<dyn Invariant>]) -> Vec<Violation> {
        check_all_invariants(&self.event_log, invariants)
    }

    fn record_failure(&self, op_id: OperationId, error: &PkgDbError) {
        // Anything but a misplaced call takes the open cycle down with it
        let result = match error {
            PkgDbError::NotCollecting { .. } | PkgDbError::StaleCycle { .. } => {
                OperationResult::Error {
                    message: error.to_string(),
                }
            }
            other => OperationResult::Aborted {
                reason: other.to_string(),
            },
        };
        self.event_log.record_return(op_id, result);
    }
}
