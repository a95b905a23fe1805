//! Rebuild cycle state machine
//!
//! ```text
//! Idle --start()--> Collecting --finish()--> Finalizing --publish--> Idle
//!                       |                        |
//!                     fail()               close/publish error
//!                       +-------> Aborted <------+
//!                                   |
//!                                  Idle
//! ```
//!
//! At most one cycle runs at a time. A second `start()` is rejected, never
//! queued. Any failure discards the staged buffer and leaves the published
//! snapshot exactly as it was.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::progress::{
    NoopProgress, ProgressEvent, ProgressSink, RebuildStatus, PERCENTAGE_COLLECTED,
    PERCENTAGE_DONE, PERCENTAGE_UNKNOWN,
};
use super::source::{self, EnumerationReceiver};
use crate::config::DatabaseConfig;
use crate::error::{PkgDbError, Result};
use crate::metrics::DatabaseMetrics;
use crate::models::PackageRecord;
use crate::store::{Generation, IngestionBuffer, RecordStore, SnapshotFile, SnapshotPublisher};

/// Observable phase of the coordinator
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildState {
    Idle,
    Collecting,
    Finalizing,
}

impl RebuildState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebuildState::Idle => "idle",
            RebuildState::Collecting => "collecting",
            RebuildState::Finalizing => "finalizing",
        }
    }
}

impl fmt::Display for RebuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of a published cycle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RebuildReport {
    pub generation: Generation,
    pub record_count: usize,
    pub duration: Duration,
    /// Bytes written to the snapshot file, if the store was persisted
    pub persisted_bytes: Option<u64>,
}

/// How the most recent cycle ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    Published(RebuildReport),
    Aborted { generation: Generation, reason: String },
}

enum CycleState {
    Idle,
    Collecting {
        buffer: IngestionBuffer,
        started: Instant,
    },
    Finalizing,
}

impl CycleState {
    fn phase(&self) -> RebuildState {
        match self {
            CycleState::Idle => RebuildState::Idle,
            CycleState::Collecting { .. } => RebuildState::Collecting,
            CycleState::Finalizing => RebuildState::Finalizing,
        }
    }
}

struct Inner {
    state: CycleState,
    /// Highest generation handed to any buffer, published or not
    last_generation: Generation,
    last_outcome: Option<CycleOutcome>,
}

/// Drives rebuild cycles for one logical database
pub struct RebuildCoordinator {
    publisher: Arc<SnapshotPublisher>,
    config: DatabaseConfig,
    inner: Mutex<Inner>,
    progress: Arc<dyn ProgressSink>,
    metrics: Option<DatabaseMetrics>,
}

impl RebuildCoordinator {
    pub fn new(publisher: Arc<SnapshotPublisher>, config: DatabaseConfig) -> Self {
        let last_generation = publisher.generation();
        Self {
            publisher,
            config,
            inner: Mutex::new(Inner {
                state: CycleState::Idle,
                last_generation,
                last_outcome: None,
            }),
            progress: Arc::new(NoopProgress),
            metrics: None,
        }
    }

    /// Report progress events to `sink`
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_metrics(mut self, metrics: DatabaseMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn publisher(&self) -> &Arc<SnapshotPublisher> {
        &self.publisher
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn state(&self) -> RebuildState {
        self.inner.lock().state.phase()
    }

    pub fn is_idle(&self) -> bool {
        self.state() == RebuildState::Idle
    }

    pub fn last_outcome(&self) -> Option<CycleOutcome> {
        self.inner.lock().last_outcome.clone()
    }

    /// Open a new cycle.
    ///
    /// Returns the generation the cycle will publish as. It doubles as the
    /// cycle's token: `ingest`, `finish` and `fail` only act on the cycle
    /// whose generation they are given.
    pub fn start(&self) -> Result<Generation> {
        let generation = {
            let mut inner = self.inner.lock();
            if !matches!(inner.state, CycleState::Idle) {
                let state = inner.state.phase().as_str();
                drop(inner);
                warn!(state, "rejecting rebuild start: cycle already running");
                if let Some(metrics) = &self.metrics {
                    metrics.record_rejected_start();
                }
                return Err(PkgDbError::AlreadyRunning { state });
            }

            let newest = inner.last_generation.max(self.publisher.generation());
            let generation = newest
                .next()
                .ok_or(PkgDbError::GenerationExhausted(newest.as_u64()))?;
            inner.last_generation = generation;
            inner.state = CycleState::Collecting {
                buffer: IngestionBuffer::with_config(generation, self.config.buffer_config()),
                started: Instant::now(),
            };
            generation
        };

        info!(generation = generation.as_u64(), "recreating package database");
        self.progress
            .report(ProgressEvent::Status(RebuildStatus::GeneratePackageList));
        self.progress
            .report(ProgressEvent::Percentage(PERCENTAGE_UNKNOWN));
        Ok(generation)
    }

    /// Stage one record in cycle `cycle`.
    ///
    /// A rejected record (duplicate identity, size cap) aborts the whole cycle.
    pub fn ingest(&self, cycle: Generation, record: PackageRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        let result = match &mut inner.state {
            CycleState::Collecting { buffer, .. } if buffer.generation() == cycle => {
                buffer.add(record)
            }
            CycleState::Collecting { .. } => return Err(stale(cycle)),
            other => {
                return Err(PkgDbError::NotCollecting {
                    state: other.phase().as_str(),
                })
            }
        };

        match result {
            Ok(()) => {
                drop(inner);
                if let Some(metrics) = &self.metrics {
                    metrics.record_ingested();
                }
                Ok(())
            }
            Err(e) => {
                let state = std::mem::replace(&mut inner.state, CycleState::Idle);
                self.abort_locked(&mut inner, state, e.to_string());
                drop(inner);
                self.report_aborted();
                Err(e)
            }
        }
    }

    /// Complete cycle `cycle`: freeze the buffer, publish it, persist it.
    pub fn finish(&self, cycle: Generation) -> Result<RebuildReport> {
        let (buffer, started) = {
            let mut inner = self.inner.lock();
            match std::mem::replace(&mut inner.state, CycleState::Finalizing) {
                CycleState::Collecting { buffer, started } if buffer.generation() == cycle => {
                    (buffer, started)
                }
                other => {
                    let err = match &other {
                        CycleState::Collecting { .. } => stale(cycle),
                        _ => PkgDbError::NotCollecting {
                            state: other.phase().as_str(),
                        },
                    };
                    inner.state = other;
                    return Err(err);
                }
            }
        };

        // Put the coordinator back to Idle if anything below unwinds
        let mut guard = FinalizeGuard {
            inner: &self.inner,
            generation: cycle,
            armed: true,
        };

        self.progress
            .report(ProgressEvent::Percentage(PERCENTAGE_COLLECTED));

        let outcome = match self.finalize(buffer) {
            Ok(store) => {
                let persisted_bytes = self.persist(&store);
                let report = RebuildReport {
                    generation: cycle,
                    record_count: store.size(),
                    duration: started.elapsed(),
                    persisted_bytes,
                };

                if let Some(metrics) = &self.metrics {
                    metrics.record_published(
                        cycle.as_u64(),
                        report.record_count,
                        report.duration.as_secs_f64(),
                    );
                }
                Ok(report)
            }
            Err(e) => {
                warn!(generation = cycle.as_u64(), error = %e, "rebuild aborted during finalize");
                if let Some(metrics) = &self.metrics {
                    metrics.record_aborted(started.elapsed().as_secs_f64());
                }
                Err(e)
            }
        };

        {
            let mut inner = self.inner.lock();
            inner.state = CycleState::Idle;
            inner.last_outcome = Some(match &outcome {
                Ok(report) => CycleOutcome::Published(report.clone()),
                Err(e) => CycleOutcome::Aborted {
                    generation: cycle,
                    reason: e.to_string(),
                },
            });
        }
        guard.armed = false;

        match &outcome {
            Ok(_) => {
                self.progress.report(ProgressEvent::Percentage(PERCENTAGE_DONE));
                self.progress
                    .report(ProgressEvent::Status(RebuildStatus::Finished));
            }
            Err(_) => self.report_aborted(),
        }
        outcome
    }

    /// Abort cycle `cycle`, discarding everything staged so far
    pub fn fail(&self, cycle: Generation, reason: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        match std::mem::replace(&mut inner.state, CycleState::Idle) {
            CycleState::Collecting { buffer, started } if buffer.generation() == cycle => {
                let state = CycleState::Collecting { buffer, started };
                self.abort_locked(&mut inner, state, reason.to_string());
                drop(inner);
                self.report_aborted();
                Ok(())
            }
            other => {
                let err = match &other {
                    CycleState::Collecting { .. } => stale(cycle),
                    _ => PkgDbError::NotCollecting {
                        state: other.phase().as_str(),
                    },
                };
                inner.state = other;
                Err(err)
            }
        }
    }

    /// Abort whichever cycle is collecting, on behalf of the host.
    ///
    /// A stream still feeding the cancelled cycle gets `StaleCycle` from then on.
    pub fn cancel(&self) -> Result<()> {
        let open = match &self.inner.lock().state {
            CycleState::Collecting { buffer, .. } => buffer.generation(),
            other => {
                return Err(PkgDbError::NotCollecting {
                    state: other.phase().as_str(),
                })
            }
        };
        self.fail(open, "cancelled by host")
    }

    /// Start a cycle and feed it from an enumeration stream until completion
    pub fn rebuild_from(&self, receiver: EnumerationReceiver) -> Result<RebuildReport> {
        let cycle = self.start()?;
        source::drive(self, cycle, receiver)
    }

    /// Start a cycle and feed it from an in-memory sequence of records
    pub fn rebuild_from_records<I>(&self, records: I) -> Result<RebuildReport>
    where
        I: IntoIterator<Item = PackageRecord>,
    {
        let cycle = self.start()?;
        for record in records {
            self.ingest(cycle, record)?;
        }
        self.finish(cycle)
    }

    fn finalize(&self, buffer: IngestionBuffer) -> Result<Arc<RecordStore>> {
        let store = Arc::new(buffer.close()?);
        self.publisher.publish(store.clone())?;
        Ok(store)
    }

    fn persist(&self, store: &RecordStore) -> Option<u64> {
        let path = self.config.persist_path()?;
        match SnapshotFile::new(path).save(store) {
            Ok(bytes) => {
                debug!(path = %path.display(), bytes, "persisted package snapshot");
                Some(bytes)
            }
            Err(e) => {
                // Readers already see the new store; only durability is lost
                warn!(path = %path.display(), error = %e, "failed to persist package snapshot");
                if let Some(metrics) = &self.metrics {
                    metrics.record_persist_failure();
                }
                None
            }
        }
    }

    fn abort_locked(&self, inner: &mut Inner, state: CycleState, reason: String) {
        if let CycleState::Collecting { buffer, started } = state {
            let generation = buffer.generation();
            let discarded = buffer.abort();
            warn!(
                generation = generation.as_u64(),
                discarded,
                reason = %reason,
                "rebuild aborted"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_aborted(started.elapsed().as_secs_f64());
            }
            inner.last_outcome = Some(CycleOutcome::Aborted { generation, reason });
        }
    }

    fn report_aborted(&self) {
        self.progress
            .report(ProgressEvent::Status(RebuildStatus::Aborted));
    }
}

fn stale(cycle: Generation) -> PkgDbError {
    PkgDbError::StaleCycle {
        cycle: cycle.as_u64(),
    }
}

/// Returns a Finalizing coordinator to Idle when `finish` unwinds early
struct FinalizeGuard<'a> {
    inner: &'a Mutex<Inner>,
    generation: Generation,
    armed: bool,
}

impl Drop for FinalizeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock();
        if matches!(inner.state, CycleState::Finalizing) {
            warn!(generation = self.generation.as_u64(), "finalize interrupted, returning to idle");
            inner.state = CycleState::Idle;
            inner.last_outcome = Some(CycleOutcome::Aborted {
                generation: self.generation,
                reason: "finalize interrupted".to_string(),
            });
        }
    }
}
