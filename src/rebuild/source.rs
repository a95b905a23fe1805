//! Enumeration stream between the host backend and a rebuild cycle
//!
//! The backend pushes `Package` events followed by exactly one terminal
//! event (`Finished` or `Failed`). The channel is bounded, so a fast
//! producer blocks once the coordinator falls behind.

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;
use tracing::debug;

use super::coordinator::{RebuildCoordinator, RebuildReport};
use crate::error::{PkgDbError, Result};
use crate::models::PackageRecord;
use crate::store::Generation;

#[derive(Clone, Debug)]
pub enum EnumerationEvent {
    Package(PackageRecord),
    Finished,
    Failed(String),
}

/// Create a bounded enumeration stream
pub fn enumeration_channel(capacity: usize) -> (EnumerationSender, EnumerationReceiver) {
    let (tx, rx) = channel::bounded(capacity.max(1));
    let (cancel_tx, cancel_rx) = channel::bounded(1);
    (
        EnumerationSender { tx },
        EnumerationReceiver {
            rx,
            cancel_tx,
            cancel_rx,
        },
    )
}

/// Producer half, held by the backend
#[derive(Clone, Debug)]
pub struct EnumerationSender {
    tx: Sender<EnumerationEvent>,
}

impl EnumerationSender {
    /// Push one package. Fails once the consuming cycle has gone away, which
    /// tells the producer to stop.
    pub fn package(&self, record: PackageRecord) -> Result<()> {
        self.send(EnumerationEvent::Package(record))
    }

    /// Signal successful completion
    pub fn finished(&self) -> Result<()> {
        self.send(EnumerationEvent::Finished)
    }

    /// Signal that enumeration failed partway
    pub fn failed(&self, reason: impl Into<String>) -> Result<()> {
        self.send(EnumerationEvent::Failed(reason.into()))
    }

    pub fn send(&self, event: EnumerationEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| PkgDbError::StreamFailure("rebuild cycle is gone".to_string()))
    }
}

/// Consumer half, drained by `drive`
#[derive(Debug)]
pub struct EnumerationReceiver {
    rx: Receiver<EnumerationEvent>,
    // Held here so the cancel channel never disconnects on its own
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
}

impl EnumerationReceiver {
    /// Handle the host can use to cancel the stream from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }
}

/// Cancels an in-flight enumeration stream
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Sender<()>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Consume an enumeration stream into cycle `cycle` of the coordinator.
///
/// Blocks until the stream reaches a terminal event, is cancelled, or all
/// senders disconnect. Every path other than `Finished` aborts the cycle and
/// leaves the published snapshot untouched. Once `cycle` has been cancelled
/// from elsewhere, the stream stops with `StaleCycle` and touches nothing.
pub fn drive(
    coordinator: &RebuildCoordinator,
    cycle: Generation,
    receiver: EnumerationReceiver,
) -> Result<RebuildReport> {
    let mut received = 0usize;
    loop {
        select! {
            recv(receiver.rx) -> msg => match msg {
                Ok(EnumerationEvent::Package(record)) => {
                    // A rejected record aborts the cycle inside `ingest`
                    coordinator.ingest(cycle, record)?;
                    received += 1;
                }
                Ok(EnumerationEvent::Finished) => {
                    debug!(received, "enumeration stream finished");
                    return coordinator.finish(cycle);
                }
                Ok(EnumerationEvent::Failed(reason)) => {
                    return Err(abort(coordinator, cycle, reason));
                }
                Err(_) => {
                    return Err(abort(
                        coordinator,
                        cycle,
                        "enumeration stream disconnected before completion".to_string(),
                    ));
                }
            },
            recv(receiver.cancel_rx) -> _ => {
                return Err(abort(coordinator, cycle, "enumeration cancelled".to_string()));
            }
        }
    }
}

fn abort(coordinator: &RebuildCoordinator, cycle: Generation, reason: String) -> PkgDbError {
    if let Err(e) = coordinator.fail(cycle, &reason) {
        return e;
    }
    PkgDbError::StreamFailure(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::rebuild::RebuildState;
    use crate::store::SnapshotPublisher;
    use std::sync::Arc;
    use std::thread;

    fn coordinator() -> RebuildCoordinator {
        RebuildCoordinator::new(Arc::new(SnapshotPublisher::default()), DatabaseConfig::default())
    }

    #[test]
    fn test_drive_to_completion() {
        let coordinator = coordinator();
        let cycle = coordinator.start().unwrap();

        let (tx, rx) = enumeration_channel(2);
        let producer = thread::spawn(move || {
            for i in 0..10 {
                tx.package(PackageRecord::new(format!("pkg{}", i), "1.0", "noarch", "main"))
                    .unwrap();
            }
            tx.finished().unwrap();
        });

        let report = drive(&coordinator, cycle, rx).unwrap();
        producer.join().unwrap();

        assert_eq!(report.record_count, 10);
        assert_eq!(coordinator.publisher().current().size(), 10);
        assert_eq!(coordinator.state(), RebuildState::Idle);
    }

    #[test]
    fn test_disconnect_aborts() {
        let coordinator = coordinator();
        let cycle = coordinator.start().unwrap();

        let (tx, rx) = enumeration_channel(4);
        tx.package(PackageRecord::new("a", "1", "noarch", "main")).unwrap();
        drop(tx);

        let err = drive(&coordinator, cycle, rx).unwrap_err();
        assert!(matches!(err, PkgDbError::StreamFailure(_)));
        assert_eq!(coordinator.state(), RebuildState::Idle);
        assert!(coordinator.publisher().current().is_empty());
    }

    #[test]
    fn test_failed_event_aborts() {
        let coordinator = coordinator();
        let cycle = coordinator.start().unwrap();

        let (tx, rx) = enumeration_channel(4);
        tx.package(PackageRecord::new("a", "1", "noarch", "main")).unwrap();
        tx.failed("mirror unreachable").unwrap();

        let err = drive(&coordinator, cycle, rx).unwrap_err();
        assert!(err.to_string().contains("mirror unreachable"));
        assert!(coordinator.publisher().current().is_empty());
    }

    #[test]
    fn test_cancel_aborts() {
        let coordinator = coordinator();
        let cycle = coordinator.start().unwrap();

        let (tx, rx) = enumeration_channel(4);
        let cancel = rx.cancel_handle();
        cancel.cancel();

        let err = drive(&coordinator, cycle, rx).unwrap_err();
        assert!(matches!(err, PkgDbError::StreamFailure(ref r) if r.contains("cancelled")));
        assert_eq!(coordinator.state(), RebuildState::Idle);

        // The producer learns the cycle is gone
        assert!(tx.finished().is_err());
    }

    #[test]
    fn test_cancelled_stream_cannot_finish_next_cycle() {
        let coordinator = coordinator();
        let old = coordinator.start().unwrap();

        let (old_tx, old_rx) = enumeration_channel(4);
        old_tx.package(PackageRecord::new("old-1", "1", "noarch", "main")).unwrap();

        // Host cancels and the next cycle opens before the old stream drains
        coordinator.cancel().unwrap();
        let new = coordinator.start().unwrap();
        coordinator
            .ingest(new, PackageRecord::new("new-1", "1", "noarch", "main"))
            .unwrap();

        old_tx.package(PackageRecord::new("old-2", "1", "noarch", "main")).unwrap();
        old_tx.finished().unwrap();

        let err = drive(&coordinator, old, old_rx).unwrap_err();
        assert!(matches!(err, PkgDbError::StaleCycle { .. }));
        assert_eq!(coordinator.state(), RebuildState::Collecting);

        let report = coordinator.finish(new).unwrap();
        assert_eq!(report.record_count, 1);
        assert_eq!(coordinator.publisher().current().names(), vec!["new-1"]);
    }
}
