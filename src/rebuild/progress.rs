//! Coarse progress reporting for rebuild cycles
//!
//! The host decides how to surface these; the coordinator only emits a
//! status change when a cycle starts or ends and a percentage at each
//! phase boundary.

use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

/// Percentage value meaning "in progress, amount unknown"
pub const PERCENTAGE_UNKNOWN: u8 = 101;
/// Percentage reported once the enumeration stream completed
pub const PERCENTAGE_COLLECTED: u8 = 90;
/// Percentage reported once the new snapshot is published
pub const PERCENTAGE_DONE: u8 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebuildStatus {
    /// Collecting the package list
    GeneratePackageList,
    /// Cycle ended with a published snapshot
    Finished,
    /// Cycle ended without publishing
    Aborted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressEvent {
    Status(RebuildStatus),
    Percentage(u8),
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn report(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Sink forwarding events into a channel.
///
/// Events are dropped when the receiving side is gone or full; progress is
/// advisory and never stalls a rebuild.
#[derive(Clone, Debug)]
pub struct ChannelProgress {
    tx: Sender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, event: ProgressEvent) {
        let _ = self.tx.try_send(event);
    }
}
