//! Rebuild cycle: the coordinator state machine, the enumeration stream
//! that feeds it, progress reporting and the post-transaction trigger.

pub mod coordinator;
#[cfg(any(test, feature = "testing"))]
pub mod instrumented;
pub mod progress;
pub mod source;
pub mod trigger;

pub use coordinator::{CycleOutcome, RebuildCoordinator, RebuildReport, RebuildState};
#[cfg(any(test, feature = "testing"))]
pub use instrumented::InstrumentedDatabase;
pub use progress::{
    ChannelProgress, NoopProgress, ProgressEvent, ProgressSink, RebuildStatus,
    PERCENTAGE_COLLECTED, PERCENTAGE_DONE, PERCENTAGE_UNKNOWN,
};
pub use source::{
    drive, enumeration_channel, CancelHandle, EnumerationEvent, EnumerationReceiver,
    EnumerationSender,
};
pub use trigger::{
    run_after_transaction, should_rebuild, PackageBackend, PackageFilter, SkipReason,
    TransactionRole, TriggerOutcome,
};
