//! When to rebuild: the host-side policy around a rebuild cycle
//!
//! A rebuild runs after a finished host transaction only if the package list
//! switch is on, the transaction refreshed the package cache, and the backend
//! can enumerate packages at all.

use std::fmt;
use std::thread;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::coordinator::{RebuildCoordinator, RebuildReport};
use super::source::{self, enumeration_channel, EnumerationSender};
use crate::error::Result;

/// Role of a host transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionRole {
    RefreshCache,
    GetPackages,
    InstallPackages,
    RemovePackages,
    UpdatePackages,
    Resolve,
    SearchName,
}

/// Package subset a backend is asked to enumerate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageFilter {
    /// Every package the backend knows about
    #[default]
    None,
    Installed,
    NotInstalled,
}

/// Host backend able to enumerate packages
pub trait PackageBackend: Send + Sync {
    /// Whether the backend implements a transaction role
    fn implements(&self, role: TransactionRole) -> bool;

    /// Clear per-transaction state before a new enumeration
    fn reset(&self) {}

    /// Enumerate packages into `sink`, ending with `finished()` or `failed()`.
    ///
    /// Runs on a dedicated thread; it should stop early once `sink` reports
    /// the cycle is gone.
    fn get_packages(&self, filter: PackageFilter, sink: EnumerationSender);
}

/// Why a finished transaction did not trigger a rebuild
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The package list switch is off
    Disabled,
    /// The transaction was not a cache refresh
    WrongRole(TransactionRole),
    /// The backend cannot enumerate packages
    Unsupported,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("package list updates disabled"),
            SkipReason::WrongRole(role) => write!(f, "transaction role {:?} does not refresh the cache", role),
            SkipReason::Unsupported => f.write_str("backend cannot get packages"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    Skipped(SkipReason),
    Rebuilt(RebuildReport),
}

/// Decide whether a finished transaction should trigger a rebuild
pub fn should_rebuild(
    coordinator: &RebuildCoordinator,
    role: TransactionRole,
    backend: &dyn PackageBackend,
) -> std::result::Result<(), SkipReason> {
    if !coordinator.config().update_package_list {
        return Err(SkipReason::Disabled);
    }
    if role != TransactionRole::RefreshCache {
        return Err(SkipReason::WrongRole(role));
    }
    if !backend.implements(TransactionRole::GetPackages) {
        return Err(SkipReason::Unsupported);
    }
    Ok(())
}

/// Run a full rebuild cycle after a host transaction finished, if policy allows.
///
/// The backend enumerates on its own scoped thread while this thread drains the
/// stream; the call returns once the new snapshot is published or the cycle
/// aborted.
pub fn run_after_transaction(
    coordinator: &RebuildCoordinator,
    role: TransactionRole,
    backend: &dyn PackageBackend,
) -> Result<TriggerOutcome> {
    if let Err(reason) = should_rebuild(coordinator, role, backend) {
        debug!(%reason, "skipping package database rebuild");
        return Ok(TriggerOutcome::Skipped(reason));
    }

    let cycle = coordinator.start()?;
    let (sender, receiver) = enumeration_channel(coordinator.config().stream_capacity);
    backend.reset();

    let result = thread::scope(|scope| {
        let producer = scope.spawn(move || backend.get_packages(PackageFilter::None, sender));
        let result = source::drive(coordinator, cycle, receiver);
        // A panicking backend drops its sender, which `drive` already saw as a
        // disconnect; the panic itself is not ours to propagate.
        let _ = producer.join();
        result
    });

    result.map(TriggerOutcome::Rebuilt)
}
