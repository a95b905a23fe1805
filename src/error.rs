use thiserror::Error;

use crate::models::PackageKey;

/// Main error type for package database operations
#[derive(Error, Debug)]
pub enum PkgDbError {
    #[error("Rebuild already running (state: {state})")]
    AlreadyRunning { state: &'static str },

    #[error("Duplicate package record: {0}")]
    DuplicateRecord(PackageKey),

    #[error("Enumeration stream failed: {0}")]
    StreamFailure(String),

    #[error("No rebuild cycle is collecting (state: {state})")]
    NotCollecting { state: &'static str },

    #[error("Rebuild cycle gen_{cycle} is no longer open")]
    StaleCycle { cycle: u64 },

    #[error("Generation space exhausted after {0}")]
    GenerationExhausted(u64),

    #[error("Stale generation: published {current}, attempted {attempted}")]
    StaleGeneration { current: u64, attempted: u64 },

    #[error("Invalid package id: {0}")]
    InvalidPackageId(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: incompatible version {actual}, expected <= {expected}")]
    IncompatibleSnapshot { expected: u32, actual: u32 },

    #[error("Snapshot file is corrupt: {0}")]
    CorruptSnapshot(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for package database operations
pub type Result<T> = std::result::Result<T, PkgDbError>;

impl PkgDbError {
    /// Check if this error aborted a rebuild cycle
    pub fn is_cycle_failure(&self) -> bool {
        matches!(
            self,
            PkgDbError::DuplicateRecord(_) | PkgDbError::StreamFailure(_)
        )
    }

    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(self, PkgDbError::AlreadyRunning { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PkgDbError::AlreadyRunning { state: "collecting" };
        assert_eq!(err.to_string(), "Rebuild already running (state: collecting)");

        let key = PackageKey::new("bash", "5.2-1", "x86_64", "core");
        let err = PkgDbError::DuplicateRecord(key);
        assert_eq!(
            err.to_string(),
            "Duplicate package record: bash;5.2-1;x86_64;core"
        );
    }

    #[test]
    fn test_stale_cycle_display() {
        let err = PkgDbError::StaleCycle { cycle: 4 };
        assert_eq!(err.to_string(), "Rebuild cycle gen_4 is no longer open");
        assert!(!err.is_cycle_failure());
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_error_classification() {
        assert!(PkgDbError::StreamFailure("boom".into()).is_cycle_failure());
        assert!(
            PkgDbError::DuplicateRecord(PackageKey::new("a", "1", "noarch", "main"))
                .is_cycle_failure()
        );
        assert!(!PkgDbError::AlreadyRunning { state: "finalizing" }.is_cycle_failure());

        assert!(PkgDbError::AlreadyRunning { state: "collecting" }.is_retriable());
        assert!(!PkgDbError::StreamFailure("boom".into()).is_retriable());
    }
}
