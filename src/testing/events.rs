//! Event types for capturing operations in the system
//!
//! Events capture rebuild and query operations with timing information so
//! snapshot consistency can be verified after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl OperationId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Type of operation in the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationType {
    /// Open a rebuild cycle
    StartRebuild,
    /// Stage one package in the open cycle
    Ingest { package_id: String },
    /// Complete the open cycle
    FinishRebuild,
    /// Abort the open cycle
    FailRebuild { reason: String },
    /// Look up a package name
    Lookup { name: String },
    /// Count records
    Size,
}

/// Result of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OperationResult {
    /// Cycle opened for this generation
    Started { generation: u64 },
    /// Start rejected because a cycle was running
    Rejected,
    /// Record staged
    Ingested,
    /// Snapshot published
    Published { generation: u64, records: usize },
    /// Cycle aborted
    Aborted { reason: String },
    /// Lookup answered from one snapshot
    LookupSuccess {
        generation: u64,
        package_ids: Vec<String>,
    },
    /// Size answered from one snapshot
    SizeSuccess { generation: u64, size: usize },
    /// Operation failed
    Error { message: String },
}

impl OperationResult {
    /// Generation a read observed, if this is a read result
    pub fn observed_generation(&self) -> Option<u64> {
        match self {
            OperationResult::LookupSuccess { generation, .. }
            | OperationResult::SizeSuccess { generation, .. } => Some(*generation),
            _ => None,
        }
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(0))
    }

    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

/// A recorded event in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique operation ID
    pub op_id: OperationId,

    /// Type of operation
    pub op_type: OperationType,

    /// When the operation was invoked
    pub invoke_time: Timestamp,

    /// When the operation returned (None if still pending)
    pub return_time: Option<Timestamp>,

    /// Result of the operation (None if still pending)
    pub result: Option<OperationResult>,

    /// Label of the thread that issued the operation
    pub client: Option<String>,
}

impl Event {
    /// Create a new event at invocation time
    pub fn invoke(op_id: OperationId, op_type: OperationType) -> Self {
        Self {
            op_id,
            op_type,
            invoke_time: Timestamp::now(),
            return_time: None,
            result: None,
            client: None,
        }
    }

    /// Mark event as completed
    pub fn complete(&mut self, result: OperationResult) {
        self.return_time = Some(Timestamp::now());
        self.result = Some(result);
    }

    pub fn with_client(mut self, client: impl Into<String>) -> Self {
        self.client = Some(client.into());
        self
    }

    /// Check if event is completed
    pub fn is_complete(&self) -> bool {
        self.return_time.is_some() && self.result.is_some()
    }

    /// Whether this event returned strictly before `other` was invoked
    pub fn happened_before(&self, other: &Event) -> bool {
        self.return_time
            .map(|rt| rt < other.invoke_time)
            .unwrap_or(false)
    }

    /// Duration of the operation in nanoseconds
    pub fn duration_nanos(&self) -> Option<i64> {
        self.return_time.map(|rt| rt.0 - self.invoke_time.0)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Op({:?}) {:?} @ {} -> ",
            self.op_id, self.op_type, self.invoke_time.0
        )?;
        match &self.result {
            Some(result) => write!(f, "{:?} @ {:?}", result, self.return_time),
            None => write!(f, "<pending>"),
        }
    }
}
