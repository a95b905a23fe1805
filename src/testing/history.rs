//! Event history and log capture for testing
//!
//! Thread-safe capture of rebuild and query histories that can be verified
//! against invariants after the run.

use super::events::{Event, OperationId, OperationResult, OperationType};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Thread-safe event log for capturing operation history
#[derive(Clone)]
pub struct EventLog {
    inner: Arc<RwLock<EventLogInner>>,
    next_op_id: Arc<AtomicU64>,
}

struct EventLogInner {
    events: Vec<Event>,
    pending: HashMap<OperationId, usize>, // op_id -> index in events
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(EventLogInner {
                events: Vec::new(),
                pending: HashMap::new(),
            })),
            next_op_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Record a new operation invocation
    pub fn record_invoke(&self, op_type: OperationType) -> OperationId {
        self.push(Event::invoke(self.allocate_id(), op_type))
    }

    /// Record an invocation issued by a named client thread
    pub fn record_invoke_from(&self, client: &str, op_type: OperationType) -> OperationId {
        self.push(Event::invoke(self.allocate_id(), op_type).with_client(client))
    }

    /// Record operation completion
    pub fn record_return(&self, op_id: OperationId, result: OperationResult) {
        let mut inner = self.inner.write();

        if let Some(index) = inner.pending.remove(&op_id) {
            if let Some(event) = inner.events.get_mut(index) {
                event.complete(result);
            }
        }
    }

    fn allocate_id(&self) -> OperationId {
        OperationId::new(self.next_op_id.fetch_add(1, Ordering::SeqCst))
    }

    fn push(&self, event: Event) -> OperationId {
        let op_id = event.op_id;
        let mut inner = self.inner.write();
        let index = inner.events.len();
        inner.events.push(event);
        inner.pending.insert(op_id, index);
        op_id
    }

    /// Get all events
    pub fn events(&self) -> Vec<Event> {
        self.inner.read().events.clone()
    }

    /// Get completed events only
    pub fn completed_events(&self) -> Vec<Event> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.is_complete())
            .cloned()
            .collect()
    }

    /// Get pending events
    pub fn pending_events(&self) -> Vec<Event> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| !e.is_complete())
            .cloned()
            .collect()
    }

    /// Number of recorded events
    pub fn len(&self) -> usize {
        self.inner.read().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().events.is_empty()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.events.clear();
        inner.pending.clear();
    }

    /// Export to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.events())
    }

    /// Import from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let events: Vec<Event> = serde_json::from_str(json)?;
        let log = Self::new();

        let max_op_id = events.iter().map(|e| e.op_id.0).max().unwrap_or(0);
        {
            let mut inner = log.inner.write();
            for (idx, event) in events.iter().enumerate() {
                if !event.is_complete() {
                    inner.pending.insert(event.op_id, idx);
                }
            }
            inner.events = events;
        }
        log.next_op_id.store(max_op_id + 1, Ordering::SeqCst);

        Ok(log)
    }

    /// Get events by operation type
    pub fn events_by_type(&self, filter: impl Fn(&OperationType) -> bool) -> Vec<Event> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| filter(&e.op_type))
            .cloned()
            .collect()
    }

    /// Completed events whose result satisfies `filter`
    pub fn events_by_result(&self, filter: impl Fn(&OperationResult) -> bool) -> Vec<Event> {
        self.inner
            .read()
            .events
            .iter()
            .filter(|e| e.result.as_ref().map_or(false, &filter))
            .cloned()
            .collect()
    }

    /// Completed publishes, in log order
    pub fn publishes(&self) -> Vec<Event> {
        self.events_by_result(|r| matches!(r, OperationResult::Published { .. }))
    }

    /// Completed reads, in log order
    pub fn reads(&self) -> Vec<Event> {
        self.events_by_result(|r| r.observed_generation().is_some())
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_basic() {
        let log = EventLog::new();

        let op_id = log.record_invoke(OperationType::StartRebuild);
        assert_eq!(log.len(), 1);
        assert_eq!(log.pending_events().len(), 1);

        log.record_return(op_id, OperationResult::Started { generation: 1 });
        assert_eq!(log.completed_events().len(), 1);
        assert!(log.pending_events().is_empty());
    }

    #[test]
    fn test_event_log_json_roundtrip() {
        let log = EventLog::new();
        let op_id = log.record_invoke_from(
            "reader-1",
            OperationType::Lookup {
                name: "bash".to_string(),
            },
        );
        log.record_return(
            op_id,
            OperationResult::LookupSuccess {
                generation: 3,
                package_ids: vec![],
            },
        );
        log.record_invoke(OperationType::Size);

        let restored = EventLog::from_json(&log.to_json().unwrap()).unwrap();
        let events = restored.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].client.as_deref(), Some("reader-1"));
        assert_eq!(restored.pending_events().len(), 1);

        // Ids keep increasing after import
        let next = restored.record_invoke(OperationType::Size);
        assert!(next.0 > events[1].op_id.0);
    }

    #[test]
    fn test_event_log_filters() {
        let log = EventLog::new();

        let start = log.record_invoke(OperationType::StartRebuild);
        log.record_return(start, OperationResult::Started { generation: 1 });
        let finish = log.record_invoke(OperationType::FinishRebuild);
        log.record_return(
            finish,
            OperationResult::Published {
                generation: 1,
                records: 0,
            },
        );
        let size = log.record_invoke(OperationType::Size);
        log.record_return(
            size,
            OperationResult::SizeSuccess {
                generation: 1,
                size: 0,
            },
        );

        assert_eq!(log.publishes().len(), 1);
        assert_eq!(log.reads().len(), 1);
        assert_eq!(
            log.events_by_type(|op| matches!(op, OperationType::StartRebuild))
                .len(),
            1
        );

        log.clear();
        assert!(log.is_empty());
    }
}
