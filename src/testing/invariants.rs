//! Invariant checking framework for correctness verification
//!
//! Each checker replays a captured [`EventLog`] and reports the first place
//! where the database's snapshot guarantees were broken.

use super::events::{Event, OperationResult, OperationType};
use super::history::EventLog;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

/// A violation of an invariant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub invariant: String,
    pub description: String,
    pub violating_events: Vec<u64>, // operation ids
    pub context: HashMap<String, String>,
}

impl Violation {
    fn new(invariant: &str, description: impl Into<String>, events: &[&Event]) -> Self {
        Self {
            invariant: invariant.to_string(),
            description: description.into(),
            violating_events: events.iter().map(|e| e.op_id.0).collect(),
            context: HashMap::new(),
        }
    }

    fn with_context(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.context.insert(key.to_string(), value.to_string());
        self
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "INVARIANT VIOLATION: {}", self.invariant)?;
        writeln!(f, "  Description: {}", self.description)?;
        writeln!(f, "  Violating events: {:?}", self.violating_events)?;
        if !self.context.is_empty() {
            writeln!(f, "  Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "    {}: {}", key, value)?;
            }
        }
        Ok(())
    }
}

/// Trait for invariant checkers
pub trait Invariant: Send + Sync {
    /// Name of the invariant
    fn name(&self) -> &str;

    /// Check the invariant against an event log
    fn check(&self, log: &EventLog) -> Result<(), Violation>;

    /// Human-readable description
    fn description(&self) -> &str {
        "No description provided"
    }
}

/// Check all invariants and return violations
pub fn check_all_invariants(log: &EventLog, invariants: &[Box<dyn Invariant>]) -> Vec<Violation> {
    invariants
        .iter()
        .filter_map(|invariant| invariant.check(log).err())
        .collect()
}

/// Contents of every published generation, rebuilt from the writer's events.
///
/// Writer operations come from one thread, so log order is cycle order.
#[derive(Default)]
struct Replay {
    published: HashMap<u64, BTreeSet<String>>,
    aborted: HashSet<u64>,
}

impl Replay {
    fn from_log(log: &EventLog) -> Self {
        let mut replay = Replay::default();
        let mut open: Option<(u64, BTreeSet<String>)> = None;

        for event in log.completed_events() {
            match (&event.op_type, &event.result) {
                (_, Some(OperationResult::Started { generation })) => {
                    open = Some((*generation, BTreeSet::new()));
                }
                (OperationType::Ingest { package_id }, Some(OperationResult::Ingested)) => {
                    if let Some((_, staged)) = open.as_mut() {
                        staged.insert(package_id.clone());
                    }
                }
                (_, Some(OperationResult::Published { generation, .. })) => {
                    let staged = open.take().map(|(_, staged)| staged).unwrap_or_default();
                    replay.published.insert(*generation, staged);
                }
                (_, Some(OperationResult::Aborted { .. })) => {
                    if let Some((generation, _)) = open.take() {
                        replay.aborted.insert(generation);
                    }
                }
                _ => {}
            }
        }

        replay
    }
}

fn package_name(package_id: &str) -> &str {
    package_id.split(';').next().unwrap_or(package_id)
}

/// Invariant: generations only move forward
///
/// Cycles start with strictly increasing generations, publishes carry
/// strictly increasing generations, and no client ever reads an older
/// generation than one it has already seen.
pub struct GenerationsMonotonic;

impl Invariant for GenerationsMonotonic {
    fn name(&self) -> &str {
        "GenerationsMonotonic"
    }

    fn description(&self) -> &str {
        "Started and published generations strictly increase; per-client reads never go back"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        let mut last_started: Option<&Event> = None;
        let mut last_published: Option<(u64, Event)> = None;
        let mut seen_by_client: HashMap<String, (u64, Event)> = HashMap::new();

        let events = log.completed_events();
        for event in &events {
            match &event.result {
                Some(OperationResult::Started { generation }) => {
                    if let Some(previous) = last_started {
                        if let Some(OperationResult::Started { generation: before }) =
                            &previous.result
                        {
                            if generation <= before {
                                return Err(Violation::new(
                                    self.name(),
                                    format!("cycle started at {} after {}", generation, before),
                                    &[previous, event],
                                ));
                            }
                        }
                    }
                    last_started = Some(event);
                }
                Some(OperationResult::Published { generation, .. }) => {
                    if let Some((before, previous)) = &last_published {
                        if generation <= before {
                            return Err(Violation::new(
                                self.name(),
                                format!("published {} after {}", generation, before),
                                &[previous, event],
                            ));
                        }
                    }
                    last_published = Some((*generation, event.clone()));
                }
                Some(result) => {
                    let (Some(observed), Some(client)) =
                        (result.observed_generation(), event.client.as_ref())
                    else {
                        continue;
                    };
                    if let Some((before, previous)) = seen_by_client.get(client) {
                        if observed < *before {
                            return Err(Violation::new(
                                self.name(),
                                format!("{} read generation {} after {}", client, observed, before),
                                &[previous, event],
                            )
                            .with_context("client", client));
                        }
                    }
                    seen_by_client.insert(client.clone(), (observed, event.clone()));
                }
                None => {}
            }
        }

        Ok(())
    }
}

/// Invariant: every read is answered from exactly one published snapshot
///
/// A lookup tagged with generation N returns exactly the records of that
/// name that were ingested in cycle N, and a size tagged N equals the
/// record count published for N.
pub struct NoMixedSnapshot;

impl Invariant for NoMixedSnapshot {
    fn name(&self) -> &str {
        "NoMixedSnapshot"
    }

    fn description(&self) -> &str {
        "Read results match the published contents of the generation they report"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        let replay = Replay::from_log(log);

        for event in log.reads() {
            match (&event.op_type, &event.result) {
                (
                    OperationType::Lookup { name },
                    Some(OperationResult::LookupSuccess {
                        generation,
                        package_ids,
                    }),
                ) => {
                    // Generations published before capture started are unknown
                    let Some(contents) = replay.published.get(generation) else {
                        continue;
                    };
                    let expected: BTreeSet<&str> = contents
                        .iter()
                        .map(String::as_str)
                        .filter(|id| package_name(id) == name)
                        .collect();
                    let actual: BTreeSet<&str> = package_ids.iter().map(String::as_str).collect();

                    if expected != actual {
                        return Err(Violation::new(
                            self.name(),
                            format!("lookup of {} does not match generation {}", name, generation),
                            &[&event],
                        )
                        .with_context("expected", format!("{:?}", expected))
                        .with_context("actual", format!("{:?}", actual)));
                    }
                }
                (_, Some(OperationResult::SizeSuccess { generation, size })) => {
                    let Some(contents) = replay.published.get(generation) else {
                        continue;
                    };
                    if contents.len() != *size {
                        return Err(Violation::new(
                            self.name(),
                            format!(
                                "size {} reported for generation {} holding {} records",
                                size,
                                generation,
                                contents.len()
                            ),
                            &[&event],
                        ));
                    }
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Invariant: aborted cycles leave no trace
///
/// No read ever reports the generation of a cycle that was aborted.
pub struct AbortedCycleInvisible;

impl Invariant for AbortedCycleInvisible {
    fn name(&self) -> &str {
        "AbortedCycleInvisible"
    }

    fn description(&self) -> &str {
        "Reads never observe the generation of an aborted cycle"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        let replay = Replay::from_log(log);

        for event in log.reads() {
            if let Some(generation) = event.result.as_ref().and_then(|r| r.observed_generation()) {
                if replay.aborted.contains(&generation) {
                    return Err(Violation::new(
                        self.name(),
                        format!("read observed aborted generation {}", generation),
                        &[&event],
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Invariant: a publish is visible to every read that starts after it
pub struct ReadAfterPublish;

impl Invariant for ReadAfterPublish {
    fn name(&self) -> &str {
        "ReadAfterPublish"
    }

    fn description(&self) -> &str {
        "Reads invoked after a publish returned observe that generation or a newer one"
    }

    fn check(&self, log: &EventLog) -> Result<(), Violation> {
        let publishes = log.publishes();

        for read in log.reads() {
            let Some(observed) = read.result.as_ref().and_then(|r| r.observed_generation()) else {
                continue;
            };
            for publish in &publishes {
                let Some(OperationResult::Published { generation, .. }) = &publish.result else {
                    continue;
                };
                if publish.happened_before(&read) && observed < *generation {
                    return Err(Violation::new(
                        self.name(),
                        format!(
                            "read observed generation {} after generation {} was published",
                            observed, generation
                        ),
                        &[publish, &read],
                    ));
                }
            }
        }

        Ok(())
    }
}

/// The invariants every rebuild history must satisfy
pub fn default_invariants() -> Vec<Box<dyn Invariant>> {
    vec![
        Box::new(GenerationsMonotonic),
        Box::new(NoMixedSnapshot),
        Box::new(AbortedCycleInvisible),
        Box::new(ReadAfterPublish),
    ]
}
