//! Structured events emitted by the process manager and its handlers.
//!
//! Events are append-only observability records. The manager returns the
//! events of each tick and also keeps a bounded log that callers drain.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::VecDeque;

use crate::process::{ProcessHandle, ProcessId, ProcessType};

/// Events produced by a single handler call, stored inline for the common case.
pub type EventBatch = SmallVec<[ProcessEvent; 4]>;

/// Mechanical event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessEventKind {
    ProcessStarted,
    /// Handler-reported progress note (seeds caught, level reached, ...).
    Milestone,
    ProcessCompleted,
    /// Handler reported a failure through its update result.
    ProcessFailed,
    /// Handler returned a fault; the process was dropped.
    ProcessError,
    ProcessCancelled,
    /// Two processes wrote the same overwrite-style field in one tick.
    DeltaConflict,
}

/// Severity tier for a process event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Info,
    Warning,
    Critical,
}

/// Immutable record of something that happened to a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEvent {
    /// Simulation clock (seconds) when the event occurred.
    pub timestamp: f64,
    pub kind: ProcessEventKind,
    pub process_id: ProcessId,
    pub process_type: ProcessType,
    pub description: String,
    pub severity: EventSeverity,
}

impl ProcessEvent {
    #[must_use]
    pub fn new(
        timestamp: f64,
        kind: ProcessEventKind,
        process_id: ProcessId,
        process_type: ProcessType,
        description: impl Into<String>,
        severity: EventSeverity,
    ) -> Self {
        Self {
            timestamp,
            kind,
            process_id,
            process_type,
            description: description.into(),
            severity,
        }
    }

    /// Event about `handle`, stamped with the handle's last update time.
    #[must_use]
    pub fn for_handle(
        handle: &ProcessHandle,
        kind: ProcessEventKind,
        description: impl Into<String>,
        severity: EventSeverity,
    ) -> Self {
        Self::new(
            handle.last_update,
            kind,
            handle.id.clone(),
            handle.process_type,
            description,
            severity,
        )
    }

    #[must_use]
    pub fn milestone(handle: &ProcessHandle, description: impl Into<String>) -> Self {
        Self::for_handle(
            handle,
            ProcessEventKind::Milestone,
            description,
            EventSeverity::Info,
        )
    }
}

/// Bounded ring of recent events; the oldest entries are evicted first.
#[derive(Debug, Clone)]
pub struct EventLog {
    capacity: usize,
    entries: VecDeque<ProcessEvent>,
    evicted: u64,
}

impl EventLog {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity.min(1024)),
            evicted: 0,
        }
    }

    pub fn push(&mut self, event: ProcessEvent) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.evicted += 1;
        }
        self.entries.push_back(event);
    }

    pub fn extend<I: IntoIterator<Item = ProcessEvent>>(&mut self, events: I) {
        for event in events {
            self.push(event);
        }
    }

    /// Remove and return every retained event, oldest first.
    pub fn drain(&mut self) -> Vec<ProcessEvent> {
        self.entries.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessEvent> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of events dropped because the log was full.
    #[must_use]
    pub const fn evicted(&self) -> u64 {
        self.evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seq: u64) -> ProcessEvent {
        ProcessEvent::new(
            f64::from(u32::try_from(seq).unwrap()),
            ProcessEventKind::Milestone,
            ProcessId::new(ProcessType::Mining, seq),
            ProcessType::Mining,
            format!("note {seq}"),
            EventSeverity::Info,
        )
    }

    #[test]
    fn process_event_serializes_with_snake_case_kind() {
        let event = ProcessEvent::new(
            12.5,
            ProcessEventKind::ProcessFailed,
            ProcessId::new(ProcessType::Adventure, 3),
            ProcessType::Adventure,
            "hero exhausted",
            EventSeverity::Critical,
        );

        let json = serde_json::to_string(&event).expect("serialize");
        assert!(json.contains("\"process_failed\""));
        assert!(json.contains("\"adventure-3\""));
        let restored: ProcessEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(restored, event);
    }

    #[test]
    fn event_log_evicts_oldest_entries() {
        let mut log = EventLog::with_capacity(2);
        log.extend((1..=3).map(sample));

        assert_eq!(log.len(), 2);
        assert_eq!(log.evicted(), 1);
        let drained = log.drain();
        assert_eq!(drained[0].description, "note 2");
        assert_eq!(drained[1].description, "note 3");
        assert!(log.is_empty());
    }

    #[test]
    fn severity_orders_by_urgency() {
        assert!(EventSeverity::Critical > EventSeverity::Warning);
        assert!(EventSeverity::Warning > EventSeverity::Info);
    }
}
