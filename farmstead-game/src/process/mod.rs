//! Process primitives shared by the handlers, registry, and manager.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::delta::StateChanges;
use crate::event::EventBatch;

/// Payload accessors and mismatch errors for one handler module.
macro_rules! payload_accessors {
    ($variant:ident, $data:ty) => {
        fn payload(data: &ProcessData) -> Result<&$data, ProcessType> {
            match data {
                ProcessData::$variant(inner) => Ok(inner),
                other => Err(other.process_type()),
            }
        }

        fn payload_mut(data: &mut ProcessData) -> Result<&mut $data, ProcessType> {
            match data {
                ProcessData::$variant(inner) => Ok(inner),
                other => Err(other.process_type()),
            }
        }

        const fn fault(found: ProcessType) -> ProcessFault {
            ProcessFault::PayloadMismatch {
                expected: ProcessType::$variant,
                found,
            }
        }

        const fn rejection(found: ProcessType) -> StartRejection {
            StartRejection::PayloadMismatch {
                expected: ProcessType::$variant,
                found,
            }
        }
    };
}

pub mod adventure;
pub mod crafting;
pub mod crop_growth;
pub mod handler;
pub mod helper_training;
pub mod mining;
pub mod seed_catching;

pub use adventure::{AdventureData, AdventureHandler};
pub use crafting::{CraftingData, CraftingHandler};
pub use crop_growth::{CropGrowthData, CropGrowthHandler};
pub use handler::{ProcessHandler, ProcessLifecycle};
pub use helper_training::{HelperTrainingData, HelperTrainingHandler};
pub use mining::{MiningData, MiningHandler};
pub use seed_catching::{SeedCatchingData, SeedCatchingHandler};

/// Closed set of long-running activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessType {
    CropGrowth,
    Adventure,
    Crafting,
    Mining,
    SeedCatching,
    HelperTraining,
}

impl ProcessType {
    pub const ALL: [Self; 6] = [
        Self::CropGrowth,
        Self::Adventure,
        Self::Crafting,
        Self::Mining,
        Self::SeedCatching,
        Self::HelperTraining,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CropGrowth => "crop_growth",
            Self::Adventure => "adventure",
            Self::Crafting => "crafting",
            Self::Mining => "mining",
            Self::SeedCatching => "seed_catching",
            Self::HelperTraining => "helper_training",
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// Deterministic process identifier, unique within one manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(String);

impl ProcessId {
    #[must_use]
    pub fn new(process_type: ProcessType, sequence: u64) -> Self {
        Self(format!("{}-{sequence}", process_type.as_str()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProcessId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Lifecycle of a process handle. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Starting,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ProcessState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Static policy declared by a handler at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessMetadata {
    pub max_concurrent: usize,
    pub can_pause: bool,
    pub can_cancel: bool,
}

impl ProcessMetadata {
    #[must_use]
    pub const fn new(max_concurrent: usize, can_pause: bool, can_cancel: bool) -> Self {
        Self {
            max_concurrent,
            can_pause,
            can_cancel,
        }
    }
}

/// Type-specific payload carried by a handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessData {
    CropGrowth(CropGrowthData),
    Adventure(AdventureData),
    Crafting(CraftingData),
    Mining(MiningData),
    SeedCatching(SeedCatchingData),
    HelperTraining(HelperTrainingData),
}

impl ProcessData {
    #[must_use]
    pub const fn process_type(&self) -> ProcessType {
        match self {
            Self::CropGrowth(_) => ProcessType::CropGrowth,
            Self::Adventure(_) => ProcessType::Adventure,
            Self::Crafting(_) => ProcessType::Crafting,
            Self::Mining(_) => ProcessType::Mining,
            Self::SeedCatching(_) => ProcessType::SeedCatching,
            Self::HelperTraining(_) => ProcessType::HelperTraining,
        }
    }
}

/// One in-flight activity tracked by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessHandle {
    pub id: ProcessId,
    pub process_type: ProcessType,
    pub data: ProcessData,
    pub start_time: f64,
    pub last_update: f64,
    /// Fraction complete in `[0, 1]`; never decreases while running.
    pub progress: f64,
    pub state: ProcessState,
}

impl ProcessHandle {
    #[must_use]
    pub fn new(id: ProcessId, data: ProcessData, now: f64) -> Self {
        Self {
            id,
            process_type: data.process_type(),
            data,
            start_time: now,
            last_update: now,
            progress: 0.0,
            state: ProcessState::Starting,
        }
    }

    /// Record a new progress reading, keeping the value monotonic and in range.
    pub fn record_progress(&mut self, progress: f64) {
        let bounded = if progress.is_finite() {
            progress.clamp(0.0, 1.0)
        } else {
            0.0
        };
        self.progress = self.progress.max(bounded);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.progress >= 1.0
    }
}

/// Advance an elapsed-time counter by `dt` and return the resulting progress ratio.
///
/// Elapsed time never exceeds `duration`; a non-positive duration completes immediately.
pub fn advance_elapsed(elapsed: &mut f64, dt: f64, duration: f64) -> f64 {
    if duration <= 0.0 || !duration.is_finite() {
        *elapsed = duration.max(0.0);
        return 1.0;
    }
    *elapsed = (*elapsed + dt).min(duration);
    (*elapsed / duration).min(1.0)
}

/// Lifecycle status reported by a single `update` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum UpdateStatus {
    Running,
    Completed,
    Failed(String),
}

/// Result of advancing one process by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub changes: StateChanges,
    pub events: EventBatch,
    pub status: UpdateStatus,
}

impl UpdateOutcome {
    #[must_use]
    pub fn running(changes: StateChanges) -> Self {
        Self {
            changes,
            events: EventBatch::new(),
            status: UpdateStatus::Running,
        }
    }

    /// `Completed` when `finished`, `Running` otherwise.
    #[must_use]
    pub fn progressed(changes: StateChanges, finished: bool) -> Self {
        let status = if finished {
            UpdateStatus::Completed
        } else {
            UpdateStatus::Running
        };
        Self {
            changes,
            events: EventBatch::new(),
            status,
        }
    }

    #[must_use]
    pub fn failed(changes: StateChanges, reason: impl Into<String>) -> Self {
        Self {
            changes,
            events: EventBatch::new(),
            status: UpdateStatus::Failed(reason.into()),
        }
    }
}

/// Terminal rewards computed by `complete`.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub changes: StateChanges,
    pub events: EventBatch,
    /// Human-readable reward summary used for the completion event.
    pub summary: String,
}

impl Completion {
    #[must_use]
    pub fn new(changes: StateChanges, summary: impl Into<String>) -> Self {
        Self {
            changes,
            events: EventBatch::new(),
            summary: summary.into(),
        }
    }
}

/// Why a process could not be started.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StartRejection {
    #[error("unknown {kind} '{id}'")]
    UnknownDefinition { kind: &'static str, id: String },
    #[error("payload for {found} given to the {expected} handler")]
    PayloadMismatch {
        expected: ProcessType,
        found: ProcessType,
    },
    #[error("not enough {resource}: need {required}, have {available}")]
    Insufficient {
        resource: String,
        required: String,
        available: String,
    },
    #[error("requires {0}")]
    Locked(String),
    #[error("{0}")]
    Invalid(String),
}

impl StartRejection {
    #[must_use]
    pub fn insufficient(
        resource: impl Into<String>,
        required: impl fmt::Display,
        available: impl fmt::Display,
    ) -> Self {
        Self::Insufficient {
            resource: resource.into(),
            required: required.to_string(),
            available: available.to_string(),
        }
    }
}

/// Unexpected handler error; fatal to the offending process only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessFault {
    #[error("{kind} '{id}' vanished from the data store")]
    MissingDefinition { kind: &'static str, id: String },
    #[error("payload for {found} given to the {expected} handler")]
    PayloadMismatch {
        expected: ProcessType,
        found: ProcessType,
    },
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_type_names_round_trip() {
        for kind in ProcessType::ALL {
            assert_eq!(kind.as_str().parse::<ProcessType>(), Ok(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
        assert!("gardening".parse::<ProcessType>().is_err());
    }

    #[test]
    fn process_ids_are_prefixed_by_type() {
        let id = ProcessId::new(ProcessType::SeedCatching, 42);
        assert_eq!(id.as_str(), "seed_catching-42");
        assert_eq!(id.to_string(), "seed_catching-42");
    }

    #[test]
    fn terminal_states_are_final() {
        assert!(!ProcessState::Starting.is_terminal());
        assert!(!ProcessState::Running.is_terminal());
        assert!(ProcessState::Completed.is_terminal());
        assert!(ProcessState::Cancelled.is_terminal());
        assert!(ProcessState::Failed.is_terminal());
    }

    #[test]
    fn record_progress_is_monotonic_and_bounded() {
        let data = ProcessData::Mining(MiningData::new(1));
        let mut handle = ProcessHandle::new(ProcessId::new(ProcessType::Mining, 1), data, 0.0);
        handle.record_progress(0.4);
        handle.record_progress(0.2);
        assert!((handle.progress - 0.4).abs() < f64::EPSILON);
        handle.record_progress(7.0);
        assert!((handle.progress - 1.0).abs() < f64::EPSILON);
        assert!(handle.is_finished());
        handle.record_progress(f64::NAN);
        assert!((handle.progress - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn advance_elapsed_caps_at_duration() {
        let mut elapsed = 0.0;
        assert!((advance_elapsed(&mut elapsed, 30.0, 60.0) - 0.5).abs() < f64::EPSILON);
        assert!((advance_elapsed(&mut elapsed, 45.0, 60.0) - 1.0).abs() < f64::EPSILON);
        assert!((elapsed - 60.0).abs() < f64::EPSILON);

        let mut instant = 0.0;
        assert!((advance_elapsed(&mut instant, 1.0, 0.0) - 1.0).abs() < f64::EPSILON);
    }
}
