//! Tick orchestration: advances every active process, merges their deltas,
//! and applies the merged delta to the simulation state once per tick.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::config::{ConfigError, ManagerConfig};
use crate::data::DataStore;
use crate::delta::{ApplyReport, DeltaAccumulator, MergeConflict, StateChanges, apply_changes};
use crate::event::{EventLog, EventSeverity, ProcessEvent, ProcessEventKind};
use crate::numbers::sanitize_dt;
use crate::process::{
    ProcessData, ProcessFault, ProcessHandle, ProcessHandler, ProcessId, ProcessLifecycle,
    ProcessState, ProcessType, StartRejection, UpdateOutcome, UpdateStatus,
};
use crate::registry::{ProcessRegistry, RegistryError};
use crate::state::SimulationState;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Why `start_process` refused to create a handle. State is untouched in every case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("no handler registered for {0}")]
    NoHandler(ProcessType),
    #[error("{process_type} already has {limit} active")]
    ConcurrencyLimit {
        process_type: ProcessType,
        limit: usize,
    },
    #[error("cannot start: {0}")]
    Validation(StartRejection),
    #[error("initialization failed: {0}")]
    Initialization(StartRejection),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CancelError {
    #[error("process {0} is not active")]
    NotFound(ProcessId),
    #[error("process {0} cannot be cancelled")]
    NotCancellable(ProcessId),
}

/// How a process left the active set without completing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The handler reported `Failed` from `update`.
    Failed,
    /// The handler returned a fault.
    Fault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFailure {
    pub id: ProcessId,
    pub process_type: ProcessType,
    pub reason: String,
    pub kind: FailureKind,
}

/// Aggregate outcome of one tick.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProcessTickResult {
    /// Processes whose `update` returned, in visit order.
    pub updated: Vec<ProcessId>,
    /// Handles that completed this tick, in their terminal state.
    pub completed: Vec<ProcessHandle>,
    pub failed: Vec<ProcessFailure>,
    /// The merged delta applied to the state.
    pub changes: StateChanges,
    pub events: Vec<ProcessEvent>,
    pub conflicts: Vec<MergeConflict>,
    pub apply: ApplyReport,
}

impl ProcessTickResult {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty()
            && self.completed.is_empty()
            && self.failed.is_empty()
            && self.events.is_empty()
            && self.changes.is_empty()
    }
}

/// Lifetime counters for one manager.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcessStats {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub faulted: u64,
    pub cancelled: u64,
    pub rejected: u64,
    pub conflicts: u64,
    pub ticks: u64,
    pub simulated_seconds: f64,
    #[serde(default)]
    pub completed_by_type: BTreeMap<ProcessType, u64>,
    #[serde(default)]
    pub active: BTreeMap<ProcessType, usize>,
}

enum Exit {
    Completed(String),
    Failed(String),
    Faulted(ProcessFault),
}

/// Owns the registry and drives every active process once per tick.
#[derive(Debug, Clone)]
pub struct ProcessManager {
    registry: ProcessRegistry,
    config: ManagerConfig,
    clock: f64,
    next_sequence: u64,
    stats: ProcessStats,
    event_log: EventLog,
}

impl ProcessManager {
    /// Build a manager with all six handlers registered, applying any
    /// concurrency overrides from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid.
    pub fn new(config: ManagerConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        let mut registry = ProcessRegistry::new();
        for process_type in ProcessType::ALL {
            let handler = ProcessHandler::for_type(process_type);
            let mut metadata = handler.metadata();
            if let Some(max) = config.concurrency.get(&process_type) {
                metadata.max_concurrent = *max;
            }
            registry.register(process_type, metadata, handler)?;
        }
        Ok(Self {
            registry,
            event_log: EventLog::with_capacity(config.event_log_capacity),
            config,
            clock: 0.0,
            next_sequence: 0,
            stats: ProcessStats::default(),
        })
    }

    /// Simulation time in seconds, advanced by every tick.
    #[must_use]
    pub const fn clock(&self) -> f64 {
        self.clock
    }

    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Validate, initialize, and register a new process.
    ///
    /// On success the handler's start reservation has been applied to `state`.
    ///
    /// # Errors
    ///
    /// Returns the rejection reason; no handle is created and `state` is unchanged.
    pub fn start_process(
        &mut self,
        process_type: ProcessType,
        data: ProcessData,
        state: &mut SimulationState,
        store: &dyn DataStore,
    ) -> Result<ProcessHandle, StartError> {
        let Some(handler) = self.registry.handler(process_type).copied() else {
            return Err(self.reject(StartError::NoHandler(process_type)));
        };
        if !self.registry.can_start_process(process_type) {
            let limit = self
                .registry
                .metadata(process_type)
                .map_or(0, |meta| meta.max_concurrent);
            return Err(self.reject(StartError::ConcurrencyLimit {
                process_type,
                limit,
            }));
        }
        if let Err(reason) = handler.can_start(&data, state, store) {
            return Err(self.reject(StartError::Validation(reason)));
        }

        let id = ProcessId::new(process_type, self.next_sequence + 1);
        let mut handle = ProcessHandle::new(id, data, self.clock);
        let reservation = match handler.initialize(&mut handle, state, store) {
            Ok(reservation) => reservation,
            Err(reason) => return Err(self.reject(StartError::Initialization(reason))),
        };
        handle.state = ProcessState::Running;
        if let Err(err) = self.registry.add_active_process(handle.clone()) {
            return Err(self.reject(err.into()));
        }
        self.next_sequence += 1;
        if !reservation.is_empty() {
            apply_changes(state, &reservation);
        }

        log::debug!("started {} at t={:.1}", handle.id, self.clock);
        self.stats.started += 1;
        self.event_log.push(ProcessEvent::for_handle(
            &handle,
            ProcessEventKind::ProcessStarted,
            format!("{process_type} started"),
            EventSeverity::Info,
        ));
        Ok(handle)
    }

    fn reject(&mut self, err: StartError) -> StartError {
        log::debug!("start rejected: {err}");
        self.stats.rejected += 1;
        err
    }

    /// Remove an active process without producing a delta. Resources reserved
    /// at start are forfeited.
    ///
    /// # Errors
    ///
    /// `NotFound` when `id` is not active; `NotCancellable` when the handler's
    /// metadata forbids cancellation.
    pub fn cancel_process(
        &mut self,
        id: &ProcessId,
        state: &SimulationState,
    ) -> Result<ProcessHandle, CancelError> {
        let Some(process_type) = self.registry.active_process(id).map(|h| h.process_type) else {
            return Err(CancelError::NotFound(id.clone()));
        };
        let cancellable = self
            .registry
            .metadata(process_type)
            .is_some_and(|meta| meta.can_cancel);
        if !cancellable {
            return Err(CancelError::NotCancellable(id.clone()));
        }
        let (Some(handler), Some(mut handle)) = (
            self.registry.handler(process_type).copied(),
            self.registry.remove_active_process(id),
        ) else {
            return Err(CancelError::NotFound(id.clone()));
        };

        handle.state = ProcessState::Cancelled;
        handle.last_update = self.clock;
        let cleanup = handler.cancel(&handle, state);
        self.event_log.extend(cleanup);
        self.event_log.push(ProcessEvent::for_handle(
            &handle,
            ProcessEventKind::ProcessCancelled,
            format!("{process_type} cancelled"),
            EventSeverity::Info,
        ));
        log::debug!("cancelled {id}");
        self.stats.cancelled += 1;
        Ok(handle)
    }

    /// Advance every active process by `dt` seconds and apply the merged delta.
    ///
    /// Handlers read the pre-tick state; nothing is written until every
    /// process has been visited. Failures and faults are isolated to the
    /// offending process.
    pub fn tick(
        &mut self,
        dt: f64,
        state: &mut SimulationState,
        store: &dyn DataStore,
    ) -> ProcessTickResult {
        let dt = sanitize_dt(dt);
        let now = self.clock + dt;
        let mut accumulator = DeltaAccumulator::new(self.config.conflict_policy);
        let mut result = ProcessTickResult::default();

        let pre_tick: &SimulationState = &*state;
        for id in self.registry.active_ids() {
            let exit = {
                let Some((handler, handle)) = self.registry.handler_and_process_mut(&id) else {
                    continue;
                };
                let handler = *handler;
                handle.last_update = now;
                handle.state = ProcessState::Running;
                match handler.update(handle, dt, pre_tick, store) {
                    Err(fault) => Some(Exit::Faulted(fault)),
                    Ok(UpdateOutcome {
                        changes,
                        events,
                        status,
                    }) => {
                        result.updated.push(id.clone());
                        merge_into(&mut accumulator, handle, changes, now, &mut result.events);
                        result.events.extend(events);
                        match status {
                            UpdateStatus::Running => None,
                            UpdateStatus::Failed(reason) => Some(Exit::Failed(reason)),
                            UpdateStatus::Completed => {
                                match handler.complete(handle, pre_tick, store) {
                                    Ok(completion) => {
                                        merge_into(
                                            &mut accumulator,
                                            handle,
                                            completion.changes,
                                            now,
                                            &mut result.events,
                                        );
                                        result.events.extend(completion.events);
                                        Some(Exit::Completed(completion.summary))
                                    }
                                    Err(fault) => Some(Exit::Faulted(fault)),
                                }
                            }
                        }
                    }
                }
            };
            let Some(exit) = exit else {
                continue;
            };
            let Some(mut handle) = self.registry.remove_active_process(&id) else {
                continue;
            };
            self.retire(&mut handle, exit, &mut result);
        }

        let (changes, conflicts) = accumulator.into_parts();
        if !changes.is_empty() {
            result.apply = apply_changes(state, &changes);
            if let Some(level) = settle_hero_level(state, store) {
                log::debug!("hero reached level {level} at t={now:.1}");
            }
        }
        result.changes = changes;
        result.conflicts = conflicts;

        self.clock = now;
        self.stats.ticks += 1;
        self.stats.simulated_seconds = now;
        self.stats.conflicts += u64::try_from(result.conflicts.len()).unwrap_or(u64::MAX);
        self.event_log.extend(result.events.iter().cloned());
        result
    }

    /// Record the terminal state of a removed handle.
    fn retire(&mut self, handle: &mut ProcessHandle, exit: Exit, result: &mut ProcessTickResult) {
        match exit {
            Exit::Completed(summary) => {
                handle.state = ProcessState::Completed;
                handle.record_progress(1.0);
                log::debug!("{} completed: {summary}", handle.id);
                result.events.push(ProcessEvent::for_handle(
                    handle,
                    ProcessEventKind::ProcessCompleted,
                    summary,
                    EventSeverity::Info,
                ));
                self.stats.completed += 1;
                *self
                    .stats
                    .completed_by_type
                    .entry(handle.process_type)
                    .or_insert(0) += 1;
                result.completed.push(handle.clone());
            }
            Exit::Failed(reason) => {
                handle.state = ProcessState::Failed;
                log::warn!("{} failed: {reason}", handle.id);
                result.events.push(ProcessEvent::for_handle(
                    handle,
                    ProcessEventKind::ProcessFailed,
                    reason.clone(),
                    EventSeverity::Critical,
                ));
                self.stats.failed += 1;
                result.failed.push(ProcessFailure {
                    id: handle.id.clone(),
                    process_type: handle.process_type,
                    reason,
                    kind: FailureKind::Failed,
                });
            }
            Exit::Faulted(fault) => {
                handle.state = ProcessState::Failed;
                let reason = fault.to_string();
                log::warn!("{} faulted: {reason}", handle.id);
                result.events.push(ProcessEvent::for_handle(
                    handle,
                    ProcessEventKind::ProcessError,
                    reason.clone(),
                    EventSeverity::Critical,
                ));
                self.stats.faulted += 1;
                result.failed.push(ProcessFailure {
                    id: handle.id.clone(),
                    process_type: handle.process_type,
                    reason,
                    kind: FailureKind::Fault,
                });
            }
        }
    }

    /// Active processes in tick order.
    pub fn active_processes(&self) -> impl Iterator<Item = &ProcessHandle> {
        self.registry.active_processes()
    }

    pub fn active_processes_by_type(
        &self,
        process_type: ProcessType,
    ) -> impl Iterator<Item = &ProcessHandle> {
        self.registry.active_processes_by_type(process_type)
    }

    #[must_use]
    pub fn active_process(&self, id: &ProcessId) -> Option<&ProcessHandle> {
        self.registry.active_process(id)
    }

    #[must_use]
    pub fn has_active_process(&self, process_type: ProcessType) -> bool {
        self.registry.active_count(process_type) > 0
    }

    #[must_use]
    pub fn can_start_process(&self, process_type: ProcessType) -> bool {
        self.registry.can_start_process(process_type)
    }

    /// Lifetime counters plus the current active count per type.
    #[must_use]
    pub fn stats(&self) -> ProcessStats {
        let mut stats = self.stats.clone();
        stats.active = ProcessType::ALL
            .into_iter()
            .map(|kind| (kind, self.registry.active_count(kind)))
            .filter(|(_, count)| *count > 0)
            .collect();
        stats
    }

    /// Take every retained event, oldest first.
    pub fn drain_events(&mut self) -> Vec<ProcessEvent> {
        self.event_log.drain()
    }

    #[must_use]
    pub const fn event_log(&self) -> &EventLog {
        &self.event_log
    }
}

/// Merge `changes` from `handle` and turn any overwrite conflicts into events.
fn merge_into(
    accumulator: &mut DeltaAccumulator,
    handle: &ProcessHandle,
    changes: StateChanges,
    now: f64,
    events: &mut Vec<ProcessEvent>,
) {
    for conflict in accumulator.merge(&handle.id, changes) {
        log::warn!(
            "{} written by {} and {}; kept {}",
            conflict.field,
            conflict.previous_writer,
            conflict.later_writer,
            conflict.kept
        );
        events.push(ProcessEvent::new(
            now,
            ProcessEventKind::DeltaConflict,
            handle.id.clone(),
            handle.process_type,
            format!(
                "{} also written by {}; kept {}",
                conflict.field, conflict.previous_writer, conflict.kept
            ),
            EventSeverity::Warning,
        ));
    }
}

/// Raise the hero level to the one the experience curve grants.
///
/// Returns the new level when it moved.
fn settle_hero_level(state: &mut SimulationState, store: &dyn DataStore) -> Option<u32> {
    let progression = &mut state.progression;
    let earned = store.hero_level_for(progression.experience);
    if earned > progression.hero_level {
        progression.hero_level = earned;
        Some(earned)
    } else {
        None
    }
}
