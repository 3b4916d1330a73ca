//! Handler bindings and the insertion-ordered set of active processes.
use indexmap::IndexMap;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::process::{
    ProcessHandle, ProcessHandler, ProcessId, ProcessLifecycle, ProcessMetadata, ProcessType,
};

/// Configuration mistakes caught while wiring the registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a handler for {0} is already registered")]
    DuplicateRegistration(ProcessType),
    #[error("handler for {handler} registered under {declared}")]
    HandlerMismatch {
        declared: ProcessType,
        handler: ProcessType,
    },
    #[error("process {0} is already active")]
    DuplicateProcessId(ProcessId),
    #[error("no handler registered for {0}")]
    Unregistered(ProcessType),
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    metadata: ProcessMetadata,
    handler: ProcessHandler,
}

/// Bookkeeping for handlers and live processes.
///
/// Iteration over active processes follows insertion order; removals keep the
/// relative order of the remaining entries.
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    bindings: BTreeMap<ProcessType, Binding>,
    active: IndexMap<ProcessId, ProcessHandle>,
}

impl ProcessRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `process_type` with the given policy.
    ///
    /// # Errors
    ///
    /// Fails when the type is already bound or the handler serves another type.
    pub fn register(
        &mut self,
        process_type: ProcessType,
        metadata: ProcessMetadata,
        handler: ProcessHandler,
    ) -> Result<(), RegistryError> {
        if self.bindings.contains_key(&process_type) {
            return Err(RegistryError::DuplicateRegistration(process_type));
        }
        if handler.process_type() != process_type {
            return Err(RegistryError::HandlerMismatch {
                declared: process_type,
                handler: handler.process_type(),
            });
        }
        self.bindings
            .insert(process_type, Binding { metadata, handler });
        Ok(())
    }

    #[must_use]
    pub fn is_registered(&self, process_type: ProcessType) -> bool {
        self.bindings.contains_key(&process_type)
    }

    #[must_use]
    pub fn handler(&self, process_type: ProcessType) -> Option<&ProcessHandler> {
        self.bindings.get(&process_type).map(|b| &b.handler)
    }

    #[must_use]
    pub fn metadata(&self, process_type: ProcessType) -> Option<ProcessMetadata> {
        self.bindings.get(&process_type).map(|b| b.metadata)
    }

    /// True while the active count for `process_type` is under its limit.
    /// Unregistered types can never start.
    #[must_use]
    pub fn can_start_process(&self, process_type: ProcessType) -> bool {
        self.metadata(process_type)
            .is_some_and(|meta| self.active_count(process_type) < meta.max_concurrent)
    }

    /// # Errors
    ///
    /// Rejects unregistered types and ids that are already active.
    pub fn add_active_process(&mut self, handle: ProcessHandle) -> Result<(), RegistryError> {
        if !self.is_registered(handle.process_type) {
            return Err(RegistryError::Unregistered(handle.process_type));
        }
        if self.active.contains_key(&handle.id) {
            return Err(RegistryError::DuplicateProcessId(handle.id));
        }
        self.active.insert(handle.id.clone(), handle);
        Ok(())
    }

    pub fn remove_active_process(&mut self, id: &ProcessId) -> Option<ProcessHandle> {
        self.active.shift_remove(id)
    }

    #[must_use]
    pub fn active_process(&self, id: &ProcessId) -> Option<&ProcessHandle> {
        self.active.get(id)
    }

    /// Active processes in insertion order.
    pub fn active_processes(&self) -> impl Iterator<Item = &ProcessHandle> {
        self.active.values()
    }

    pub fn active_processes_by_type(
        &self,
        process_type: ProcessType,
    ) -> impl Iterator<Item = &ProcessHandle> {
        self.active
            .values()
            .filter(move |handle| handle.process_type == process_type)
    }

    #[must_use]
    pub fn active_count(&self, process_type: ProcessType) -> usize {
        self.active_processes_by_type(process_type).count()
    }

    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Snapshot of active ids in iteration order.
    #[must_use]
    pub fn active_ids(&self) -> Vec<ProcessId> {
        self.active.keys().cloned().collect()
    }

    /// Handler and mutable handle for one active process.
    pub fn handler_and_process_mut(
        &mut self,
        id: &ProcessId,
    ) -> Option<(&ProcessHandler, &mut ProcessHandle)> {
        let handle = self.active.get_mut(id)?;
        let binding = self.bindings.get(&handle.process_type)?;
        Some((&binding.handler, handle))
    }
}
