//! Handler contract and the closed dispatch over the six process kinds.
use crate::data::DataStore;
use crate::delta::{ResourceDelta, StateChanges};
use crate::event::EventBatch;
use crate::state::SimulationState;

use super::{
    AdventureHandler, Completion, CraftingHandler, CropGrowthHandler, HelperTrainingHandler,
    MiningHandler, ProcessData, ProcessFault, ProcessHandle, ProcessMetadata, ProcessType,
    SeedCatchingHandler, StartRejection, UpdateOutcome,
};

/// Lifecycle operations every process kind implements.
///
/// Handlers never mutate the simulation state; every effect is returned as
/// [`StateChanges`] and applied by the manager.
pub trait ProcessLifecycle {
    fn process_type(&self) -> ProcessType;

    fn metadata(&self) -> ProcessMetadata;

    /// Pure precondition check.
    ///
    /// # Errors
    ///
    /// Returns the reason the process cannot start against `state`.
    fn can_start(
        &self,
        data: &ProcessData,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<(), StartRejection>;

    /// Derive computed fields into `handle.data` and return the start-time
    /// reservation (costs paid up front).
    ///
    /// # Errors
    ///
    /// Returns a rejection when the handle cannot be prepared.
    fn initialize(
        &self,
        handle: &mut ProcessHandle,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<StateChanges, StartRejection>;

    /// Advance the process by `dt` seconds against the pre-tick `state`.
    ///
    /// # Errors
    ///
    /// Returns a fault for unexpected conditions; the manager drops the process.
    fn update(
        &self,
        handle: &mut ProcessHandle,
        dt: f64,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<UpdateOutcome, ProcessFault>;

    /// Terminal rewards, computed once after an update reports completion.
    ///
    /// # Errors
    ///
    /// Returns a fault when the rewards cannot be computed.
    fn complete(
        &self,
        handle: &ProcessHandle,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<Completion, ProcessFault>;

    /// Cleanup notes for a cancelled handle. Reserved resources are forfeited.
    ///
    /// Only called for kinds whose metadata allows cancellation.
    fn cancel(&self, _handle: &ProcessHandle, _state: &SimulationState) -> EventBatch {
        EventBatch::new()
    }
}

/// Closed set of handlers, one per [`ProcessType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessHandler {
    CropGrowth(CropGrowthHandler),
    Adventure(AdventureHandler),
    Crafting(CraftingHandler),
    Mining(MiningHandler),
    SeedCatching(SeedCatchingHandler),
    HelperTraining(HelperTrainingHandler),
}

macro_rules! dispatch {
    ($self:expr, $handler:ident => $call:expr) => {
        match $self {
            ProcessHandler::CropGrowth($handler) => $call,
            ProcessHandler::Adventure($handler) => $call,
            ProcessHandler::Crafting($handler) => $call,
            ProcessHandler::Mining($handler) => $call,
            ProcessHandler::SeedCatching($handler) => $call,
            ProcessHandler::HelperTraining($handler) => $call,
        }
    };
}

impl ProcessHandler {
    /// The stock handler for `process_type`.
    #[must_use]
    pub const fn for_type(process_type: ProcessType) -> Self {
        match process_type {
            ProcessType::CropGrowth => Self::CropGrowth(CropGrowthHandler),
            ProcessType::Adventure => Self::Adventure(AdventureHandler),
            ProcessType::Crafting => Self::Crafting(CraftingHandler),
            ProcessType::Mining => Self::Mining(MiningHandler),
            ProcessType::SeedCatching => Self::SeedCatching(SeedCatchingHandler),
            ProcessType::HelperTraining => Self::HelperTraining(HelperTrainingHandler),
        }
    }
}

impl ProcessLifecycle for ProcessHandler {
    fn process_type(&self) -> ProcessType {
        dispatch!(self, handler => handler.process_type())
    }

    fn metadata(&self) -> ProcessMetadata {
        dispatch!(self, handler => handler.metadata())
    }

    fn can_start(
        &self,
        data: &ProcessData,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<(), StartRejection> {
        dispatch!(self, handler => handler.can_start(data, state, store))
    }

    fn initialize(
        &self,
        handle: &mut ProcessHandle,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<StateChanges, StartRejection> {
        dispatch!(self, handler => handler.initialize(handle, state, store))
    }

    fn update(
        &self,
        handle: &mut ProcessHandle,
        dt: f64,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<UpdateOutcome, ProcessFault> {
        dispatch!(self, handler => handler.update(handle, dt, state, store))
    }

    fn complete(
        &self,
        handle: &ProcessHandle,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<Completion, ProcessFault> {
        dispatch!(self, handler => handler.complete(handle, state, store))
    }

    fn cancel(&self, handle: &ProcessHandle, state: &SimulationState) -> EventBatch {
        dispatch!(self, handler => handler.cancel(handle, state))
    }
}

/// `"3 carrot, 1 beet"` style summary; `"nothing"` when empty.
pub(crate) fn describe(delta: &ResourceDelta) -> String {
    let parts: Vec<String> = delta
        .iter()
        .map(|(id, amount)| format!("{amount} {id}"))
        .collect();
    if parts.is_empty() {
        String::from("nothing")
    } else {
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_type_matches_process_type() {
        for kind in ProcessType::ALL {
            let handler = ProcessHandler::for_type(kind);
            assert_eq!(handler.process_type(), kind);
            assert!(handler.metadata().max_concurrent >= 1);
        }
    }

    #[test]
    fn only_growth_and_training_refuse_cancel() {
        let refusing: Vec<ProcessType> = ProcessType::ALL
            .into_iter()
            .filter(|kind| !ProcessHandler::for_type(*kind).metadata().can_cancel)
            .collect();
        assert_eq!(
            refusing,
            vec![ProcessType::CropGrowth, ProcessType::HelperTraining]
        );
    }

    #[test]
    fn describe_lists_entries_in_key_order() {
        let delta: ResourceDelta = [("wheat", 2), ("beet", 1)].into_iter().collect();
        assert_eq!(describe(&delta), "1 beet, 2 wheat");
        assert_eq!(describe(&ResourceDelta::new()), "nothing");
    }
}
