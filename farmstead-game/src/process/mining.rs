use serde::{Deserialize, Serialize};

use crate::data::{DataStore, MineLevelDef};
use crate::delta::StateChanges;
use crate::event::{EventBatch, ProcessEvent};
use crate::state::{Screen, SimulationState};

use super::handler::{ProcessLifecycle, describe};
use super::{
    Completion, ProcessData, ProcessFault, ProcessHandle, ProcessMetadata, ProcessType,
    StartRejection, UpdateOutcome, advance_elapsed,
};

/// A dig at a fixed mine depth. Energy drains every second underground.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MiningData {
    pub depth: u32,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub elapsed: f64,
}

impl MiningData {
    #[must_use]
    pub const fn new(depth: u32) -> Self {
        Self {
            depth,
            duration: 0.0,
            elapsed: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MiningHandler;

impl MiningHandler {
    pub const METADATA: ProcessMetadata = ProcessMetadata::new(1, true, true);
}

payload_accessors!(Mining, MiningData);

fn level(store: &dyn DataStore, depth: u32) -> Option<&MineLevelDef> {
    store.mining().level(depth)
}

impl ProcessLifecycle for MiningHandler {
    fn process_type(&self) -> ProcessType {
        ProcessType::Mining
    }

    fn metadata(&self) -> ProcessMetadata {
        Self::METADATA
    }

    fn can_start(
        &self,
        data: &ProcessData,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<(), StartRejection> {
        let data = payload(data).map_err(rejection)?;
        let depth_def =
            level(store, data.depth).ok_or_else(|| StartRejection::UnknownDefinition {
                kind: "mine level",
                id: data.depth.to_string(),
            })?;
        if state.progression.hero_level < depth_def.min_level {
            return Err(StartRejection::Locked(format!(
                "hero level {}",
                depth_def.min_level
            )));
        }
        let first_second = store.mining().drain_rate(data.depth);
        if !state.resources.energy.covers(first_second) {
            return Err(StartRejection::insufficient(
                "energy",
                first_second,
                state.resources.energy.current,
            ));
        }
        Ok(())
    }

    fn initialize(
        &self,
        handle: &mut ProcessHandle,
        _state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<StateChanges, StartRejection> {
        let data = payload_mut(&mut handle.data).map_err(rejection)?;
        let depth_def =
            level(store, data.depth).ok_or_else(|| StartRejection::UnknownDefinition {
                kind: "mine level",
                id: data.depth.to_string(),
            })?;
        data.duration = depth_def.duration;
        data.elapsed = 0.0;
        Ok(StateChanges {
            current_screen: Some(Screen::Mine),
            ..StateChanges::default()
        })
    }

    fn update(
        &self,
        handle: &mut ProcessHandle,
        dt: f64,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<UpdateOutcome, ProcessFault> {
        let data = payload_mut(&mut handle.data).map_err(fault)?;
        let step = dt.min((data.duration - data.elapsed).max(0.0));
        let drain = store.mining().drain_rate(data.depth) * step;
        if !drain.is_finite() {
            return Err(ProcessFault::NonFinite("mining energy drain"));
        }

        let available = state.resources.energy.current;
        if drain > 0.0 && available < drain {
            let changes = StateChanges {
                energy: -available,
                ..StateChanges::default()
            };
            return Ok(UpdateOutcome::failed(
                changes,
                format!("too exhausted to dig at depth {}", data.depth),
            ));
        }

        let progress = advance_elapsed(&mut data.elapsed, step, data.duration);
        handle.record_progress(progress);
        Ok(UpdateOutcome::progressed(
            StateChanges {
                energy: -drain,
                ..StateChanges::default()
            },
            handle.is_finished(),
        ))
    }

    fn complete(
        &self,
        handle: &ProcessHandle,
        _state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<Completion, ProcessFault> {
        let data = payload(&handle.data).map_err(fault)?;
        let depth_def = level(store, data.depth).ok_or_else(|| ProcessFault::MissingDefinition {
            kind: "mine level",
            id: data.depth.to_string(),
        })?;

        let mut changes = StateChanges::new();
        for (ore, amount) in &depth_def.ores {
            changes.materials.add(ore.clone(), *amount);
        }
        let summary = format!(
            "mined {} at depth {}",
            describe(&changes.materials),
            data.depth
        );
        Ok(Completion::new(changes, summary))
    }

    fn cancel(&self, handle: &ProcessHandle, _state: &SimulationState) -> EventBatch {
        let mut notes = EventBatch::new();
        if let Ok(data) = payload(&handle.data) {
            notes.push(ProcessEvent::milestone(
                handle,
                format!("left depth {} after {:.0}s", data.depth, data.elapsed),
            ));
        }
        notes
    }
}
