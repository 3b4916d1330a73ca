use serde::{Deserialize, Serialize};

use crate::data::{DataStore, RecipeDef};
use crate::delta::StateChanges;
use crate::event::{EventBatch, ProcessEvent};
use crate::state::{Screen, SimulationState};

use super::handler::{ProcessLifecycle, describe};
use super::{
    Completion, ProcessData, ProcessFault, ProcessHandle, ProcessMetadata, ProcessType,
    StartRejection, UpdateOutcome, advance_elapsed,
};

/// One recipe being worked at the forge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CraftingData {
    pub recipe_id: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub elapsed: f64,
}

impl CraftingData {
    #[must_use]
    pub fn new(recipe_id: &str) -> Self {
        Self {
            recipe_id: recipe_id.to_string(),
            duration: 0.0,
            elapsed: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CraftingHandler;

impl CraftingHandler {
    pub const METADATA: ProcessMetadata = ProcessMetadata::new(1, false, true);
}

payload_accessors!(Crafting, CraftingData);

fn lookup<'a>(store: &'a dyn DataStore, id: &str) -> Result<&'a RecipeDef, StartRejection> {
    store
        .recipe(id)
        .ok_or_else(|| StartRejection::UnknownDefinition {
            kind: "recipe",
            id: id.to_string(),
        })
}

impl ProcessLifecycle for CraftingHandler {
    fn process_type(&self) -> ProcessType {
        ProcessType::Crafting
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
        let recipe = lookup(store, &data.recipe_id)?;
        let progression = &state.progression;
        let resources = &state.resources;

        if let Some(required) = &recipe.requires
            && !progression.has_upgrade(required)
        {
            return Err(StartRejection::Locked(required.clone()));
        }
        if let Some(unlock) = &recipe.unlocks
            && progression.has_upgrade(unlock)
        {
            return Err(StartRejection::Invalid(format!("{unlock} already unlocked")));
        }
        if let Some((material, amount)) = recipe
            .materials
            .iter()
            .find(|(id, amount)| resources.material_count(id) < **amount)
        {
            return Err(StartRejection::insufficient(
                material.clone(),
                amount,
                resources.material_count(material),
            ));
        }
        if !resources.energy.covers(recipe.energy_cost) {
            return Err(StartRejection::insufficient(
                "energy",
                recipe.energy_cost,
                resources.energy.current,
            ));
        }
        if resources.gold < recipe.gold_cost {
            return Err(StartRejection::insufficient(
                "gold",
                recipe.gold_cost,
                resources.gold,
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
        let recipe = lookup(store, &data.recipe_id)?;
        data.duration = recipe.duration;
        data.elapsed = 0.0;

        let mut reservation = StateChanges {
            energy: -recipe.energy_cost,
            gold: -recipe.gold_cost,
            current_screen: Some(Screen::Forge),
            ..StateChanges::default()
        };
        for (material, amount) in &recipe.materials {
            reservation.materials.add(material.clone(), -amount);
        }
        Ok(reservation)
    }

    fn update(
        &self,
        handle: &mut ProcessHandle,
        dt: f64,
        _state: &SimulationState,
        _store: &dyn DataStore,
    ) -> Result<UpdateOutcome, ProcessFault> {
        let data = payload_mut(&mut handle.data).map_err(fault)?;
        let progress = advance_elapsed(&mut data.elapsed, dt, data.duration);
        handle.record_progress(progress);
        Ok(UpdateOutcome::progressed(
            StateChanges::new(),
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
        let recipe = store
            .recipe(&data.recipe_id)
            .ok_or_else(|| ProcessFault::MissingDefinition {
                kind: "recipe",
                id: data.recipe_id.clone(),
            })?;

        let mut changes = StateChanges::new();
        for (material, amount) in &recipe.outputs {
            changes.materials.add(material.clone(), *amount);
        }
        if let Some(unlock) = &recipe.unlocks {
            changes.unlock(unlock.clone());
        }
        changes.experience = recipe.experience;
        let summary = format!("crafted {}", describe(&changes.materials));
        let mut completion = Completion::new(changes, summary);
        if let Some(unlock) = &recipe.unlocks {
            completion
                .events
                .push(ProcessEvent::milestone(handle, format!("unlocked {unlock}")));
        }
        Ok(completion)
    }

    fn cancel(&self, handle: &ProcessHandle, _state: &SimulationState) -> EventBatch {
        let mut notes = EventBatch::new();
        if let Ok(data) = payload(&handle.data) {
            notes.push(ProcessEvent::milestone(
                handle,
                format!("abandoned {}; reserved materials forfeited", data.recipe_id),
            ));
        }
        notes
    }
}
