use serde::{Deserialize, Serialize};

use crate::combat::{CombatModifiers, Equipment};
use crate::data::{AdventureDef, DataStore};
use crate::delta::StateChanges;
use crate::event::{EventBatch, ProcessEvent};
use crate::numbers::scale_amount;
use crate::state::{Screen, SimulationState};

use super::handler::{ProcessLifecycle, describe};
use super::{
    Completion, ProcessData, ProcessFault, ProcessHandle, ProcessMetadata, ProcessType,
    StartRejection, UpdateOutcome, advance_elapsed,
};

/// Hero expedition. Duration and drain are fixed at start from the combat collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdventureData {
    pub adventure_id: String,
    #[serde(default)]
    pub equipment: Equipment,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub elapsed: f64,
    #[serde(default)]
    pub modifiers: CombatModifiers,
}

impl AdventureData {
    #[must_use]
    pub fn new(adventure_id: &str) -> Self {
        Self {
            adventure_id: adventure_id.to_string(),
            equipment: Equipment::default(),
            duration: 0.0,
            elapsed: 0.0,
            modifiers: CombatModifiers::NEUTRAL,
        }
    }

    #[must_use]
    pub fn with_equipment(mut self, equipment: Equipment) -> Self {
        self.equipment = equipment;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdventureHandler;

impl AdventureHandler {
    pub const METADATA: ProcessMetadata = ProcessMetadata::new(1, false, true);
}

payload_accessors!(Adventure, AdventureData);

fn definition<'a>(store: &'a dyn DataStore, id: &str) -> Result<&'a AdventureDef, ProcessFault> {
    store
        .adventure(id)
        .ok_or_else(|| ProcessFault::MissingDefinition {
            kind: "adventure",
            id: id.to_string(),
        })
}

impl ProcessLifecycle for AdventureHandler {
    fn process_type(&self) -> ProcessType {
        ProcessType::Adventure
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
        let adventure =
            store
                .adventure(&data.adventure_id)
                .ok_or_else(|| StartRejection::UnknownDefinition {
                    kind: "adventure",
                    id: data.adventure_id.clone(),
                })?;
        if state.progression.hero_level < adventure.min_level {
            return Err(StartRejection::Locked(format!(
                "hero level {}",
                adventure.min_level
            )));
        }
        if !state.resources.energy.covers(adventure.energy_cost) {
            return Err(StartRejection::insufficient(
                "energy",
                adventure.energy_cost,
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
        let adventure =
            store
                .adventure(&data.adventure_id)
                .ok_or_else(|| StartRejection::UnknownDefinition {
                    kind: "adventure",
                    id: data.adventure_id.clone(),
                })?;
        data.modifiers = store
            .combat()
            .modifiers(adventure.boss.as_deref(), &data.equipment);
        data.duration = adventure.duration * data.modifiers.duration_multiplier;
        data.elapsed = 0.0;

        Ok(StateChanges {
            energy: -adventure.energy_cost,
            current_screen: Some(Screen::Adventure),
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
        let adventure = definition(store, &data.adventure_id)?;
        let step = dt.min((data.duration - data.elapsed).max(0.0));
        let drain =
            adventure.energy_per_second * step * data.modifiers.energy_drain_multiplier;
        if !drain.is_finite() {
            return Err(ProcessFault::NonFinite("adventure energy drain"));
        }

        let available = state.resources.energy.current;
        if drain > 0.0 && available < drain {
            let changes = StateChanges {
                energy: -available,
                ..StateChanges::default()
            };
            return Ok(UpdateOutcome::failed(
                changes,
                format!("hero exhausted on {}", data.adventure_id),
            ));
        }

        let before = data.elapsed;
        let progress = advance_elapsed(&mut data.elapsed, step, data.duration);
        let halfway = data.duration / 2.0;
        let boss = if before < halfway && data.elapsed >= halfway {
            adventure.boss.clone()
        } else {
            None
        };
        handle.record_progress(progress);

        let mut outcome = UpdateOutcome::progressed(
            StateChanges {
                energy: -drain,
                ..StateChanges::default()
            },
            handle.is_finished(),
        );
        if let Some(boss) = boss {
            outcome
                .events
                .push(ProcessEvent::milestone(handle, format!("facing {boss}")));
        }
        Ok(outcome)
    }

    fn complete(
        &self,
        handle: &ProcessHandle,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<Completion, ProcessFault> {
        let data = payload(&handle.data).map_err(fault)?;
        let adventure = definition(store, &data.adventure_id)?;

        let mut changes = StateChanges::new();
        changes.gold = adventure.gold;
        changes.experience = adventure.experience;
        for (material, amount) in &adventure.loot {
            changes.materials.add(
                material.clone(),
                scale_amount(*amount, data.modifiers.loot_multiplier),
            );
        }
        changes.complete_adventure(data.adventure_id.clone());
        changes.current_screen = Some(Screen::Town);

        let summary = format!(
            "returned from {} with {} gold and {}",
            data.adventure_id,
            changes.gold,
            describe(&changes.materials)
        );
        let mut completion = Completion::new(changes, summary);
        if !state.progression.has_completed(&data.adventure_id) {
            completion.events.push(ProcessEvent::milestone(
                handle,
                format!("first clear of {}", data.adventure_id),
            ));
        }
        Ok(completion)
    }

    fn cancel(&self, handle: &ProcessHandle, _state: &SimulationState) -> EventBatch {
        let mut notes = EventBatch::new();
        if let Ok(data) = payload(&handle.data) {
            notes.push(ProcessEvent::milestone(
                handle,
                format!(
                    "retreated from {} at {:.0}%",
                    data.adventure_id,
                    handle.progress * 100.0
                ),
            ));
        }
        notes
    }
}
