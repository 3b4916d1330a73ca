use serde::{Deserialize, Serialize};

use crate::data::{DataStore, TrainingDef};
use crate::delta::StateChanges;
use crate::numbers::floor_f64_to_i64;
use crate::state::SimulationState;

use super::handler::ProcessLifecycle;
use super::{
    Completion, ProcessData, ProcessFault, ProcessHandle, ProcessMetadata, ProcessType,
    StartRejection, UpdateOutcome, advance_elapsed,
};

/// A helper working through a training course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelperTrainingData {
    pub helper_id: String,
    pub training_id: String,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub elapsed: f64,
    /// Fractional experience not yet delivered.
    #[serde(default)]
    pub pending_experience: f64,
}

impl HelperTrainingData {
    #[must_use]
    pub fn new(helper_id: &str, training_id: &str) -> Self {
        Self {
            helper_id: helper_id.to_string(),
            training_id: training_id.to_string(),
            duration: 0.0,
            elapsed: 0.0,
            pending_experience: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HelperTrainingHandler;

impl HelperTrainingHandler {
    pub const METADATA: ProcessMetadata = ProcessMetadata::new(3, true, false);
}

payload_accessors!(HelperTraining, HelperTrainingData);

fn course<'a>(store: &'a dyn DataStore, id: &str) -> Result<&'a TrainingDef, ProcessFault> {
    store
        .training(id)
        .ok_or_else(|| ProcessFault::MissingDefinition {
            kind: "training",
            id: id.to_string(),
        })
}

impl ProcessLifecycle for HelperTrainingHandler {
    fn process_type(&self) -> ProcessType {
        ProcessType::HelperTraining
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
        if data.helper_id.trim().is_empty() {
            return Err(StartRejection::Invalid(String::from("helper id is empty")));
        }
        let training =
            store
                .training(&data.training_id)
                .ok_or_else(|| StartRejection::UnknownDefinition {
                    kind: "training",
                    id: data.training_id.clone(),
                })?;
        if state.resources.gold < training.gold_cost {
            return Err(StartRejection::insufficient(
                "gold",
                training.gold_cost,
                state.resources.gold,
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
        let training =
            store
                .training(&data.training_id)
                .ok_or_else(|| StartRejection::UnknownDefinition {
                    kind: "training",
                    id: data.training_id.clone(),
                })?;
        data.duration = training.duration;
        data.elapsed = 0.0;
        data.pending_experience = 0.0;
        Ok(StateChanges {
            gold: -training.gold_cost,
            ..StateChanges::default()
        })
    }

    fn update(
        &self,
        handle: &mut ProcessHandle,
        dt: f64,
        _state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<UpdateOutcome, ProcessFault> {
        let data = payload_mut(&mut handle.data).map_err(fault)?;
        let training = course(store, &data.training_id)?;
        let before = data.elapsed;
        let progress = advance_elapsed(&mut data.elapsed, dt, data.duration);

        let accrued = data.pending_experience + training.xp_per_second * (data.elapsed - before);
        if !accrued.is_finite() {
            return Err(ProcessFault::NonFinite("helper training experience"));
        }
        let whole = floor_f64_to_i64(accrued);
        data.pending_experience = accrued - accrued.floor();
        let mut changes = StateChanges::new();
        changes.helper_experience.add(data.helper_id.clone(), whole);
        handle.record_progress(progress);

        Ok(UpdateOutcome::progressed(changes, handle.is_finished()))
    }

    fn complete(
        &self,
        handle: &ProcessHandle,
        _state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<Completion, ProcessFault> {
        let data = payload(&handle.data).map_err(fault)?;
        let training = course(store, &data.training_id)?;

        let mut changes = StateChanges::new();
        changes
            .helper_level_gains
            .add(data.helper_id.clone(), i64::from(training.level_bonus));
        let summary = format!(
            "{} finished {} (+{} level)",
            data.helper_id, data.training_id, training.level_bonus
        );
        Ok(Completion::new(changes, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GameData;
    use crate::process::{ProcessId, UpdateStatus};
    use crate::state::HelperState;

    fn store() -> GameData {
        GameData::default().with_training(
            "field_work",
            TrainingDef {
                duration: 10.0,
                gold_cost: 15,
                xp_per_second: 1.5,
                level_bonus: 1,
            },
        )
    }

    fn started() -> ProcessHandle {
        let mut handle = ProcessHandle::new(
            ProcessId::new(ProcessType::HelperTraining, 1),
            ProcessData::HelperTraining(HelperTrainingData::new("mira", "field_work")),
            0.0,
        );
        let reservation = HelperTrainingHandler
            .initialize(&mut handle, &SimulationState::default(), &store())
            .unwrap();
        assert_eq!(reservation.gold, -15);
        handle
    }

    #[test]
    fn requires_gold_for_the_course() {
        let data = ProcessData::HelperTraining(HelperTrainingData::new("mira", "field_work"));
        assert!(matches!(
            HelperTrainingHandler.can_start(&data, &SimulationState::default(), &store()),
            Err(StartRejection::Insufficient { .. })
        ));
        let mut rich = SimulationState::default();
        rich.resources.gold = 15;
        assert!(HelperTrainingHandler.can_start(&data, &rich, &store()).is_ok());
    }

    #[test]
    fn fractional_experience_carries_between_ticks() {
        let store = store();
        let state = SimulationState::default();
        let mut handle = started();

        let first = HelperTrainingHandler
            .update(&mut handle, 1.0, &state, &store)
            .unwrap();
        assert_eq!(first.changes.helper_experience.get("mira"), 1);
        let second = HelperTrainingHandler
            .update(&mut handle, 1.0, &state, &store)
            .unwrap();
        assert_eq!(second.changes.helper_experience.get("mira"), 2);

        let last = HelperTrainingHandler
            .update(&mut handle, 20.0, &state, &store)
            .unwrap();
        assert_eq!(last.status, UpdateStatus::Completed);
        assert_eq!(last.changes.helper_experience.get("mira"), 12);
    }

    #[test]
    fn completion_grants_the_level_bonus() {
        let mut state = SimulationState::default();
        state.helpers.insert(
            String::from("mira"),
            HelperState {
                experience: 40,
                level: 3,
            },
        );
        let completion = HelperTrainingHandler
            .complete(&started(), &state, &store())
            .unwrap();
        assert_eq!(completion.changes.helper_level_gains.get("mira"), 1);
        assert_eq!(completion.summary, "mira finished field_work (+1 level)");

        crate::delta::apply_changes(&mut state, &completion.changes);
        assert_eq!(state.helpers["mira"].level, 4);
    }
}
