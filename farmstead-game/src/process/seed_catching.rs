use serde::{Deserialize, Serialize};

use crate::data::{DataStore, SeedAreaDef};
use crate::delta::{ResourceDelta, StateChanges};
use crate::event::{EventBatch, ProcessEvent};
use crate::numbers::floor_f64_to_i64;
use crate::state::SimulationState;

use super::handler::ProcessLifecycle;
use super::{
    Completion, ProcessData, ProcessFault, ProcessHandle, ProcessMetadata, ProcessType,
    StartRejection, UpdateOutcome, advance_elapsed,
};

/// Catching wind-blown seeds in one area. Seeds arrive as they are caught.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCatchingData {
    pub area_id: String,
    pub wind_level: u8,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub elapsed: f64,
    /// Seeds already delivered.
    #[serde(default)]
    pub caught: i64,
}

impl SeedCatchingData {
    #[must_use]
    pub fn new(area_id: &str, wind_level: u8) -> Self {
        Self {
            area_id: area_id.to_string(),
            wind_level,
            duration: 0.0,
            elapsed: 0.0,
            caught: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeedCatchingHandler;

impl SeedCatchingHandler {
    pub const METADATA: ProcessMetadata = ProcessMetadata::new(1, false, true);
}

payload_accessors!(SeedCatching, SeedCatchingData);

fn area_def<'a>(store: &'a dyn DataStore, id: &str) -> Result<&'a SeedAreaDef, ProcessFault> {
    store
        .seed_area(id)
        .ok_or_else(|| ProcessFault::MissingDefinition {
            kind: "seed area",
            id: id.to_string(),
        })
}

/// Total seeds caught after `elapsed` seconds.
fn caught_by(area: &SeedAreaDef, wind: f64, elapsed: f64) -> i64 {
    floor_f64_to_i64(elapsed * area.catch_rate * wind).max(0)
}

/// Hand out seeds `from..from + count` round-robin over the area's kinds.
fn distribute(kinds: &[String], from: i64, count: i64, seeds: &mut ResourceDelta) {
    let len = i64::try_from(kinds.len()).unwrap_or(i64::MAX);
    if len == 0 || count <= 0 {
        return;
    }
    let base = count / len;
    let extra = count % len;
    for offset in 0..len {
        let index = usize::try_from((from + offset) % len).unwrap_or(0);
        let amount = base + i64::from(offset < extra);
        if let Some(kind) = kinds.get(index) {
            seeds.add(kind.clone(), amount);
        }
    }
}

impl ProcessLifecycle for SeedCatchingHandler {
    fn process_type(&self) -> ProcessType {
        ProcessType::SeedCatching
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
        let area =
            store
                .seed_area(&data.area_id)
                .ok_or_else(|| StartRejection::UnknownDefinition {
                    kind: "seed area",
                    id: data.area_id.clone(),
                })?;
        if area.wind_multiplier(data.wind_level).is_none() {
            return Err(StartRejection::Invalid(format!(
                "wind level {} is not available in {}",
                data.wind_level, data.area_id
            )));
        }
        if !state.resources.energy.covers(area.energy_cost) {
            return Err(StartRejection::insufficient(
                "energy",
                area.energy_cost,
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
        let area =
            store
                .seed_area(&data.area_id)
                .ok_or_else(|| StartRejection::UnknownDefinition {
                    kind: "seed area",
                    id: data.area_id.clone(),
                })?;
        data.duration = area.duration;
        data.elapsed = 0.0;
        data.caught = 0;
        Ok(StateChanges {
            energy: -area.energy_cost,
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
        let area = area_def(store, &data.area_id)?;
        let wind = area
            .wind_multiplier(data.wind_level)
            .ok_or_else(|| ProcessFault::MissingDefinition {
                kind: "wind level",
                id: data.wind_level.to_string(),
            })?;

        let progress = advance_elapsed(&mut data.elapsed, dt, data.duration);
        let total = caught_by(area, wind, data.elapsed);
        let fresh = (total - data.caught).max(0);
        let mut changes = StateChanges::new();
        distribute(&area.kinds, data.caught, fresh, &mut changes.seeds);
        data.caught += fresh;
        handle.record_progress(progress);

        let mut outcome = UpdateOutcome::progressed(changes, handle.is_finished());
        if fresh > 0 {
            outcome.events.push(ProcessEvent::milestone(
                handle,
                format!("caught {fresh} seeds"),
            ));
        }
        Ok(outcome)
    }

    fn complete(
        &self,
        handle: &ProcessHandle,
        _state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<Completion, ProcessFault> {
        let data = payload(&handle.data).map_err(fault)?;
        let area = area_def(store, &data.area_id)?;
        let wind = area.wind_multiplier(data.wind_level).unwrap_or(0.0);

        let mut changes = StateChanges::new();
        let remainder = (caught_by(area, wind, data.duration) - data.caught).max(0);
        distribute(&area.kinds, data.caught, remainder, &mut changes.seeds);
        changes.experience = area.experience;

        let summary = format!("caught {} seeds in {}", data.caught + remainder, data.area_id);
        Ok(Completion::new(changes, summary))
    }

    fn cancel(&self, handle: &ProcessHandle, _state: &SimulationState) -> EventBatch {
        let mut notes = EventBatch::new();
        if let Ok(data) = payload(&handle.data) {
            notes.push(ProcessEvent::milestone(
                handle,
                format!("stopped in {} with {} seeds caught", data.area_id, data.caught),
            ));
        }
        notes
    }
}
