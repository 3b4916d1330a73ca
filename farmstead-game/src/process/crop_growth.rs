use serde::{Deserialize, Serialize};

use crate::data::DataStore;
use crate::delta::{PlotChange, StateChanges};
use crate::state::{PlotId, SimulationState};

use super::handler::{ProcessLifecycle, describe};
use super::{
    Completion, ProcessData, ProcessFault, ProcessHandle, ProcessMetadata, ProcessType,
    StartRejection, UpdateOutcome, advance_elapsed,
};

/// A crop planted on one plot, growing until harvest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropGrowthData {
    pub crop_id: String,
    /// Requested plot; the lowest free plot is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot: Option<PlotId>,
    #[serde(default)]
    pub growth_time_required: f64,
    #[serde(default)]
    pub elapsed: f64,
}

impl CropGrowthData {
    #[must_use]
    pub fn new(crop_id: &str) -> Self {
        Self {
            crop_id: crop_id.to_string(),
            plot: None,
            growth_time_required: 0.0,
            elapsed: 0.0,
        }
    }

    #[must_use]
    pub const fn on_plot(mut self, plot: PlotId) -> Self {
        self.plot = Some(plot);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropGrowthHandler;

impl CropGrowthHandler {
    pub const METADATA: ProcessMetadata = ProcessMetadata::new(6, false, false);
}

payload_accessors!(CropGrowth, CropGrowthData);

impl ProcessLifecycle for CropGrowthHandler {
    fn process_type(&self) -> ProcessType {
        ProcessType::CropGrowth
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
        let crop = store
            .crop(&data.crop_id)
            .ok_or_else(|| StartRejection::UnknownDefinition {
                kind: "crop",
                id: data.crop_id.clone(),
            })?;
        let seeds = state.resources.seed_count(&crop.seed_kind);
        if seeds < 1 {
            return Err(StartRejection::insufficient(
                format!("{} seeds", crop.seed_kind),
                1,
                seeds,
            ));
        }
        match data.plot {
            Some(plot) if !state.farm.is_plot_free(plot) => {
                return Err(StartRejection::Invalid(format!("plot {plot} is not free")));
            }
            None if state.farm.free_plot().is_none() => {
                return Err(StartRejection::Invalid(String::from("no free plot")));
            }
            _ => {}
        }
        if !state.resources.water.covers(crop.water_cost) {
            return Err(StartRejection::insufficient(
                "water",
                crop.water_cost,
                state.resources.water.current,
            ));
        }
        Ok(())
    }

    fn initialize(
        &self,
        handle: &mut ProcessHandle,
        state: &SimulationState,
        store: &dyn DataStore,
    ) -> Result<StateChanges, StartRejection> {
        let data = payload_mut(&mut handle.data).map_err(rejection)?;
        let crop = store
            .crop(&data.crop_id)
            .ok_or_else(|| StartRejection::UnknownDefinition {
                kind: "crop",
                id: data.crop_id.clone(),
            })?;
        let plot = data
            .plot
            .or_else(|| state.farm.free_plot())
            .ok_or_else(|| StartRejection::Invalid(String::from("no free plot")))?;
        data.plot = Some(plot);
        data.growth_time_required = crop.growth_time;
        data.elapsed = 0.0;

        let mut reservation = StateChanges::new();
        reservation.seeds.add(crop.seed_kind.clone(), -1);
        reservation.water = -crop.water_cost;
        reservation.plots.insert(
            plot,
            PlotChange::Planted {
                crop: data.crop_id.clone(),
            },
        );
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
        let progress = advance_elapsed(&mut data.elapsed, dt, data.growth_time_required);
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
        let crop = store
            .crop(&data.crop_id)
            .ok_or_else(|| ProcessFault::MissingDefinition {
                kind: "crop",
                id: data.crop_id.clone(),
            })?;

        let mut changes = StateChanges::new();
        for (material, amount) in &crop.yields {
            changes.materials.add(material.clone(), *amount);
        }
        changes.experience = crop.experience;
        if let Some(plot) = data.plot {
            changes.plots.insert(plot, PlotChange::Cleared);
        }
        let summary = format!("harvested {}", describe(&changes.materials));
        Ok(Completion::new(changes, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CropDef, GameData};
    use crate::process::{ProcessId, UpdateStatus};
    use std::collections::BTreeMap;

    fn store() -> GameData {
        GameData {
            level_thresholds: vec![10],
            ..GameData::default()
        }
        .with_crop(
            "carrot",
            CropDef {
                seed_kind: String::from("carrot"),
                growth_time: 60.0,
                water_cost: 2.0,
                yields: BTreeMap::from([(String::from("carrot"), 3)]),
                experience: 12,
            },
        )
    }

    fn handle(data: CropGrowthData) -> ProcessHandle {
        ProcessHandle::new(
            ProcessId::new(ProcessType::CropGrowth, 1),
            ProcessData::CropGrowth(data),
            0.0,
        )
    }

    #[test]
    fn can_start_requires_seed_plot_and_water() {
        let store = store();
        let data = ProcessData::CropGrowth(CropGrowthData::new("carrot"));
        let handler = CropGrowthHandler;

        let empty = SimulationState::default();
        assert!(matches!(
            handler.can_start(&data, &empty, &store),
            Err(StartRejection::Insufficient { .. })
        ));

        let dry = SimulationState::default()
            .with_seeds("carrot", 1)
            .with_water(1.0, 20.0);
        assert!(matches!(
            handler.can_start(&data, &dry, &store),
            Err(StartRejection::Insufficient { ref resource, .. }) if resource == "water"
        ));

        let mut full = SimulationState::default().with_seeds("carrot", 1);
        full.farm.plot_count = 1;
        full.farm.plots.insert(0, String::from("beet"));
        assert_eq!(
            handler.can_start(&data, &full, &store),
            Err(StartRejection::Invalid(String::from("no free plot")))
        );

        let ready = SimulationState::default().with_seeds("carrot", 1);
        assert!(handler.can_start(&data, &ready, &store).is_ok());
        let unknown = ProcessData::CropGrowth(CropGrowthData::new("mandrake"));
        assert!(matches!(
            handler.can_start(&unknown, &ready, &store),
            Err(StartRejection::UnknownDefinition { kind: "crop", .. })
        ));
    }

    #[test]
    fn initialize_reserves_seed_water_and_plot() {
        let store = store();
        let mut state = SimulationState::default().with_seeds("carrot", 2);
        state.farm.plots.insert(0, String::from("beet"));
        let mut handle = handle(CropGrowthData::new("carrot"));

        let reservation = CropGrowthHandler
            .initialize(&mut handle, &state, &store)
            .unwrap();
        assert_eq!(reservation.seeds.get("carrot"), -1);
        assert!((reservation.water + 2.0).abs() < f64::EPSILON);
        assert_eq!(
            reservation.plots.get(&1),
            Some(&PlotChange::Planted {
                crop: String::from("carrot")
            })
        );
        let ProcessData::CropGrowth(data) = &handle.data else {
            panic!("payload changed type");
        };
        assert_eq!(data.plot, Some(1));
        assert!((data.growth_time_required - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn progress_follows_elapsed_over_growth_time() {
        let store = store();
        let state = SimulationState::default().with_seeds("carrot", 1);
        let mut handle = handle(CropGrowthData::new("carrot"));
        CropGrowthHandler
            .initialize(&mut handle, &state, &store)
            .unwrap();

        let first = CropGrowthHandler
            .update(&mut handle, 30.0, &state, &store)
            .unwrap();
        assert_eq!(first.status, UpdateStatus::Running);
        assert!((handle.progress - 0.5).abs() < f64::EPSILON);

        let second = CropGrowthHandler
            .update(&mut handle, 30.0, &state, &store)
            .unwrap();
        assert_eq!(second.status, UpdateStatus::Completed);
        assert!((handle.progress - 1.0).abs() < f64::EPSILON);
        assert!(second.changes.is_empty());
    }

    #[test]
    fn complete_harvests_and_clears_plot() {
        let store = store();
        let state = SimulationState::default().with_seeds("carrot", 1);
        let mut handle = handle(CropGrowthData::new("carrot").on_plot(4));
        CropGrowthHandler
            .initialize(&mut handle, &state, &store)
            .unwrap();

        let completion = CropGrowthHandler
            .complete(&handle, &state, &store)
            .unwrap();
        assert_eq!(completion.changes.materials.get("carrot"), 3);
        assert_eq!(completion.changes.experience, 12);
        assert_eq!(completion.changes.plots.get(&4), Some(&PlotChange::Cleared));
        assert!(completion.changes.hero_level.is_none());
        assert_eq!(completion.summary, "harvested 3 carrot");
    }

    #[test]
    fn missing_definition_is_a_fault() {
        let state = SimulationState::default();
        let handle = handle(CropGrowthData::new("carrot"));
        assert_eq!(
            CropGrowthHandler.complete(&handle, &state, &GameData::default()),
            Err(ProcessFault::MissingDefinition {
                kind: "crop",
                id: String::from("carrot"),
            })
        );
    }
}
