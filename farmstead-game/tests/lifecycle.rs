use farmstead_game::{
    AdventureData, CancelError, CraftingData, CropGrowthData, Equipment, FailureKind, GameData,
    HelperTrainingData, ManagerConfig, MiningData, ProcessData, ProcessEventKind, ProcessManager,
    ProcessState, ProcessType, Screen, SeedCatchingData, SimulationState, StartError,
};

fn bundled() -> GameData {
    GameData::bundled().expect("bundled data")
}

fn manager() -> ProcessManager {
    ProcessManager::new(ManagerConfig::default()).expect("default config")
}

fn run_until_idle(
    manager: &mut ProcessManager,
    state: &mut SimulationState,
    data: &GameData,
    dt: f64,
    max_ticks: usize,
) -> usize {
    for tick in 0..max_ticks {
        if manager.active_processes().next().is_none() {
            return tick;
        }
        manager.tick(dt, state, data);
    }
    max_ticks
}

#[test]
fn farm_day_runs_every_process_kind_to_completion() {
    let data = bundled();
    let mut manager = manager();
    let mut state = SimulationState::default()
        .with_seeds("carrot", 2)
        .with_seeds("wheat", 1)
        .with_material("copper_ore", 3);
    state.resources.gold = 100;

    let starts = [
        (
            ProcessType::CropGrowth,
            ProcessData::CropGrowth(CropGrowthData::new("carrot")),
        ),
        (
            ProcessType::CropGrowth,
            ProcessData::CropGrowth(CropGrowthData::new("wheat")),
        ),
        (
            ProcessType::Adventure,
            ProcessData::Adventure(AdventureData::new("meadow_patrol")),
        ),
        (
            ProcessType::Crafting,
            ProcessData::Crafting(CraftingData::new("copper_hoe")),
        ),
        (ProcessType::Mining, ProcessData::Mining(MiningData::new(1))),
        (
            ProcessType::SeedCatching,
            ProcessData::SeedCatching(SeedCatchingData::new("meadow", 3)),
        ),
        (
            ProcessType::HelperTraining,
            ProcessData::HelperTraining(HelperTrainingData::new("mira", "field_work")),
        ),
    ];
    for (kind, payload) in starts {
        manager
            .start_process(kind, payload, &mut state, &data)
            .unwrap_or_else(|err| panic!("{kind} should start: {err}"));
    }
    assert_eq!(manager.active_processes().count(), 7);
    assert_eq!(state.resources.gold, 100 - 15 - 20);

    let ticks = run_until_idle(&mut manager, &mut state, &data, 5.0, 200);
    assert!(ticks < 200, "processes never finished");

    let stats = manager.stats();
    assert_eq!(stats.completed, 7);
    assert_eq!(stats.failed + stats.faulted, 0);
    assert_eq!(state.resources.material_count("carrot"), 2);
    assert_eq!(state.resources.material_count("wheat"), 3);
    assert_eq!(state.resources.material_count("copper_hoe"), 1);
    assert_eq!(state.resources.material_count("copper_ore"), 3);
    assert_eq!(state.resources.material_count("slime_gel"), 2);
    assert_eq!(state.resources.gold, 65 + 25);
    assert!(state.progression.has_completed("meadow_patrol"));
    assert_eq!(state.helpers["mira"].level, 2);
    assert_eq!(state.helpers["mira"].experience, 60);
    assert!(state.farm.plots.is_empty());
    assert!(state.invariant_violation().is_none());
}

#[test]
fn insertion_order_is_the_tick_order() {
    let data = bundled();
    let mut manager = manager();
    let mut state = SimulationState::default()
        .with_seeds("carrot", 1)
        .with_material("copper_ore", 3);
    state.resources.gold = 50;

    let mining = manager
        .start_process(
            ProcessType::Mining,
            ProcessData::Mining(MiningData::new(1)),
            &mut state,
            &data,
        )
        .unwrap();
    let crop = manager
        .start_process(
            ProcessType::CropGrowth,
            ProcessData::CropGrowth(CropGrowthData::new("carrot")),
            &mut state,
            &data,
        )
        .unwrap();
    let craft = manager
        .start_process(
            ProcessType::Crafting,
            ProcessData::Crafting(CraftingData::new("copper_hoe")),
            &mut state,
            &data,
        )
        .unwrap();

    let result = manager.tick(1.0, &mut state, &data);
    assert_eq!(result.updated, vec![mining.id, crop.id, craft.id]);
}

#[test]
fn exhausted_adventure_fails_but_keeps_its_drain() {
    let data = bundled();
    let mut manager = manager();
    let mut state = SimulationState::default().with_energy(8.0, 100.0);

    manager
        .start_process(
            ProcessType::Adventure,
            ProcessData::Adventure(
                AdventureData::new("meadow_patrol")
                    .with_equipment(Equipment::new(None, Some("leather"))),
            ),
            &mut state,
            &data,
        )
        .unwrap();
    assert!((state.resources.energy.current - 3.0).abs() < 1e-9);
    assert_eq!(state.location.current_screen, Screen::Adventure);

    let mut failed = None;
    for _ in 0..20 {
        let result = manager.tick(10.0, &mut state, &data);
        if !result.failed.is_empty() {
            failed = Some(result);
            break;
        }
    }
    let result = failed.expect("adventure should fail");
    let failure = &result.failed[0];
    assert_eq!(failure.kind, FailureKind::Failed);
    assert!(
        result
            .events
            .iter()
            .any(|event| event.kind == ProcessEventKind::ProcessFailed)
    );
    assert!(state.resources.energy.current.abs() < 1e-9);
    assert!(!state.progression.has_completed("meadow_patrol"));
    assert!(!manager.has_active_process(ProcessType::Adventure));
}

#[test]
fn cancelled_crafting_forfeits_its_reservation() {
    let data = bundled();
    let mut manager = manager();
    let mut state = SimulationState::default().with_material("copper_ore", 3);
    state.resources.gold = 15;

    let handle = manager
        .start_process(
            ProcessType::Crafting,
            ProcessData::Crafting(CraftingData::new("copper_hoe")),
            &mut state,
            &data,
        )
        .unwrap();
    manager.tick(10.0, &mut state, &data);
    let before = state.clone();

    let cancelled = manager.cancel_process(&handle.id, &state).unwrap();
    assert_eq!(cancelled.state, ProcessState::Cancelled);
    assert_eq!(state, before);
    assert_eq!(state.resources.gold, 0);
    assert_eq!(state.resources.material_count("copper_ore"), 0);

    for _ in 0..10 {
        let result = manager.tick(10.0, &mut state, &data);
        assert!(result.updated.is_empty());
    }
    assert_eq!(state.resources.material_count("copper_hoe"), 0);

    let err = manager.cancel_process(&handle.id, &state).unwrap_err();
    assert_eq!(err, CancelError::NotFound(handle.id));
    let events = manager.drain_events();
    let cancels = events
        .iter()
        .filter(|event| event.kind == ProcessEventKind::ProcessCancelled)
        .count();
    assert_eq!(cancels, 1);
}

#[test]
fn locked_recipes_and_levels_reject_cleanly() {
    let data = bundled();
    let mut manager = manager();
    let mut state = SimulationState::default()
        .with_material("ancient_wood", 10)
        .with_material("iron_ore", 10);
    state.resources.gold = 500;
    let before = state.clone();

    let err = manager
        .start_process(
            ProcessType::Crafting,
            ProcessData::Crafting(CraftingData::new("greenhouse")),
            &mut state,
            &data,
        )
        .unwrap_err();
    assert!(matches!(err, StartError::Validation(_)));

    let err = manager
        .start_process(
            ProcessType::Adventure,
            ProcessData::Adventure(AdventureData::new("crystal_cave")),
            &mut state,
            &data,
        )
        .unwrap_err();
    assert!(err.to_string().contains("hero level 4"));
    assert_eq!(state, before);
    assert_eq!(manager.stats().rejected, 2);
}
