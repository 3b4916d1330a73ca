use farmstead_game::{
    AdventureData, CraftingData, CropGrowthData, Equipment, GameData, HelperTrainingData,
    ManagerConfig, MiningData, ProcessData, ProcessManager, ProcessType, SeedCatchingData,
    SimulationState, StateChanges, apply_changes,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

const AREAS: [&str; 2] = ["meadow", "hillside"];
const CROPS: [&str; 3] = ["carrot", "wheat", "pumpkin"];
const ADVENTURES: [&str; 3] = ["meadow_patrol", "forest_ruins", "crystal_cave"];
const RECIPES: [&str; 4] = ["copper_hoe", "scarecrow", "workbench", "greenhouse"];

fn random_start(rng: &mut ChaCha20Rng) -> (ProcessType, ProcessData) {
    match rng.gen_range(0..6) {
        0 => {
            let crop = CROPS[rng.gen_range(0..CROPS.len())];
            (
                ProcessType::CropGrowth,
                ProcessData::CropGrowth(CropGrowthData::new(crop)),
            )
        }
        1 => {
            let adventure = ADVENTURES[rng.gen_range(0..ADVENTURES.len())];
            let equipment = if rng.gen_bool(0.5) {
                Equipment::new(Some("copper_hoe"), Some("leather"))
            } else {
                Equipment::default()
            };
            (
                ProcessType::Adventure,
                ProcessData::Adventure(AdventureData::new(adventure).with_equipment(equipment)),
            )
        }
        2 => {
            let recipe = RECIPES[rng.gen_range(0..RECIPES.len())];
            (
                ProcessType::Crafting,
                ProcessData::Crafting(CraftingData::new(recipe)),
            )
        }
        3 => (
            ProcessType::Mining,
            ProcessData::Mining(MiningData::new(rng.gen_range(1..=4))),
        ),
        4 => {
            let area = AREAS[rng.gen_range(0..AREAS.len())];
            (
                ProcessType::SeedCatching,
                ProcessData::SeedCatching(SeedCatchingData::new(area, rng.gen_range(0..5))),
            )
        }
        _ => (
            ProcessType::HelperTraining,
            ProcessData::HelperTraining(HelperTrainingData::new("mira", "field_work")),
        ),
    }
}

fn stocked_state() -> SimulationState {
    let mut state = SimulationState::default()
        .with_seeds("carrot", 3)
        .with_seeds("wheat", 3)
        .with_seeds("pumpkin", 1)
        .with_material("copper_ore", 4)
        .with_material("wheat", 4);
    state.resources.gold = 60;
    state
}

#[test]
fn random_workloads_never_break_state_bounds() {
    let data = GameData::bundled().expect("bundled data");
    for seed in 0..8_u64 {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut manager = ProcessManager::new(ManagerConfig::default()).expect("config");
        let mut state = stocked_state();

        for tick in 0..250 {
            if rng.gen_bool(0.6) {
                let (kind, payload) = random_start(&mut rng);
                let _ = manager.start_process(kind, payload, &mut state, &data);
            }
            let oldest = manager.active_processes().next().map(|h| h.id.clone());
            if rng.gen_bool(0.05)
                && let Some(id) = oldest
            {
                let _ = manager.cancel_process(&id, &state);
            }
            let dt = rng.gen_range(0.5..20.0);
            manager.tick(dt, &mut state, &data);

            let mut regen = StateChanges::new();
            regen.energy = 0.5 * dt;
            regen.water = 0.05 * dt;
            apply_changes(&mut state, &regen);

            if let Some(violation) = state.invariant_violation() {
                panic!("seed {seed} tick {tick}: {violation}");
            }
        }

        let stats = manager.stats();
        assert!(stats.ticks == 250);
        assert!(stats.started >= stats.completed + stats.failed + stats.faulted);
    }
}

#[test]
fn oversized_deltas_are_clamped_and_reported() {
    let mut state = SimulationState::default().with_energy(10.0, 50.0);
    state.resources.gold = 5;

    let mut changes = StateChanges::new();
    changes.energy = 500.0;
    changes.water = -1_000.0;
    changes.gold = -12;
    changes.materials.add("copper_ore", -3);
    let report = apply_changes(&mut state, &changes);

    assert!((state.resources.energy.current - 50.0).abs() < f64::EPSILON);
    assert!(state.resources.water.current.abs() < f64::EPSILON);
    assert_eq!(state.resources.gold, 0);
    assert_eq!(state.resources.material_count("copper_ore"), 0);
    assert!((report.energy_clamped - 460.0).abs() < 1e-9);
    assert_eq!(report.gold_floored, 7);
    assert_eq!(report.materials_floored, 3);
    assert!(!report.is_clean());
    assert!(state.invariant_violation().is_none());
}

#[test]
fn non_finite_dt_is_treated_as_zero() {
    let data = GameData::bundled().expect("bundled data");
    let mut manager = ProcessManager::new(ManagerConfig::default()).expect("config");
    let mut state = stocked_state();
    manager
        .start_process(
            ProcessType::Mining,
            ProcessData::Mining(MiningData::new(1)),
            &mut state,
            &data,
        )
        .expect("mining starts");
    let before = state.clone();

    for dt in [f64::NAN, f64::INFINITY, -5.0] {
        manager.tick(dt, &mut state, &data);
    }
    assert_eq!(state, before);
    assert!(manager.has_active_process(ProcessType::Mining));
    assert!(manager.clock().abs() < f64::EPSILON);
}
