//! Farmstead process engine
//!
//! Deterministic, tick-driven orchestration of long-running farm activities
//! (crop growth, adventures, crafting, mining, seed catching, helper training).
//! Each tick advances every active process, merges their deltas, and applies
//! the merged delta to the simulation state once.

pub mod combat;
pub mod config;
pub mod data;
pub mod delta;
pub mod event;
pub mod manager;
pub mod numbers;
pub mod process;
pub mod registry;
pub mod state;

// Re-export commonly used types
pub use combat::{CombatEffects, CombatModifiers, CombatTables, Equipment};
pub use config::{ConfigError, ConflictPolicy, ManagerConfig};
pub use data::{
    AdventureDef, CropDef, DataStore, DataStoreError, GameData, MineLevelDef, MiningDef,
    RecipeDef, SeedAreaDef, TrainingDef,
};
pub use delta::{
    ApplyReport, DeltaAccumulator, MergeConflict, OverwriteField, PlotChange, ResourceDelta,
    StateChanges, apply_changes,
};
pub use event::{EventBatch, EventLog, EventSeverity, ProcessEvent, ProcessEventKind};
pub use manager::{
    CancelError, FailureKind, ManagerError, ProcessFailure, ProcessManager, ProcessStats,
    ProcessTickResult, StartError,
};
pub use process::{
    AdventureData, Completion, CraftingData, CropGrowthData, HelperTrainingData, MiningData,
    ProcessData, ProcessFault, ProcessHandle, ProcessHandler, ProcessId, ProcessLifecycle,
    ProcessMetadata, ProcessState, ProcessType, SeedCatchingData, StartRejection, UpdateOutcome,
    UpdateStatus,
};
pub use registry::{ProcessRegistry, RegistryError};
pub use state::{
    Capacity, FarmState, HelperState, Location, PlotId, Progression, Resources, Screen,
    SimulationState,
};
