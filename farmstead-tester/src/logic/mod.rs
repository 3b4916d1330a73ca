pub mod balance;
pub mod policy;
pub mod reports;
pub mod scenarios;
pub mod seeds;
pub mod simulation;
pub mod tester;

pub use balance::{BalanceAggregate, BalanceRecord, aggregate_balance};
pub use policy::GameplayStrategy;
pub use scenarios::{all_scenario_keys, get_scenario, list_scenarios};
pub use seeds::resolve_seed_inputs;
pub use simulation::{FarmTester, TesterAssets};
pub use tester::*;
