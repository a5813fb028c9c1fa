//! Rangebook Runner — scenario replay, randomized soak runs, report export.
//!
//! This crate builds on `rangebook-core` to provide:
//! - TOML scenario files with per-step expectations and fault injection
//! - Scenario replay against the in-memory resource with post-step audits
//! - Seeded soak runs mixing operations, tick moves and injected faults
//! - JSON/CSV artifact export with schema versioning

pub mod audit;
pub mod export;
pub mod runner;
pub mod scenario;
pub mod soak;

pub use audit::{audit, snapshot_positions, PositionSnapshot};
pub use export::{
    export_json, export_ranges_csv, export_soak_json, export_steps_csv, import_json,
    load_artifacts, save_artifacts, save_soak,
};
pub use runner::{run_scenario, RunError, ScenarioReport, StepOutcome, SCHEMA_VERSION};
pub use scenario::{ConfigError, PoolConfig, ScenarioConfig, Step, StepKind};
pub use soak::{run_soak, SoakConfig, SoakReport};
