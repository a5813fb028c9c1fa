//! Scenario runner — replays a scenario against the in-memory resource.
//!
//! Each step runs as one public operation. The runner records its outcome,
//! compares it with the step's expectation, checks that a failed step left
//! its position untouched, and audits all invariants after every step.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use rangebook_core::sim::InMemoryResource;
use rangebook_core::{
    LiquidityError, LiquidityManager, Owner, PositionId, Receipt, ResourceKey,
    SequentialIdentity, ServiceError, Unit,
};

use crate::audit::{audit, snapshot_positions, unchanged, PositionSnapshot};
use crate::scenario::{ConfigError, ScenarioConfig, Step, StepKind};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("resource error: {0}")]
    Service(#[from] ServiceError),
}

/// Current schema version for persisted reports.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// What one step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub index: usize,
    pub kind: String,
    pub caller: String,
    /// Resolved position (the minted id for a successful new-position add).
    pub position: Option<PositionId>,
    /// `"ok"` or the error kind.
    pub outcome: String,
    pub error: Option<String>,
    pub actions: usize,
    pub applied: usize,
    pub expected: Option<String>,
    pub passed: bool,
}

/// Complete result of replaying one scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub name: String,
    pub scenario_hash: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepOutcome>,
    pub positions: Vec<PositionSnapshot>,
    pub sessions: u64,
    pub journal_len: usize,
    pub violations: Vec<String>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepOutcome> + '_ {
        self.steps.iter().filter(|s| !s.passed)
    }
}

/// Replay `config` from a fresh manager.
pub fn run_scenario(config: &ScenarioConfig) -> Result<ScenarioReport, RunError> {
    config.validate()?;
    let started_at = Utc::now();

    let mut resource = InMemoryResource::new();
    let mut keys: HashMap<&str, ResourceKey> = HashMap::new();
    for pool in &config.pools {
        let key = pool.key();
        resource.register_pool(key.clone(), pool.current_tick);
        keys.insert(pool.name.as_str(), key);
    }
    for (symbol, amount) in &config.reserves {
        resource.fund(&Unit::new(symbol.as_str()), *amount);
    }
    let mut manager =
        LiquidityManager::with_params(resource, SequentialIdentity::new(), config.manager)
            .map_err(ConfigError::from)?;

    let mut steps = Vec::with_capacity(config.steps.len());
    let mut violations = Vec::new();

    for (index, step) in config.steps.iter().enumerate() {
        let position = PositionId(step.position);
        let before = manager.ranges(position).cloned();
        let positions_before = manager.total_positions();

        if let Some(k) = step.fail_at {
            manager.resource_mut().fail_apply_at(k);
        }
        let result = execute_step(&mut manager, &keys, index, step)?;
        manager.resource_mut().clear_fault();

        let outcome = match &result {
            Ok(receipt) => StepResult::from_receipt(receipt),
            Err(err) => {
                if let Err(msg) = unchanged(position, before.as_ref(), manager.ranges(position)) {
                    violations.push(format!("step {index}: {msg}"));
                }
                if manager.total_positions() != positions_before {
                    violations.push(format!("step {index}: failed operation created a position"));
                }
                StepResult::from_error(err)
            }
        };

        let passed = step.expect.as_deref().map_or(true, |e| e == outcome.outcome);
        if !passed {
            violations.push(format!(
                "step {index} ({}): expected {}, got {}",
                step.kind.name(),
                step.expect.as_deref().unwrap_or("ok"),
                outcome.outcome
            ));
        }
        for msg in audit(&manager) {
            violations.push(format!("step {index}: {msg}"));
        }

        debug!(index, kind = step.kind.name(), outcome = %outcome.outcome, "step");
        steps.push(StepOutcome {
            index,
            kind: step.kind.name().to_string(),
            caller: step.caller.clone(),
            position: outcome.position.or(Some(position).filter(|p| !p.is_new())),
            outcome: outcome.outcome,
            error: outcome.error,
            actions: outcome.actions,
            applied: outcome.applied,
            expected: step.expect.clone(),
            passed,
        });
    }

    let report = ScenarioReport {
        schema_version: SCHEMA_VERSION,
        name: config.name.clone(),
        scenario_hash: config.fingerprint()?,
        started_at,
        finished_at: Utc::now(),
        steps,
        positions: snapshot_positions(&manager),
        sessions: manager.resource().sessions(),
        journal_len: manager.resource().journal().len(),
        violations,
    };
    info!(
        name = %report.name,
        steps = report.steps.len(),
        positions = report.positions.len(),
        violations = report.violations.len(),
        "scenario finished"
    );
    Ok(report)
}

/// Intermediate per-step result before it is joined with the step itself.
struct StepResult {
    position: Option<PositionId>,
    outcome: String,
    error: Option<String>,
    actions: usize,
    applied: usize,
}

impl StepResult {
    fn from_receipt(receipt: &Option<Receipt>) -> Self {
        match receipt {
            Some(r) => Self {
                position: Some(r.position),
                outcome: "ok".to_string(),
                error: None,
                actions: r.actions.len(),
                applied: r.report.applied.len(),
            },
            None => Self {
                position: None,
                outcome: "ok".to_string(),
                error: None,
                actions: 0,
                applied: 0,
            },
        }
    }

    fn from_error(err: &LiquidityError) -> Self {
        Self {
            position: None,
            outcome: err.kind().to_string(),
            error: Some(err.to_string()),
            actions: 0,
            applied: 0,
        }
    }
}

/// Run one step. `Ok(None)` is a successful step with no receipt (set_tick).
///
/// The outer `Result` is for runner failures; the inner one is the operation's.
fn execute_step(
    manager: &mut LiquidityManager<InMemoryResource>,
    keys: &HashMap<&str, ResourceKey>,
    index: usize,
    step: &Step,
) -> Result<Result<Option<Receipt>, LiquidityError>, RunError> {
    let caller = Owner::new(step.caller.as_str());
    let position = PositionId(step.position);
    let key_of = |pool: &str| {
        keys.get(pool).cloned().ok_or_else(|| ConfigError::UnknownPool {
            step: index,
            pool: pool.to_string(),
        })
    };

    let result = match &step.kind {
        StepKind::Add {
            pool,
            lower,
            upper,
            amount,
        } => {
            let key = key_of(pool)?;
            manager.add_liquidity(&caller, position, &key, *lower, *upper, *amount, &[])
        }
        StepKind::Remove {
            pool,
            lower,
            upper,
            amount,
        } => {
            let key = key_of(pool)?;
            manager.remove_liquidity(&caller, position, &key, *lower, *upper, *amount, &[])
        }
        StepKind::Batch { pool, changes } => {
            let key = key_of(pool)?;
            manager.modify_liquidity(&caller, position, &key, changes.clone(), &[])
        }
        StepKind::Rebalance { reference } => {
            let reference = reference.unwrap_or_else(|| reference_tick(manager, position));
            manager.rebalance(&caller, position, reference, &[])
        }
        StepKind::SetTick { pool, tick } => {
            let key = key_of(pool)?;
            manager.resource_mut().set_tick(&key, *tick)?;
            return Ok(Ok(None));
        }
    };
    Ok(result.map(Some))
}

/// The bound pool's current tick, snapped down to its spacing; 0 when the
/// position is unknown (the operation then fails on its own preconditions).
fn reference_tick(manager: &LiquidityManager<InMemoryResource>, position: PositionId) -> i32 {
    manager
        .position(position)
        .and_then(|record| record.binding())
        .and_then(|key| {
            let tick = manager.resource().current_tick(key)?;
            let spacing = i32::try_from(key.spacing).ok().filter(|s| *s > 0)?;
            Some(tick.div_euclid(spacing) * spacing)
        })
        .unwrap_or(0)
}
