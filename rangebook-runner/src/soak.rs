//! Seeded randomized soak run.
//!
//! Drives a manager with a random mix of adds, removes, batches, rebalances,
//! tick moves and injected resource faults. After every step it checks that:
//! - a failed operation left its position bit-for-bit unchanged
//! - a failed operation minted nothing
//! - every store invariant holds and the stores agree with the resource
//!
//! The same seed always produces the same sequence of operations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use rangebook_core::sim::InMemoryResource;
use rangebook_core::{
    LiquidityChange, LiquidityError, LiquidityManager, Owner, PositionId, RangeStore,
    RebalanceParams, ResourceKey, SequentialIdentity,
};

use crate::audit::{audit, snapshot_positions, unchanged, PositionSnapshot};
use crate::runner::{RunError, SCHEMA_VERSION};
use crate::scenario::ConfigError;

/// Tick spacing of the soak pool.
const SPACING: i32 = 10;

/// Opening reserves per unit, so removals after large tick moves can settle.
const FLOAT: i128 = 1_000_000_000_000_000;

/// Soak run parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoakConfig {
    pub seed: u64,
    pub steps: usize,
    /// Upper bound on the number of positions opened.
    pub positions: usize,
    /// Probability that a step runs with an injected apply fault.
    pub fault_rate: f64,
    #[serde(default)]
    pub params: RebalanceParams,
}

impl SoakConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.params.validate()?;
        if self.positions == 0 {
            return Err(ConfigError::NoSoakPositions);
        }
        if !(0.0..=1.0).contains(&self.fault_rate) {
            return Err(ConfigError::FaultRate(self.fault_rate));
        }
        Ok(())
    }
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: 1_000,
            positions: 8,
            fault_rate: 0.1,
            params: RebalanceParams::default(),
        }
    }
}

/// Outcome of a soak run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoakReport {
    pub schema_version: u32,
    pub config: SoakConfig,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub committed: usize,
    pub failed: usize,
    /// Count per outcome kind (`"ok"` or an error kind).
    pub outcomes: BTreeMap<String, usize>,
    pub faults_injected: usize,
    pub positions: Vec<PositionSnapshot>,
    pub violations: Vec<String>,
}

impl SoakReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A live position as the soak driver knows it.
struct Tracked {
    id: PositionId,
    owner: Owner,
}

/// Run a soak with `config`.
pub fn run_soak(config: &SoakConfig) -> Result<SoakReport, RunError> {
    config.validate()?;
    let started_at = Utc::now();
    let mut rng = StdRng::seed_from_u64(config.seed);

    let key = ResourceKey::new("ETH", "USDC", 3000, SPACING as u32);
    let mut resource = InMemoryResource::new();
    resource.register_pool(key.clone(), 0);
    for unit in key.units() {
        resource.fund(unit, FLOAT);
    }
    let mut manager =
        LiquidityManager::with_params(resource, SequentialIdentity::new(), config.params)
            .map_err(ConfigError::from)?;

    let mut tracked: Vec<Tracked> = Vec::new();
    let mut outcomes: BTreeMap<String, usize> = BTreeMap::new();
    let mut violations = Vec::new();
    let (mut committed, mut failed, mut faults_injected) = (0, 0, 0);

    for step in 0..config.steps {
        if rng.gen_bool(0.1) {
            let tick = rng.gen_range(-1_500..1_500);
            manager.resource_mut().set_tick(&key, tick)?;
            continue;
        }

        let open_new = tracked.len() < config.positions && (tracked.is_empty() || rng.gen_bool(0.2));
        let (position, owner) = if open_new {
            (PositionId::NEW, Owner::new(format!("owner-{}", tracked.len())))
        } else {
            let t = &tracked[rng.gen_range(0..tracked.len())];
            let owner = if rng.gen_bool(0.03) {
                Owner::new("intruder")
            } else {
                t.owner.clone()
            };
            (t.id, owner)
        };

        if rng.gen_bool(config.fault_rate) {
            manager.resource_mut().fail_apply_at(rng.gen_range(1..=4));
            faults_injected += 1;
        }

        let before = manager.ranges(position).cloned();
        let positions_before = manager.total_positions();
        let choice = if position.is_new() { 0 } else { rng.gen_range(0..100) };

        let result = match choice {
            0..=39 => {
                let (lower, upper) = pick_bounds(&mut rng, &manager, position);
                let amount = rng.gen_range(1..=1_000_000);
                manager.add_liquidity(&owner, position, &key, lower, upper, amount, &[])
            }
            40..=64 => {
                let (lower, upper, amount) = pick_removal(&mut rng, &manager, position);
                manager.remove_liquidity(&owner, position, &key, lower, upper, amount, &[])
            }
            65..=84 => {
                let changes = pick_batch(&mut rng, &manager, position);
                manager.modify_liquidity(&owner, position, &key, changes, &[])
            }
            _ => {
                let tick = manager.resource().current_tick(&key).unwrap_or(0);
                let reference = tick.div_euclid(SPACING) * SPACING;
                manager.rebalance(&owner, position, reference, &[])
            }
        };
        manager.resource_mut().clear_fault();

        let kind = match &result {
            Ok(receipt) => {
                committed += 1;
                if receipt.minted {
                    tracked.push(Tracked {
                        id: receipt.position,
                        owner: owner.clone(),
                    });
                }
                "ok"
            }
            Err(err) => {
                failed += 1;
                check_failure(
                    step,
                    position,
                    err,
                    before.as_ref(),
                    &manager,
                    positions_before,
                    &mut violations,
                );
                err.kind()
            }
        };
        *outcomes.entry(kind.to_string()).or_insert(0) += 1;

        for msg in audit(&manager) {
            violations.push(format!("step {step}: {msg}"));
        }
        debug!(step, %position, outcome = kind, "soak step");
    }

    let report = SoakReport {
        schema_version: SCHEMA_VERSION,
        config: config.clone(),
        started_at,
        finished_at: Utc::now(),
        committed,
        failed,
        outcomes,
        faults_injected,
        positions: snapshot_positions(&manager),
        violations,
    };
    info!(
        seed = config.seed,
        steps = config.steps,
        committed = report.committed,
        failed = report.failed,
        violations = report.violations.len(),
        "soak finished"
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn check_failure(
    step: usize,
    position: PositionId,
    err: &LiquidityError,
    before: Option<&RangeStore>,
    manager: &LiquidityManager<InMemoryResource>,
    positions_before: usize,
    violations: &mut Vec<String>,
) {
    if let Err(msg) = unchanged(position, before, manager.ranges(position)) {
        violations.push(format!("step {step} ({}): {msg}", err.kind()));
    }
    if manager.total_positions() != positions_before {
        violations.push(format!("step {step} ({}): failed operation created a position", err.kind()));
    }
    if matches!(err, LiquidityError::SessionAlreadyActive) {
        violations.push(format!("step {step}: executor reported a reentrant session"));
    }
}

/// Random aligned bounds; reuses the stored upper for an existing lower most
/// of the time so the store accepts the add.
fn pick_bounds(
    rng: &mut StdRng,
    manager: &LiquidityManager<InMemoryResource>,
    position: PositionId,
) -> (i32, i32) {
    let lower = rng.gen_range(-150..150) * SPACING;
    let stored = manager
        .ranges(position)
        .and_then(|store| store.get(lower))
        .map(|range| range.upper);
    match stored {
        Some(upper) if rng.gen_bool(0.95) => (lower, upper),
        _ => (lower, lower + rng.gen_range(1..=40) * SPACING),
    }
}

/// Pick an existing range and an amount that sometimes exceeds its liquidity.
fn pick_removal(
    rng: &mut StdRng,
    manager: &LiquidityManager<InMemoryResource>,
    position: PositionId,
) -> (i32, i32, i128) {
    let ranges: Vec<_> = manager
        .ranges(position)
        .map(|store| store.iter().copied().collect())
        .unwrap_or_default();
    if ranges.is_empty() {
        let (lower, upper) = pick_bounds(rng, manager, position);
        return (lower, upper, rng.gen_range(1..=1_000));
    }
    let range = ranges[rng.gen_range(0..ranges.len())];
    let amount = match rng.gen_range(0..10) {
        0 => range.liquidity,
        1 => range.liquidity + 1,
        _ => rng.gen_range(1..=range.liquidity),
    };
    (range.lower, range.upper, amount)
}

fn pick_batch(
    rng: &mut StdRng,
    manager: &LiquidityManager<InMemoryResource>,
    position: PositionId,
) -> Vec<LiquidityChange> {
    let len = rng.gen_range(1..=4);
    (0..len)
        .map(|_| {
            if rng.gen_bool(0.7) {
                let (lower, upper) = pick_bounds(rng, manager, position);
                LiquidityChange::add(lower, upper, rng.gen_range(1..=1_000_000))
            } else {
                let (lower, upper, amount) = pick_removal(rng, manager, position);
                LiquidityChange::remove(lower, upper, amount)
            }
        })
        .collect()
}
