//! Action planner — turns a high-level operation into an ordered list of deltas.
//!
//! Planning also applies the operation speculatively to the position's range
//! store (a working copy owned by the caller), so the store and the action list
//! always describe the same change.

use crate::domain::{bounds_are_valid, PlannedAction, PositionId};
use crate::error::LiquidityError;
use crate::rebalance::RebalanceEngine;
use crate::store::{RangeStore, StoreError};
use serde::{Deserialize, Serialize};

/// Direction of a single liquidity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Add,
    Remove,
}

/// One add or remove of a positive `amount` on `[lower, upper)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityChange {
    pub direction: Direction,
    pub lower: i32,
    pub upper: i32,
    pub amount: i128,
}

impl LiquidityChange {
    pub fn add(lower: i32, upper: i32, amount: i128) -> Self {
        Self {
            direction: Direction::Add,
            lower,
            upper,
            amount,
        }
    }

    pub fn remove(lower: i32, upper: i32, amount: i128) -> Self {
        Self {
            direction: Direction::Remove,
            lower,
            upper,
            amount,
        }
    }

    /// The caller supplies a positive magnitude; removals are negated here.
    pub fn signed_delta(&self) -> i128 {
        match self.direction {
            Direction::Add => self.amount,
            Direction::Remove => -self.amount,
        }
    }
}

/// A public operation, as seen by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Add(LiquidityChange),
    Remove(LiquidityChange),
    /// Several adds/removes settled in one session.
    Batch(Vec<LiquidityChange>),
    Rebalance { reference_point: i32 },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add(_) => "add",
            Operation::Remove(_) => "remove",
            Operation::Batch(_) => "batch",
            Operation::Rebalance { .. } => "rebalance",
        }
    }

    /// Every add/remove carried by this operation (empty for rebalance).
    pub fn changes(&self) -> &[LiquidityChange] {
        match self {
            Operation::Add(change) | Operation::Remove(change) => std::slice::from_ref(change),
            Operation::Batch(changes) => changes,
            Operation::Rebalance { .. } => &[],
        }
    }

    /// Amount and bounds checks, in that order, before anything else runs.
    pub fn validate(&self) -> Result<(), LiquidityError> {
        for change in self.changes() {
            if change.amount <= 0 {
                return Err(LiquidityError::ZeroOrNegativeLiquidity(change.amount));
            }
        }
        for change in self.changes() {
            if !bounds_are_valid(change.lower, change.upper) {
                return Err(StoreError::InvalidRange {
                    lower: change.lower,
                    upper: change.upper,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Whether the target position must already be bound.
    pub fn requires_initialized(&self) -> bool {
        match self {
            Operation::Add(_) => false,
            Operation::Remove(_) | Operation::Rebalance { .. } => true,
            Operation::Batch(changes) => changes.iter().any(|c| c.direction == Direction::Remove),
        }
    }
}

/// Plans operations for one position at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ActionPlanner {
    rebalance: RebalanceEngine,
}

impl ActionPlanner {
    pub fn new(rebalance: RebalanceEngine) -> Self {
        Self { rebalance }
    }

    pub fn rebalance_engine(&self) -> &RebalanceEngine {
        &self.rebalance
    }

    /// Apply `op` to `store` and return the deltas to send to the resource.
    pub fn plan(
        &self,
        position: PositionId,
        op: &Operation,
        store: &mut RangeStore,
    ) -> Result<Vec<PlannedAction>, LiquidityError> {
        match op {
            Operation::Rebalance { reference_point } => Ok(self
                .rebalance
                .plan(position, store, *reference_point)?
                .actions),
            _ => op
                .changes()
                .iter()
                .map(|change| plan_change(position, change, store))
                .collect(),
        }
    }
}

fn plan_change(
    position: PositionId,
    change: &LiquidityChange,
    store: &mut RangeStore,
) -> Result<PlannedAction, LiquidityError> {
    let delta = change.signed_delta();
    store.apply_delta(change.lower, change.upper, delta)?;
    Ok(PlannedAction::new(position, change.lower, change.upper, delta))
}
