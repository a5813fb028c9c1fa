//! Post-step invariant audit of a manager and its in-memory resource.
//!
//! Checks, for every position:
//! - the range store's own invariants (unique lower bounds, positive liquidity)
//! - every stored range matches the liquidity of its slot at the resource
//!
//! and globally, that the resource holds no slot the stores do not know of.

use rangebook_core::sim::InMemoryResource;
use rangebook_core::{
    ActionTag, IdentityRegistry, LiquidityManager, PositionId, Range, RangeStore,
};
use serde::{Deserialize, Serialize};

/// Serializable view of one position at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub id: PositionId,
    pub owner: Option<String>,
    pub key: Option<String>,
    pub ranges: Vec<Range>,
    /// `None` when the sum overflows `i128`.
    pub total_liquidity: Option<i128>,
}

/// Snapshot every committed position, ascending by id.
pub fn snapshot_positions<I: IdentityRegistry>(
    manager: &LiquidityManager<InMemoryResource, I>,
) -> Vec<PositionSnapshot> {
    manager
        .registry()
        .iter()
        .map(|record| PositionSnapshot {
            id: record.id,
            owner: manager.identity().owner_of(record.id).map(|o| o.0.clone()),
            key: record.binding().map(|k| k.to_string()),
            ranges: record.ranges.iter().copied().collect(),
            total_liquidity: record.ranges.total_liquidity(),
        })
        .collect()
}

/// Every invariant violation currently observable, as readable messages.
pub fn audit<I: IdentityRegistry>(manager: &LiquidityManager<InMemoryResource, I>) -> Vec<String> {
    let resource = manager.resource();
    let mut violations = Vec::new();
    let mut ranges_seen = 0usize;

    for record in manager.registry().iter() {
        if let Err(msg) = record.ranges.check_invariants() {
            violations.push(format!("position {}: {msg}", record.id));
        }
        if record.ranges.total_liquidity().is_none() {
            violations.push(format!("position {}: total liquidity overflows", record.id));
        }
        let Some(key) = record.binding() else {
            if !record.ranges.is_empty() {
                violations.push(format!("position {}: ranges without a binding", record.id));
            }
            continue;
        };
        for range in record.ranges.iter() {
            ranges_seen += 1;
            let tag = ActionTag::derive(record.id, range.lower, range.upper);
            let held = resource.liquidity_of(key, range.lower, range.upper, tag);
            if held != range.liquidity {
                violations.push(format!(
                    "position {}: range [{}, {}) stores {} but resource slot holds {held}",
                    record.id, range.lower, range.upper, range.liquidity
                ));
            }
        }
    }

    let slots = resource.slots().count();
    if slots != ranges_seen {
        violations.push(format!(
            "resource holds {slots} non-empty slots but stores hold {ranges_seen} ranges"
        ));
    }
    violations
}

/// Compare a position's store before and after a failed operation.
pub fn unchanged(
    id: PositionId,
    before: Option<&RangeStore>,
    after: Option<&RangeStore>,
) -> Result<(), String> {
    if before == after {
        Ok(())
    } else {
        Err(format!("position {id}: failed operation changed the range store"))
    }
}
