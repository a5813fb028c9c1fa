//! Rebalance engine — redistributes a position's total liquidity into three
//! bands around a reference point.
//!
//! Pass 1 removes every stored range (ascending) and sums the liquidity.
//! Pass 2 splits the total:
//! - inner band `[ref - w, ref + w]` gets `floor(total * inner_percent / 100)`
//! - left band `[ref - 2w, ref - w]` gets `floor(outer / 2)`
//! - right band `[ref + w, ref + 2w]` gets the rest of `outer` (odd remainder
//!   goes right)
//!
//! The action list is always `removals ++ [inner, left, right]`; a zero-sized
//! band stays in the list as a no-op and is never written to the store.

use crate::domain::{PlannedAction, PositionId};
use crate::error::LiquidityError;
use crate::store::RangeStore;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to rebalance planning.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RebalanceError {
    #[error("inner_percent must be at most 100, got {0}")]
    InnerPercentOutOfRange(u8),

    #[error("window must be strictly positive, got {0}")]
    NonPositiveWindow(i32),

    #[error("band bounds overflow for reference {reference} and window {window}")]
    BoundsOverflow { reference: i32, window: i32 },

    #[error("total liquidity overflow while draining ranges")]
    TotalOverflow,
}

/// Fixed rebalance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceParams {
    /// Share of total liquidity placed in the inner band, in percent.
    pub inner_percent: u8,
    /// Half-width of the inner band; each outer band is one window wide.
    pub window: i32,
}

impl Default for RebalanceParams {
    fn default() -> Self {
        Self {
            inner_percent: 80,
            window: 500,
        }
    }
}

impl RebalanceParams {
    pub fn validate(&self) -> Result<(), RebalanceError> {
        if self.inner_percent > 100 {
            return Err(RebalanceError::InnerPercentOutOfRange(self.inner_percent));
        }
        if self.window <= 0 {
            return Err(RebalanceError::NonPositiveWindow(self.window));
        }
        Ok(())
    }
}

/// How a total is split across the three bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandSplit {
    pub inner: i128,
    pub left: i128,
    pub right: i128,
}

impl BandSplit {
    /// Split `total` (must be `>= 0`) with `inner_percent <= 100`.
    ///
    /// `inner` is `floor(total * inner_percent / 100)`, computed without
    /// forming the full product.
    pub fn compute(total: i128, inner_percent: u8) -> Result<Self, RebalanceError> {
        let percent = i128::from(inner_percent);
        let inner = (total / 100)
            .checked_mul(percent)
            .and_then(|whole| whole.checked_add(total % 100 * percent / 100))
            .ok_or(RebalanceError::TotalOverflow)?;
        let outer = total - inner;
        let left = outer / 2;
        Ok(Self {
            inner,
            left,
            right: outer - left,
        })
    }

    pub fn total(&self) -> i128 {
        self.inner + self.left + self.right
    }
}

/// Band bounds around a reference point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bands {
    pub inner: (i32, i32),
    pub left: (i32, i32),
    pub right: (i32, i32),
}

impl Bands {
    pub fn around(reference: i32, window: i32) -> Result<Self, RebalanceError> {
        let overflow = || RebalanceError::BoundsOverflow { reference, window };
        let double = window.checked_mul(2).ok_or_else(overflow)?;
        let near_low = reference.checked_sub(window).ok_or_else(overflow)?;
        let near_high = reference.checked_add(window).ok_or_else(overflow)?;
        let far_low = reference.checked_sub(double).ok_or_else(overflow)?;
        let far_high = reference.checked_add(double).ok_or_else(overflow)?;
        Ok(Self {
            inner: (near_low, near_high),
            left: (far_low, near_low),
            right: (near_high, far_high),
        })
    }
}

/// Result of planning a rebalance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancePlan {
    pub actions: Vec<PlannedAction>,
    /// Liquidity drained in pass 1.
    pub total: i128,
    /// `None` when there was nothing to redistribute.
    pub split: Option<BandSplit>,
}

impl RebalancePlan {
    pub fn removals(&self) -> impl Iterator<Item = &PlannedAction> + '_ {
        self.actions.iter().filter(|a| a.is_removal())
    }

    pub fn additions(&self) -> impl Iterator<Item = &PlannedAction> + '_ {
        self.actions.iter().filter(|a| !a.is_removal())
    }
}

/// Plans (and speculatively applies to the store) a three-band rebalance.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebalanceEngine {
    params: RebalanceParams,
}

impl RebalanceEngine {
    pub fn new(params: RebalanceParams) -> Result<Self, RebalanceError> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &RebalanceParams {
        &self.params
    }

    /// Drain `store`, then refill it with the three bands around `reference`.
    ///
    /// Band bounds are computed before the store is touched, so an overflow
    /// leaves it unchanged.
    pub fn plan(
        &self,
        position: PositionId,
        store: &mut RangeStore,
        reference: i32,
    ) -> Result<RebalancePlan, LiquidityError> {
        let bands = Bands::around(reference, self.params.window)?;

        let drained: Vec<_> = store.iter().filter(|r| r.liquidity > 0).copied().collect();
        let mut actions = Vec::with_capacity(drained.len() + 3);
        let mut total: i128 = 0;
        for range in drained {
            actions.push(PlannedAction::new(
                position,
                range.lower,
                range.upper,
                -range.liquidity,
            ));
            total = total
                .checked_add(range.liquidity)
                .ok_or(RebalanceError::TotalOverflow)?;
            store.apply_delta(range.lower, range.upper, -range.liquidity)?;
        }

        if total == 0 {
            return Ok(RebalancePlan {
                actions,
                total,
                split: None,
            });
        }

        let split = BandSplit::compute(total, self.params.inner_percent)?;
        for ((lower, upper), liquidity) in [
            (bands.inner, split.inner),
            (bands.left, split.left),
            (bands.right, split.right),
        ] {
            actions.push(PlannedAction::new(position, lower, upper, liquidity));
            if liquidity > 0 {
                store.upsert(lower, upper, liquidity)?;
            }
        }

        Ok(RebalancePlan {
            actions,
            total,
            split: Some(split),
        })
    }
}
