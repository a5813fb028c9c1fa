//! Range store — the ordered per-position collection of ranges.
//!
//! Ranges are keyed by lower bound in a `BTreeMap<i32, Range>`, so negative and
//! zero bounds are first-class keys and ascending iteration is free.
//!
//! Invariants:
//! - at most one range per lower bound
//! - every stored range has `liquidity > 0`
//! - the upper bound of a stored range never changes

use crate::domain::{bounds_are_valid, Range};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors from range store mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("invalid range: lower {lower} must be below upper {upper}")]
    InvalidRange { lower: i32, upper: i32 },

    #[error("range at lower {lower} has upper {stored}, caller supplied {supplied}")]
    UpperBoundMismatch { lower: i32, stored: i32, supplied: i32 },

    #[error("no range at lower {lower} to apply delta {delta} to")]
    RangeNotFound { lower: i32, delta: i128 },

    #[error("liquidity overflow at lower {lower}")]
    LiquidityOverflow { lower: i32 },
}

/// Ordered collection of ranges for one position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeStore {
    ranges: BTreeMap<i32, Range>,
}

impl RangeStore {
    pub fn new() -> Self {
        Self {
            ranges: BTreeMap::new(),
        }
    }

    /// Add `delta` liquidity to the range starting at `lower`.
    ///
    /// A missing range is created when `delta > 0`. An existing range must
    /// have the same `upper`. A range whose liquidity drops to `<= 0` stays
    /// in place until [`RangeStore::remove_if_empty`] is called, so callers
    /// see the raw post-delta value first.
    ///
    /// Returns the liquidity now held at `lower`.
    pub fn upsert(&mut self, lower: i32, upper: i32, delta: i128) -> Result<i128, StoreError> {
        if !bounds_are_valid(lower, upper) {
            return Err(StoreError::InvalidRange { lower, upper });
        }

        match self.ranges.get_mut(&lower) {
            Some(range) => {
                if range.upper != upper {
                    return Err(StoreError::UpperBoundMismatch {
                        lower,
                        stored: range.upper,
                        supplied: upper,
                    });
                }
                range.liquidity = range
                    .liquidity
                    .checked_add(delta)
                    .ok_or(StoreError::LiquidityOverflow { lower })?;
                Ok(range.liquidity)
            }
            None => {
                if delta <= 0 {
                    return Err(StoreError::RangeNotFound { lower, delta });
                }
                self.ranges.insert(lower, Range::new(lower, upper, delta));
                Ok(delta)
            }
        }
    }

    /// Delete the range at `lower` if its liquidity is `<= 0`.
    ///
    /// Returns true if a range was deleted.
    pub fn remove_if_empty(&mut self, lower: i32) -> bool {
        match self.ranges.get(&lower) {
            Some(range) if range.liquidity <= 0 => {
                self.ranges.remove(&lower);
                true
            }
            _ => false,
        }
    }

    /// Apply a delta and immediately prune the range if it emptied.
    pub fn apply_delta(&mut self, lower: i32, upper: i32, delta: i128) -> Result<(), StoreError> {
        self.upsert(lower, upper, delta)?;
        self.remove_if_empty(lower);
        Ok(())
    }

    /// Ranges in ascending lower-bound order. Each call starts a fresh pass.
    pub fn iter(&self) -> impl Iterator<Item = &Range> + '_ {
        self.ranges.values()
    }

    /// Sum of all stored liquidity, `None` if it does not fit in an `i128`.
    pub fn total_liquidity(&self) -> Option<i128> {
        self.ranges
            .values()
            .try_fold(0i128, |acc, r| acc.checked_add(r.liquidity))
    }

    pub fn get(&self, lower: i32) -> Option<&Range> {
        self.ranges.get(&lower)
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Check the store invariants. Used by the soak runner and tests.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (lower, range) in &self.ranges {
            if *lower != range.lower {
                return Err(format!("key {lower} holds range starting at {}", range.lower));
            }
            if range.liquidity <= 0 {
                return Err(format!("range at {lower} has liquidity {}", range.liquidity));
            }
            if !bounds_are_valid(range.lower, range.upper) {
                return Err(format!("range at {lower} has upper {}", range.upper));
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RangeStore {
    type Item = &'a Range;
    type IntoIter = std::collections::btree_map::Values<'a, i32, Range>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.values()
    }
}
