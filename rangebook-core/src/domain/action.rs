use super::ids::{ActionTag, PositionId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One atomic delta to apply against the external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedAction {
    pub lower: i32,
    pub upper: i32,
    pub liquidity_delta: i128,
    pub tag: ActionTag,
}

impl PlannedAction {
    pub fn new(position: PositionId, lower: i32, upper: i32, liquidity_delta: i128) -> Self {
        Self {
            lower,
            upper,
            liquidity_delta,
            tag: ActionTag::derive(position, lower, upper),
        }
    }

    /// Zero-delta actions never reach the external resource.
    pub fn is_noop(&self) -> bool {
        self.liquidity_delta == 0
    }

    pub fn is_addition(&self) -> bool {
        self.liquidity_delta > 0
    }

    pub fn is_removal(&self) -> bool {
        self.liquidity_delta < 0
    }

    /// Absolute liquidity moved by this action.
    pub fn magnitude(&self) -> u128 {
        self.liquidity_delta.unsigned_abs()
    }
}

impl fmt::Display for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.is_removal() { "remove" } else { "add" };
        write!(
            f,
            "{}({},{},{})",
            verb, self.lower, self.upper, self.liquidity_delta
        )
    }
}
