use serde::{Deserialize, Serialize};

/// A contiguous allocation `[lower, upper)` holding `liquidity` units.
///
/// Only ranges with `liquidity > 0` are ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub lower: i32,
    pub upper: i32,
    pub liquidity: i128,
}

impl Range {
    pub fn new(lower: i32, upper: i32, liquidity: i128) -> Self {
        Self {
            lower,
            upper,
            liquidity,
        }
    }

    pub fn width(&self) -> i64 {
        i64::from(self.upper) - i64::from(self.lower)
    }

    pub fn contains(&self, point: i32) -> bool {
        self.lower <= point && point < self.upper
    }
}

/// Whether `lower < upper`.
pub fn bounds_are_valid(lower: i32, upper: i32) -> bool {
    lower < upper
}
