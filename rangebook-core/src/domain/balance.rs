use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-unit settlement result of applying one action, seen from the position.
///
/// Negative amounts are owed to the resource (pulled); positive amounts are
/// owed by the resource (pushed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    pub amount0: i128,
    pub amount1: i128,
}

impl BalanceDelta {
    pub const ZERO: BalanceDelta = BalanceDelta {
        amount0: 0,
        amount1: 0,
    };

    pub fn new(amount0: i128, amount1: i128) -> Self {
        Self { amount0, amount1 }
    }

    pub fn is_zero(&self) -> bool {
        self.amount0 == 0 && self.amount1 == 0
    }

    /// Amounts in settlement order (unit0, unit1).
    pub fn amounts(&self) -> [i128; 2] {
        [self.amount0, self.amount1]
    }

    pub fn checked_add(&self, other: &BalanceDelta) -> Option<BalanceDelta> {
        Some(BalanceDelta {
            amount0: self.amount0.checked_add(other.amount0)?,
            amount1: self.amount1.checked_add(other.amount1)?,
        })
    }
}

impl fmt::Display for BalanceDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.amount0, self.amount1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_add_sums_per_unit() {
        let a = BalanceDelta::new(-10, 5);
        let b = BalanceDelta::new(3, -5);
        assert_eq!(a.checked_add(&b), Some(BalanceDelta::new(-7, 0)));
    }

    #[test]
    fn checked_add_overflow_is_none() {
        let a = BalanceDelta::new(i128::MAX, 0);
        assert_eq!(a.checked_add(&BalanceDelta::new(1, 0)), None);
    }

    #[test]
    fn zero() {
        assert!(BalanceDelta::ZERO.is_zero());
        assert!(!BalanceDelta::new(0, 1).is_zero());
    }
}
