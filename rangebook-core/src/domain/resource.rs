//! External resource binding: which pool a position lives in.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One settlement unit (a currency held by the external resource).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Unit(pub String);

impl Unit {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of one external resource (pool).
///
/// A position is bound to exactly one key on first use; every later operation
/// must present a key that is structurally identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    pub unit0: Unit,
    pub unit1: Unit,
    /// Fee tier in hundredths of a basis point.
    pub fee: u32,
    /// Bounds must be multiples of this at the resource.
    pub spacing: u32,
}

impl ResourceKey {
    pub fn new(unit0: impl Into<String>, unit1: impl Into<String>, fee: u32, spacing: u32) -> Self {
        Self {
            unit0: Unit::new(unit0),
            unit1: Unit::new(unit1),
            fee,
            spacing,
        }
    }

    /// The two units in settlement order.
    pub fn units(&self) -> [&Unit; 2] {
        [&self.unit0, &self.unit1]
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}:{}", self.unit0, self.unit1, self.fee, self.spacing)
    }
}
