//! Per-action settlement and the session's net ledger.

use super::service::{ServiceError, SessionContext};
use crate::domain::{BalanceDelta, ResourceKey};
use crate::error::LiquidityError;
use tracing::debug;

/// Settle one apply result against the resource, unit by unit.
///
/// Negative amounts are pulled, positive amounts are pushed, zero is skipped.
pub fn settle(
    ctx: &mut dyn SessionContext,
    key: &ResourceKey,
    delta: &BalanceDelta,
) -> Result<(), LiquidityError> {
    for (unit, amount) in key.units().into_iter().zip(delta.amounts()) {
        let outcome = if amount < 0 {
            debug!(unit = %unit, amount = amount.unsigned_abs(), "pull");
            ctx.pull(unit, amount.unsigned_abs())
        } else if amount > 0 {
            debug!(unit = %unit, amount = amount.unsigned_abs(), "push");
            ctx.push(unit, amount.unsigned_abs())
        } else {
            Ok(())
        };
        outcome.map_err(|source| LiquidityError::SettlementFailure {
            unit: unit.clone(),
            source,
        })?;
    }
    Ok(())
}

/// Running net of every settled delta in a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettlementLedger {
    net: BalanceDelta,
    settled: usize,
}

impl SettlementLedger {
    pub fn record(&mut self, delta: &BalanceDelta) -> Result<(), LiquidityError> {
        self.net = self
            .net
            .checked_add(delta)
            .ok_or(LiquidityError::Service(ServiceError::Overflow))?;
        self.settled += 1;
        Ok(())
    }

    pub fn net(&self) -> BalanceDelta {
        self.net
    }

    pub fn settled(&self) -> usize {
        self.settled
    }
}
