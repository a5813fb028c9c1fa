//! In-memory resource service.
//!
//! Models one external resource with several pools. Each pool has a current
//! tick; each slot `(key, lower, upper, tag)` holds liquidity. Amounts follow a
//! linear model in ticks:
//!
//! - range entirely above the current tick: all unit0
//! - range entirely at or below it: all unit1
//! - straddling: unit0 gets `delta * (upper - tick) / (upper - lower)` and
//!   unit1 gets `delta * (tick - lower) / (upper - lower)`
//!
//! Adds round the owed amounts up and removes round the returned amounts down,
//! so reserves can never be drained below zero by rounding.

use crate::domain::{ActionTag, BalanceDelta, PlannedAction, PositionId, ResourceKey, Unit};
use crate::error::LiquidityError;
use crate::executor::{ResourceService, ServiceError, SessionCallback, SessionContext, SessionPayload};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// One liquidity slot at the resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotKey {
    pub key: ResourceKey,
    pub lower: i32,
    pub upper: i32,
    pub tag: ActionTag,
}

/// One committed apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyRecord {
    /// Sequence number of the session that committed this apply (from 1).
    pub session: u64,
    pub position: PositionId,
    pub key: ResourceKey,
    pub lower: i32,
    pub upper: i32,
    pub liquidity_delta: i128,
    pub tag: ActionTag,
    pub delta: BalanceDelta,
}

/// Everything a failed session must restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Ledger {
    slots: HashMap<SlotKey, i128>,
    journal: Vec<ApplyRecord>,
    reserves: BTreeMap<Unit, i128>,
}

#[derive(Debug, Default)]
pub struct InMemoryResource {
    pools: HashMap<ResourceKey, i32>,
    ledger: Ledger,
    session_open: bool,
    sessions: u64,
    fail_apply_at: Option<usize>,
}

impl InMemoryResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) a pool at `current_tick`.
    pub fn register_pool(&mut self, key: ResourceKey, current_tick: i32) {
        self.pools.insert(key, current_tick);
    }

    pub fn set_tick(&mut self, key: &ResourceKey, tick: i32) -> Result<(), ServiceError> {
        let current = self
            .pools
            .get_mut(key)
            .ok_or_else(|| ServiceError::UnknownResource(key.clone()))?;
        *current = tick;
        Ok(())
    }

    pub fn current_tick(&self, key: &ResourceKey) -> Option<i32> {
        self.pools.get(key).copied()
    }

    /// Add `amount` of `unit` to the resource's reserves outside any session.
    pub fn fund(&mut self, unit: &Unit, amount: i128) {
        let reserve = self.ledger.reserves.entry(unit.clone()).or_insert(0);
        *reserve = reserve.saturating_add(amount);
    }

    /// Fail the `k`-th apply (1-based) of the next session. One-shot.
    pub fn fail_apply_at(&mut self, k: usize) {
        self.fail_apply_at = Some(k);
    }

    /// Drop a fault that no session consumed.
    pub fn clear_fault(&mut self) {
        self.fail_apply_at = None;
    }

    pub fn pending_fault(&self) -> Option<usize> {
        self.fail_apply_at
    }

    /// Committed applies, in order.
    pub fn journal(&self) -> &[ApplyRecord] {
        &self.ledger.journal
    }

    /// Number of committed sessions.
    pub fn sessions(&self) -> u64 {
        self.sessions
    }

    pub fn liquidity_of(&self, key: &ResourceKey, lower: i32, upper: i32, tag: ActionTag) -> i128 {
        let slot = SlotKey {
            key: key.clone(),
            lower,
            upper,
            tag,
        };
        self.ledger.slots.get(&slot).copied().unwrap_or(0)
    }

    /// Every non-empty slot.
    pub fn slots(&self) -> impl Iterator<Item = (&SlotKey, i128)> + '_ {
        self.ledger.slots.iter().map(|(slot, liquidity)| (slot, *liquidity))
    }

    pub fn reserves(&self, unit: &Unit) -> i128 {
        self.ledger.reserves.get(unit).copied().unwrap_or(0)
    }
}

impl ResourceService for InMemoryResource {
    fn begin_session(
        &mut self,
        payload: &SessionPayload,
        callback: &mut SessionCallback<'_>,
    ) -> Result<(), LiquidityError> {
        if self.session_open {
            return Err(LiquidityError::Service(ServiceError::SessionOpen));
        }
        if !self.pools.contains_key(&payload.key) {
            return Err(LiquidityError::Service(ServiceError::UnknownResource(
                payload.key.clone(),
            )));
        }

        let snapshot = self.ledger.clone();
        self.session_open = true;
        let mut session = Session {
            pools: &self.pools,
            ledger: &mut self.ledger,
            key: &payload.key,
            position: payload.position,
            number: self.sessions + 1,
            fault: self.fail_apply_at.take(),
            applies: 0,
            outstanding: BTreeMap::new(),
        };

        let outcome = callback(payload, &mut session)
            .and_then(|()| session.close().map_err(LiquidityError::Service));
        self.session_open = false;

        match outcome {
            Ok(()) => {
                self.sessions += 1;
                debug!(session = self.sessions, key = %payload.key, "session closed");
                Ok(())
            }
            Err(err) => {
                self.ledger = snapshot;
                debug!(key = %payload.key, kind = err.kind(), "session discarded");
                Err(err)
            }
        }
    }
}

/// Context handed to the callback while a session is open.
struct Session<'a> {
    pools: &'a HashMap<ResourceKey, i32>,
    ledger: &'a mut Ledger,
    key: &'a ResourceKey,
    position: PositionId,
    number: u64,
    fault: Option<usize>,
    applies: usize,
    /// Per-unit balance still to settle; negative is owed to the resource.
    outstanding: BTreeMap<Unit, i128>,
}

impl Session<'_> {
    fn unit_of_session(&self, unit: &Unit) -> Result<(), ServiceError> {
        if self.key.units().contains(&unit) {
            Ok(())
        } else {
            Err(ServiceError::UnknownUnit(unit.clone()))
        }
    }

    fn owe(&mut self, unit: &Unit, amount: i128) -> Result<(), ServiceError> {
        let slot = self.outstanding.entry(unit.clone()).or_insert(0);
        *slot = slot.checked_add(amount).ok_or(ServiceError::Overflow)?;
        Ok(())
    }

    fn close(&self) -> Result<(), ServiceError> {
        match self.outstanding.iter().find(|(_, amount)| **amount != 0) {
            Some((unit, amount)) => Err(ServiceError::Unsettled {
                unit: unit.clone(),
                amount: *amount,
            }),
            None => Ok(()),
        }
    }
}

impl SessionContext for Session<'_> {
    fn apply(
        &mut self,
        key: &ResourceKey,
        action: &PlannedAction,
        _extra: &[u8],
    ) -> Result<BalanceDelta, ServiceError> {
        self.applies += 1;
        if self.fault == Some(self.applies) {
            return Err(ServiceError::Rejected(format!(
                "injected fault at apply {}",
                self.applies
            )));
        }

        if key != self.key {
            return Err(ServiceError::UnknownResource(key.clone()));
        }
        let tick = *self
            .pools
            .get(key)
            .ok_or_else(|| ServiceError::UnknownResource(key.clone()))?;

        let (lower, upper) = (action.lower, action.upper);
        if lower >= upper {
            return Err(ServiceError::EmptyRange { lower, upper });
        }
        if !is_aligned(lower, key.spacing) || !is_aligned(upper, key.spacing) {
            return Err(ServiceError::Misaligned {
                lower,
                upper,
                spacing: key.spacing,
            });
        }

        let slot = SlotKey {
            key: key.clone(),
            lower,
            upper,
            tag: action.tag,
        };
        let available = self.ledger.slots.get(&slot).copied().unwrap_or(0);
        let liquidity = available
            .checked_add(action.liquidity_delta)
            .ok_or(ServiceError::Overflow)?;
        if liquidity < 0 {
            return Err(ServiceError::InsufficientLiquidity {
                tag: action.tag,
                available,
                requested: action.liquidity_delta.saturating_neg(),
            });
        }

        let (amount0, amount1) = amounts_for(tick, lower, upper, action.liquidity_delta)?;
        let delta = if action.liquidity_delta > 0 {
            BalanceDelta::new(-amount0, -amount1)
        } else {
            BalanceDelta::new(amount0, amount1)
        };

        if liquidity == 0 {
            self.ledger.slots.remove(&slot);
        } else {
            self.ledger.slots.insert(slot, liquidity);
        }
        self.owe(&key.unit0, delta.amount0)?;
        self.owe(&key.unit1, delta.amount1)?;
        self.ledger.journal.push(ApplyRecord {
            session: self.number,
            position: self.position,
            key: key.clone(),
            lower,
            upper,
            liquidity_delta: action.liquidity_delta,
            tag: action.tag,
            delta,
        });
        Ok(delta)
    }

    fn pull(&mut self, unit: &Unit, amount: u128) -> Result<(), ServiceError> {
        self.unit_of_session(unit)?;
        let amount = i128::try_from(amount).map_err(|_| ServiceError::Overflow)?;
        self.owe(unit, amount)?;
        let reserve = self.ledger.reserves.entry(unit.clone()).or_insert(0);
        *reserve = reserve.checked_add(amount).ok_or(ServiceError::Overflow)?;
        Ok(())
    }

    fn push(&mut self, unit: &Unit, amount: u128) -> Result<(), ServiceError> {
        self.unit_of_session(unit)?;
        let signed = i128::try_from(amount).map_err(|_| ServiceError::Overflow)?;
        let available = self.ledger.reserves.get(unit).copied().unwrap_or(0);
        if available < signed {
            return Err(ServiceError::InsufficientReserves {
                unit: unit.clone(),
                available,
                requested: amount,
            });
        }
        self.owe(unit, -signed)?;
        self.ledger.reserves.insert(unit.clone(), available - signed);
        Ok(())
    }
}

fn is_aligned(tick: i32, spacing: u32) -> bool {
    spacing == 0 || i64::from(tick).rem_euclid(i64::from(spacing)) == 0
}

/// Unsigned amounts of (unit0, unit1) for moving `delta` liquidity on
/// `[lower, upper)` at `tick`.
fn amounts_for(tick: i32, lower: i32, upper: i32, delta: i128) -> Result<(i128, i128), ServiceError> {
    let magnitude = delta.checked_abs().ok_or(ServiceError::Overflow)?;
    if tick < lower {
        return Ok((magnitude, 0));
    }
    if tick >= upper {
        return Ok((0, magnitude));
    }

    let width = i128::from(upper) - i128::from(lower);
    let share = |part: i128| -> Result<i128, ServiceError> {
        let scaled = magnitude.checked_mul(part).ok_or(ServiceError::Overflow)?;
        let floor = scaled / width;
        Ok(if delta > 0 && scaled % width != 0 {
            floor + 1
        } else {
            floor
        })
    };
    Ok((
        share(i128::from(upper) - i128::from(tick))?,
        share(i128::from(tick) - i128::from(lower))?,
    ))
}
