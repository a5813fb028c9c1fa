//! Atomic executor — runs one settlement session per public operation.
//!
//! Session lifecycle: `Idle → Active → Idle`.
//! - `prepare` stages a payload and moves to Active (fails if already Active)
//! - the service re-enters `apply_session_payload` exactly once; each non-zero
//!   action is applied and settled before the next one
//! - `commit` / `rollback` return to Idle; a session the service closed
//!   without entering the payload is rolled back, never committed
//!
//! The executor never touches the range store. The caller stages its store
//! mutations on a working copy and publishes them only after `execute`
//! returns Ok, so a failed session leaves no observable change anywhere.

pub mod service;
pub mod settlement;

pub use service::{
    ResourceService, ServiceError, SessionCallback, SessionContext, SessionPayload,
};
pub use settlement::{settle, SettlementLedger};

use crate::domain::{BalanceDelta, PlannedAction, PositionId};
use crate::error::LiquidityError;
use serde::Serialize;
use tracing::debug;

/// Session state of the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// `applied` flips once the service has re-entered the payload.
    Active { position: PositionId, applied: bool },
}

/// One action that reached the resource, with its settled delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AppliedAction {
    pub index: usize,
    pub action: PlannedAction,
    pub delta: BalanceDelta,
}

/// Outcome of a committed session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub applied: Vec<AppliedAction>,
    /// Zero-delta actions skipped before reaching the resource.
    pub skipped: usize,
    pub net: BalanceDelta,
}

/// Drives the two-phase session protocol against a `ResourceService`.
#[derive(Debug)]
pub struct AtomicExecutor {
    state: SessionState,
}

impl Default for AtomicExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicExecutor {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active { .. })
    }

    /// Stage a session: Idle → Active.
    pub fn prepare(&mut self, payload: &SessionPayload) -> Result<(), LiquidityError> {
        if self.is_active() {
            return Err(LiquidityError::SessionAlreadyActive);
        }
        self.state = SessionState::Active {
            position: payload.position,
            applied: false,
        };
        Ok(())
    }

    /// Active → Idle after the service accepted the session.
    pub fn commit(&mut self) {
        debug_assert!(self.is_active(), "commit without an active session");
        self.state = SessionState::Idle;
    }

    /// Active → Idle after a failed session.
    pub fn rollback(&mut self) {
        self.state = SessionState::Idle;
    }

    /// Run `payload` as one all-or-nothing session.
    pub fn execute<S>(
        &mut self,
        service: &mut S,
        payload: &SessionPayload,
    ) -> Result<SessionReport, LiquidityError>
    where
        S: ResourceService + ?Sized,
    {
        self.prepare(payload)?;

        let mut report = SessionReport::default();
        let state = &mut self.state;
        let outcome = service.begin_session(payload, &mut |payload, ctx| {
            apply_session_payload(&mut *state, payload, ctx, &mut report)
        });

        let outcome = outcome.and_then(|()| match self.state {
            SessionState::Active { applied: true, .. } => Ok(()),
            _ => Err(LiquidityError::Service(ServiceError::CallbackNotInvoked)),
        });

        match outcome {
            Ok(()) => {
                self.commit();
                Ok(report)
            }
            Err(err) => {
                debug!(position = %payload.position, kind = err.kind(), "session rolled back");
                self.rollback();
                Err(err)
            }
        }
    }
}

/// The re-entered half of the session: apply and settle every action in order.
///
/// Runs inside `ResourceService::begin_session`. A second entry within the same
/// session is a reentrant double-application and fails fast.
pub fn apply_session_payload(
    state: &mut SessionState,
    payload: &SessionPayload,
    ctx: &mut dyn SessionContext,
    report: &mut SessionReport,
) -> Result<(), LiquidityError> {
    match state {
        SessionState::Active { applied, position } if !*applied && *position == payload.position => {
            *applied = true;
        }
        _ => return Err(LiquidityError::SessionAlreadyActive),
    }

    let mut ledger = SettlementLedger::default();
    for (index, action) in payload.actions.iter().enumerate() {
        if action.is_noop() {
            report.skipped += 1;
            continue;
        }

        let delta = ctx
            .apply(&payload.key, action, &payload.extra)
            .map_err(|source| LiquidityError::ExternalApplyFailure {
                index,
                tag: action.tag,
                source,
            })?;
        debug!(
            position = %payload.position,
            index,
            action = %action,
            tag = %action.tag.short(),
            delta = %delta,
            "applied"
        );

        settle(ctx, &payload.key, &delta)?;
        ledger.record(&delta)?;
        report.applied.push(AppliedAction {
            index,
            action: *action,
            delta,
        });
    }
    report.net = ledger.net();
    Ok(())
}
