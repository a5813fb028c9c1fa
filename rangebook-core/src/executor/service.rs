//! Boundary to the external resource service.
//!
//! The service runs a session as one synchronous call: `begin_session` invokes
//! the supplied callback exactly once, handing it a `SessionContext` through
//! which every apply and settlement of the session flows. If the callback
//! fails (or the service's own closing checks fail) the service discards every
//! effect of the session before returning the error.

use crate::domain::{ActionTag, BalanceDelta, PlannedAction, PositionId, ResourceKey, Unit};
use crate::error::LiquidityError;
use thiserror::Error;

/// Errors raised by the external resource service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("a session is already open at the resource")]
    SessionOpen,

    #[error("no session is open at the resource")]
    NoSession,

    #[error("the resource closed the session without invoking the callback")]
    CallbackNotInvoked,

    #[error("unknown resource {0}")]
    UnknownResource(ResourceKey),

    #[error("unit {0} is not part of this session's resource")]
    UnknownUnit(Unit),

    #[error("bounds [{lower}, {upper}) are not aligned to spacing {spacing}")]
    Misaligned { lower: i32, upper: i32, spacing: u32 },

    #[error("bounds [{lower}, {upper}) are empty")]
    EmptyRange { lower: i32, upper: i32 },

    #[error("slot {tag:?} holds {available}, cannot remove {requested}")]
    InsufficientLiquidity {
        tag: ActionTag,
        available: i128,
        requested: i128,
    },

    #[error("reserves of {unit} hold {available}, cannot push {requested}")]
    InsufficientReserves {
        unit: Unit,
        available: i128,
        requested: u128,
    },

    #[error("unit {unit} left unsettled by {amount}")]
    Unsettled { unit: Unit, amount: i128 },

    #[error("arithmetic overflow at the resource")]
    Overflow,

    #[error("rejected: {0}")]
    Rejected(String),
}

/// Everything the service needs to hand back to the callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPayload {
    pub position: PositionId,
    pub key: ResourceKey,
    pub actions: Vec<PlannedAction>,
    /// Opaque caller data passed through to every apply.
    pub extra: Vec<u8>,
}

impl SessionPayload {
    /// Actions that will actually reach the resource.
    pub fn effective_actions(&self) -> impl Iterator<Item = &PlannedAction> + '_ {
        self.actions.iter().filter(|a| !a.is_noop())
    }
}

/// Operations available while a session is open.
pub trait SessionContext {
    /// Apply one liquidity delta to the slot identified by the action's tag.
    fn apply(
        &mut self,
        key: &ResourceKey,
        action: &PlannedAction,
        extra: &[u8],
    ) -> Result<BalanceDelta, ServiceError>;

    /// The resource pulls `amount` of `unit` from the position's side
    /// (settles a negative delta).
    fn pull(&mut self, unit: &Unit, amount: u128) -> Result<(), ServiceError>;

    /// The resource pushes `amount` of `unit` to the position's side
    /// (settles a positive delta).
    fn push(&mut self, unit: &Unit, amount: u128) -> Result<(), ServiceError>;
}

/// Callback re-entered by the service while a session is open.
pub type SessionCallback<'a> =
    dyn FnMut(&SessionPayload, &mut dyn SessionContext) -> Result<(), LiquidityError> + 'a;

/// The external resource service.
pub trait ResourceService {
    /// Open a session, invoke `callback` synchronously, close the session.
    ///
    /// All-or-nothing: on any error nothing done inside the session persists,
    /// and a callback error is returned unchanged.
    fn begin_session(
        &mut self,
        payload: &SessionPayload,
        callback: &mut SessionCallback<'_>,
    ) -> Result<(), LiquidityError>;
}
