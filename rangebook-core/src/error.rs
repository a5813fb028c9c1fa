//! Top-level error for liquidity operations.
//!
//! Every public operation fails with exactly one `LiquidityError` and leaves
//! no partial effect behind. Precondition kinds are raised before any store
//! mutation or external call; the rest abort a session and roll it back.

use crate::domain::{ActionTag, PositionId, ResourceKey, Unit};
use crate::executor::ServiceError;
use crate::rebalance::RebalanceError;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LiquidityError {
    #[error("liquidity amount must be strictly positive, got {0}")]
    ZeroOrNegativeLiquidity(i128),

    #[error("caller {caller} is not the owner of position {position}")]
    NotOwner { position: PositionId, caller: String },

    #[error("position {position} is bound to {bound}, caller supplied {supplied}")]
    KeyMismatch {
        position: PositionId,
        bound: ResourceKey,
        supplied: ResourceKey,
    },

    #[error("position {0} has never been initialized")]
    NotInitialized(PositionId),

    #[error("a settlement session is already active")]
    SessionAlreadyActive,

    #[error("external apply failed on action {index} (tag {tag:?}): {source}")]
    ExternalApplyFailure {
        index: usize,
        tag: ActionTag,
        source: ServiceError,
    },

    #[error("settlement of {unit} failed: {source}")]
    SettlementFailure { unit: Unit, source: ServiceError },

    #[error("resource service error: {0}")]
    Service(ServiceError),

    #[error("range store error: {0}")]
    Store(#[from] StoreError),

    #[error("rebalance error: {0}")]
    Rebalance(#[from] RebalanceError),
}

impl LiquidityError {
    /// Every name `kind()` can return.
    pub const KINDS: &'static [&'static str] = &[
        "zero_or_negative_liquidity",
        "not_owner",
        "key_mismatch",
        "not_initialized",
        "session_already_active",
        "external_apply_failure",
        "settlement_failure",
        "service_error",
        "invalid_range",
        "upper_bound_mismatch",
        "range_not_found",
        "liquidity_overflow",
        "rebalance_error",
    ];

    /// Stable snake_case name of the error kind, for reports and expectations.
    pub fn kind(&self) -> &'static str {
        match self {
            LiquidityError::ZeroOrNegativeLiquidity(_) => "zero_or_negative_liquidity",
            LiquidityError::NotOwner { .. } => "not_owner",
            LiquidityError::KeyMismatch { .. } => "key_mismatch",
            LiquidityError::NotInitialized(_) => "not_initialized",
            LiquidityError::SessionAlreadyActive => "session_already_active",
            LiquidityError::ExternalApplyFailure { .. } => "external_apply_failure",
            LiquidityError::SettlementFailure { .. } => "settlement_failure",
            LiquidityError::Service(_) => "service_error",
            LiquidityError::Store(StoreError::InvalidRange { .. }) => "invalid_range",
            LiquidityError::Store(StoreError::UpperBoundMismatch { .. }) => "upper_bound_mismatch",
            LiquidityError::Store(StoreError::RangeNotFound { .. }) => "range_not_found",
            LiquidityError::Store(StoreError::LiquidityOverflow { .. }) => "liquidity_overflow",
            LiquidityError::Rebalance(_) => "rebalance_error",
        }
    }

    /// Whether this error is a precondition failure (raised before any side effect).
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LiquidityError::ZeroOrNegativeLiquidity(_)
                | LiquidityError::NotOwner { .. }
                | LiquidityError::KeyMismatch { .. }
                | LiquidityError::NotInitialized(_)
                | LiquidityError::Store(StoreError::InvalidRange { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            LiquidityError::ZeroOrNegativeLiquidity(0).kind(),
            "zero_or_negative_liquidity"
        );
        assert_eq!(LiquidityError::SessionAlreadyActive.kind(), "session_already_active");
        assert_eq!(
            LiquidityError::NotInitialized(PositionId(3)).kind(),
            "not_initialized"
        );
        assert_eq!(
            LiquidityError::from(StoreError::UpperBoundMismatch {
                lower: 0,
                stored: 1,
                supplied: 2
            })
            .kind(),
            "upper_bound_mismatch"
        );
    }

    #[test]
    fn kinds_list_covers_kind() {
        let samples = [
            LiquidityError::NotInitialized(PositionId(1)),
            LiquidityError::Service(ServiceError::NoSession),
            LiquidityError::from(StoreError::LiquidityOverflow { lower: 0 }),
        ];
        for err in samples {
            assert!(LiquidityError::KINDS.contains(&err.kind()));
        }
    }

    #[test]
    fn precondition_classification() {
        assert!(LiquidityError::ZeroOrNegativeLiquidity(-1).is_precondition());
        assert!(!LiquidityError::SessionAlreadyActive.is_precondition());
        assert!(!LiquidityError::Service(ServiceError::SessionOpen).is_precondition());
    }
}
