//! Public operation surface: add, remove, batch-modify and rebalance.
//!
//! Every operation follows the same pipeline:
//!
//! 1. preconditions (amount, bounds, owner, initialization, key), no side effects
//! 2. clone the position record into a staged copy and plan against it
//! 3. run one settlement session through the executor
//! 4. on success, mint the id (new positions only) and commit the staged record
//!
//! A failure anywhere before step 4 drops the staged copy, so the registry is
//! exactly as it was before the call.

use crate::domain::{Owner, PlannedAction, PositionId, ResourceKey};
use crate::error::LiquidityError;
use crate::executor::{AtomicExecutor, ResourceService, SessionPayload, SessionReport};
use crate::identity::{IdentityRegistry, SequentialIdentity};
use crate::planner::{ActionPlanner, LiquidityChange, Operation};
use crate::rebalance::{RebalanceEngine, RebalanceError, RebalanceParams};
use crate::registry::{PositionRecord, PositionRegistry};
use crate::store::RangeStore;
use serde::Serialize;
use tracing::{info, warn};

/// What a committed operation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receipt {
    pub position: PositionId,
    /// True when this operation minted `position`.
    pub minted: bool,
    pub operation: &'static str,
    /// Full planned list, including zero-delta no-ops.
    pub actions: Vec<PlannedAction>,
    pub report: SessionReport,
}

/// Owns every position and drives operations against one resource service.
pub struct LiquidityManager<R, I = SequentialIdentity> {
    registry: PositionRegistry,
    executor: AtomicExecutor,
    planner: ActionPlanner,
    identity: I,
    resource: R,
}

impl<R: ResourceService> LiquidityManager<R, SequentialIdentity> {
    /// Manager with default rebalance parameters and sequential ids.
    pub fn new(resource: R) -> Self {
        Self::with_identity(resource, SequentialIdentity::new())
    }
}

impl<R, I> LiquidityManager<R, I>
where
    R: ResourceService,
    I: IdentityRegistry,
{
    pub fn with_identity(resource: R, identity: I) -> Self {
        Self {
            registry: PositionRegistry::new(),
            executor: AtomicExecutor::new(),
            planner: ActionPlanner::default(),
            identity,
            resource,
        }
    }

    pub fn with_params(
        resource: R,
        identity: I,
        params: RebalanceParams,
    ) -> Result<Self, RebalanceError> {
        let mut manager = Self::with_identity(resource, identity);
        manager.planner = ActionPlanner::new(RebalanceEngine::new(params)?);
        Ok(manager)
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Add `amount` on `[lower, upper)`. `PositionId::NEW` mints a position.
    #[allow(clippy::too_many_arguments)]
    pub fn add_liquidity(
        &mut self,
        caller: &Owner,
        position: PositionId,
        key: &ResourceKey,
        lower: i32,
        upper: i32,
        amount: i128,
        extra: &[u8],
    ) -> Result<Receipt, LiquidityError> {
        let op = Operation::Add(LiquidityChange::add(lower, upper, amount));
        self.run(caller, position, Some(key), op, extra)
    }

    /// Remove `amount` (a positive magnitude) from `[lower, upper)`.
    #[allow(clippy::too_many_arguments)]
    pub fn remove_liquidity(
        &mut self,
        caller: &Owner,
        position: PositionId,
        key: &ResourceKey,
        lower: i32,
        upper: i32,
        amount: i128,
        extra: &[u8],
    ) -> Result<Receipt, LiquidityError> {
        let op = Operation::Remove(LiquidityChange::remove(lower, upper, amount));
        self.run(caller, position, Some(key), op, extra)
    }

    /// Apply several adds/removes in one all-or-nothing session.
    pub fn modify_liquidity(
        &mut self,
        caller: &Owner,
        position: PositionId,
        key: &ResourceKey,
        changes: Vec<LiquidityChange>,
        extra: &[u8],
    ) -> Result<Receipt, LiquidityError> {
        self.run(caller, position, Some(key), Operation::Batch(changes), extra)
    }

    /// Redistribute the position's liquidity around `reference_point`.
    ///
    /// Uses the position's bound key; there is nothing to compare it against.
    pub fn rebalance(
        &mut self,
        caller: &Owner,
        position: PositionId,
        reference_point: i32,
        extra: &[u8],
    ) -> Result<Receipt, LiquidityError> {
        self.run(
            caller,
            position,
            None,
            Operation::Rebalance { reference_point },
            extra,
        )
    }

    fn run(
        &mut self,
        caller: &Owner,
        position: PositionId,
        key: Option<&ResourceKey>,
        op: Operation,
        extra: &[u8],
    ) -> Result<Receipt, LiquidityError> {
        let result = self.try_run(caller, position, key, &op, extra);
        if let Err(err) = &result {
            warn!(
                %position,
                op = op.name(),
                kind = err.kind(),
                precondition = err.is_precondition(),
                error = %err,
                "operation failed"
            );
        }
        result
    }

    fn try_run(
        &mut self,
        caller: &Owner,
        position: PositionId,
        key: Option<&ResourceKey>,
        op: &Operation,
        extra: &[u8],
    ) -> Result<Receipt, LiquidityError> {
        let (id, mut staged) = self.stage(caller, position, key, op)?;
        let key = staged.require_initialized()?.clone();

        let actions = self.planner.plan(id, op, &mut staged.ranges)?;
        let payload = SessionPayload {
            position: id,
            key,
            actions,
            extra: extra.to_vec(),
        };
        let report = self.executor.execute(&mut self.resource, &payload)?;

        let minted = position.is_new();
        if minted {
            let issued = self.identity.mint_next(caller);
            debug_assert_eq!(issued, id, "mint_next must return the previewed id");
            if issued != id {
                warn!(previewed = %id, %issued, "identity issued a different id than previewed");
            }
        }
        self.registry.commit(staged);

        info!(
            position = %id,
            op = op.name(),
            minted,
            actions = payload.actions.len(),
            applied = report.applied.len(),
            skipped = report.skipped,
            net = %report.net,
            "committed"
        );

        Ok(Receipt {
            position: id,
            minted,
            operation: op.name(),
            actions: payload.actions,
            report,
        })
    }

    /// Run every precondition, then return the resolved id and a staged copy
    /// of its record, already bound.
    fn stage(
        &self,
        caller: &Owner,
        position: PositionId,
        key: Option<&ResourceKey>,
        op: &Operation,
    ) -> Result<(PositionId, PositionRecord), LiquidityError> {
        op.validate()?;

        let id = if position.is_new() {
            self.identity.peek_next()
        } else {
            match self.identity.owner_of(position) {
                Some(owner) if owner == caller => position,
                _ => {
                    return Err(LiquidityError::NotOwner {
                        position,
                        caller: caller.0.clone(),
                    })
                }
            }
        };

        if op.requires_initialized() {
            if position.is_new() {
                return Err(LiquidityError::NotInitialized(position));
            }
            self.registry.require_initialized(id)?;
        }

        let mut staged = self
            .registry
            .get(id)
            .cloned()
            .unwrap_or_else(|| PositionRecord::new(id));
        if let Some(key) = key {
            staged.bind(key)?;
        }
        Ok((id, staged))
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Number of positions this manager has committed.
    pub fn total_positions(&self) -> usize {
        self.registry.len()
    }

    pub fn position(&self, id: PositionId) -> Option<&PositionRecord> {
        self.registry.get(id)
    }

    pub fn ranges(&self, id: PositionId) -> Option<&RangeStore> {
        self.registry.get(id).map(|record| &record.ranges)
    }

    pub fn registry(&self) -> &PositionRegistry {
        &self.registry
    }

    pub fn rebalance_params(&self) -> &RebalanceParams {
        self.planner.rebalance_engine().params()
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    pub fn identity_mut(&mut self) -> &mut I {
        &mut self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::InMemoryResource;

    fn pool() -> ResourceKey {
        ResourceKey::new("ETH", "USDC", 3000, 10)
    }

    fn manager() -> LiquidityManager<InMemoryResource> {
        let mut resource = InMemoryResource::new();
        resource.register_pool(pool(), 0);
        LiquidityManager::new(resource)
    }

    #[test]
    fn new_position_is_minted_at_commit() {
        let mut m = manager();
        let alice = Owner::new("alice");
        let receipt = m
            .add_liquidity(&alice, PositionId::NEW, &pool(), -100, 100, 5, &[])
            .unwrap();
        assert_eq!(receipt.position, PositionId(1));
        assert!(receipt.minted);
        assert_eq!(m.identity().owner_of(PositionId(1)), Some(&alice));
        assert_eq!(m.total_positions(), 1);
    }

    #[test]
    fn failed_new_position_mints_nothing() {
        let mut m = manager();
        m.resource_mut().fail_apply_at(1);
        let err = m
            .add_liquidity(&Owner::new("alice"), PositionId::NEW, &pool(), -100, 100, 5, &[])
            .unwrap_err();
        assert_eq!(err.kind(), "external_apply_failure");
        assert_eq!(m.identity().peek_next(), PositionId(1));
        assert_eq!(m.total_positions(), 0);
    }

    /// Identity that skips one id between preview and mint.
    struct SkippingIdentity(SequentialIdentity);

    impl IdentityRegistry for SkippingIdentity {
        fn peek_next(&self) -> PositionId {
            self.0.peek_next()
        }

        fn mint_next(&mut self, owner: &Owner) -> PositionId {
            self.0.mint_next(owner);
            self.0.mint_next(owner)
        }

        fn owner_of(&self, id: PositionId) -> Option<&Owner> {
            self.0.owner_of(id)
        }
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "mint_next must return the previewed id")]
    fn identity_breaking_preview_contract_is_caught() {
        let mut resource = InMemoryResource::new();
        resource.register_pool(pool(), 0);
        let mut m =
            LiquidityManager::with_identity(resource, SkippingIdentity(SequentialIdentity::new()));
        let _ = m.add_liquidity(&Owner::new("alice"), PositionId::NEW, &pool(), -100, 100, 5, &[]);
    }

    /// Service that closes every session without running the callback.
    struct SilentService;

    impl ResourceService for SilentService {
        fn begin_session(
            &mut self,
            _payload: &SessionPayload,
            _callback: &mut crate::executor::SessionCallback<'_>,
        ) -> Result<(), LiquidityError> {
            Ok(())
        }
    }

    #[test]
    fn session_that_never_ran_commits_nothing() {
        let mut m = LiquidityManager::new(SilentService);
        let err = m
            .add_liquidity(&Owner::new("alice"), PositionId::NEW, &pool(), -1000, 1000, 100, &[])
            .unwrap_err();
        assert_eq!(err.kind(), "service_error");
        assert_eq!(m.total_positions(), 0);
        assert!(m.ranges(PositionId(1)).is_none());
        assert_eq!(m.identity().peek_next(), PositionId(1));
    }

    #[test]
    fn amount_checked_before_owner() {
        let mut m = manager();
        let err = m
            .add_liquidity(&Owner::new("mallory"), PositionId(7), &pool(), 0, 10, 0, &[])
            .unwrap_err();
        assert_eq!(err, LiquidityError::ZeroOrNegativeLiquidity(0));
    }

    #[test]
    fn remove_on_sentinel_is_not_initialized() {
        let mut m = manager();
        let err = m
            .remove_liquidity(&Owner::new("alice"), PositionId::NEW, &pool(), 0, 10, 1, &[])
            .unwrap_err();
        assert_eq!(err, LiquidityError::NotInitialized(PositionId::NEW));
    }

    #[test]
    fn rebalance_uses_bound_key() {
        let mut m = manager();
        let alice = Owner::new("alice");
        let id = m
            .add_liquidity(&alice, PositionId::NEW, &pool(), -1000, 1000, 100, &[])
            .unwrap()
            .position;
        let receipt = m.rebalance(&alice, id, 0, &[]).unwrap();
        assert_eq!(receipt.actions.len(), 4);
        assert_eq!(m.ranges(id).unwrap().len(), 3);
        assert_eq!(m.ranges(id).unwrap().total_liquidity(), Some(100));
    }

    #[test]
    fn custom_params_are_used() {
        let mut resource = InMemoryResource::new();
        resource.register_pool(pool(), 0);
        let params = RebalanceParams {
            inner_percent: 50,
            window: 100,
        };
        let mut m =
            LiquidityManager::with_params(resource, SequentialIdentity::new(), params).unwrap();
        let alice = Owner::new("alice");
        let id = m
            .add_liquidity(&alice, PositionId::NEW, &pool(), -1000, 1000, 100, &[])
            .unwrap()
            .position;
        m.rebalance(&alice, id, 0, &[]).unwrap();
        let lowers: Vec<(i32, i128)> = m
            .ranges(id)
            .unwrap()
            .iter()
            .map(|r| (r.lower, r.liquidity))
            .collect();
        assert_eq!(lowers, vec![(-200, 25), (-100, 50), (100, 25)]);
    }

    #[test]
    fn invalid_params_rejected() {
        let params = RebalanceParams {
            inner_percent: 120,
            window: 100,
        };
        let result =
            LiquidityManager::with_params(InMemoryResource::new(), SequentialIdentity::new(), params);
        assert!(matches!(result, Err(RebalanceError::InnerPercentOutOfRange(120))));
    }
}
