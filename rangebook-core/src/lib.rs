//! Rangebook Core — per-position range tracking with all-or-nothing settlement.
//!
//! This crate contains:
//! - Domain types (ids, ranges, planned actions, balance deltas, resource keys)
//! - Ordered range store keyed by lower bound
//! - Position registry with permanent resource binding
//! - Action planner and three-band rebalance engine
//! - Atomic executor driving one settlement session per operation
//! - `LiquidityManager`, the public add/remove/modify/rebalance surface
//! - An in-memory resource service for simulation and tests

pub mod domain;
pub mod error;
pub mod executor;
pub mod identity;
pub mod manager;
pub mod planner;
pub mod rebalance;
pub mod registry;
pub mod sim;
pub mod store;

pub use domain::{ActionTag, BalanceDelta, Owner, PlannedAction, PositionId, Range, ResourceKey, Unit};
pub use error::LiquidityError;
pub use executor::{AtomicExecutor, ResourceService, ServiceError, SessionContext, SessionPayload, SessionReport};
pub use identity::{IdentityRegistry, SequentialIdentity};
pub use manager::{LiquidityManager, Receipt};
pub use planner::{ActionPlanner, Direction, LiquidityChange, Operation};
pub use rebalance::{RebalanceEngine, RebalanceError, RebalanceParams};
pub use registry::{PositionRecord, PositionRegistry};
pub use store::{RangeStore, StoreError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: state that may cross into a worker thread is Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Range>();
        require_sync::<Range>();
        require_send::<PlannedAction>();
        require_sync::<PlannedAction>();
        require_send::<RangeStore>();
        require_sync::<RangeStore>();
        require_send::<PositionRegistry>();
        require_sync::<PositionRegistry>();
        require_send::<LiquidityError>();
        require_sync::<LiquidityError>();
        require_send::<SessionReport>();
        require_sync::<SessionReport>();
        require_send::<sim::InMemoryResource>();
        require_sync::<sim::InMemoryResource>();
        require_send::<LiquidityManager<sim::InMemoryResource>>();
        require_sync::<LiquidityManager<sim::InMemoryResource>>();
    }
}
