//! Domain types for rangebook

pub mod action;
pub mod balance;
pub mod ids;
pub mod range;
pub mod resource;

pub use action::PlannedAction;
pub use balance::BalanceDelta;
pub use ids::{ActionTag, Owner, PositionId};
pub use range::{bounds_are_valid, Range};
pub use resource::{ResourceKey, Unit};
