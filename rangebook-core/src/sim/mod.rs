//! Reference resource service for simulation and tests.

pub mod memory;

pub use memory::{ApplyRecord, InMemoryResource, SlotKey};
