//! Position registry — binds each position to one external resource key and
//! owns its range store.
//!
//! The binding is set exactly once, on first use, and is permanent for the
//! lifetime of the position. There is no rebinding operation.

use crate::domain::{PositionId, ResourceKey};
use crate::error::LiquidityError;
use crate::store::RangeStore;
use std::collections::BTreeMap;

/// One position: its binding and its ranges, owned together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionRecord {
    pub id: PositionId,
    binding: Option<ResourceKey>,
    pub ranges: RangeStore,
}

impl PositionRecord {
    pub fn new(id: PositionId) -> Self {
        Self {
            id,
            binding: None,
            ranges: RangeStore::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.is_some()
    }

    pub fn binding(&self) -> Option<&ResourceKey> {
        self.binding.as_ref()
    }

    /// Bind to `key` if unbound; otherwise the key must match exactly.
    pub fn bind(&mut self, key: &ResourceKey) -> Result<(), LiquidityError> {
        match &self.binding {
            None => {
                self.binding = Some(key.clone());
                Ok(())
            }
            Some(bound) => self.check_key(bound, key),
        }
    }

    /// The bound key, or `NotInitialized`.
    pub fn require_initialized(&self) -> Result<&ResourceKey, LiquidityError> {
        self.binding
            .as_ref()
            .ok_or(LiquidityError::NotInitialized(self.id))
    }

    /// Require initialization and that `key` equals the bound key.
    pub fn require_key(&self, key: &ResourceKey) -> Result<(), LiquidityError> {
        let bound = self.require_initialized()?;
        self.check_key(bound, key)
    }

    fn check_key(&self, bound: &ResourceKey, supplied: &ResourceKey) -> Result<(), LiquidityError> {
        if bound == supplied {
            Ok(())
        } else {
            Err(LiquidityError::KeyMismatch {
                position: self.id,
                bound: bound.clone(),
                supplied: supplied.clone(),
            })
        }
    }
}

/// Owned repository of positions keyed by id.
#[derive(Debug, Clone, Default)]
pub struct PositionRegistry {
    records: BTreeMap<PositionId, PositionRecord>,
}

impl PositionRegistry {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }

    /// Bind `id` to `key`, creating the record if this is its first use.
    pub fn bind(&mut self, id: PositionId, key: &ResourceKey) -> Result<(), LiquidityError> {
        self.records
            .entry(id)
            .or_insert_with(|| PositionRecord::new(id))
            .bind(key)
    }

    /// The bound key of `id`, or `NotInitialized`.
    pub fn require_initialized(&self, id: PositionId) -> Result<&ResourceKey, LiquidityError> {
        self.records
            .get(&id)
            .ok_or(LiquidityError::NotInitialized(id))?
            .require_initialized()
    }

    pub fn get(&self, id: PositionId) -> Option<&PositionRecord> {
        self.records.get(&id)
    }

    /// Replace (or insert) a record wholesale. This is the commit point for a
    /// staged record produced by a successful operation.
    pub fn commit(&mut self, record: PositionRecord) {
        self.records.insert(record.id, record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PositionRecord> + '_ {
        self.records.values()
    }
}
