//! Identity collaborator — issues position ids and answers ownership queries.
//!
//! Issuance and transfer of position identity are owned by this collaborator;
//! the core only previews the next id, mints it at commit, and checks owners.

use crate::domain::{Owner, PositionId};
use std::collections::HashMap;

/// Issues position ids and answers ownership queries.
///
/// Contract: with no call in between, `mint_next` returns exactly the id
/// `peek_next` reported. Action tags of a new position are derived from the
/// previewed id before it is minted.
pub trait IdentityRegistry {
    /// The id the next `mint_next` call will return.
    fn peek_next(&self) -> PositionId;

    /// Issue the id `peek_next` reported to `owner`.
    fn mint_next(&mut self, owner: &Owner) -> PositionId;

    /// Current owner of `id`, if it was ever minted.
    fn owner_of(&self, id: PositionId) -> Option<&Owner>;
}

/// In-memory identity registry with sequential ids starting at 1.
#[derive(Debug, Clone)]
pub struct SequentialIdentity {
    next: u64,
    owners: HashMap<PositionId, Owner>,
}

impl Default for SequentialIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialIdentity {
    pub fn new() -> Self {
        Self {
            next: 1,
            owners: HashMap::new(),
        }
    }

    /// Reassign ownership. Returns false if `id` was never minted.
    pub fn transfer(&mut self, id: PositionId, to: Owner) -> bool {
        match self.owners.get_mut(&id) {
            Some(owner) => {
                *owner = to;
                true
            }
            None => false,
        }
    }

    pub fn minted(&self) -> usize {
        self.owners.len()
    }
}

impl IdentityRegistry for SequentialIdentity {
    fn peek_next(&self) -> PositionId {
        PositionId(self.next)
    }

    fn mint_next(&mut self, owner: &Owner) -> PositionId {
        let id = PositionId(self.next);
        self.next += 1;
        self.owners.insert(id, owner.clone());
        id
    }

    fn owner_of(&self, id: PositionId) -> Option<&Owner> {
        self.owners.get(&id)
    }
}
