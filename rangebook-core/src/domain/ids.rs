use serde::{Deserialize, Serialize};
use std::fmt;

/// Position identifier issued by the identity collaborator.
///
/// `PositionId::NEW` (0) is the sentinel meaning "mint a new position".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionId(pub u64);

impl PositionId {
    pub const NEW: PositionId = PositionId(0);

    pub fn is_new(&self) -> bool {
        *self == Self::NEW
    }
}

impl From<u64> for PositionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Caller / owner identity (opaque to this core).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner(pub String);

impl Owner {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tag identifying one range slot of one position at the external resource.
///
/// Derived with BLAKE3 from `(position, lower, upper)` so the same range of the
/// same position always lands in the same external slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionTag(pub [u8; 32]);

impl ActionTag {
    pub fn derive(position: PositionId, lower: i32, upper: i32) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"rangebook.slot");
        hasher.update(&position.0.to_le_bytes());
        hasher.update(&lower.to_le_bytes());
        hasher.update(&upper.to_le_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }
}

impl fmt::Debug for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActionTag({})", self.short())
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
