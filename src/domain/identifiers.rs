//! Opaque order identifier.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 128-bit opaque identifier assigned to an order at creation.
///
/// Assigned exactly once and never mutated (invariant 1, spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InternalId(Uuid);

impl InternalId {
    /// Generate a new, random internal id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an internal id from its string form, e.g. a path segment.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for InternalId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}
