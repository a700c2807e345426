//! Artifact identifiers.
//!
//! An [`ArtifactId`] is minted once when a binary is uploaded and is
//! derived from the upload clock (unix milliseconds). It is embedded in
//! every published link, so nothing may ever regenerate it: metadata
//! edits, binary replacements, and re-signs all preserve the id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Stable identifier for one uploaded binary generation.
///
/// Ordering follows upload time, since the id is the upload timestamp
/// (bumped by one millisecond on collision).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ArtifactId(i64);

impl ArtifactId {
    /// Build an id from a unix-millisecond timestamp.
    pub fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// The raw unix-millisecond value.
    pub fn as_millis(self) -> i64 {
        self.0
    }

    /// The next candidate id, used to resolve same-millisecond collisions.
    pub fn bumped(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ArtifactId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_roundtrip() {
        let id = ArtifactId::from_millis(1_700_000_000_123);
        let parsed: ArtifactId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_bumped_orders_after() {
        let id = ArtifactId::from_millis(42);
        assert!(id.bumped() > id);
    }

    #[test]
    fn test_serde_transparent() {
        let id = ArtifactId::from_millis(7);
        assert_eq!(serde_json::to_string(&id).unwrap(), "7");
    }
}
