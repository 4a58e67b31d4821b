//! Blob identifiers and the id-minting capability.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// An opaque blob identifier, unique within a namespace.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mints ids for new uploads. Injectable so tests can use deterministic ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> Id;
}

/// Default generator: ULIDs, lexicographically time-ordered.
#[derive(Clone, Copy, Debug, Default)]
pub struct UlidGenerator;

impl IdGenerator for UlidGenerator {
    fn next_id(&self) -> Id {
        Id(Ulid::new().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ulid_ids_are_distinct_26_char_strings() {
        let generator = UlidGenerator;
        let a = generator.next_id();
        let b = generator.next_id();
        assert_eq!(a.as_str().len(), 26);
        assert_ne!(a, b);
    }
}
