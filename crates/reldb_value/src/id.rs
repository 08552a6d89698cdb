//! Row identifier.

use sha2::{Digest, Sha256};
use std::fmt;

/// Unique identifier for a row within a table.
///
/// Most tables allocate integer identifiers from a per-table counter
/// (seeded to `max(existing) + 1`). Tables keyed by content hash carry
/// a caller-supplied hash identifier instead, and the counter is unused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Id {
    /// Counter-allocated integer identifier.
    Int(i64),
    /// Content-hash identifier (lowercase hex).
    Hash(String),
}

impl Id {
    /// Computes a content-hash identifier over the given bytes (SHA-256, hex).
    #[must_use]
    pub fn hash_of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let digest = hasher.finalize();
        let mut hex = String::with_capacity(digest.len() * 2);
        for byte in digest {
            use std::fmt::Write;
            let _ = write!(hex, "{byte:02x}");
        }
        Self::Hash(hex)
    }

    /// Returns the integer value, if this is an integer identifier.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Hash(_) => None,
        }
    }

    /// Returns the hash string, if this is a content-hash identifier.
    #[must_use]
    pub fn as_hash(&self) -> Option<&str> {
        match self {
            Self::Int(_) => None,
            Self::Hash(h) => Some(h),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Hash(h) => write!(f, "{h}"),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Id {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}
