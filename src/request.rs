//! Lookup requests and their identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque token identifying one lookup for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// One price lookup, created when the coordinator misses its cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub card_name: String,
    pub id: RequestId,
}

impl LookupRequest {
    pub fn new(card_name: impl Into<String>, id: RequestId) -> Self {
        Self { card_name: card_name.into(), id }
    }
}
