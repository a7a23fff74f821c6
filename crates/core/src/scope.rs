//! Caller scope key.
//!
//! Every graph retrieval is filtered by the caller's identity so concurrent
//! users never see each other's documents.

use serde::{Deserialize, Serialize};

/// Non-empty caller identity (the user's e-mail address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeKey(String);

/// Returned when a scope key is built from a blank string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("scope key must not be empty")]
pub struct EmptyScopeKey;

impl ScopeKey {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyScopeKey> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(EmptyScopeKey);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ScopeKey {
    type Error = EmptyScopeKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ScopeKey> for String {
    fn from(key: ScopeKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
