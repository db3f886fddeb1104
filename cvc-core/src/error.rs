//! Error taxonomy for the CVC core.
//!
//! Every public operation returns a value or one of these typed failures;
//! no other error type crosses a component boundary.

use crate::model::Digest;

/// Result type for CVC core operations
pub type Result<T> = std::result::Result<T, CvcError>;

/// Errors that can occur across the storage tiers and the engine
#[derive(Debug, thiserror::Error)]
pub enum CvcError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous reference '{prefix}' ({matches} matches)")]
    Ambiguous { prefix: String, matches: usize },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("branch '{branch}' moved, current head is {current_head}")]
    Conflict { branch: String, current_head: Digest },

    #[error("no common ancestor between '{from}' and '{target}'")]
    NoCommonAncestor { from: String, target: String },

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("cache unreadable: {0}")]
    CacheCorrupt(String),

    #[error("integrity failure for {hash}: {detail}")]
    Integrity { hash: Digest, detail: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for CvcError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => CvcError::NotFound("no such row".into()),
            other => CvcError::Storage(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CvcError {
    fn from(e: serde_json::Error) -> Self {
        CvcError::Encoding(e.to_string())
    }
}
