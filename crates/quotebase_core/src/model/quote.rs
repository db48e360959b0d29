//! Quote model and read projection.
//!
//! # Invariants
//! - `content` is never blank.
//! - `author_id`, when set, references an existing author.

use super::entity::{EntityId, NamedEntity};
use super::ValidationError;
use serde::{Deserialize, Serialize};

pub type QuoteId = i64;

/// Stored quote row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub content: String,
    pub author_id: Option<EntityId>,
    /// Epoch milliseconds. Quote lists are newest-created first.
    pub created_at: i64,
    pub updated_at: i64,
}

/// Quote read model with its author and linked entities resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub id: QuoteId,
    pub content: String,
    pub author: Option<NamedEntity>,
    /// Sorted by name.
    pub categories: Vec<NamedEntity>,
    /// Sorted by name.
    pub sources: Vec<NamedEntity>,
    /// Every quote currently carries the configured content language.
    pub language: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Rejects blank quote content.
pub fn validate_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::BlankContent);
    }
    Ok(())
}
