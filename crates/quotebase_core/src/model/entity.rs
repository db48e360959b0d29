//! Counted entity model (author, category, source).
//!
//! # Responsibility
//! - Define the shared record shape of the three counted entity kinds.
//! - Normalize user-provided names.
//!
//! # Invariants
//! - `quotes_count >= 0`.
//! - Stored names are trimmed with internal whitespace runs collapsed.

use super::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid ws regex"));

/// Row id of an author, category or source.
pub type EntityId = i64;

/// The three entity kinds that carry a denormalized `quotes_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Counted by `quotes.author_id`.
    Author,
    /// Counted by `quote_categories` rows.
    Category,
    /// Counted by `quote_sources` rows.
    Source,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [Self::Author, Self::Category, Self::Source];

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Author => "authors",
            Self::Category => "categories",
            Self::Source => "sources",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Category => "category",
            Self::Source => "source",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Author, category or source row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds. Counter maintenance does not touch it.
    pub updated_at: i64,
    /// Denormalized number of quotes linked to this entity.
    pub quotes_count: i64,
}

/// Trims a name and collapses internal whitespace runs to one space.
///
/// # Errors
/// - `ValidationError::BlankName` when nothing remains after trimming.
pub fn normalize_name(kind: EntityKind, raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankName(kind));
    }
    Ok(WHITESPACE_RE.replace_all(trimmed, " ").into_owned())
}

#[cfg(test)]
mod tests {
    use super::{normalize_name, EntityKind};
    use crate::model::ValidationError;

    #[test]
    fn normalize_name_trims_and_collapses_whitespace() {
        let name = normalize_name(EntityKind::Author, "  Albert \t\n Einstein ").unwrap();
        assert_eq!(name, "Albert Einstein");
    }

    #[test]
    fn normalize_name_keeps_case() {
        let name = normalize_name(EntityKind::Category, "Freedom").unwrap();
        assert_eq!(name, "Freedom");
    }

    #[test]
    fn normalize_name_rejects_blank() {
        let err = normalize_name(EntityKind::Source, " \t ").unwrap_err();
        assert_eq!(err, ValidationError::BlankName(EntityKind::Source));
    }

    #[test]
    fn kinds_map_to_distinct_tables() {
        let tables: Vec<_> = EntityKind::ALL.iter().map(|kind| kind.table()).collect();
        assert_eq!(tables, vec!["authors", "categories", "sources"]);
    }
}
