//! Quote association rows (quote↔category, quote↔source).

use super::entity::{EntityId, EntityKind};
use super::quote::QuoteId;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Row id inside one association table.
pub type LinkId = i64;

/// The two many-to-many association tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Category,
    Source,
}

impl LinkKind {
    pub const ALL: [LinkKind; 2] = [Self::Category, Self::Source];

    pub fn table(self) -> &'static str {
        match self {
            Self::Category => "quote_categories",
            Self::Source => "quote_sources",
        }
    }

    /// Column holding the linked entity id.
    pub fn target_column(self) -> &'static str {
        match self {
            Self::Category => "category_id",
            Self::Source => "source_id",
        }
    }

    /// Entity kind whose counter this association drives.
    pub fn target_kind(self) -> EntityKind {
        match self {
            Self::Category => EntityKind::Category,
            Self::Source => EntityKind::Source,
        }
    }
}

impl Display for LinkKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Category => f.write_str("quote category link"),
            Self::Source => f.write_str("quote source link"),
        }
    }
}

/// One association row. `(quote_id, target_id)` is unique per kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLink {
    pub id: LinkId,
    pub kind: LinkKind,
    pub quote_id: QuoteId,
    pub target_id: EntityId,
    pub created_at: i64,
}
