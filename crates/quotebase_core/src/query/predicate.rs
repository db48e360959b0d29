//! Composable quote predicates.
//!
//! # Responsibility
//! - Represent filter conditions as a tree combined with `and`/`or`.
//! - Evaluate the same tree in memory over hydrated quotes.
//!
//! # Invariants
//! - `Always` is the identity of `and`; `Never` is the identity of `or`.
//! - Text predicates compare with [`fold_case`], the same folding the
//!   `casefold` SQL function applies.

use crate::db::fold_case;
use crate::model::entity::{EntityId, NamedEntity};
use crate::model::quote::QuoteRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Always,
    Never,
    ContentContains(String),
    AuthorNameContains(String),
    CategoryNameContains(String),
    SourceNameContains(String),
    AuthorIs(EntityId),
    CategoryIs(EntityId),
    SourceIs(EntityId),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction, flattening nested `And` nodes.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Self::Always, other) | (other, Self::Always) => other,
            (Self::Never, _) | (_, Self::Never) => Self::Never,
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), other) => {
                left.push(other);
                Self::And(left)
            }
            (other, Self::And(mut right)) => {
                right.insert(0, other);
                Self::And(right)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Disjunction, flattening nested `Or` nodes.
    pub fn or(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Self::Never, other) | (other, Self::Never) => other,
            (Self::Always, _) | (_, Self::Always) => Self::Always,
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), other) => {
                left.push(other);
                Self::Or(left)
            }
            (other, Self::Or(mut right)) => {
                right.insert(0, other);
                Self::Or(right)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    /// Whether matching needs a category or source association.
    pub fn traverses_association(&self) -> bool {
        match self {
            Self::CategoryNameContains(_)
            | Self::SourceNameContains(_)
            | Self::CategoryIs(_)
            | Self::SourceIs(_) => true,
            Self::And(children) | Self::Or(children) => {
                children.iter().any(Predicate::traverses_association)
            }
            _ => false,
        }
    }

    pub fn evaluate(&self, quote: &QuoteRecord) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::ContentContains(needle) => contains_folded(&quote.content, needle),
            Self::AuthorNameContains(needle) => quote
                .author
                .as_ref()
                .is_some_and(|author| contains_folded(&author.name, needle)),
            Self::CategoryNameContains(needle) => any_name_contains(&quote.categories, needle),
            Self::SourceNameContains(needle) => any_name_contains(&quote.sources, needle),
            Self::AuthorIs(id) => quote.author.as_ref().is_some_and(|author| author.id == *id),
            Self::CategoryIs(id) => quote.categories.iter().any(|entity| entity.id == *id),
            Self::SourceIs(id) => quote.sources.iter().any(|entity| entity.id == *id),
            Self::And(children) => children.iter().all(|child| child.evaluate(quote)),
            Self::Or(children) => children.iter().any(|child| child.evaluate(quote)),
        }
    }
}

fn contains_folded(haystack: &str, needle: &str) -> bool {
    fold_case(haystack).contains(&fold_case(needle))
}

fn any_name_contains(entities: &[NamedEntity], needle: &str) -> bool {
    entities
        .iter()
        .any(|entity| contains_folded(&entity.name, needle))
}
