//! Domain model for quotes and their linked authors, categories and sources.
//!
//! # Responsibility
//! - Define canonical data structures used by core business logic.
//! - Keep one shape for the three counted entity kinds.
//!
//! # Invariants
//! - `quotes_count` fields are written only by the counter engine.
//! - Names and quote content are never blank once persisted.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entity;
pub mod link;
pub mod quote;

use entity::{EntityId, EntityKind};
use link::{LinkId, LinkKind};
use quote::QuoteId;

/// Input validation failure detected before any write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    BlankName(EntityKind),
    BlankContent,
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName(kind) => write!(f, "{kind} name must not be blank"),
            Self::BlankContent => write!(f, "quote content must not be blank"),
        }
    }
}

impl Error for ValidationError {}

/// Typed reference to one stored row, used in not-found/in-use reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordRef {
    Entity(EntityKind, EntityId),
    Quote(QuoteId),
    Link(LinkKind, LinkId),
}

impl Display for RecordRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entity(kind, id) => write!(f, "{kind} {id}"),
            Self::Quote(id) => write!(f, "quote {id}"),
            Self::Link(kind, id) => write!(f, "{kind} {id}"),
        }
    }
}
