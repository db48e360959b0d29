//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service orchestration.
//! - Own the only write path for quotes and association rows
//!   ([`quote_repo::QuoteWriter`]).
//!
//! # Invariants
//! - Repository APIs return semantic errors (`NotFound`, `InUse`,
//!   `DuplicateLink`) in addition to store errors.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::counter::CounterError;
use crate::db::DbError;
use crate::model::entity::EntityId;
use crate::model::link::LinkKind;
use crate::model::quote::QuoteId;
use crate::model::{RecordRef, ValidationError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod entity_repo;
pub mod quote_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for persistence, lookup and counter failures.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    NotFound(RecordRef),
    /// Entity is still referenced by quotes or association rows.
    InUse {
        record: RecordRef,
        references: i64,
    },
    /// `(quote, target)` pair already exists in the association table.
    DuplicateLink {
        kind: LinkKind,
        quote_id: QuoteId,
        target_id: EntityId,
    },
    Counter(CounterError),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(record) => write!(f, "{record} not found"),
            Self::InUse { record, references } => {
                write!(f, "{record} is still referenced by {references} rows")
            }
            Self::DuplicateLink {
                kind,
                quote_id,
                target_id,
            } => write!(
                f,
                "quote {quote_id} is already linked to {} {target_id}",
                kind.target_kind()
            ),
            Self::Counter(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Counter(err) => Some(err),
            Self::NotFound(_) => None,
            Self::InUse { .. } => None,
            Self::DuplicateLink { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<CounterError> for RepoError {
    fn from(value: CounterError) -> Self {
        Self::Counter(value)
    }
}
