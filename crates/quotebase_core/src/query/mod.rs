//! Quote filter compilation and execution.
//!
//! # Responsibility
//! - Compile a structured [`QuoteFilter`] into a [`QuotePlan`].
//! - Lower plans to SQL and run them read-only.
//!
//! # Invariants
//! - Query paths never write.
//! - Plans that traverse an association return each quote at most once.
//! - Quote order is `created_at DESC, id DESC` before pagination.

use crate::db::DbError;
use crate::model::entity::EntityKind;
use crate::model::RecordRef;
use crate::repo::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod executor;
pub mod filter;
pub mod pagination;
pub mod predicate;

pub use executor::{count_matching, fetch_matching};
pub use filter::{compile, QuoteFilter, QuotePlan};
pub use pagination::Pagination;
pub use predicate::Predicate;

pub type QueryResult<T> = Result<T, QueryError>;

/// Read-side failure. Every variant is safe to retry.
#[derive(Debug)]
pub enum QueryError {
    NotFound(RecordRef),
    /// Exact-name lookup matched neither case-sensitively nor case-insensitively.
    NameNotFound {
        kind: EntityKind,
        name: String,
    },
    Db(DbError),
    InvalidData(String),
}

impl QueryError {
    /// Stable log token.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::NameNotFound { .. } => "name_not_found",
            Self::Db(_) => "db_error",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(record) => write!(f, "{record} not found"),
            Self::NameNotFound { kind, name } => write!(f, "no {kind} named `{name}`"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for QueryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for QueryError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for QueryError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<RepoError> for QueryError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Db(err) => Self::Db(err),
            RepoError::NotFound(record) => Self::NotFound(record),
            RepoError::InvalidData(message) => Self::InvalidData(message),
            other => Self::InvalidData(other.to_string()),
        }
    }
}
