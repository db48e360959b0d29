//! Mutation use-case service.
//!
//! # Responsibility
//! - Validate and authorize entity, quote and association mutations.
//! - Run each mutation in one `IMMEDIATE` transaction with counter upkeep.
//!
//! # Invariants
//! - Anonymous callers are rejected before any store access.
//! - A mutation commits in full or not at all; failures are never retried.
//! - Quote and association writes go through [`QuoteWriter`] only.

use crate::config::CoreConfig;
use crate::counter::{CounterEngine, CounterError};
use crate::db::DbError;
use crate::model::entity::{normalize_name, EntityId, EntityKind, NamedEntity};
use crate::model::link::{LinkId, LinkKind, QuoteLink};
use crate::model::quote::{validate_content, QuoteId, QuoteRecord};
use crate::model::{RecordRef, ValidationError};
use crate::repo::entity_repo::{EntityRepository, SqliteEntityRepository};
use crate::repo::quote_repo::{hydrate_quote, QuoteRepository, QuoteWriter, SqliteQuoteRepository};
use crate::repo::{RepoError, RepoResult};
use crate::service::Caller;
use log::{error, info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// The mutation that failed, named in every [`MutationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOp {
    CreateEntity(EntityKind),
    UpdateEntity(EntityKind),
    DeleteEntity(EntityKind),
    CreateQuote,
    UpdateQuote,
    DeleteQuote,
    CreateLink(LinkKind),
    RetargetLink(LinkKind),
    DeleteLink(LinkKind),
}

impl MutationOp {
    /// Stable log token, e.g. `create_author`.
    pub fn code(self) -> &'static str {
        match self {
            Self::CreateEntity(EntityKind::Author) => "create_author",
            Self::CreateEntity(EntityKind::Category) => "create_category",
            Self::CreateEntity(EntityKind::Source) => "create_source",
            Self::UpdateEntity(EntityKind::Author) => "update_author",
            Self::UpdateEntity(EntityKind::Category) => "update_category",
            Self::UpdateEntity(EntityKind::Source) => "update_source",
            Self::DeleteEntity(EntityKind::Author) => "delete_author",
            Self::DeleteEntity(EntityKind::Category) => "delete_category",
            Self::DeleteEntity(EntityKind::Source) => "delete_source",
            Self::CreateQuote => "create_quote",
            Self::UpdateQuote => "update_quote",
            Self::DeleteQuote => "delete_quote",
            Self::CreateLink(LinkKind::Category) => "create_quote_category",
            Self::CreateLink(LinkKind::Source) => "create_quote_source",
            Self::RetargetLink(LinkKind::Category) => "retarget_quote_category",
            Self::RetargetLink(LinkKind::Source) => "retarget_quote_source",
            Self::DeleteLink(LinkKind::Category) => "delete_quote_category",
            Self::DeleteLink(LinkKind::Source) => "delete_quote_source",
        }
    }
}

impl Display for MutationOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateEntity(kind) => write!(f, "create {kind}"),
            Self::UpdateEntity(kind) => write!(f, "update {kind}"),
            Self::DeleteEntity(kind) => write!(f, "delete {kind}"),
            Self::CreateQuote => f.write_str("create quote"),
            Self::UpdateQuote => f.write_str("update quote"),
            Self::DeleteQuote => f.write_str("delete quote"),
            Self::CreateLink(kind) => write!(f, "create {kind}"),
            Self::RetargetLink(kind) => write!(f, "retarget {kind}"),
            Self::DeleteLink(kind) => write!(f, "delete {kind}"),
        }
    }
}

/// Failure category of a mutation.
#[derive(Debug)]
pub enum MutationErrorKind {
    Unauthorized,
    InvalidInput(ValidationError),
    NotFound(RecordRef),
    InUse {
        record: RecordRef,
        references: i64,
    },
    DuplicateLink {
        kind: LinkKind,
        quote_id: QuoteId,
        target_id: EntityId,
    },
    /// Counter underflow, missing counter row or detected drift.
    ConsistencyViolation(CounterError),
    /// Store-level failure, including lock timeouts.
    TransactionFailure(DbError),
    InvalidData(String),
}

impl MutationErrorKind {
    /// Stable log token. Lock timeouts report `busy`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::InUse { .. } => "in_use",
            Self::DuplicateLink { .. } => "duplicate_link",
            Self::ConsistencyViolation(_) => "consistency_violation",
            Self::TransactionFailure(err) if err.is_busy() => "busy",
            Self::TransactionFailure(_) => "transaction_failure",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for MutationErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthorized => f.write_str("caller is not authenticated"),
            Self::InvalidInput(err) => write!(f, "{err}"),
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
            Self::ConsistencyViolation(err) => write!(f, "consistency violation: {err}"),
            Self::TransactionFailure(err) => write!(f, "transaction failed: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl From<RepoError> for MutationErrorKind {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::InvalidInput(err),
            RepoError::Db(err) => Self::TransactionFailure(err),
            RepoError::NotFound(record) => Self::NotFound(record),
            RepoError::InUse { record, references } => Self::InUse { record, references },
            RepoError::DuplicateLink {
                kind,
                quote_id,
                target_id,
            } => Self::DuplicateLink {
                kind,
                quote_id,
                target_id,
            },
            RepoError::Counter(CounterError::Db(err)) => Self::TransactionFailure(err),
            RepoError::Counter(err) => Self::ConsistencyViolation(err),
            RepoError::InvalidData(message) => Self::InvalidData(message),
        }
    }
}

/// Mutation failure naming the failed operation.
#[derive(Debug)]
pub struct MutationError {
    pub op: MutationOp,
    pub kind: MutationErrorKind,
}

impl MutationError {
    pub fn new(op: MutationOp, kind: MutationErrorKind) -> Self {
        Self { op, kind }
    }
}

impl Display for MutationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.op, self.kind)
    }
}

impl Error for MutationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            MutationErrorKind::InvalidInput(err) => Some(err),
            MutationErrorKind::ConsistencyViolation(err) => Some(err),
            MutationErrorKind::TransactionFailure(err) => Some(err),
            _ => None,
        }
    }
}

pub type MutationResult<T> = Result<T, MutationError>;

/// New quote with its author and association sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteInput {
    pub content: String,
    pub author_id: Option<EntityId>,
    pub category_ids: Vec<EntityId>,
    pub source_ids: Vec<EntityId>,
}

/// Author change requested by a quote update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorUpdate {
    #[default]
    Keep,
    Set(EntityId),
    Clear,
}

/// Quote update. `None` leaves a field untouched; a supplied id set
/// replaces the whole association set of that kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteUpdate {
    pub content: Option<String>,
    pub author: AuthorUpdate,
    pub category_ids: Option<Vec<EntityId>>,
    pub source_ids: Option<Vec<EntityId>>,
}

/// Mutation facade over one connection.
pub struct MutationService<'conn> {
    conn: &'conn Connection,
    config: &'conn CoreConfig,
    engine: CounterEngine,
}

impl<'conn> MutationService<'conn> {
    pub fn new(conn: &'conn Connection, config: &'conn CoreConfig) -> Self {
        Self {
            conn,
            config,
            engine: CounterEngine::new(config),
        }
    }

    pub fn create_entity(
        &self,
        caller: &Caller,
        kind: EntityKind,
        name: &str,
    ) -> MutationResult<NamedEntity> {
        self.run(caller, MutationOp::CreateEntity(kind), |tx| {
            let name = normalize_name(kind, name)?;
            SqliteEntityRepository::new(tx).create_entity(kind, &name)
        })
    }

    pub fn update_entity(
        &self,
        caller: &Caller,
        kind: EntityKind,
        id: EntityId,
        name: &str,
    ) -> MutationResult<NamedEntity> {
        self.run(caller, MutationOp::UpdateEntity(kind), |tx| {
            let name = normalize_name(kind, name)?;
            SqliteEntityRepository::new(tx).rename_entity(kind, id, &name)
        })
    }

    /// Deletes an entity no quote or association row references.
    pub fn delete_entity(
        &self,
        caller: &Caller,
        kind: EntityKind,
        id: EntityId,
    ) -> MutationResult<()> {
        self.run(caller, MutationOp::DeleteEntity(kind), |tx| {
            SqliteEntityRepository::new(tx).delete_entity(kind, id)
        })
    }

    pub fn create_quote(&self, caller: &Caller, input: &QuoteInput) -> MutationResult<QuoteRecord> {
        self.run(caller, MutationOp::CreateQuote, |tx| {
            validate_content(&input.content)?;
            let writer = QuoteWriter::new(tx, &self.engine);
            let quote = writer.insert_quote(&input.content, input.author_id)?;
            writer.replace_links(LinkKind::Category, quote.id, &input.category_ids)?;
            writer.replace_links(LinkKind::Source, quote.id, &input.source_ids)?;
            hydrate_quote(tx, quote, &self.config.content_language)
        })
    }

    pub fn update_quote(
        &self,
        caller: &Caller,
        id: QuoteId,
        update: &QuoteUpdate,
    ) -> MutationResult<QuoteRecord> {
        self.run(caller, MutationOp::UpdateQuote, |tx| {
            if let Some(content) = &update.content {
                validate_content(content)?;
            }
            let writer = QuoteWriter::new(tx, &self.engine);
            if let Some(content) = &update.content {
                writer.update_content(id, content)?;
            }
            match update.author {
                AuthorUpdate::Keep => {}
                AuthorUpdate::Set(author_id) => writer.set_author(id, Some(author_id))?,
                AuthorUpdate::Clear => writer.set_author(id, None)?,
            }
            if let Some(category_ids) = &update.category_ids {
                writer.replace_links(LinkKind::Category, id, category_ids)?;
            }
            if let Some(source_ids) = &update.source_ids {
                writer.replace_links(LinkKind::Source, id, source_ids)?;
            }

            SqliteQuoteRepository::new(tx)
                .get_quote_record(id, &self.config.content_language)?
                .ok_or(RepoError::NotFound(RecordRef::Quote(id)))
        })
    }

    /// Deletes a quote and its association rows.
    pub fn delete_quote(&self, caller: &Caller, id: QuoteId) -> MutationResult<()> {
        self.run(caller, MutationOp::DeleteQuote, |tx| {
            QuoteWriter::new(tx, &self.engine).delete_quote(id)
        })
    }

    pub fn create_link(
        &self,
        caller: &Caller,
        kind: LinkKind,
        quote_id: QuoteId,
        target_id: EntityId,
    ) -> MutationResult<QuoteLink> {
        self.run(caller, MutationOp::CreateLink(kind), |tx| {
            QuoteWriter::new(tx, &self.engine).insert_link(kind, quote_id, target_id)
        })
    }

    pub fn retarget_link(
        &self,
        caller: &Caller,
        kind: LinkKind,
        link_id: LinkId,
        target_id: EntityId,
    ) -> MutationResult<QuoteLink> {
        self.run(caller, MutationOp::RetargetLink(kind), |tx| {
            QuoteWriter::new(tx, &self.engine).retarget_link(kind, link_id, target_id)
        })
    }

    pub fn delete_link(
        &self,
        caller: &Caller,
        kind: LinkKind,
        link_id: LinkId,
    ) -> MutationResult<()> {
        self.run(caller, MutationOp::DeleteLink(kind), |tx| {
            QuoteWriter::new(tx, &self.engine)
                .delete_link(kind, link_id)
                .map(|_| ())
        })
    }

    fn run<T>(
        &self,
        caller: &Caller,
        op: MutationOp,
        body: impl FnOnce(&Transaction<'_>) -> RepoResult<T>,
    ) -> MutationResult<T> {
        if !caller.is_authenticated() {
            warn!(
                "event=mutation module=service status=rejected op={} error_code=unauthorized",
                op.code()
            );
            return Err(MutationError::new(op, MutationErrorKind::Unauthorized));
        }

        let started_at = Instant::now();
        let outcome = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)
            .and_then(|tx| {
                let value = body(&tx)?;
                tx.commit()?;
                Ok(value)
            });

        match outcome {
            Ok(value) => {
                info!(
                    "event=mutation module=service status=ok op={} duration_ms={}",
                    op.code(),
                    started_at.elapsed().as_millis()
                );
                Ok(value)
            }
            Err(err) => {
                let kind = MutationErrorKind::from(err);
                error!(
                    "event=mutation module=service status=error op={} duration_ms={} error_code={} error={}",
                    op.code(),
                    started_at.elapsed().as_millis(),
                    kind.code(),
                    kind
                );
                Err(MutationError::new(op, kind))
            }
        }
    }
}
