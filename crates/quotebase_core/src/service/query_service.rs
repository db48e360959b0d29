//! Read-only query service.
//!
//! # Responsibility
//! - Serve entity and quote lookups, lists and counts.
//! - Run every request in one snapshot read transaction.
//!
//! # Invariants
//! - Never writes.
//! - `filtered_quote_count(f)` equals `list_quotes(f.without_window()).len()`.

use crate::config::CoreConfig;
use crate::model::entity::{EntityId, EntityKind, NamedEntity};
use crate::model::link::{LinkId, LinkKind, QuoteLink};
use crate::model::quote::{QuoteId, QuoteRecord};
use crate::model::RecordRef;
use crate::query::{
    compile, count_matching, fetch_matching, Pagination, QueryError, QueryResult, QuoteFilter,
};
use crate::repo::entity_repo::{EntityListQuery, EntityRepository, SqliteEntityRepository};
use crate::repo::quote_repo::{hydrate_quote, QuoteRepository, SqliteQuoteRepository};
use log::{debug, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::time::Instant;

pub struct QueryService<'conn> {
    conn: &'conn Connection,
    config: &'conn CoreConfig,
}

impl<'conn> QueryService<'conn> {
    pub fn new(conn: &'conn Connection, config: &'conn CoreConfig) -> Self {
        Self { conn, config }
    }

    pub fn get_entity(&self, kind: EntityKind, id: EntityId) -> QueryResult<NamedEntity> {
        self.read("get_entity", |tx| {
            SqliteEntityRepository::new(tx)
                .get_entity(kind, id)?
                .ok_or(QueryError::NotFound(RecordRef::Entity(kind, id)))
        })
    }

    /// Case-sensitive match first, then case-insensitive; lowest id wins.
    pub fn find_by_exact_name(&self, kind: EntityKind, name: &str) -> QueryResult<NamedEntity> {
        self.read("find_by_exact_name", |tx| {
            SqliteEntityRepository::new(tx)
                .find_by_exact_name(kind, name)?
                .ok_or_else(|| QueryError::NameNotFound {
                    kind,
                    name: name.to_string(),
                })
        })
    }

    pub fn list_entities(
        &self,
        kind: EntityKind,
        query: &EntityListQuery,
    ) -> QueryResult<Vec<NamedEntity>> {
        self.read("list_entities", |tx| {
            Ok(SqliteEntityRepository::new(tx).list_entities(kind, query)?)
        })
    }

    pub fn count_entities(&self, kind: EntityKind) -> QueryResult<i64> {
        self.read("count_entities", |tx| {
            Ok(SqliteEntityRepository::new(tx).count_entities(kind)?)
        })
    }

    pub fn get_quote(&self, id: QuoteId) -> QueryResult<QuoteRecord> {
        self.read("get_quote", |tx| {
            SqliteQuoteRepository::new(tx)
                .get_quote_record(id, &self.config.content_language)?
                .ok_or(QueryError::NotFound(RecordRef::Quote(id)))
        })
    }

    /// Association rows of one quote, oldest first. Their ids address
    /// `retarget_link` and `delete_link`.
    pub fn list_links(&self, kind: LinkKind, quote_id: QuoteId) -> QueryResult<Vec<QuoteLink>> {
        self.read("list_links", |tx| {
            let repo = SqliteQuoteRepository::new(tx);
            if repo.get_quote(quote_id)?.is_none() {
                return Err(QueryError::NotFound(RecordRef::Quote(quote_id)));
            }
            Ok(repo.list_links(kind, quote_id)?)
        })
    }

    pub fn get_link(&self, kind: LinkKind, link_id: LinkId) -> QueryResult<QuoteLink> {
        self.read("get_link", |tx| {
            SqliteQuoteRepository::new(tx)
                .get_link(kind, link_id)?
                .ok_or(QueryError::NotFound(RecordRef::Link(kind, link_id)))
        })
    }

    /// Filtered quotes, newest first, after limit → skip → first.
    pub fn list_quotes(&self, filter: &QuoteFilter) -> QueryResult<Vec<QuoteRecord>> {
        let plan = compile(filter, self.config);
        self.read("list_quotes", |tx| {
            fetch_matching(tx, &plan)?
                .into_iter()
                .map(|quote| {
                    hydrate_quote(tx, quote, &self.config.content_language)
                        .map_err(QueryError::from)
                })
                .collect()
        })
    }

    /// Total quotes, capped by `limit` when given.
    pub fn quote_count(&self, limit: Option<u32>) -> QueryResult<i64> {
        self.read("quote_count", |tx| {
            let total = SqliteQuoteRepository::new(tx).count_quotes()?;
            Ok(Pagination::new(limit, None, None).cap_count(total))
        })
    }

    /// Matching quotes, capped by the filter's `limit`. `skip`/`first` are ignored.
    pub fn filtered_quote_count(&self, filter: &QuoteFilter) -> QueryResult<i64> {
        let plan = compile(filter, self.config);
        self.read("filtered_quote_count", |tx| count_matching(tx, &plan))
    }

    fn read<T>(
        &self,
        op: &'static str,
        body: impl FnOnce(&Transaction<'_>) -> QueryResult<T>,
    ) -> QueryResult<T> {
        let started_at = Instant::now();
        let outcome = Transaction::new_unchecked(self.conn, TransactionBehavior::Deferred)
            .map_err(QueryError::from)
            .and_then(|tx| {
                let value = body(&tx)?;
                tx.commit()?;
                Ok(value)
            });

        match &outcome {
            Ok(_) => debug!(
                "event=query module=service status=ok op={} duration_ms={}",
                op,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=query module=service status=error op={} duration_ms={} error_code={}",
                op,
                started_at.elapsed().as_millis(),
                err.code()
            ),
        }
        outcome
    }
}
