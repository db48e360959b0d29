//! Quote and association persistence.
//!
//! # Responsibility
//! - Read quotes, association rows and the hydrated [`QuoteRecord`].
//! - Own every write to `quotes`, `quote_categories` and `quote_sources`
//!   through [`QuoteWriter`].
//!
//! # Invariants
//! - Every row write is followed by exactly one [`CounterEvent`] applied in
//!   the same transaction. No other code writes these tables.
//! - Referenced quotes and entities are checked before the write, so a
//!   missing reference surfaces as `NotFound` rather than a constraint error.
//! - `(quote, target)` stays unique per association kind.

use super::entity_repo::load_linked_entities;
use super::{RepoError, RepoResult};
use crate::counter::{CounterEngine, CounterEvent};
use crate::db::NOW_MS_SQL;
use crate::model::entity::{EntityId, EntityKind};
use crate::model::link::{LinkId, LinkKind, QuoteLink};
use crate::model::quote::{Quote, QuoteId, QuoteRecord};
use crate::model::RecordRef;
use crate::repo::entity_repo::{EntityRepository, SqliteEntityRepository};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};

const QUOTE_COLUMNS: &str = "id, content, author_id, created_at, updated_at";

/// Read-only quote access.
pub trait QuoteRepository {
    fn get_quote(&self, id: QuoteId) -> RepoResult<Option<Quote>>;
    /// Loads the quote and resolves author, categories and sources.
    fn get_quote_record(&self, id: QuoteId, language: &str) -> RepoResult<Option<QuoteRecord>>;
    /// Association rows of one quote, oldest first.
    fn list_links(&self, kind: LinkKind, quote_id: QuoteId) -> RepoResult<Vec<QuoteLink>>;
    fn get_link(&self, kind: LinkKind, link_id: LinkId) -> RepoResult<Option<QuoteLink>>;
    fn count_quotes(&self) -> RepoResult<i64>;
}

/// SQLite-backed quote reader.
pub struct SqliteQuoteRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteQuoteRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl QuoteRepository for SqliteQuoteRepository<'_> {
    fn get_quote(&self, id: QuoteId) -> RepoResult<Option<Quote>> {
        load_quote(self.conn, id)
    }

    fn get_quote_record(&self, id: QuoteId, language: &str) -> RepoResult<Option<QuoteRecord>> {
        match load_quote(self.conn, id)? {
            Some(quote) => hydrate_quote(self.conn, quote, language).map(Some),
            None => Ok(None),
        }
    }

    fn list_links(&self, kind: LinkKind, quote_id: QuoteId) -> RepoResult<Vec<QuoteLink>> {
        load_links(self.conn, kind, quote_id)
    }

    fn get_link(&self, kind: LinkKind, link_id: LinkId) -> RepoResult<Option<QuoteLink>> {
        load_link(self.conn, kind, link_id)
    }

    fn count_quotes(&self) -> RepoResult<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM quotes;", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Resolves author and linked entities of one quote row.
pub(crate) fn hydrate_quote(
    conn: &Connection,
    quote: Quote,
    language: &str,
) -> RepoResult<QuoteRecord> {
    let author = match quote.author_id {
        Some(author_id) => {
            let author = SqliteEntityRepository::new(conn).get_entity(EntityKind::Author, author_id)?;
            match author {
                Some(author) => Some(author),
                None => {
                    return Err(RepoError::InvalidData(format!(
                        "quote {} references missing author {author_id}",
                        quote.id
                    )))
                }
            }
        }
        None => None,
    };

    let categories = load_linked_entities(
        conn,
        EntityKind::Category,
        LinkKind::Category.table(),
        LinkKind::Category.target_column(),
        quote.id,
    )?;
    let sources = load_linked_entities(
        conn,
        EntityKind::Source,
        LinkKind::Source.table(),
        LinkKind::Source.target_column(),
        quote.id,
    )?;

    Ok(QuoteRecord {
        id: quote.id,
        content: quote.content,
        author,
        categories,
        sources,
        language: language.to_string(),
        created_at: quote.created_at,
        updated_at: quote.updated_at,
    })
}

pub(crate) fn parse_quote_row(row: &Row<'_>) -> rusqlite::Result<Quote> {
    Ok(Quote {
        id: row.get("id")?,
        content: row.get("content")?,
        author_id: row.get("author_id")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn load_quote(conn: &Connection, id: QuoteId) -> RepoResult<Option<Quote>> {
    let quote = conn
        .query_row(
            &format!("SELECT {QUOTE_COLUMNS} FROM quotes WHERE id = ?1;"),
            [id],
            parse_quote_row,
        )
        .optional()?;
    Ok(quote)
}

fn load_links(conn: &Connection, kind: LinkKind, quote_id: QuoteId) -> RepoResult<Vec<QuoteLink>> {
    let table = kind.table();
    let target = kind.target_column();
    let mut stmt = conn.prepare(&format!(
        "SELECT id, quote_id, {target} AS target_id, created_at
         FROM {table}
         WHERE quote_id = ?1
         ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([quote_id])?;
    let mut links = Vec::new();
    while let Some(row) = rows.next()? {
        links.push(parse_link_row(kind, row)?);
    }
    Ok(links)
}

fn load_link(conn: &Connection, kind: LinkKind, link_id: LinkId) -> RepoResult<Option<QuoteLink>> {
    let table = kind.table();
    let target = kind.target_column();
    let link = conn
        .query_row(
            &format!(
                "SELECT id, quote_id, {target} AS target_id, created_at
                 FROM {table}
                 WHERE id = ?1;"
            ),
            [link_id],
            |row| parse_link_row(kind, row),
        )
        .optional()?;
    Ok(link)
}

fn parse_link_row(kind: LinkKind, row: &Row<'_>) -> rusqlite::Result<QuoteLink> {
    Ok(QuoteLink {
        id: row.get("id")?,
        kind,
        quote_id: row.get("quote_id")?,
        target_id: row.get("target_id")?,
        created_at: row.get("created_at")?,
    })
}

fn entity_exists(conn: &Connection, kind: EntityKind, id: EntityId) -> RepoResult<bool> {
    let table = kind.table();
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);"),
        [id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn ensure_entity(conn: &Connection, kind: EntityKind, id: EntityId) -> RepoResult<()> {
    if entity_exists(conn, kind, id)? {
        Ok(())
    } else {
        Err(RepoError::NotFound(RecordRef::Entity(kind, id)))
    }
}

fn link_exists(
    conn: &Connection,
    kind: LinkKind,
    quote_id: QuoteId,
    target_id: EntityId,
) -> RepoResult<bool> {
    let table = kind.table();
    let target = kind.target_column();
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE quote_id = ?1 AND {target} = ?2);"),
        params![quote_id, target_id],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

/// Drops repeated ids, keeping first-seen order.
fn dedupe_ids(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = std::collections::BTreeSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Write path for quotes and association rows inside one open transaction.
///
/// Each method performs one logical write and reports it to the counter
/// engine before returning. Any error leaves `tx` unusable for commit.
pub struct QuoteWriter<'a, 'tx> {
    tx: &'a Transaction<'tx>,
    engine: &'a CounterEngine,
}

impl<'a, 'tx> QuoteWriter<'a, 'tx> {
    pub fn new(tx: &'a Transaction<'tx>, engine: &'a CounterEngine) -> Self {
        Self { tx, engine }
    }

    fn require_quote(&self, id: QuoteId) -> RepoResult<Quote> {
        load_quote(self.tx, id)?.ok_or(RepoError::NotFound(RecordRef::Quote(id)))
    }

    /// Inserts a quote. `content` must already be validated.
    pub fn insert_quote(&self, content: &str, author_id: Option<EntityId>) -> RepoResult<Quote> {
        if let Some(author_id) = author_id {
            ensure_entity(self.tx, EntityKind::Author, author_id)?;
        }

        self.tx.execute(
            "INSERT INTO quotes (content, author_id) VALUES (?1, ?2);",
            params![content, author_id],
        )?;
        let id = self.tx.last_insert_rowid();
        self.engine
            .apply(self.tx, &CounterEvent::QuoteInserted { author: author_id })?;

        load_quote(self.tx, id)?
            .ok_or_else(|| RepoError::InvalidData(format!("quote {id} missing after insert")))
    }

    /// Replaces quote content and bumps `updated_at`. No counter is involved.
    pub fn update_content(&self, id: QuoteId, content: &str) -> RepoResult<()> {
        let changed = self.tx.execute(
            &format!("UPDATE quotes SET content = ?2, updated_at = {NOW_MS_SQL} WHERE id = ?1;"),
            params![id, content],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(RecordRef::Quote(id)));
        }
        Ok(())
    }

    /// Reassigns, sets or clears the author of one quote.
    pub fn set_author(&self, id: QuoteId, author_id: Option<EntityId>) -> RepoResult<()> {
        let quote = self.require_quote(id)?;
        if quote.author_id == author_id {
            return Ok(());
        }
        if let Some(author_id) = author_id {
            ensure_entity(self.tx, EntityKind::Author, author_id)?;
        }

        self.tx.execute(
            &format!("UPDATE quotes SET author_id = ?2, updated_at = {NOW_MS_SQL} WHERE id = ?1;"),
            params![id, author_id],
        )?;
        self.engine.apply(
            self.tx,
            &CounterEvent::QuoteAuthorChanged {
                from: quote.author_id,
                to: author_id,
            },
        )?;
        Ok(())
    }

    /// Deletes association rows of the quote, then the quote itself.
    pub fn delete_quote(&self, id: QuoteId) -> RepoResult<()> {
        let quote = self.require_quote(id)?;
        for kind in LinkKind::ALL {
            for link in load_links(self.tx, kind, id)? {
                self.delete_link(kind, link.id)?;
            }
        }

        self.tx.execute("DELETE FROM quotes WHERE id = ?1;", [id])?;
        self.engine.apply(
            self.tx,
            &CounterEvent::QuoteDeleted {
                author: quote.author_id,
            },
        )?;
        Ok(())
    }

    /// Links one quote to one category or source.
    pub fn insert_link(
        &self,
        kind: LinkKind,
        quote_id: QuoteId,
        target_id: EntityId,
    ) -> RepoResult<QuoteLink> {
        self.require_quote(quote_id)?;
        ensure_entity(self.tx, kind.target_kind(), target_id)?;
        if link_exists(self.tx, kind, quote_id, target_id)? {
            return Err(RepoError::DuplicateLink {
                kind,
                quote_id,
                target_id,
            });
        }

        let table = kind.table();
        let target = kind.target_column();
        self.tx.execute(
            &format!("INSERT INTO {table} (quote_id, {target}) VALUES (?1, ?2);"),
            params![quote_id, target_id],
        )?;
        let link_id = self.tx.last_insert_rowid();
        self.engine.apply(
            self.tx,
            &CounterEvent::LinkInserted {
                kind,
                target: target_id,
            },
        )?;

        load_link(self.tx, kind, link_id)?.ok_or_else(|| {
            RepoError::InvalidData(format!("{kind} {link_id} missing after insert"))
        })
    }

    /// Points an existing association row at another target.
    pub fn retarget_link(
        &self,
        kind: LinkKind,
        link_id: LinkId,
        target_id: EntityId,
    ) -> RepoResult<QuoteLink> {
        let link = load_link(self.tx, kind, link_id)?
            .ok_or(RepoError::NotFound(RecordRef::Link(kind, link_id)))?;
        if link.target_id == target_id {
            return Ok(link);
        }
        ensure_entity(self.tx, kind.target_kind(), target_id)?;
        if link_exists(self.tx, kind, link.quote_id, target_id)? {
            return Err(RepoError::DuplicateLink {
                kind,
                quote_id: link.quote_id,
                target_id,
            });
        }

        let table = kind.table();
        let target = kind.target_column();
        self.tx.execute(
            &format!("UPDATE {table} SET {target} = ?2 WHERE id = ?1;"),
            params![link_id, target_id],
        )?;
        self.engine.apply(
            self.tx,
            &CounterEvent::LinkRetargeted {
                kind,
                from: link.target_id,
                to: target_id,
            },
        )?;

        Ok(QuoteLink { target_id, ..link })
    }

    pub fn delete_link(&self, kind: LinkKind, link_id: LinkId) -> RepoResult<QuoteLink> {
        let link = load_link(self.tx, kind, link_id)?
            .ok_or(RepoError::NotFound(RecordRef::Link(kind, link_id)))?;

        let table = kind.table();
        self.tx
            .execute(&format!("DELETE FROM {table} WHERE id = ?1;"), [link_id])?;
        self.engine.apply(
            self.tx,
            &CounterEvent::LinkDeleted {
                kind,
                target: link.target_id,
            },
        )?;
        Ok(link)
    }

    /// Replaces the whole association set of one kind.
    ///
    /// Existing rows are deleted first, then `target_ids` are inserted in
    /// order with duplicates dropped.
    pub fn replace_links(
        &self,
        kind: LinkKind,
        quote_id: QuoteId,
        target_ids: &[EntityId],
    ) -> RepoResult<Vec<QuoteLink>> {
        self.require_quote(quote_id)?;
        let target_ids = dedupe_ids(target_ids);
        for target_id in &target_ids {
            ensure_entity(self.tx, kind.target_kind(), *target_id)?;
        }

        for link in load_links(self.tx, kind, quote_id)? {
            self.delete_link(kind, link.id)?;
        }
        target_ids
            .into_iter()
            .map(|target_id| self.insert_link(kind, quote_id, target_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::dedupe_ids;

    #[test]
    fn dedupe_ids_keeps_first_occurrence_order() {
        assert_eq!(dedupe_ids(&[3, 1, 3, 2, 1]), vec![3, 1, 2]);
        assert!(dedupe_ids(&[]).is_empty());
    }
}
