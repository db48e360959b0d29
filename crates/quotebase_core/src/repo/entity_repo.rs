//! Author/category/source repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, exact-name lookup and list APIs over the three counted
//!   entity tables.
//! - Keep SQL details inside the core persistence boundary.
//!
//! # Invariants
//! - This repository never writes `quotes_count`; new rows start at zero.
//! - An entity referenced by a quote or association row cannot be deleted.
//! - List ordering is deterministic: every order ends with `id ASC`.

use super::{RepoError, RepoResult};
use crate::db::{CASEFOLD_FN, NOW_MS_SQL};
use crate::model::entity::{EntityId, EntityKind, NamedEntity};
use crate::model::RecordRef;
use crate::query::pagination::Pagination;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const ENTITY_COLUMNS: &str = "id, name, created_at, updated_at, quotes_count";

/// Sort direction for counter ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Ordering selector for entity lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOrder {
    /// Case-insensitive name order.
    #[default]
    Name,
    QuotesCount(SortDirection),
}

impl EntityOrder {
    fn order_by_sql(self) -> &'static str {
        match self {
            Self::Name => "name COLLATE NOCASE ASC, id ASC",
            Self::QuotesCount(SortDirection::Asc) => "quotes_count ASC, id ASC",
            Self::QuotesCount(SortDirection::Desc) => "quotes_count DESC, id ASC",
        }
    }
}

/// Query options for listing one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityListQuery {
    /// Case-insensitive name substring. Empty means no filter.
    pub search: Option<String>,
    pub order: EntityOrder,
    pub skip: Option<u32>,
    pub first: Option<u32>,
}

/// Repository interface for counted entities.
pub trait EntityRepository {
    /// Inserts one row with `quotes_count = 0`. `name` must be normalized.
    fn create_entity(&self, kind: EntityKind, name: &str) -> RepoResult<NamedEntity>;
    /// Replaces the name and bumps `updated_at`.
    fn rename_entity(&self, kind: EntityKind, id: EntityId, name: &str)
        -> RepoResult<NamedEntity>;
    /// Deletes an unreferenced row.
    fn delete_entity(&self, kind: EntityKind, id: EntityId) -> RepoResult<()>;
    fn get_entity(&self, kind: EntityKind, id: EntityId) -> RepoResult<Option<NamedEntity>>;
    /// Case-sensitive match first, then first case-insensitive match.
    fn find_by_exact_name(&self, kind: EntityKind, name: &str)
        -> RepoResult<Option<NamedEntity>>;
    fn list_entities(
        &self,
        kind: EntityKind,
        query: &EntityListQuery,
    ) -> RepoResult<Vec<NamedEntity>>;
    fn count_entities(&self, kind: EntityKind) -> RepoResult<i64>;
    /// Live number of quote/association rows pointing at the entity.
    fn live_reference_count(&self, kind: EntityKind, id: EntityId) -> RepoResult<i64>;
}

/// SQLite-backed entity repository.
///
/// Works on a plain connection or, through deref, on an open transaction.
pub struct SqliteEntityRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteEntityRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl EntityRepository for SqliteEntityRepository<'_> {
    fn create_entity(&self, kind: EntityKind, name: &str) -> RepoResult<NamedEntity> {
        let table = kind.table();
        self.conn.execute(
            &format!("INSERT INTO {table} (name, quotes_count) VALUES (?1, 0);"),
            [name],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_entity(kind, id)?
            .ok_or_else(|| RepoError::InvalidData(format!("{kind} {id} missing after insert")))
    }

    fn rename_entity(
        &self,
        kind: EntityKind,
        id: EntityId,
        name: &str,
    ) -> RepoResult<NamedEntity> {
        let table = kind.table();
        let changed = self.conn.execute(
            &format!("UPDATE {table} SET name = ?2, updated_at = {NOW_MS_SQL} WHERE id = ?1;"),
            params![id, name],
        )?;
        if changed == 0 {
            return Err(RepoError::NotFound(RecordRef::Entity(kind, id)));
        }
        self.get_entity(kind, id)?
            .ok_or(RepoError::NotFound(RecordRef::Entity(kind, id)))
    }

    fn delete_entity(&self, kind: EntityKind, id: EntityId) -> RepoResult<()> {
        let record = RecordRef::Entity(kind, id);
        if self.get_entity(kind, id)?.is_none() {
            return Err(RepoError::NotFound(record));
        }
        let references = self.live_reference_count(kind, id)?;
        if references > 0 {
            return Err(RepoError::InUse { record, references });
        }

        let table = kind.table();
        self.conn
            .execute(&format!("DELETE FROM {table} WHERE id = ?1;"), [id])?;
        Ok(())
    }

    fn get_entity(&self, kind: EntityKind, id: EntityId) -> RepoResult<Option<NamedEntity>> {
        let table = kind.table();
        let entity = self
            .conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM {table} WHERE id = ?1;"),
                [id],
                |row| parse_entity_row(kind, row),
            )
            .optional()?;
        Ok(entity)
    }

    fn find_by_exact_name(
        &self,
        kind: EntityKind,
        name: &str,
    ) -> RepoResult<Option<NamedEntity>> {
        let table = kind.table();
        let exact = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS}
                     FROM {table}
                     WHERE name = ?1
                     ORDER BY id ASC
                     LIMIT 1;"
                ),
                [name],
                |row| parse_entity_row(kind, row),
            )
            .optional()?;
        if exact.is_some() {
            return Ok(exact);
        }

        let folded = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS}
                     FROM {table}
                     WHERE {CASEFOLD_FN}(name) = {CASEFOLD_FN}(?1)
                     ORDER BY id ASC
                     LIMIT 1;"
                ),
                [name],
                |row| parse_entity_row(kind, row),
            )
            .optional()?;
        Ok(folded)
    }

    fn list_entities(
        &self,
        kind: EntityKind,
        query: &EntityListQuery,
    ) -> RepoResult<Vec<NamedEntity>> {
        let table = kind.table();
        let mut select = format!("SELECT {ENTITY_COLUMNS} FROM {table} WHERE 1 = 1");
        let mut binds: Vec<Value> = Vec::new();

        if let Some(search) = query.search.as_deref().filter(|value| !value.is_empty()) {
            select.push_str(&format!(
                " AND instr({CASEFOLD_FN}(name), {CASEFOLD_FN}(?)) > 0"
            ));
            binds.push(Value::Text(search.to_string()));
        }

        let sql = Pagination::window(query.skip, query.first).wrap_select(
            &select,
            query.order.order_by_sql(),
            &mut binds,
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut entities = Vec::new();
        while let Some(row) = rows.next()? {
            entities.push(parse_entity_row(kind, row)?);
        }
        Ok(entities)
    }

    fn count_entities(&self, kind: EntityKind) -> RepoResult<i64> {
        let table = kind.table();
        let count = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
                row.get(0)
            })?;
        Ok(count)
    }

    fn live_reference_count(&self, kind: EntityKind, id: EntityId) -> RepoResult<i64> {
        let sql = match kind {
            EntityKind::Author => "SELECT COUNT(*) FROM quotes WHERE author_id = ?1;",
            EntityKind::Category => "SELECT COUNT(*) FROM quote_categories WHERE category_id = ?1;",
            EntityKind::Source => "SELECT COUNT(*) FROM quote_sources WHERE source_id = ?1;",
        };
        let count = self.conn.query_row(sql, [id], |row| row.get(0))?;
        Ok(count)
    }
}

/// Loads all entities of `kind` linked to one quote, sorted by name.
pub(crate) fn load_linked_entities(
    conn: &Connection,
    kind: EntityKind,
    link_table: &str,
    target_column: &str,
    quote_id: i64,
) -> RepoResult<Vec<NamedEntity>> {
    let table = kind.table();
    let mut stmt = conn.prepare(&format!(
        "SELECT e.id AS id, e.name AS name, e.created_at AS created_at,
                e.updated_at AS updated_at, e.quotes_count AS quotes_count
         FROM {link_table} l
         INNER JOIN {table} e ON e.id = l.{target_column}
         WHERE l.quote_id = ?1
         ORDER BY e.name COLLATE NOCASE ASC, e.id ASC;"
    ))?;
    let mut rows = stmt.query([quote_id])?;
    let mut entities = Vec::new();
    while let Some(row) = rows.next()? {
        entities.push(parse_entity_row(kind, row)?);
    }
    Ok(entities)
}

fn parse_entity_row(kind: EntityKind, row: &Row<'_>) -> rusqlite::Result<NamedEntity> {
    Ok(NamedEntity {
        id: row.get("id")?,
        kind,
        name: row.get("name")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        quotes_count: row.get("quotes_count")?,
    })
}
