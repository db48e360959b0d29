//! SQLite lowering for quote plans.
//!
//! # Responsibility
//! - Translate a [`Predicate`] into a parameterized `WHERE` clause.
//! - Apply ordering, deduplication and three-stage pagination in SQL.
//!
//! # Invariants
//! - Association predicates lower to `EXISTS` semi-joins on `quotes.id`,
//!   which never multiply rows. `SELECT DISTINCT` from the plan's `distinct`
//!   flag is a safeguard for lowerings that join instead and does not change
//!   the result of the current ones.
//! - User text only reaches SQL through bind parameters.
//! - `count_matching` equals the length of `fetch_matching` without
//!   `skip`/`first`.

use super::filter::QuotePlan;
use super::predicate::Predicate;
use super::QueryResult;
use crate::db::CASEFOLD_FN;
use crate::model::quote::Quote;
use crate::repo::quote_repo::parse_quote_row;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};

const QUOTE_ORDER: &str = "created_at DESC, id DESC";

/// Returns the quotes selected by `plan`, newest first.
pub fn fetch_matching(conn: &Connection, plan: &QuotePlan) -> QueryResult<Vec<Quote>> {
    let mut binds = Vec::new();
    let select = select_sql(plan, &mut binds);
    let sql = plan.pagination.wrap_select(&select, QUOTE_ORDER, &mut binds);

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(binds))?;
    let mut quotes = Vec::new();
    while let Some(row) = rows.next()? {
        quotes.push(parse_quote_row(row)?);
    }
    Ok(quotes)
}

/// Counts matching quotes, capped by the plan's `limit`.
pub fn count_matching(conn: &Connection, plan: &QuotePlan) -> QueryResult<i64> {
    let mut binds = Vec::new();
    let select = select_sql(plan, &mut binds);
    let matching: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM ({select});"),
        params_from_iter(binds),
        |row| row.get(0),
    )?;
    Ok(plan.pagination.cap_count(matching))
}

fn select_sql(plan: &QuotePlan, binds: &mut Vec<Value>) -> String {
    let distinct = if plan.distinct { "DISTINCT " } else { "" };
    let condition = lower(&plan.predicate, binds);
    format!(
        "SELECT {distinct}quotes.id AS id, quotes.content AS content, \
         quotes.author_id AS author_id, quotes.created_at AS created_at, \
         quotes.updated_at AS updated_at \
         FROM quotes WHERE {condition}"
    )
}

fn contains_sql(column: &str) -> String {
    format!("instr({CASEFOLD_FN}({column}), {CASEFOLD_FN}(?)) > 0")
}

fn lower(predicate: &Predicate, binds: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::Always => "1 = 1".to_string(),
        Predicate::Never => "1 = 0".to_string(),
        Predicate::ContentContains(needle) => {
            binds.push(Value::Text(needle.clone()));
            contains_sql("quotes.content")
        }
        Predicate::AuthorNameContains(needle) => {
            binds.push(Value::Text(needle.clone()));
            format!(
                "EXISTS (SELECT 1 FROM authors a WHERE a.id = quotes.author_id AND {})",
                contains_sql("a.name")
            )
        }
        Predicate::CategoryNameContains(needle) => {
            binds.push(Value::Text(needle.clone()));
            format!(
                "EXISTS (SELECT 1 FROM quote_categories qc \
                 INNER JOIN categories c ON c.id = qc.category_id \
                 WHERE qc.quote_id = quotes.id AND {})",
                contains_sql("c.name")
            )
        }
        Predicate::SourceNameContains(needle) => {
            binds.push(Value::Text(needle.clone()));
            format!(
                "EXISTS (SELECT 1 FROM quote_sources qs \
                 INNER JOIN sources s ON s.id = qs.source_id \
                 WHERE qs.quote_id = quotes.id AND {})",
                contains_sql("s.name")
            )
        }
        Predicate::AuthorIs(id) => {
            binds.push(Value::Integer(*id));
            "quotes.author_id = ?".to_string()
        }
        Predicate::CategoryIs(id) => {
            binds.push(Value::Integer(*id));
            "EXISTS (SELECT 1 FROM quote_categories qc \
             WHERE qc.quote_id = quotes.id AND qc.category_id = ?)"
                .to_string()
        }
        Predicate::SourceIs(id) => {
            binds.push(Value::Integer(*id));
            "EXISTS (SELECT 1 FROM quote_sources qs \
             WHERE qs.quote_id = quotes.id AND qs.source_id = ?)"
                .to_string()
        }
        Predicate::And(children) => join(children, " AND ", "1 = 1", binds),
        Predicate::Or(children) => join(children, " OR ", "1 = 0", binds),
    }
}

fn join(children: &[Predicate], separator: &str, empty: &str, binds: &mut Vec<Value>) -> String {
    if children.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = children.iter().map(|child| lower(child, binds)).collect();
    format!("({})", parts.join(separator))
}
