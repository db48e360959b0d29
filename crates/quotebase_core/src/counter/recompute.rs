//! Counter recompute and drift verification.
//!
//! # Responsibility
//! - Count linked rows from scratch for every counted entity.
//! - Report drift read-only, or repair it and report what changed.
//!
//! # Invariants
//! - `recompute_counters` runs in one `IMMEDIATE` transaction.
//! - Running `recompute_counters` twice leaves identical values and the
//!   second run reports no corrections.

use super::{CounterError, CounterResult};
use crate::model::entity::{EntityId, EntityKind};
use log::{info, warn};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::time::Instant;

/// One counter whose stored value disagrees with the live row count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub kind: EntityKind,
    pub id: EntityId,
    pub stored: i64,
    pub live: i64,
}

/// Outcome of a full counter recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecomputeReport {
    /// Number of entity rows recomputed, across all kinds.
    pub rows_scanned: u64,
    /// Rows whose stored value was replaced, with previous and new values.
    pub corrected: Vec<CounterDrift>,
}

impl RecomputeReport {
    pub fn is_clean(&self) -> bool {
        self.corrected.is_empty()
    }
}

/// SQL expression counting live rows that reference `{outer}.id`.
fn live_count_sql(kind: EntityKind, outer: &str) -> String {
    match kind {
        EntityKind::Author => {
            format!("(SELECT COUNT(*) FROM quotes WHERE quotes.author_id = {outer}.id)")
        }
        EntityKind::Category => format!(
            "(SELECT COUNT(*) FROM quote_categories WHERE quote_categories.category_id = {outer}.id)"
        ),
        EntityKind::Source => format!(
            "(SELECT COUNT(*) FROM quote_sources WHERE quote_sources.source_id = {outer}.id)"
        ),
    }
}

/// Lists every counter that disagrees with live rows. Read-only.
pub fn verify_counters(conn: &Connection) -> CounterResult<Vec<CounterDrift>> {
    let mut drifts = Vec::new();
    for kind in EntityKind::ALL {
        drifts.extend(find_drift(conn, kind)?);
    }
    Ok(drifts)
}

/// Recomputes every counter from live rows and reports corrected rows.
///
/// Intended for drift repair and initial backfill, not request traffic.
pub fn recompute_counters(conn: &Connection) -> CounterResult<RecomputeReport> {
    let started_at = Instant::now();
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let mut report = RecomputeReport::default();
    for kind in EntityKind::ALL {
        report.corrected.extend(find_drift(&tx, kind)?);
        let table = kind.table();
        let live = live_count_sql(kind, table);
        let scanned = tx.execute(&format!("UPDATE {table} SET quotes_count = {live};"), [])?;
        report.rows_scanned += scanned as u64;
    }
    tx.commit()?;

    for drift in &report.corrected {
        warn!(
            "event=counter_recompute module=counter status=corrected kind={} id={} stored={} live={}",
            drift.kind, drift.id, drift.stored, drift.live
        );
    }
    info!(
        "event=counter_recompute module=counter status=ok rows_scanned={} corrected={} duration_ms={}",
        report.rows_scanned,
        report.corrected.len(),
        started_at.elapsed().as_millis()
    );
    Ok(report)
}

/// Fails with [`CounterError::Drift`] when one counter disagrees with live rows.
pub(crate) fn verify_counter(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
) -> CounterResult<()> {
    let table = kind.table();
    let live_sql = live_count_sql(kind, "t");
    let (stored, live): (i64, i64) = conn.query_row(
        &format!("SELECT t.quotes_count, {live_sql} FROM {table} AS t WHERE t.id = ?1;"),
        [id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    if stored != live {
        return Err(CounterError::Drift(CounterDrift {
            kind,
            id,
            stored,
            live,
        }));
    }
    Ok(())
}

fn find_drift(conn: &Connection, kind: EntityKind) -> CounterResult<Vec<CounterDrift>> {
    let table = kind.table();
    let live = live_count_sql(kind, "t");
    let mut stmt = conn.prepare(&format!(
        "SELECT id, stored, live
         FROM (SELECT t.id AS id, t.quotes_count AS stored, {live} AS live FROM {table} AS t)
         WHERE stored <> live
         ORDER BY id ASC;"
    ))?;
    let mut rows = stmt.query([])?;
    let mut drifts = Vec::new();
    while let Some(row) = rows.next()? {
        drifts.push(CounterDrift {
            kind,
            id: row.get(0)?,
            stored: row.get(1)?,
            live: row.get(2)?,
        });
    }
    Ok(drifts)
}
