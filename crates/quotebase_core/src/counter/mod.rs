//! Denormalized `quotes_count` maintenance.
//!
//! # Responsibility
//! - Translate quote/association writes into counter deltas.
//! - Apply deltas inside the transaction of the triggering write.
//! - Recompute and verify counters from live rows (see [`recompute`]).
//!
//! # Invariants
//! - `authors.quotes_count` equals the number of quotes referencing the author.
//! - `categories.quotes_count` / `sources.quotes_count` equal the number of
//!   association rows referencing them.
//! - A decrement never clamps: underflow is reported as a consistency defect.
//! - Each delta is one `UPDATE ... SET quotes_count = quotes_count ± 1`, run
//!   while the write transaction holds the database write lock.

use crate::config::CoreConfig;
use crate::db::DbError;
use crate::model::entity::{EntityId, EntityKind};
use crate::model::link::LinkKind;
use log::{error, trace};
use rusqlite::{Connection, Transaction};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod recompute;

pub use recompute::{recompute_counters, verify_counters, CounterDrift, RecomputeReport};

pub type CounterResult<T> = Result<T, CounterError>;

/// Counter maintenance failure. Every variant aborts the surrounding mutation.
#[derive(Debug)]
pub enum CounterError {
    /// Decrement would take the counter below zero; the stored value drifted.
    WouldUnderflow { kind: EntityKind, id: EntityId },
    /// The counted row does not exist.
    MissingTarget { kind: EntityKind, id: EntityId },
    /// Stored value disagrees with the live row count.
    Drift(CounterDrift),
    Db(DbError),
}

impl Display for CounterError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WouldUnderflow { kind, id } => {
                write!(f, "quotes_count of {kind} {id} would drop below zero")
            }
            Self::MissingTarget { kind, id } => {
                write!(f, "quotes_count target {kind} {id} does not exist")
            }
            Self::Drift(drift) => write!(
                f,
                "quotes_count of {} {} is {} but {} rows reference it",
                drift.kind, drift.id, drift.stored, drift.live
            ),
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CounterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for CounterError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CounterError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// A counted write, reported by the store writer right after it happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterEvent {
    QuoteInserted {
        author: Option<EntityId>,
    },
    QuoteDeleted {
        author: Option<EntityId>,
    },
    QuoteAuthorChanged {
        from: Option<EntityId>,
        to: Option<EntityId>,
    },
    LinkInserted {
        kind: LinkKind,
        target: EntityId,
    },
    LinkDeleted {
        kind: LinkKind,
        target: EntityId,
    },
    LinkRetargeted {
        kind: LinkKind,
        from: EntityId,
        to: EntityId,
    },
}

/// One `±1` adjustment of one counter row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterDelta {
    pub kind: EntityKind,
    pub id: EntityId,
    pub step: i8,
}

impl CounterDelta {
    fn increment(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id, step: 1 }
    }

    fn decrement(kind: EntityKind, id: EntityId) -> Self {
        Self { kind, id, step: -1 }
    }
}

impl CounterEvent {
    /// Returns the counter adjustments implied by this event.
    ///
    /// Decrements precede increments. Reassignment to the same target
    /// yields no deltas.
    pub fn deltas(&self) -> Vec<CounterDelta> {
        match *self {
            Self::QuoteInserted { author } => author
                .map(|id| CounterDelta::increment(EntityKind::Author, id))
                .into_iter()
                .collect(),
            Self::QuoteDeleted { author } => author
                .map(|id| CounterDelta::decrement(EntityKind::Author, id))
                .into_iter()
                .collect(),
            Self::QuoteAuthorChanged { from, to } => {
                if from == to {
                    return Vec::new();
                }
                from.map(|id| CounterDelta::decrement(EntityKind::Author, id))
                    .into_iter()
                    .chain(to.map(|id| CounterDelta::increment(EntityKind::Author, id)))
                    .collect()
            }
            Self::LinkInserted { kind, target } => {
                vec![CounterDelta::increment(kind.target_kind(), target)]
            }
            Self::LinkDeleted { kind, target } => {
                vec![CounterDelta::decrement(kind.target_kind(), target)]
            }
            Self::LinkRetargeted { kind, from, to } => {
                if from == to {
                    return Vec::new();
                }
                vec![
                    CounterDelta::decrement(kind.target_kind(), from),
                    CounterDelta::increment(kind.target_kind(), to),
                ]
            }
        }
    }
}

/// In-transaction counter hook invoked for every quote/association write.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterEngine {
    verify_on_write: bool,
}

impl CounterEngine {
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            verify_on_write: config.verify_counters_on_write,
        }
    }

    /// Applies every delta of `event` inside `tx`.
    ///
    /// On error the caller must drop `tx` without committing.
    pub fn apply(&self, tx: &Transaction<'_>, event: &CounterEvent) -> CounterResult<()> {
        let deltas = event.deltas();
        for delta in &deltas {
            if let Err(err) = apply_delta(tx, delta) {
                error!(
                    "event=counter_apply module=counter status=error kind={} id={} step={} error={}",
                    delta.kind, delta.id, delta.step, err
                );
                return Err(err);
            }
            trace!(
                "event=counter_apply module=counter status=ok kind={} id={} step={}",
                delta.kind,
                delta.id,
                delta.step
            );
        }

        if self.verify_on_write {
            for delta in &deltas {
                recompute::verify_counter(tx, delta.kind, delta.id)?;
            }
        }
        Ok(())
    }
}

fn apply_delta(conn: &Connection, delta: &CounterDelta) -> CounterResult<()> {
    let table = delta.kind.table();
    let changed = if delta.step > 0 {
        conn.execute(
            &format!("UPDATE {table} SET quotes_count = quotes_count + 1 WHERE id = ?1;"),
            [delta.id],
        )?
    } else {
        conn.execute(
            &format!(
                "UPDATE {table}
                 SET quotes_count = quotes_count - 1
                 WHERE id = ?1
                   AND quotes_count > 0;"
            ),
            [delta.id],
        )?
    };

    if changed == 1 {
        return Ok(());
    }

    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1);"),
        [delta.id],
        |row| row.get(0),
    )?;
    if exists == 1 {
        Err(CounterError::WouldUnderflow {
            kind: delta.kind,
            id: delta.id,
        })
    } else {
        Err(CounterError::MissingTarget {
            kind: delta.kind,
            id: delta.id,
        })
    }
}
