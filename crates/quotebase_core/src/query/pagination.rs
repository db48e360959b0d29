//! Three-stage pagination: cap, then skip, then take.
//!
//! # Invariants
//! - Stages run in the order `limit` → `skip` → `first`, so `limit` bounds
//!   the candidate set before `skip` is applied. This differs from offset
//!   pagination whenever `limit < skip + first` and must stay that way.
//! - `0` in any field means "not provided".
//! - SQL lowering and [`Pagination::apply`] select the same positions.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Upper bound on the ordered candidate set.
    limit: Option<u32>,
    /// Rows dropped from the front of the capped set.
    skip: Option<u32>,
    /// Rows returned after skipping.
    first: Option<u32>,
}

fn provided(value: Option<u32>) -> Option<u32> {
    value.filter(|value| *value > 0)
}

impl Pagination {
    pub fn new(limit: Option<u32>, skip: Option<u32>, first: Option<u32>) -> Self {
        Self { limit, skip, first }
    }

    /// Conventional skip/first window with no cap.
    pub fn window(skip: Option<u32>, first: Option<u32>) -> Self {
        Self::new(None, skip, first)
    }

    pub fn limit(&self) -> Option<u32> {
        provided(self.limit)
    }

    pub fn skip(&self) -> Option<u32> {
        provided(self.skip)
    }

    pub fn first(&self) -> Option<u32> {
        provided(self.first)
    }

    /// Applies the three stages to an already filtered and ordered sequence.
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let cap = self.limit().map_or(usize::MAX, |value| value as usize);
        let skip = self.skip().map_or(0, |value| value as usize);
        let take = self.first().map_or(usize::MAX, |value| value as usize);
        items.into_iter().take(cap).skip(skip).take(take).collect()
    }

    /// Count reported for `matching` candidates: `min(matching, limit)`.
    pub fn cap_count(&self, matching: i64) -> i64 {
        match self.limit() {
            Some(limit) => matching.min(i64::from(limit)),
            None => matching,
        }
    }

    /// Wraps `select_sql` so the store applies the three stages.
    ///
    /// `select_sql` must not carry its own `ORDER BY`/`LIMIT`; its bind
    /// values must already be in `binds`. `order_by` must reference result
    /// column names only, since it is reused outside the capped subquery.
    pub(crate) fn wrap_select(
        &self,
        select_sql: &str,
        order_by: &str,
        binds: &mut Vec<Value>,
    ) -> String {
        let mut sql = match self.limit() {
            Some(limit) => {
                binds.push(Value::Integer(i64::from(limit)));
                format!(
                    "SELECT * FROM ({select_sql} ORDER BY {order_by} LIMIT ?) ORDER BY {order_by}"
                )
            }
            None => format!("{select_sql} ORDER BY {order_by}"),
        };

        match (self.first(), self.skip()) {
            (Some(first), skip) => {
                sql.push_str(" LIMIT ? OFFSET ?");
                binds.push(Value::Integer(i64::from(first)));
                binds.push(Value::Integer(i64::from(skip.unwrap_or(0))));
            }
            (None, Some(skip)) => {
                sql.push_str(" LIMIT -1 OFFSET ?");
                binds.push(Value::Integer(i64::from(skip)));
            }
            (None, None) => {}
        }
        sql
    }
}
