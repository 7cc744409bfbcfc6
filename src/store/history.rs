//! Lazy, restartable history queries
//!
//! Rows are fetched a page at a time using the last seen `id` as the
//! cursor, so a pass never holds a statement open between items. A pass
//! ends on the first empty page, which means rows appended mid-pass are
//! still picked up.
//!
//! An id filter is bound a window at a time, never more than
//! `MAX_BOUND_IDS` ids per statement, so arbitrarily long id lists stay
//! under SQLite's bound-parameter limit.

use chrono::{DateTime, Utc};
use rusqlite::params_from_iter;
use rusqlite::types::Value;
use std::collections::VecDeque;

use super::{format_timestamp, map_entry, ChatHistoryEntry, HistoryStore, Result, ENTRY_COLUMNS};

/// Upper bound on ids bound into a single page statement.
const MAX_BOUND_IDS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Oldest first (insertion order).
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

/// Filters applied to a history pass. The default matches every entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
    pub role: Option<String>,
    pub ids: Option<Vec<i64>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub order: Order,
    pub limit: Option<usize>,
}

impl HistoryQuery {
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn ids(mut self, ids: Vec<i64>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.order = Order::Descending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the statement for one page starting after `cursor`.
    ///
    /// `window` holds the slice of the id filter this page may return.
    fn page_sql(
        &self,
        cursor: Option<i64>,
        window: Option<&[i64]>,
        page: usize,
    ) -> (String, Vec<Value>) {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(role) = &self.role {
            clauses.push("COALESCE(role, 'default') = ?".to_string());
            values.push(Value::Text(role.clone()));
        }

        if let Some(ids) = window {
            if ids.is_empty() {
                clauses.push("0".to_string());
            } else {
                let placeholders = vec!["?"; ids.len()].join(", ");
                clauses.push(format!("id IN ({})", placeholders));
                values.extend(ids.iter().map(|id| Value::Integer(*id)));
            }
        }

        if let Some(since) = &self.since {
            clauses.push("datetime(timestamp) >= ?".to_string());
            values.push(Value::Text(format_timestamp(since)));
        }

        if let Some(until) = &self.until {
            clauses.push("datetime(timestamp) <= ?".to_string());
            values.push(Value::Text(format_timestamp(until)));
        }

        let direction = match self.order {
            Order::Ascending => "ASC",
            Order::Descending => "DESC",
        };

        if let Some(last) = cursor {
            clauses.push(match self.order {
                Order::Ascending => "id > ?".to_string(),
                Order::Descending => "id < ?".to_string(),
            });
            values.push(Value::Integer(last));
        }

        let filter = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };

        values.push(Value::Integer(i64::try_from(page).unwrap_or(i64::MAX)));
        let sql = format!(
            "SELECT {} FROM chat_history{} ORDER BY id {} LIMIT ?",
            ENTRY_COLUMNS, filter, direction
        );

        (sql, values)
    }

    /// The id filter deduplicated and sorted in pass order.
    fn candidates(&self) -> Option<Vec<i64>> {
        self.ids.as_ref().map(|ids| {
            let mut ids = ids.clone();
            ids.sort_unstable();
            ids.dedup();
            if self.order == Order::Descending {
                ids.reverse();
            }
            ids
        })
    }
}

/// A history query bound to a store.
///
/// Iterating it (by reference) starts a fresh pass each time.
pub struct History<'a> {
    store: &'a HistoryStore,
    query: HistoryQuery,
}

impl<'a> History<'a> {
    pub(super) fn new(store: &'a HistoryStore, query: HistoryQuery) -> Self {
        Self { store, query }
    }

    pub fn query(&self) -> &HistoryQuery {
        &self.query
    }

    pub fn iter(&self) -> HistoryIter<'_> {
        HistoryIter {
            store: self.store,
            query: &self.query,
            page_size: self.store.options.page_size.max(1),
            candidates: self.query.candidates(),
            offset: 0,
            buffer: VecDeque::new(),
            cursor: None,
            yielded: 0,
            exhausted: false,
        }
    }
}

impl<'h, 'a> IntoIterator for &'h History<'a> {
    type Item = Result<ChatHistoryEntry>;
    type IntoIter = HistoryIter<'h>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct HistoryIter<'a> {
    store: &'a HistoryStore,
    query: &'a HistoryQuery,
    page_size: usize,
    candidates: Option<Vec<i64>>,
    offset: usize,
    buffer: VecDeque<ChatHistoryEntry>,
    cursor: Option<i64>,
    yielded: usize,
    exhausted: bool,
}

impl HistoryIter<'_> {
    fn remaining(&self) -> Option<usize> {
        self.query.limit.map(|limit| limit.saturating_sub(self.yielded))
    }

    fn fetch_page(&mut self) -> Result<()> {
        let page = match self.remaining() {
            Some(remaining) => remaining.min(self.page_size),
            None => self.page_size,
        };

        let window = match &self.candidates {
            Some(candidates) => {
                let rest = &candidates[self.offset..];
                if rest.is_empty() {
                    self.exhausted = true;
                    return Ok(());
                }
                Some(&rest[..rest.len().min(page).min(MAX_BOUND_IDS)])
            }
            None => None,
        };

        let (sql, values) = self.query.page_sql(self.cursor, window, page);
        let mut stmt = self.store.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), map_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        match window {
            // Ids missing from the table leave gaps, so the pass follows
            // the window rather than the rows.
            Some(window) => {
                self.offset += window.len();
                self.cursor = window.last().copied();
            }
            None => {
                if rows.is_empty() {
                    self.exhausted = true;
                }
                if let Some(last) = rows.last() {
                    self.cursor = Some(last.id);
                }
            }
        }
        self.buffer.extend(rows);
        Ok(())
    }
}

impl Iterator for HistoryIter<'_> {
    type Item = Result<ChatHistoryEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining() == Some(0) {
                return None;
            }

            if let Some(entry) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(entry));
            }

            if self.exhausted {
                return None;
            }

            if let Err(e) = self.fetch_page() {
                self.exhausted = true;
                return Some(Err(e));
            }
        }
    }
}
