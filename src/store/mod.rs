//! Chat history storage with SQLite
//!
//! Interactions are appended to `chat_history`, sessions are opened and
//! ended in `sessions`, and `session_messages` links the two by id only.
//! Multi-step operations run inside a single transaction that rolls back
//! when dropped uncommitted.

mod history;
mod schema;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::selection::Selection;

pub use crate::error::{Result, StoreError};
pub use history::{History, HistoryIter, HistoryQuery, Order};
pub use schema::{SCHEMA, TABLES};

/// Role stored when an interaction does not name one.
pub const DEFAULT_ROLE: &str = "default";

/// Rows fetched per round trip while iterating history.
pub const DEFAULT_PAGE_SIZE: usize = 64;

const ENTRY_COLUMNS: &str =
    "id, timestamp, problem, answer, output, COALESCE(role, 'default')";

const SESSION_COLUMNS: &str = "id, session_id, start_time, COALESCE(is_active, 0)";

const ORPHAN_PREDICATE: &str = "sm.session_id IS NULL OR sm.message_id IS NULL
       OR NOT EXISTS (SELECT 1 FROM sessions s WHERE s.id = sm.session_id)
       OR NOT EXISTS (SELECT 1 FROM chat_history ch WHERE ch.id = sm.message_id)";

/// What happens to links when the session or entry they point at is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Leave links in place; they become orphans.
    #[default]
    Allow,
    /// Refuse to delete a row that is still linked.
    Restrict,
    /// Delete the links together with the row.
    Cascade,
}

impl OrphanPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrphanPolicy::Allow => "allow",
            OrphanPolicy::Restrict => "restrict",
            OrphanPolicy::Cascade => "cascade",
        }
    }
}

/// Behavioural knobs for a store handle.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub orphan_policy: OrphanPolicy,
    pub page_size: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            orphan_policy: OrphanPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// An interaction waiting to be recorded.
#[derive(Debug, Clone, Default)]
pub struct NewEntry {
    pub problem: String,
    pub answer: Option<String>,
    pub output: Option<String>,
    pub role: Option<String>,
    /// Left to the column default when `None`.
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewEntry {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problem: problem.into(),
            ..Self::default()
        }
    }

    pub fn answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Outcome of [`HistoryStore::record_in_active_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordedInteraction {
    pub entry_id: i64,
    /// Session the entry was linked to, if one was active.
    pub session_id: Option<i64>,
    pub link_id: Option<i64>,
}

pub struct HistoryStore {
    conn: Connection,
    options: StoreOptions,
}

impl HistoryStore {
    pub fn open(path: &Path, options: StoreOptions) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "opened history database");
        Self::with_connection(conn, options)
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, options)
    }

    fn with_connection(conn: Connection, options: StoreOptions) -> Result<Self> {
        let store = Self { conn, options };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let existing: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN (?, ?, ?)",
            params![TABLES[0], TABLES[1], TABLES[2]],
            |row| row.get(0),
        )?;

        if existing as usize == TABLES.len() {
            return Ok(());
        }

        debug!(existing, "creating history schema");
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    // ============================================
    // INTERACTIONS
    // ============================================

    /// Record one interaction and return its id.
    pub fn record_interaction(&self, entry: &NewEntry) -> Result<i64> {
        let id = insert_entry(&self.conn, entry)?;
        debug!(id, role = entry.role.as_deref().unwrap_or(DEFAULT_ROLE), "recorded interaction");
        Ok(id)
    }

    /// Record an interaction and link it to the active session, if any.
    pub fn record_in_active_session(&self, entry: &NewEntry) -> Result<RecordedInteraction> {
        let tx = self.conn.unchecked_transaction()?;

        let entry_id = insert_entry(&tx, entry)?;
        let session_id = active_session_id(&tx)?;
        let link_id = match session_id {
            Some(sid) => Some(insert_link(&tx, sid, entry_id)?),
            None => None,
        };

        tx.commit()?;
        debug!(entry_id, ?session_id, "recorded interaction in active session");

        Ok(RecordedInteraction {
            entry_id,
            session_id,
            link_id,
        })
    }

    pub fn get_entry(&self, id: i64) -> Result<Option<ChatHistoryEntry>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM chat_history WHERE id = ?", ENTRY_COLUMNS),
                params![id],
                map_entry,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Lazily page through history matching `query`.
    ///
    /// The returned value can be iterated any number of times; each pass
    /// re-reads the table from the start.
    pub fn get_history(&self, query: HistoryQuery) -> History<'_> {
        History::new(self, query)
    }

    /// Ids of the newest `count` entries, newest first.
    pub fn recent_ids(&self, count: usize) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM chat_history ORDER BY id DESC LIMIT ?")?;
        let limit = i64::try_from(count).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Resolve a selection against the current history, oldest first.
    pub fn select(&self, selection: &Selection) -> Result<Vec<ChatHistoryEntry>> {
        let recent = self.recent_ids(selection.depth())?;
        let ids = selection.resolve(&recent);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let history = self.get_history(HistoryQuery::default().ids(ids));
        let entries = history.iter().collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    // ============================================
    // SESSIONS
    // ============================================

    /// Start a session under the given identifier.
    ///
    /// Identifiers are not unique; starting a second session with the
    /// same `session_id` creates a second row.
    pub fn start_session(&self, session_id: &str) -> Result<i64> {
        if session_id.trim().is_empty() {
            return Err(StoreError::Validation("session_id must not be empty".to_string()));
        }

        let id: i64 = self.conn.query_row(
            "INSERT INTO sessions (session_id) VALUES (?) RETURNING id",
            params![session_id],
            |row| row.get(0),
        )?;
        debug!(id, session_id, "started session");
        Ok(id)
    }

    /// End every active session, then start a fresh one with a generated id.
    pub fn begin_session(&self) -> Result<SessionRow> {
        let tx = self.conn.unchecked_transaction()?;

        let ended = tx.execute("UPDATE sessions SET is_active = 0 WHERE is_active = 1", [])?;
        let session = tx.query_row(
            &format!(
                "INSERT INTO sessions (session_id) VALUES (?) RETURNING {}",
                SESSION_COLUMNS
            ),
            params![Uuid::new_v4().to_string()],
            map_session,
        )?;

        tx.commit()?;
        debug!(id = session.id, ended, "began session");
        Ok(session)
    }

    /// Mark a session as ended. Ending an ended session is a no-op.
    pub fn end_session(&self, id: i64) -> Result<()> {
        let changed = self
            .conn
            .execute("UPDATE sessions SET is_active = 0 WHERE id = ?", params![id])?;

        if changed == 0 {
            return Err(StoreError::NotFound(format!("session {}", id)));
        }

        debug!(id, "ended session");
        Ok(())
    }

    pub fn get_session(&self, id: i64) -> Result<Option<SessionRow>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?", SESSION_COLUMNS),
                params![id],
                map_session,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Most recently started session that is still active.
    pub fn active_session(&self) -> Result<Option<SessionRow>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {} FROM sessions WHERE is_active = 1 ORDER BY id DESC LIMIT 1",
                    SESSION_COLUMNS
                ),
                [],
                map_session,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn has_active_session(&self) -> Result<bool> {
        Ok(active_session_id(&self.conn)?.is_some())
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY id DESC",
            SESSION_COLUMNS
        ))?;
        let rows = stmt.query_map([], map_session)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // ============================================
    // LINKS
    // ============================================

    /// Link an entry to a session. Both must exist.
    pub fn link_message(&self, session_id: i64, message_id: i64) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;

        if !row_exists(&tx, "sessions", session_id)? {
            return Err(StoreError::Reference(format!(
                "session {} does not exist",
                session_id
            )));
        }
        if !row_exists(&tx, "chat_history", message_id)? {
            return Err(StoreError::Reference(format!(
                "message {} does not exist",
                message_id
            )));
        }

        let id = insert_link(&tx, session_id, message_id)?;
        tx.commit()?;
        debug!(id, session_id, message_id, "linked message");
        Ok(id)
    }

    /// Entries linked to a session, in link order.
    pub fn get_session_messages(&self, session_id: i64) -> Result<Vec<ChatHistoryEntry>> {
        let mut stmt = self.conn.prepare(
            r#"SELECT ch.id, ch.timestamp, ch.problem, ch.answer, ch.output,
                      COALESCE(ch.role, 'default')
               FROM session_messages sm
               JOIN chat_history ch ON ch.id = sm.message_id
               WHERE sm.session_id = ?
               ORDER BY sm.id"#,
        )?;
        let rows = stmt.query_map(params![session_id], map_entry)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // ============================================
    // MAINTENANCE
    // ============================================

    /// Delete an entry, applying the orphan policy to its links.
    pub fn delete_entry(&self, id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        if !row_exists(&tx, "chat_history", id)? {
            return Err(StoreError::NotFound(format!("message {}", id)));
        }
        self.release_links(&tx, "message_id", "message", id)?;
        tx.execute("DELETE FROM chat_history WHERE id = ?", params![id])?;

        tx.commit()?;
        debug!(id, policy = self.options.orphan_policy.as_str(), "deleted entry");
        Ok(())
    }

    /// Delete a session, applying the orphan policy to its links.
    ///
    /// Linked entries are never deleted.
    pub fn delete_session(&self, id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;

        if !row_exists(&tx, "sessions", id)? {
            return Err(StoreError::NotFound(format!("session {}", id)));
        }
        self.release_links(&tx, "session_id", "session", id)?;
        tx.execute("DELETE FROM sessions WHERE id = ?", params![id])?;

        tx.commit()?;
        debug!(id, policy = self.options.orphan_policy.as_str(), "deleted session");
        Ok(())
    }

    fn release_links(
        &self,
        conn: &Connection,
        column: &'static str,
        kind: &str,
        id: i64,
    ) -> Result<()> {
        match self.options.orphan_policy {
            OrphanPolicy::Allow => Ok(()),
            OrphanPolicy::Restrict => {
                let links: i64 = conn.query_row(
                    &format!("SELECT COUNT(*) FROM session_messages WHERE {} = ?", column),
                    params![id],
                    |row| row.get(0),
                )?;
                if links > 0 {
                    warn!(kind, id, links, "refusing to delete linked row");
                    return Err(StoreError::Referenced(format!(
                        "{} {} has {} link(s)",
                        kind, id, links
                    )));
                }
                Ok(())
            }
            OrphanPolicy::Cascade => {
                let removed = conn.execute(
                    &format!("DELETE FROM session_messages WHERE {} = ?", column),
                    params![id],
                )?;
                debug!(kind, id, removed, "removed links");
                Ok(())
            }
        }
    }

    /// Links whose session or entry no longer exists.
    pub fn orphaned_links(&self) -> Result<Vec<LinkRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT sm.id, sm.session_id, sm.message_id FROM session_messages sm
             WHERE {} ORDER BY sm.id",
            ORPHAN_PREDICATE
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(LinkRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                message_id: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Delete orphaned links, returning how many were removed.
    pub fn prune_orphans(&self) -> Result<usize> {
        let removed = self.conn.execute(
            &format!(
                "DELETE FROM session_messages WHERE id IN (
                     SELECT sm.id FROM session_messages sm WHERE {})",
                ORPHAN_PREDICATE
            ),
            [],
        )?;
        debug!(removed, "pruned orphaned links");
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<i64> {
            self.conn
                .query_row(sql, [], |row| row.get(0))
                .map_err(Into::into)
        };

        Ok(StoreStats {
            entries: count("SELECT COUNT(*) FROM chat_history")?,
            sessions: count("SELECT COUNT(*) FROM sessions")?,
            active_sessions: count("SELECT COUNT(*) FROM sessions WHERE is_active = 1")?,
            links: count("SELECT COUNT(*) FROM session_messages")?,
            orphaned_links: count(
                format!(
                    "SELECT COUNT(*) FROM session_messages sm WHERE {}",
                    ORPHAN_PREDICATE
                )
                .as_str(),
            )?,
        })
    }
}

// ============================================
// HELPERS
// ============================================

fn insert_entry(conn: &Connection, entry: &NewEntry) -> Result<i64> {
    if entry.problem.trim().is_empty() {
        return Err(StoreError::Validation("problem must not be empty".to_string()));
    }

    let role = entry.role.as_deref().unwrap_or(DEFAULT_ROLE);
    let id = match entry.timestamp {
        Some(ts) => conn.query_row(
            "INSERT INTO chat_history (timestamp, problem, answer, output, role)
             VALUES (?, ?, ?, ?, ?) RETURNING id",
            params![
                format_timestamp(&ts),
                entry.problem,
                entry.answer,
                entry.output,
                role
            ],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "INSERT INTO chat_history (problem, answer, output, role)
             VALUES (?, ?, ?, ?) RETURNING id",
            params![entry.problem, entry.answer, entry.output, role],
            |row| row.get(0),
        )?,
    };
    Ok(id)
}

fn insert_link(conn: &Connection, session_id: i64, message_id: i64) -> Result<i64> {
    let id = conn.query_row(
        "INSERT INTO session_messages (session_id, message_id) VALUES (?, ?) RETURNING id",
        params![session_id, message_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn active_session_id(conn: &Connection) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM sessions WHERE is_active = 1 ORDER BY id DESC LIMIT 1",
        [],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

fn row_exists(conn: &Connection, table: &'static str, id: i64) -> Result<bool> {
    let exists = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", table),
        params![id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(schema::TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, schema::TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|ts| ts.with_timezone(&Utc)))
}

fn timestamp_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_timestamp(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn map_entry(row: &rusqlite::Row) -> rusqlite::Result<ChatHistoryEntry> {
    Ok(ChatHistoryEntry {
        id: row.get(0)?,
        timestamp: timestamp_column(row, 1)?,
        problem: row.get(2)?,
        answer: row.get(3)?,
        output: row.get(4)?,
        role: row.get(5)?,
    })
}

fn map_session(row: &rusqlite::Row) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        start_time: timestamp_column(row, 2)?,
        is_active: row.get::<_, i64>(3)? != 0,
    })
}

// ============================================
// ROW TYPES
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatHistoryEntry {
    pub id: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub problem: String,
    pub answer: Option<String>,
    pub output: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub id: i64,
    pub session_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkRow {
    pub id: i64,
    pub session_id: Option<i64>,
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub entries: i64,
    pub sessions: i64,
    pub active_sessions: i64,
    pub links: i64,
    pub orphaned_links: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> HistoryStore {
        HistoryStore::open_in_memory(StoreOptions::default()).unwrap()
    }

    fn store_with(policy: OrphanPolicy) -> HistoryStore {
        HistoryStore::open_in_memory(StoreOptions {
            orphan_policy: policy,
            ..StoreOptions::default()
        })
        .unwrap()
    }

    #[test]
    fn test_empty_problem_is_rejected() {
        let store = store();
        assert!(matches!(
            store.record_interaction(&NewEntry::new("")),
            Err(StoreError::Validation(_))
        ));
        assert!(matches!(
            store.record_interaction(&NewEntry::new("   ")),
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.stats().unwrap().entries, 0);
    }

    #[test]
    fn test_role_defaults_to_default() {
        let store = store();
        let id = store.record_interaction(&NewEntry::new("hi")).unwrap();
        let entry = store.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.role, "default");
        assert!(entry.timestamp.is_some());
        assert_eq!(entry.answer, None);
        assert_eq!(entry.output, None);
    }

    #[test]
    fn test_entry_round_trip() {
        let store = store();
        let id = store
            .record_interaction(&NewEntry::new("2+2?").answer("4").output("4").role("code"))
            .unwrap();
        let entry = store.get_entry(id).unwrap().unwrap();
        assert_eq!(entry.problem, "2+2?");
        assert_eq!(entry.answer.as_deref(), Some("4"));
        assert_eq!(entry.output.as_deref(), Some("4"));
        assert_eq!(entry.role, "code");
    }

    #[test]
    fn test_explicit_timestamp_is_kept() {
        let store = store();
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let id = store
            .record_interaction(&NewEntry::new("when?").timestamp(ts))
            .unwrap();
        assert_eq!(store.get_entry(id).unwrap().unwrap().timestamp, Some(ts));
    }

    #[test]
    fn test_missing_entry_is_none() {
        assert_eq!(store().get_entry(42).unwrap(), None);
    }

    #[test]
    fn test_end_session_is_idempotent() {
        let store = store();
        let id = store.start_session("abc").unwrap();
        assert!(store.get_session(id).unwrap().unwrap().is_active);

        store.end_session(id).unwrap();
        assert!(!store.get_session(id).unwrap().unwrap().is_active);

        store.end_session(id).unwrap();
        assert!(!store.get_session(id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_end_unknown_session_is_not_found() {
        assert!(matches!(store().end_session(7), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_session_ids_are_allowed() {
        let store = store();
        let a = store.start_session("same").unwrap();
        let b = store.start_session("same").unwrap();
        assert_ne!(a, b);
        assert_eq!(store.list_sessions().unwrap().len(), 2);
        assert_eq!(store.stats().unwrap().active_sessions, 2);
    }

    #[test]
    fn test_empty_session_id_is_rejected() {
        assert!(matches!(
            store().start_session(""),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_link_requires_both_referents() {
        let store = store();
        let session = store.start_session("s").unwrap();
        let message = store.record_interaction(&NewEntry::new("q")).unwrap();

        assert!(matches!(
            store.link_message(session + 100, message),
            Err(StoreError::Reference(_))
        ));
        assert!(matches!(
            store.link_message(session, message + 100),
            Err(StoreError::Reference(_))
        ));
        assert_eq!(store.stats().unwrap().links, 0);

        store.link_message(session, message).unwrap();
        let messages = store.get_session_messages(session).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, message);
    }

    #[test]
    fn test_session_messages_follow_link_order() {
        let store = store();
        let session = store.start_session("s").unwrap();
        let first = store.record_interaction(&NewEntry::new("one")).unwrap();
        let second = store.record_interaction(&NewEntry::new("two")).unwrap();

        store.link_message(session, second).unwrap();
        store.link_message(session, first).unwrap();

        let ids: Vec<i64> = store
            .get_session_messages(session)
            .unwrap()
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_begin_session_ends_previous() {
        let store = store();
        let first = store.begin_session().unwrap();
        let second = store.begin_session().unwrap();

        assert_ne!(first.session_id, second.session_id);
        assert!(second.is_active);
        assert!(!store.get_session(first.id).unwrap().unwrap().is_active);
        assert_eq!(store.active_session().unwrap().unwrap().id, second.id);
        assert_eq!(store.stats().unwrap().active_sessions, 1);
    }

    #[test]
    fn test_record_in_active_session() {
        let store = store();
        let unlinked = store
            .record_in_active_session(&NewEntry::new("before"))
            .unwrap();
        assert_eq!(unlinked.session_id, None);
        assert_eq!(unlinked.link_id, None);

        let session = store.begin_session().unwrap();
        let linked = store
            .record_in_active_session(&NewEntry::new("during"))
            .unwrap();
        assert_eq!(linked.session_id, Some(session.id));
        assert!(linked.link_id.is_some());

        let messages = store.get_session_messages(session.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].problem, "during");
    }

    #[test]
    fn test_allow_policy_leaves_orphans() {
        let store = store_with(OrphanPolicy::Allow);
        let session = store.start_session("s").unwrap();
        let message = store.record_interaction(&NewEntry::new("q")).unwrap();
        store.link_message(session, message).unwrap();

        store.delete_entry(message).unwrap();
        assert_eq!(store.orphaned_links().unwrap().len(), 1);
        assert!(store.get_session_messages(session).unwrap().is_empty());

        assert_eq!(store.prune_orphans().unwrap(), 1);
        assert_eq!(store.stats().unwrap().links, 0);
    }

    #[test]
    fn test_restrict_policy_refuses_linked_delete() {
        let store = store_with(OrphanPolicy::Restrict);
        let session = store.start_session("s").unwrap();
        let message = store.record_interaction(&NewEntry::new("q")).unwrap();
        store.link_message(session, message).unwrap();

        assert!(matches!(
            store.delete_session(session),
            Err(StoreError::Referenced(_))
        ));
        assert!(matches!(
            store.delete_entry(message),
            Err(StoreError::Referenced(_))
        ));
        assert!(store.get_session(session).unwrap().is_some());
        assert!(store.get_entry(message).unwrap().is_some());

        let free = store.record_interaction(&NewEntry::new("free")).unwrap();
        store.delete_entry(free).unwrap();
    }

    #[test]
    fn test_cascade_policy_keeps_entries() {
        let store = store_with(OrphanPolicy::Cascade);
        let session = store.start_session("s").unwrap();
        let message = store.record_interaction(&NewEntry::new("q")).unwrap();
        store.link_message(session, message).unwrap();

        store.delete_session(session).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.links, 0);
        assert_eq!(stats.sessions, 0);
        assert!(store.get_entry(message).unwrap().is_some());
    }

    #[test]
    fn test_delete_missing_rows_is_not_found() {
        let store = store();
        assert!(matches!(store.delete_entry(1), Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete_session(1), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp("2024-01-02 03:04:05").unwrap(), expected);
        assert_eq!(parse_timestamp("2024-01-02 03:04:05.250").unwrap().timestamp(), expected.timestamp());
        assert_eq!(parse_timestamp("2024-01-02T03:04:05Z").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_select_past_bound_parameter_limit() {
        let store = store();
        store
            .conn
            .execute_batch(
                "INSERT INTO chat_history (problem)
                 WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 33000)
                 SELECT 'q' || i FROM n;",
            )
            .unwrap();

        let entries = store.select(&"33000".parse().unwrap()).unwrap();
        assert_eq!(entries.len(), 33000);
        assert_eq!(entries[0].problem, "q1");
        assert_eq!(entries[32999].problem, "q33000");

        let tail = store.select(&"32999-40000".parse().unwrap()).unwrap();
        let problems: Vec<&str> = tail.iter().map(|e| e.problem.as_str()).collect();
        assert_eq!(problems, ["q1", "q2"]);
    }

    #[test]
    fn test_select_huge_range() {
        let store = store();
        for p in ["a", "b", "c"] {
            store.record_interaction(&NewEntry::new(p)).unwrap();
        }

        let all = store.select(&"1-18446744073709551615".parse().unwrap()).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(store.recent_ids(usize::MAX).unwrap().len(), 3);
    }
}
