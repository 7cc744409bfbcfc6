//! SQLite schema definition
//!
//! Three tables: interactions, sessions, and the links between them.
//! The foreign keys on `session_messages` carry no ON DELETE clause; what
//! happens to links when a referent is removed is decided by
//! [`OrphanPolicy`](crate::store::OrphanPolicy) at delete time.

/// Tables checked on open to decide whether the schema must be created.
pub const TABLES: [&str; 3] = ["chat_history", "sessions", "session_messages"];

pub const SCHEMA: &str = r#"
-- ============================================
-- INTERACTIONS
-- ============================================

-- One question/answer/output record per interaction
CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
    problem TEXT NOT NULL,                 -- User-submitted input
    answer TEXT,                           -- Proposed answer or command
    output TEXT,                           -- Realized result
    role TEXT DEFAULT 'default'            -- 'default', 'code', or any custom label
);

-- ============================================
-- SESSIONS
-- ============================================

CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,              -- Not unique: duplicates are allowed
    start_time DATETIME DEFAULT CURRENT_TIMESTAMP,
    is_active INTEGER DEFAULT 1            -- 1 = active, 0 = ended
);

-- ============================================
-- SESSION <-> MESSAGE LINKS
-- ============================================

CREATE TABLE IF NOT EXISTS session_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER,
    message_id INTEGER,
    FOREIGN KEY (session_id) REFERENCES sessions(id),
    FOREIGN KEY (message_id) REFERENCES chat_history(id)
);
"#;

/// Format used by SQLite's `CURRENT_TIMESTAMP`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
