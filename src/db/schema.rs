//! Database schema and record types

use crate::conversation::{ConversationMode, ModeState, Transcript};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    server_session_id TEXT,
    mode TEXT NOT NULL,
    title TEXT NOT NULL,
    transcript TEXT NOT NULL,
    mode_state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);

CREATE TABLE IF NOT EXISTS learner_progress (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    data TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

/// One locally stored tutoring session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Local key; unrelated to the server's session id
    pub id: String,
    pub session_id: Option<String>,
    pub mode: ConversationMode,
    pub title: String,
    pub transcript: Transcript,
    pub mode_state: ModeState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Empty record for a freshly started session
    #[cfg(test)]
    pub fn new(id: impl Into<String>, mode: ConversationMode, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            session_id: None,
            mode,
            title: crate::conversation::session_title(None),
            transcript: Transcript::default(),
            mode_state: ModeState::default(),
            created_at: now,
            updated_at: now,
        }
    }
}
