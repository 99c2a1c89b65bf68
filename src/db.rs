//! Local persistence for sessions and learner progress

mod schema;

pub use schema::{SessionRecord, SCHEMA};

use crate::conversation::{ConversationMode, LearnerProgress};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Stored data is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Database connection lock poisoned")]
    Poisoned,
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// Columns exactly as stored, before JSON decoding
struct SessionRow {
    id: String,
    session_id: Option<String>,
    mode: String,
    title: String,
    transcript: String,
    mode_state: String,
    created_at: String,
    updated_at: String,
}

const SESSION_COLUMNS: &str =
    "id, server_session_id, mode, title, transcript, mode_state, created_at, updated_at";

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                // Connection::open reports the real error if this fails
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DbError::Poisoned)
    }

    fn run_migrations(&self) -> DbResult<()> {
        self.lock()?.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Insert or replace a session record
    pub fn save_session(&self, record: &SessionRecord) -> DbResult<()> {
        let transcript = serde_json::to_string(&record.transcript)?;
        let mode_state = serde_json::to_string(&record.mode_state)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (id, server_session_id, mode, title, transcript, mode_state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                server_session_id = excluded.server_session_id,
                mode = excluded.mode,
                title = excluded.title,
                transcript = excluded.transcript,
                mode_state = excluded.mode_state,
                updated_at = excluded.updated_at",
            params![
                record.id,
                record.session_id,
                record.mode.as_str(),
                record.title,
                transcript,
                mode_state,
                record.created_at.to_rfc3339(),
                record.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get a session by local id
    pub fn get_session(&self, id: &str) -> DbResult<SessionRecord> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                read_session_row,
            )
            .optional()?
        };
        row.ok_or_else(|| DbError::SessionNotFound(id.to_string()))
            .and_then(decode_session)
    }

    /// Most recently updated session, if any
    pub fn latest_session(&self) -> DbResult<Option<SessionRecord>> {
        let row = {
            let conn = self.lock()?;
            conn.query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC LIMIT 1"
                ),
                [],
                read_session_row,
            )
            .optional()?
        };
        row.map(decode_session).transpose()
    }

    /// Recent sessions, newest first
    pub fn list_sessions(&self, limit: usize) -> DbResult<Vec<SessionRecord>> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions ORDER BY updated_at DESC LIMIT ?1"
            ))?;
            let rows = stmt
                .query_map(params![i64::try_from(limit).unwrap_or(i64::MAX)], read_session_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(decode_session).collect()
    }

    // ==================== Progress Operations ====================

    pub fn save_progress(&self, progress: &LearnerProgress) -> DbResult<()> {
        let data = serde_json::to_string(progress)?;
        self.lock()?.execute(
            "INSERT INTO learner_progress (id, data, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![data, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Stored progress, or empty progress on first run
    pub fn load_progress(&self) -> DbResult<LearnerProgress> {
        let data: Option<String> = self
            .lock()?
            .query_row("SELECT data FROM learner_progress WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        match data {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(LearnerProgress::default()),
        }
    }
}

fn read_session_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionRow> {
    Ok(SessionRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        mode: row.get(2)?,
        title: row.get(3)?,
        transcript: row.get(4)?,
        mode_state: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn decode_session(row: SessionRow) -> DbResult<SessionRecord> {
    let mode = row.mode.parse().unwrap_or_else(|e| {
        tracing::warn!(session = %row.id, error = %e, "Unknown stored mode, using default");
        ConversationMode::default()
    });
    Ok(SessionRecord {
        mode,
        session_id: row.session_id,
        title: row.title,
        transcript: serde_json::from_str(&row.transcript)?,
        mode_state: serde_json::from_str(&row.mode_state)?,
        created_at: parse_datetime(&row.created_at),
        updated_at: parse_datetime(&row.updated_at),
        id: row.id,
    })
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
