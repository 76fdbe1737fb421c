//! Message repository: the per-session dialogue log

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{DbPool, format_timestamp, parse_timestamp, pooled, sql_limit};
use crate::Result;
use crate::memory::Emotion;

/// A message in a session
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub emotion: Emotion,
}

impl Message {
    /// Create a new message stamped with the current time
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        role: MessageRole,
        content: impl Into<String>,
        emotion: Emotion,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            emotion,
        }
    }

    /// Override the timestamp (imports and tests)
    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

impl MessageRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "agent" => Self::Agent,
            _ => Self::User,
        }
    }
}

/// Per-session activity overview
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub message_count: usize,
    pub last_active: Option<DateTime<Utc>>,
}

/// Message repository
#[derive(Debug, Clone)]
pub struct SessionRepo {
    pool: DbPool,
}

impl SessionRepo {
    /// Create a new session repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a message
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add(&self, message: &Message) -> Result<()> {
        let conn = pooled(&self.pool)?;

        conn.execute(
            "INSERT INTO messages (id, session_id, role, content, emotion, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.id,
                message.session_id,
                message.role.as_str(),
                message.content,
                message.emotion.as_str(),
                format_timestamp(&message.created_at),
            ],
        )?;

        Ok(())
    }

    /// Get the most recent `limit` messages, oldest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let conn = pooled(&self.pool)?;

        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, emotion, created_at
             FROM messages WHERE session_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;

        let mut messages = stmt
            .query_map(rusqlite::params![session_id, sql_limit(limit)], |row| {
                Ok(Message {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: MessageRole::from_str(&row.get::<_, String>(2)?),
                    content: row.get(3)?,
                    emotion: Emotion::from_str_value(&row.get::<_, String>(4)?),
                    created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Reverse to get chronological order
        messages.reverse();
        Ok(messages)
    }

    /// Timestamp of the latest message in a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn last_message_at(&self, session_id: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = pooled(&self.pool)?;

        let latest: Option<String> = conn.query_row(
            "SELECT MAX(created_at) FROM messages WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(latest.as_deref().map(parse_timestamp).transpose()?)
    }

    /// Count messages in a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self, session_id: &str) -> Result<usize> {
        let conn = pooled(&self.pool)?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Count all messages
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn total(&self) -> Result<usize> {
        let conn = pooled(&self.pool)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Every session id that owns at least one message or memory
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn session_ids(&self) -> Result<Vec<String>> {
        let conn = pooled(&self.pool)?;

        let mut stmt = conn.prepare(
            "SELECT session_id FROM messages
             UNION
             SELECT session_id FROM memories",
        )?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(ids)
    }

    /// Message counts and last activity per session, most recent first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn summaries(&self) -> Result<Vec<SessionSummary>> {
        let conn = pooled(&self.pool)?;

        let mut stmt = conn.prepare(
            "SELECT session_id, COUNT(*), MAX(created_at)
             FROM messages GROUP BY session_id
             ORDER BY MAX(created_at) DESC",
        )?;

        let summaries = stmt
            .query_map([], |row| {
                let count: i64 = row.get(1)?;
                let last: Option<String> = row.get(2)?;
                Ok(SessionSummary {
                    session_id: row.get(0)?,
                    message_count: usize::try_from(count).unwrap_or(0),
                    last_active: last.as_deref().map(parse_timestamp).transpose()?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(summaries)
    }
}
