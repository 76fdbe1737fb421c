//! Proactive message repository

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DbPool, format_timestamp, parse_timestamp, pooled, sql_limit};
use crate::Result;

/// Why the agent reached out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProactiveTrigger {
    /// Silent for more than a day
    LongAbsence,
    /// Silent for more than an hour
    CheckIn,
    /// Recently active, but quiet past the silence floor
    SpontaneousThought,
}

impl ProactiveTrigger {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LongAbsence => "long_absence",
            Self::CheckIn => "check_in",
            Self::SpontaneousThought => "spontaneous_thought",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "long_absence" => Self::LongAbsence,
            "check_in" => Self::CheckIn,
            _ => Self::SpontaneousThought,
        }
    }
}

impl std::fmt::Display for ProactiveTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An agent-initiated message
#[derive(Debug, Clone, Serialize)]
pub struct ProactiveMessage {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub trigger: ProactiveTrigger,
    pub delivered: bool,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl ProactiveMessage {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        content: impl Into<String>,
        trigger: ProactiveTrigger,
        delivered: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            content: content.into(),
            trigger,
            delivered,
            created_at: Utc::now(),
        }
    }
}

/// Proactive message repository
#[derive(Debug, Clone)]
pub struct ProactiveRepo {
    pool: DbPool,
}

impl ProactiveRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add(&self, message: &ProactiveMessage) -> Result<()> {
        let conn = pooled(&self.pool)?;

        conn.execute(
            r"INSERT INTO proactive_messages (id, session_id, content, trigger_kind, delivered, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.id,
                message.session_id,
                message.content,
                message.trigger.as_str(),
                i32::from(message.delivered),
                format_timestamp(&message.created_at),
            ],
        )?;

        Ok(())
    }

    /// Most recent proactive messages, newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ProactiveMessage>> {
        let conn = pooled(&self.pool)?;

        let mut stmt = conn.prepare(
            r"SELECT id, session_id, content, trigger_kind, delivered, created_at
              FROM proactive_messages WHERE session_id = ?1
              ORDER BY created_at DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(rusqlite::params![session_id, sql_limit(limit)], |row| {
            Ok(ProactiveMessage {
                id: row.get(0)?,
                session_id: row.get(1)?,
                content: row.get(2)?,
                trigger: ProactiveTrigger::from_str(&row.get::<_, String>(3)?),
                delivered: row.get::<_, i32>(4)? != 0,
                created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self, session_id: &str) -> Result<usize> {
        let conn = pooled(&self.pool)?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM proactive_messages WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}
