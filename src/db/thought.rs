//! Rumination thought repository

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DbPool, format_timestamp, parse_timestamp, pooled, sql_limit};
use crate::Result;

/// Kind of internal thought produced by rumination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    Wonder,
    MemoryReplay,
    Curiosity,
    Gratitude,
    Worry,
    Dream,
}

impl ThoughtType {
    /// Fixed rotation order
    pub const SEQUENCE: [Self; 6] = [
        Self::Wonder,
        Self::MemoryReplay,
        Self::Curiosity,
        Self::Gratitude,
        Self::Worry,
        Self::Dream,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Wonder => "wonder",
            Self::MemoryReplay => "memory_replay",
            Self::Curiosity => "curiosity",
            Self::Gratitude => "gratitude",
            Self::Worry => "worry",
            Self::Dream => "dream",
        }
    }

    fn from_str(s: &str) -> Self {
        Self::SEQUENCE
            .into_iter()
            .find(|t| t.as_str() == s)
            .unwrap_or(Self::Wonder)
    }

    /// Type of the next thought given how many a session already has
    #[must_use]
    pub const fn next(existing: usize) -> Self {
        Self::SEQUENCE[existing % Self::SEQUENCE.len()]
    }
}

impl std::fmt::Display for ThoughtType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An internal thought generated between conversations
#[derive(Debug, Clone, Serialize)]
pub struct RuminationThought {
    pub id: String,
    pub session_id: String,
    pub thought_text: String,
    pub thought_type: ThoughtType,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub surfaced: bool,
    pub influenced_response: bool,
}

impl RuminationThought {
    #[must_use]
    pub fn new(session_id: impl Into<String>, thought_type: ThoughtType, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            thought_text: text.into(),
            thought_type,
            created_at: Utc::now(),
            surfaced: false,
            influenced_response: false,
        }
    }
}

/// Rumination thought repository
#[derive(Debug, Clone)]
pub struct ThoughtRepo {
    pool: DbPool,
}

impl ThoughtRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add(&self, thought: &RuminationThought) -> Result<()> {
        let conn = pooled(&self.pool)?;

        conn.execute(
            r"INSERT INTO rumination_thoughts
                (id, session_id, thought_text, thought_type, surfaced, influenced_response, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                thought.id,
                thought.session_id,
                thought.thought_text,
                thought.thought_type.as_str(),
                i32::from(thought.surfaced),
                i32::from(thought.influenced_response),
                format_timestamp(&thought.created_at),
            ],
        )?;

        Ok(())
    }

    /// Most recent thoughts, newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<RuminationThought>> {
        let conn = pooled(&self.pool)?;

        let mut stmt = conn.prepare(
            r"SELECT id, session_id, thought_text, thought_type, surfaced, influenced_response, created_at
              FROM rumination_thoughts WHERE session_id = ?1
              ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(rusqlite::params![session_id, sql_limit(limit)], |row| {
            Ok(RuminationThought {
                id: row.get(0)?,
                session_id: row.get(1)?,
                thought_text: row.get(2)?,
                thought_type: ThoughtType::from_str(&row.get::<_, String>(3)?),
                surfaced: row.get::<_, i32>(4)? != 0,
                influenced_response: row.get::<_, i32>(5)? != 0,
                created_at: parse_timestamp(&row.get::<_, String>(6)?)?,
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
            "SELECT COUNT(*) FROM rumination_thoughts WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[test]
    fn next_type_cycles() {
        assert_eq!(ThoughtType::next(0), ThoughtType::Wonder);
        assert_eq!(ThoughtType::next(1), ThoughtType::MemoryReplay);
        assert_eq!(ThoughtType::next(5), ThoughtType::Dream);
        assert_eq!(ThoughtType::next(6), ThoughtType::Wonder);
        assert_eq!(ThoughtType::next(13), ThoughtType::MemoryReplay);
    }

    #[test]
    fn stored_type_follows_count() {
        let repo = ThoughtRepo::new(init_memory().unwrap());

        for _ in 0..8 {
            let count = repo.count("s1").unwrap();
            let thought = RuminationThought::new("s1", ThoughtType::next(count), "hmm");
            repo.add(&thought).unwrap();
        }

        let recent = repo.recent("s1", 1).unwrap();
        // 8th thought (count 7) lands on memory_replay
        assert_eq!(recent[0].thought_type, ThoughtType::MemoryReplay);
        assert!(!recent[0].surfaced);
        assert_eq!(repo.count("s1").unwrap(), 8);
    }
}
