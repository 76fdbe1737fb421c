//! Memory repository for extracted and inner-life memory records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DbPool, format_timestamp, parse_timestamp, pooled, sql_limit};
use crate::Result;
use crate::memory::Emotion;

/// Retrieval weight of rumination-derived memories
pub const RUMINATION_WEIGHT: f64 = 2.0;

/// Retrieval weight of reflection-derived memories
pub const REFLECTION_WEIGHT: f64 = 3.0;

/// Column list for all memory SELECT queries
const MEMORY_COLUMNS: &str = "id, session_id, content, category, sentiment, weight, created_at";

/// Memory categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    /// People in the user's life, including the user's own name
    Person,
    /// Things that happened or will happen
    Event,
    /// Emotional states the user reported
    Feeling,
    /// Likes and dislikes
    Preference,
    /// Output of the agent's own inner life
    Thought,
}

impl MemoryCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Event => "event",
            Self::Feeling => "feeling",
            Self::Preference => "preference",
            Self::Thought => "thought",
        }
    }

    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "person" => Some(Self::Person),
            "event" => Some(Self::Event),
            "feeling" => Some(Self::Feeling),
            "preference" => Some(Self::Preference),
            "thought" => Some(Self::Thought),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A memory record stored in the database
#[derive(Debug, Clone, Serialize)]
pub struct MemoryRecord {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub category: MemoryCategory,
    pub sentiment: Emotion,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
    pub weight: f64,
}

impl MemoryRecord {
    /// Create a new weight-1 memory record
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        category: MemoryCategory,
        content: impl Into<String>,
        sentiment: Emotion,
    ) -> Self {
        Self {
            id: format!("mem_{}", Uuid::new_v4()),
            session_id: session_id.into(),
            content: content.into(),
            category,
            sentiment,
            created_at: Utc::now(),
            weight: 1.0,
        }
    }

    /// Set the retrieval weight (negative values clamp to zero)
    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight.max(0.0);
        self
    }

    /// Override the timestamp
    #[must_use]
    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let category: String = row.get(3)?;
    let sentiment: String = row.get(4)?;
    let created_at: String = row.get(6)?;

    Ok(MemoryRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        content: row.get(2)?,
        category: MemoryCategory::from_str_value(&category).unwrap_or(MemoryCategory::Thought),
        sentiment: Emotion::from_str_value(&sentiment),
        weight: row.get(5)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

/// Memory repository for database operations
#[derive(Debug, Clone)]
pub struct MemoryRepo {
    pool: DbPool,
}

impl MemoryRepo {
    /// Create a new memory repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Append a memory record
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add(&self, memory: &MemoryRecord) -> Result<()> {
        let conn = pooled(&self.pool)?;

        conn.execute(
            r"INSERT INTO memories (id, session_id, content, category, sentiment, weight, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                memory.id,
                memory.session_id,
                memory.content,
                memory.category.as_str(),
                memory.sentiment.as_str(),
                memory.weight,
                format_timestamp(&memory.created_at),
            ],
        )?;

        Ok(())
    }

    /// Most recent memories for a session, newest first
    ///
    /// Records sharing a timestamp are ordered by descending weight.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = pooled(&self.pool)?;

        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE session_id = ?1
             ORDER BY created_at DESC, weight DESC, rowid DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![session_id, sql_limit(limit)], row_to_memory)?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// All memories for a session ordered for graph rendering
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list_for_graph(&self, session_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = pooled(&self.pool)?;

        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories WHERE session_id = ?1
             ORDER BY category, weight DESC, created_at DESC LIMIT ?2"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params![session_id, sql_limit(limit)], row_to_memory)?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Count memories in a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self, session_id: &str) -> Result<usize> {
        let conn = pooled(&self.pool)?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Count all memories
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn total(&self) -> Result<usize> {
        let conn = pooled(&self.pool)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Format memories as a bullet list for prompt injection
    #[must_use]
    pub fn format_for_prompt(memories: &[MemoryRecord], max_chars: usize) -> String {
        use std::fmt::Write;

        let mut output = String::new();
        for mem in memories {
            let _ = writeln!(
                output,
                "- [{}] {}",
                mem.category,
                truncate_chars(&mem.content, max_chars)
            );
        }
        output
    }
}

/// Truncate to at most `max` characters, marking the cut with an ellipsis
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
