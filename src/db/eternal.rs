//! Embedded long-term memory entries

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::embedder::Embedder;
use super::{DbPool, format_timestamp, parse_timestamp, pooled, sql_limit};
use crate::Result;

/// A long-term memory entry with its embedding
#[derive(Debug, Clone)]
pub struct EternalEntry {
    pub id: String,
    pub session_id: String,
    pub content: String,
    pub metadata: serde_json::Value,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
}

impl EternalEntry {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        content: impl Into<String>,
        metadata: serde_json::Value,
        embedding: Vec<f32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            content: content.into(),
            metadata,
            embedding,
            created_at: Utc::now(),
        }
    }
}

/// Long-term memory repository
#[derive(Debug, Clone)]
pub struct EternalRepo {
    pool: DbPool,
}

impl EternalRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn add(&self, entry: &EternalEntry) -> Result<()> {
        let conn = pooled(&self.pool)?;

        conn.execute(
            r"INSERT INTO eternal_memories (id, session_id, content, metadata, embedding, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                entry.id,
                entry.session_id,
                entry.content,
                entry.metadata.to_string(),
                Embedder::to_bytes(&entry.embedding),
                format_timestamp(&entry.created_at),
            ],
        )?;

        Ok(())
    }

    /// The newest `limit` entries for a session, newest first
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn for_session(&self, session_id: &str, limit: usize) -> Result<Vec<EternalEntry>> {
        let conn = pooled(&self.pool)?;

        let mut stmt = conn.prepare(
            r"SELECT id, session_id, content, metadata, embedding, created_at
              FROM eternal_memories WHERE session_id = ?1
              ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;

        let rows = stmt.query_map(rusqlite::params![session_id, sql_limit(limit)], |row| {
            let metadata: String = row.get(3)?;
            let embedding: Vec<u8> = row.get(4)?;
            Ok(EternalEntry {
                id: row.get(0)?,
                session_id: row.get(1)?,
                content: row.get(2)?,
                metadata: serde_json::from_str(&metadata).unwrap_or(serde_json::Value::Null),
                embedding: Embedder::from_bytes(&embedding),
                created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[test]
    fn entries_are_scoped_to_session() {
        let repo = EternalRepo::new(init_memory().unwrap());

        let meta = serde_json::json!({"source": "chat"});
        repo.add(&EternalEntry::new("s1", "likes tea", meta.clone(), vec![0.5, 0.5]))
            .unwrap();
        repo.add(&EternalEntry::new("s2", "likes coffee", meta, vec![1.0, 0.0]))
            .unwrap();

        let entries = repo.for_session("s1", 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "likes tea");
        assert_eq!(entries[0].embedding, vec![0.5, 0.5]);
        assert_eq!(entries[0].metadata["source"], "chat");
    }

    #[test]
    fn window_keeps_newest_entries() {
        let repo = EternalRepo::new(init_memory().unwrap());
        let now = Utc::now();

        for age in [30, 10, 20] {
            let mut entry = EternalEntry::new("s1", format!("{age}m ago"), serde_json::Value::Null, vec![1.0]);
            entry.created_at = now - chrono::Duration::minutes(age);
            repo.add(&entry).unwrap();
        }

        let entries = repo.for_session("s1", 2).unwrap();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["10m ago", "20m ago"]);
    }
}
