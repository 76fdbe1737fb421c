//! Weekly reflection repository

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{DbPool, format_timestamp, parse_timestamp, pooled};
use crate::Result;

/// A weekly reflection on a session
#[derive(Debug, Clone, Serialize)]
pub struct ReflectionRecord {
    pub id: String,
    pub session_id: String,
    pub reflection_text: String,
    pub evolution_notes: String,
    pub week_number: u32,
    #[serde(rename = "timestamp")]
    pub created_at: DateTime<Utc>,
}

impl ReflectionRecord {
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        week_number: u32,
        reflection_text: impl Into<String>,
        evolution_notes: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            reflection_text: reflection_text.into(),
            evolution_notes: evolution_notes.into(),
            week_number,
            created_at: Utc::now(),
        }
    }
}

/// Reflection repository
#[derive(Debug, Clone)]
pub struct ReflectionRepo {
    pool: DbPool,
}

impl ReflectionRepo {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a reflection unless its `(session_id, week_number)` already exists
    ///
    /// Returns `false` when another writer claimed the week first.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn insert_if_absent(&self, reflection: &ReflectionRecord) -> Result<bool> {
        let conn = pooled(&self.pool)?;

        let inserted = conn.execute(
            r"INSERT OR IGNORE INTO reflections
                (id, session_id, reflection_text, evolution_notes, week_number, created_at)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                reflection.id,
                reflection.session_id,
                reflection.reflection_text,
                reflection.evolution_notes,
                reflection.week_number,
                format_timestamp(&reflection.created_at),
            ],
        )?;

        Ok(inserted > 0)
    }

    /// Latest reflection by week number
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn latest(&self, session_id: &str) -> Result<Option<ReflectionRecord>> {
        let conn = pooled(&self.pool)?;

        let result = conn.query_row(
            r"SELECT id, session_id, reflection_text, evolution_notes, week_number, created_at
              FROM reflections WHERE session_id = ?1
              ORDER BY week_number DESC LIMIT 1",
            [session_id],
            |row| {
                Ok(ReflectionRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    reflection_text: row.get(2)?,
                    evolution_notes: row.get(3)?,
                    week_number: row.get(4)?,
                    created_at: parse_timestamp(&row.get::<_, String>(5)?)?,
                })
            },
        );

        match result {
            Ok(r) => Ok(Some(r)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Count reflections in a session
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn count(&self, session_id: &str) -> Result<usize> {
        let conn = pooled(&self.pool)?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM reflections WHERE session_id = ?1",
            [session_id],
            |row| row.get(0),
        )?;

        Ok(usize::try_from(count).unwrap_or(0))
    }
}
