//! Database module for session, message, memory, and inner-life persistence

pub mod embedder;
pub mod eternal;
pub mod memory;
pub mod proactive;
pub mod reflection;
mod schema;
pub mod session;
pub mod store;
pub mod thought;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::{Error, Result};

pub use embedder::{Embedder, cosine_similarity};
pub use eternal::{EternalEntry, EternalRepo};
pub use memory::{
    MemoryCategory, MemoryRecord, MemoryRepo, REFLECTION_WEIGHT, RUMINATION_WEIGHT, truncate_chars,
};
pub use proactive::{ProactiveMessage, ProactiveRepo, ProactiveTrigger};
pub use reflection::{ReflectionRecord, ReflectionRepo};
pub use schema::SCHEMA_VERSION;
pub use session::{Message, MessageRole, SessionRepo, SessionSummary};
pub use store::{RecordKind, SessionStore, SqliteStore, StoreStats};
pub use thought::{RuminationThought, ThoughtRepo, ThoughtType};

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Initialize the database
///
/// # Errors
///
/// Returns error if database cannot be opened or initialized
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;")
    });
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    // Run migrations on first connection
    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    tracing::info!(version = SCHEMA_VERSION, "database initialized");
    Ok(pool)
}

/// Initialize an in-memory database (for testing)
///
/// # Errors
///
/// Returns error if database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    Ok(pool)
}

/// Format a timestamp for storage
///
/// Fixed-width UTC so that lexical order in SQL equals chronological order.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp inside a row mapper
///
/// A corrupt value fails the row instead of standing in for "now".
pub(crate) fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            tracing::warn!(value = s, error = %e, "unparseable stored timestamp");
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Clamp a window size to an `SQLite` LIMIT parameter
pub(crate) fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

pub(crate) fn pooled(pool: &DbPool) -> Result<DbConn> {
    pool.get().map_err(|e| Error::Database(e.to_string()))
}
