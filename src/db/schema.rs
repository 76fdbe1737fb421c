//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 4;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }
    if version < 3 {
        migrate_v3(conn)?;
    }
    if version < 4 {
        migrate_v4(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Conversation messages, append-only
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('user', 'agent')),
            content TEXT NOT NULL,
            emotion TEXT NOT NULL DEFAULT 'neutral',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, created_at);

        -- Memory records, append-only
        CREATE TABLE IF NOT EXISTS memories (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            content TEXT NOT NULL,
            category TEXT NOT NULL CHECK(category IN ('person', 'event', 'feeling', 'preference', 'thought')),
            sentiment TEXT NOT NULL DEFAULT 'neutral',
            weight REAL NOT NULL DEFAULT 1.0 CHECK(weight >= 0),
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id, created_at);

        PRAGMA user_version = 1;
        ",
    )?;

    tracing::info!("migrated to schema v1");
    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Weekly reflections; (session_id, week_number) is the idempotency key
        CREATE TABLE IF NOT EXISTS reflections (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            reflection_text TEXT NOT NULL,
            evolution_notes TEXT NOT NULL DEFAULT '',
            week_number INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE(session_id, week_number)
        );

        PRAGMA user_version = 2;
        ",
    )?;

    tracing::info!("migrated to schema v2");
    Ok(())
}

fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Agent-initiated outreach
        CREATE TABLE IF NOT EXISTS proactive_messages (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            content TEXT NOT NULL,
            trigger_kind TEXT NOT NULL CHECK(trigger_kind IN ('long_absence', 'check_in', 'spontaneous_thought')),
            delivered INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_proactive_session ON proactive_messages(session_id);

        -- Background rumination output
        CREATE TABLE IF NOT EXISTS rumination_thoughts (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            thought_text TEXT NOT NULL,
            thought_type TEXT NOT NULL,
            surfaced INTEGER NOT NULL DEFAULT 0,
            influenced_response INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_thoughts_session ON rumination_thoughts(session_id);

        PRAGMA user_version = 3;
        ",
    )?;

    tracing::info!("migrated to schema v3");
    Ok(())
}

fn migrate_v4(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Embedded long-term memory entries
        CREATE TABLE IF NOT EXISTS eternal_memories (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            content TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_eternal_session ON eternal_memories(session_id);

        PRAGMA user_version = 4;
        ",
    )?;

    tracing::info!("migrated to schema v4");
    Ok(())
}
