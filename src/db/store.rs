//! Async session store over the blocking repositories
//!
//! Every call hops onto the blocking pool and carries a deadline, so a slow
//! disk never stalls the runtime threads serving live sockets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    DbPool, MemoryRecord, MemoryRepo, Message, ProactiveMessage, ProactiveRepo, ReflectionRecord,
    ReflectionRepo, RuminationThought, SessionRepo, SessionSummary, ThoughtRepo,
};
use crate::{Error, Result};

/// Per-session record kinds that can be counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Messages,
    Memories,
    Thoughts,
    Reflections,
    Proactive,
}

/// Global totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_messages: usize,
    pub total_memories: usize,
    pub total_sessions: usize,
}

/// Durable session store
///
/// All writes are single appends. Reads return owned snapshots.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn append_message(&self, message: Message) -> Result<()>;

    async fn append_memory(&self, memory: MemoryRecord) -> Result<()>;

    /// Returns `false` if the `(session_id, week_number)` slot was taken
    async fn append_reflection(&self, reflection: ReflectionRecord) -> Result<bool>;

    async fn append_proactive(&self, message: ProactiveMessage) -> Result<()>;

    async fn append_thought(&self, thought: RuminationThought) -> Result<()>;

    /// Last `limit` messages, oldest first
    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<Message>>;

    /// Last `limit` memories, newest first
    async fn recent_memories(&self, session_id: &str, limit: usize) -> Result<Vec<MemoryRecord>>;

    async fn latest_reflection(&self, session_id: &str) -> Result<Option<ReflectionRecord>>;

    /// Every session that owns a message or a memory
    async fn session_ids(&self) -> Result<Vec<String>>;

    async fn last_message_at(&self, session_id: &str) -> Result<Option<DateTime<Utc>>>;

    async fn count(&self, session_id: &str, kind: RecordKind) -> Result<usize>;

    async fn stats(&self) -> Result<StoreStats>;

    async fn session_summaries(&self) -> Result<Vec<SessionSummary>>;

    async fn memory_graph(&self, session_id: &str, limit: usize) -> Result<Vec<MemoryRecord>>;
}

#[derive(Debug)]
struct Repos {
    sessions: SessionRepo,
    memories: MemoryRepo,
    reflections: ReflectionRepo,
    proactive: ProactiveRepo,
    thoughts: ThoughtRepo,
}

/// `SQLite`-backed [`SessionStore`]
#[derive(Debug, Clone)]
pub struct SqliteStore {
    repos: Arc<Repos>,
    timeout: Duration,
}

impl SqliteStore {
    /// Create a store over an initialized pool
    #[must_use]
    pub fn new(pool: DbPool, timeout: Duration) -> Self {
        Self {
            repos: Arc::new(Repos {
                sessions: SessionRepo::new(pool.clone()),
                memories: MemoryRepo::new(pool.clone()),
                reflections: ReflectionRepo::new(pool.clone()),
                proactive: ProactiveRepo::new(pool.clone()),
                thoughts: ThoughtRepo::new(pool),
            }),
            timeout,
        }
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repos) -> Result<T> + Send + 'static,
    {
        let repos = Arc::clone(&self.repos);
        let task = tokio::task::spawn_blocking(move || f(&repos));

        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(Error::Database(format!("{op}: {e}"))),
            Err(_) => Err(Error::Timeout(op)),
        }
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn append_message(&self, message: Message) -> Result<()> {
        self.blocking("append message", move |r| r.sessions.add(&message))
            .await
    }

    async fn append_memory(&self, memory: MemoryRecord) -> Result<()> {
        self.blocking("append memory", move |r| r.memories.add(&memory))
            .await
    }

    async fn append_reflection(&self, reflection: ReflectionRecord) -> Result<bool> {
        self.blocking("append reflection", move |r| {
            r.reflections.insert_if_absent(&reflection)
        })
        .await
    }

    async fn append_proactive(&self, message: ProactiveMessage) -> Result<()> {
        self.blocking("append proactive", move |r| r.proactive.add(&message))
            .await
    }

    async fn append_thought(&self, thought: RuminationThought) -> Result<()> {
        self.blocking("append thought", move |r| r.thoughts.add(&thought))
            .await
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let session_id = session_id.to_string();
        self.blocking("recent messages", move |r| {
            r.sessions.recent(&session_id, limit)
        })
        .await
    }

    async fn recent_memories(&self, session_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let session_id = session_id.to_string();
        self.blocking("recent memories", move |r| {
            r.memories.recent(&session_id, limit)
        })
        .await
    }

    async fn latest_reflection(&self, session_id: &str) -> Result<Option<ReflectionRecord>> {
        let session_id = session_id.to_string();
        self.blocking("latest reflection", move |r| {
            r.reflections.latest(&session_id)
        })
        .await
    }

    async fn session_ids(&self) -> Result<Vec<String>> {
        self.blocking("session ids", |r| r.sessions.session_ids())
            .await
    }

    async fn last_message_at(&self, session_id: &str) -> Result<Option<DateTime<Utc>>> {
        let session_id = session_id.to_string();
        self.blocking("last message", move |r| {
            r.sessions.last_message_at(&session_id)
        })
        .await
    }

    async fn count(&self, session_id: &str, kind: RecordKind) -> Result<usize> {
        let session_id = session_id.to_string();
        self.blocking("count", move |r| match kind {
            RecordKind::Messages => r.sessions.count(&session_id),
            RecordKind::Memories => r.memories.count(&session_id),
            RecordKind::Thoughts => r.thoughts.count(&session_id),
            RecordKind::Reflections => r.reflections.count(&session_id),
            RecordKind::Proactive => r.proactive.count(&session_id),
        })
        .await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.blocking("stats", |r| {
            Ok(StoreStats {
                total_messages: r.sessions.total()?,
                total_memories: r.memories.total()?,
                total_sessions: r.sessions.session_ids()?.len(),
            })
        })
        .await
    }

    async fn session_summaries(&self) -> Result<Vec<SessionSummary>> {
        self.blocking("session summaries", |r| r.sessions.summaries())
            .await
    }

    async fn memory_graph(&self, session_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let session_id = session_id.to_string();
        self.blocking("memory graph", move |r| {
            r.memories.list_for_graph(&session_id, limit)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryCategory, MessageRole, init_memory};
    use crate::memory::Emotion;

    fn store() -> SqliteStore {
        SqliteStore::new(init_memory().unwrap(), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn sessions_include_memory_only_sessions() {
        let store = store();
        store
            .append_message(Message::new("chatty", MessageRole::User, "hi", Emotion::Neutral))
            .await
            .unwrap();
        store
            .append_memory(MemoryRecord::new(
                "quiet",
                MemoryCategory::Person,
                "User said: call me Jo",
                Emotion::Neutral,
            ))
            .await
            .unwrap();

        let mut ids = store.session_ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec!["chatty", "quiet"]);

        assert!(store.last_message_at("quiet").await.unwrap().is_none());
        assert_eq!(store.count("quiet", RecordKind::Memories).await.unwrap(), 1);
        assert_eq!(store.count("quiet", RecordKind::Messages).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_total_everything() {
        let store = store();
        for session in ["a", "b"] {
            store
                .append_message(Message::new(session, MessageRole::User, "hello", Emotion::Neutral))
                .await
                .unwrap();
        }
        store
            .append_memory(MemoryRecord::new("a", MemoryCategory::Event, "today", Emotion::Neutral))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats,
            StoreStats {
                total_messages: 2,
                total_memories: 1,
                total_sessions: 2,
            }
        );
    }

    #[tokio::test]
    async fn reflection_week_claim_is_exclusive() {
        let store = store();
        let first = ReflectionRecord::new("s1", 1, "one", "");
        let second = ReflectionRecord::new("s1", 1, "two", "");

        assert!(store.append_reflection(first).await.unwrap());
        assert!(!store.append_reflection(second).await.unwrap());
        assert_eq!(store.count("s1", RecordKind::Reflections).await.unwrap(), 1);
    }
}
