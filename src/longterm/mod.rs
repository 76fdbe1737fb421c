//! Long-term semantic memory
//!
//! Best-effort by contract: ingestion is fire-and-forget and a failed or slow
//! search degrades to "no results" instead of failing the caller.

mod embedding;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use crate::Result;
use crate::error::with_deadline;

pub use embedding::EmbeddingMemory;

/// Semantic store keyed by session
#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// Store a piece of text for later semantic recall
    async fn ingest(&self, session_id: &str, text: &str, metadata: serde_json::Value) -> Result<()>;

    /// Texts most similar to `query`, best first, at or above `threshold`
    async fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<String>>;
}

/// Stand-in used when no embedding provider is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMemory;

#[async_trait]
impl LongTermMemory for NoopMemory {
    async fn ingest(&self, _session_id: &str, _text: &str, _metadata: serde_json::Value) -> Result<()> {
        Ok(())
    }

    async fn search(
        &self,
        _session_id: &str,
        _query: &str,
        _limit: usize,
        _threshold: f32,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Ingest in the background; failures are logged and dropped
pub fn spawn_ingest(
    memory: Arc<dyn LongTermMemory>,
    session_id: String,
    text: String,
    metadata: serde_json::Value,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = memory.ingest(&session_id, &text, metadata).await {
            tracing::warn!(session_id = %session_id, error = %e, "long-term ingest failed");
        }
    })
}

/// Search with a deadline, treating any failure as an empty result
pub async fn search_or_empty(
    memory: &dyn LongTermMemory,
    session_id: &str,
    query: &str,
    limit: usize,
    threshold: f32,
    timeout: Duration,
) -> Vec<String> {
    match with_deadline(
        "long-term search",
        timeout,
        memory.search(session_id, query, limit, threshold),
    )
    .await
    {
        Ok(hits) => hits,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "long-term search unavailable");
            Vec::new()
        }
    }
}
