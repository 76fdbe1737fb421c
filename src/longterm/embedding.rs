//! Embedding-backed long-term memory over `SQLite`

use async_trait::async_trait;

use super::LongTermMemory;
use crate::db::{DbPool, Embedder, EternalEntry, EternalRepo, cosine_similarity};
use crate::{Error, Result};

/// Embeds text on ingest and ranks stored entries by cosine similarity
///
/// Only the newest `candidate_window` entries of a session are scored.
#[derive(Debug, Clone)]
pub struct EmbeddingMemory {
    embedder: Embedder,
    repo: EternalRepo,
    candidate_window: usize,
}

impl EmbeddingMemory {
    #[must_use]
    pub const fn new(embedder: Embedder, pool: DbPool, candidate_window: usize) -> Self {
        Self {
            embedder,
            repo: EternalRepo::new(pool),
            candidate_window,
        }
    }
}

/// Rank entries against a query vector, best first
fn rank(entries: Vec<EternalEntry>, query: &[f32], limit: usize, threshold: f32) -> Vec<String> {
    let mut scored: Vec<(f32, String)> = entries
        .into_iter()
        .map(|e| (cosine_similarity(query, &e.embedding), e.content))
        .filter(|(score, _)| *score >= threshold)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(limit);
    scored.into_iter().map(|(_, content)| content).collect()
}

#[async_trait]
impl LongTermMemory for EmbeddingMemory {
    async fn ingest(&self, session_id: &str, text: &str, metadata: serde_json::Value) -> Result<()> {
        let embedding = self.embedder.embed(text).await?;
        let entry = EternalEntry::new(session_id, text, metadata, embedding);

        let repo = self.repo.clone();
        tokio::task::spawn_blocking(move || repo.add(&entry))
            .await
            .map_err(|e| Error::LongTermMemory(e.to_string()))??;

        tracing::debug!(session_id, "ingested long-term memory");
        Ok(())
    }

    async fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<String>> {
        if limit == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed(query).await?;

        let repo = self.repo.clone();
        let session = session_id.to_string();
        let window = self.candidate_window;
        let entries = tokio::task::spawn_blocking(move || repo.for_session(&session, window))
            .await
            .map_err(|e| Error::LongTermMemory(e.to_string()))??;

        Ok(rank(entries, &query_embedding, limit, threshold))
    }
}
