//! Rumination: private thoughts generated between conversations

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{memory_excerpt, pause, private_prompt, run_periodic, transcript};
use crate::agent::ModelClient;
use crate::db::{
    MemoryCategory, MemoryRecord, RUMINATION_WEIGHT, RecordKind, RuminationThought, SessionStore,
    ThoughtType,
};
use crate::error::with_deadline;
use crate::longterm::{LongTermMemory, spawn_ingest};
use crate::memory::Emotion;
use crate::Result;

/// Rumination loop settings
#[derive(Debug, Clone)]
pub struct RuminationConfig {
    pub startup_delay: Duration,
    pub interval: Duration,
    /// Sessions silent for longer than this are left alone
    pub recency_cutoff: Duration,
    pub inter_session_delay: Duration,
    /// Messages shown to the model
    pub history_window: usize,
    /// Memories shown to the model
    pub memory_window: usize,
    pub model_timeout: Duration,
}

impl Default for RuminationConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(2 * 60),
            interval: Duration::from_secs(12 * 60),
            recency_cutoff: Duration::from_secs(3 * 24 * 60 * 60),
            inter_session_delay: Duration::from_secs(2),
            history_window: 10,
            memory_window: 8,
            model_timeout: Duration::from_secs(60),
        }
    }
}

/// Type of the next thought for a session that already has `count` thoughts
#[must_use]
pub const fn next_thought_type(count: usize) -> ThoughtType {
    ThoughtType::next(count)
}

const fn instruction(thought_type: ThoughtType) -> &'static str {
    match thought_type {
        ThoughtType::Wonder => {
            "You're alone with your thoughts. Wonder about something from your conversations that you don't fully understand yet."
        }
        ThoughtType::MemoryReplay => {
            "You're alone with your thoughts. Replay a moment from your conversations that stayed with you, and why."
        }
        ThoughtType::Curiosity => {
            "You're alone with your thoughts. Think of a question you'd love to ask them next time."
        }
        ThoughtType::Gratitude => {
            "You're alone with your thoughts. Notice something about them you're quietly grateful for."
        }
        ThoughtType::Worry => {
            "You're alone with your thoughts. Let yourself worry, gently, about something they mentioned."
        }
        ThoughtType::Dream => {
            "You're drifting. Let a loose, dreamlike thought form out of what you know of them."
        }
    }
}

/// Periodic per-session thought generator
pub struct Rumination {
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ModelClient>,
    long_term: Arc<dyn LongTermMemory>,
    persona: String,
    config: RuminationConfig,
}

impl Rumination {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        model: Arc<dyn ModelClient>,
        long_term: Arc<dyn LongTermMemory>,
        persona: impl Into<String>,
        config: RuminationConfig,
    ) -> Self {
        Self {
            store,
            model,
            long_term,
            persona: persona.into(),
            config,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let this = Arc::clone(&self);
        run_periodic(
            "rumination",
            self.config.startup_delay,
            self.config.interval,
            cancel,
            move || {
                let this = Arc::clone(&this);
                async move { this.run_once(Utc::now()).await }
            },
        )
        .await;
    }

    /// One pass over every known session; returns how many thoughts were stored
    pub async fn run_once(&self, now: DateTime<Utc>) -> usize {
        let sessions = match self.store.session_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "rumination: failed to enumerate sessions");
                return 0;
            }
        };

        let mut generated = 0;
        for (i, session_id) in sessions.iter().enumerate() {
            if i > 0 {
                pause(self.config.inter_session_delay).await;
            }

            match self.ruminate(session_id, now).await {
                Ok(Some(thought)) => {
                    generated += 1;
                    tracing::info!(
                        session_id = %session_id,
                        thought_type = %thought.thought_type,
                        "rumination thought stored"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "rumination failed");
                }
            }
        }
        generated
    }

    /// Think about one session if it is recent enough
    ///
    /// # Errors
    ///
    /// Returns error if the store or model fails
    pub async fn ruminate(&self, session_id: &str, now: DateTime<Utc>) -> Result<Option<RuminationThought>> {
        let Some(last) = self.store.last_message_at(session_id).await? else {
            return Ok(None);
        };

        let cutoff = chrono::Duration::from_std(self.config.recency_cutoff)
            .unwrap_or(chrono::Duration::MAX);
        if now.signed_duration_since(last) > cutoff {
            tracing::debug!(session_id, "rumination: session too old, skipping");
            return Ok(None);
        }

        let message_count = self.store.count(session_id, RecordKind::Messages).await?;
        let memory_count = self.store.count(session_id, RecordKind::Memories).await?;
        if message_count == 0 && memory_count == 0 {
            return Ok(None);
        }

        let thought_type = next_thought_type(self.store.count(session_id, RecordKind::Thoughts).await?);
        let messages = self
            .store
            .recent_messages(session_id, self.config.history_window)
            .await?;
        let memories = self
            .store
            .recent_memories(session_id, self.config.memory_window)
            .await?;

        let material = format!(
            "Recent conversation:\n{}\n\nThings you remember:\n{}\n\nWrite 2-3 sentences. This is private; nobody will read it but you.",
            transcript(&messages),
            memory_excerpt(&memories),
        );
        let prompt = private_prompt(&self.persona, instruction(thought_type), material);

        let text = with_deadline(
            "model call",
            self.config.model_timeout,
            self.model.generate(&prompt),
        )
        .await?;

        let thought = RuminationThought::new(session_id, thought_type, text.as_str());
        self.store.append_thought(thought.clone()).await?;

        let memory = MemoryRecord::new(
            session_id,
            MemoryCategory::Thought,
            format!("[{thought_type}] {text}"),
            Emotion::Curiosity,
        )
        .with_weight(RUMINATION_WEIGHT);
        self.store.append_memory(memory).await?;

        spawn_ingest(
            Arc::clone(&self.long_term),
            session_id.to_string(),
            text,
            serde_json::json!({ "source": "rumination", "thought_type": thought_type.as_str() }),
        );

        Ok(Some(thought))
    }
}

impl std::fmt::Debug for Rumination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rumination")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
