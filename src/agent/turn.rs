//! Live conversational turn
//!
//! extract drafts -> assemble context -> model -> persist -> ingest

use std::sync::Arc;
use std::time::Duration;

use crate::agent::ModelClient;
use crate::context::ContextAssembler;
use crate::db::{Message, MessageRole, SessionStore};
use crate::error::with_deadline;
use crate::longterm::{LongTermMemory, spawn_ingest};
use crate::memory::MemoryExtractor;
use crate::{Error, Result};

/// Runs user turns against the shared collaborators
pub struct ChatService {
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ModelClient>,
    long_term: Arc<dyn LongTermMemory>,
    assembler: Arc<ContextAssembler>,
    extractor: MemoryExtractor,
    model_timeout: Duration,
}

impl ChatService {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        model: Arc<dyn ModelClient>,
        long_term: Arc<dyn LongTermMemory>,
        assembler: Arc<ContextAssembler>,
        extractor: MemoryExtractor,
        model_timeout: Duration,
    ) -> Self {
        Self {
            store,
            model,
            long_term,
            assembler,
            extractor,
            model_timeout,
        }
    }

    /// Run one turn and return the persisted agent message
    ///
    /// Nothing is written when the model fails: the user message and the
    /// reply are appended together, user first, only after a reply exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidFrame` for blank input, `Model`/`Timeout` when no reply
    /// could be generated, or a store error.
    pub async fn run_turn(&self, session_id: &str, text: &str) -> Result<Message> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidFrame("empty message".to_string()));
        }

        let drafts = self.extractor.extract(text, "");
        let segments = self.assembler.assemble(session_id, text).await?;

        let reply = with_deadline("model call", self.model_timeout, self.model.generate(&segments))
            .await
            .inspect_err(|e| {
                tracing::warn!(session_id, error = %e, "model call failed, aborting turn");
            })?;

        let classifier = self.extractor.classifier();
        let user_message = Message::new(session_id, MessageRole::User, text, classifier.classify(text));
        let agent_message =
            Message::new(session_id, MessageRole::Agent, reply.as_str(), classifier.classify(&reply));

        self.store.append_message(user_message).await?;
        self.store.append_message(agent_message.clone()).await?;

        let extracted = drafts.len();
        for draft in drafts {
            if let Err(e) = self.store.append_memory(draft.into_record(session_id)).await {
                tracing::warn!(session_id, error = %e, "failed to persist extracted memory");
            }
        }

        spawn_ingest(
            Arc::clone(&self.long_term),
            session_id.to_string(),
            format!("User: {text}\nSam: {reply}"),
            serde_json::json!({ "source": "chat" }),
        );

        tracing::info!(
            session_id,
            emotion = %agent_message.emotion,
            memories = extracted,
            "turn complete"
        );

        Ok(agent_message)
    }
}

impl std::fmt::Debug for ChatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatService")
            .field("model_timeout", &self.model_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::agent::ContextSegment;
    use crate::context::ContextConfig;
    use crate::db::{MemoryCategory, RecordKind, SqliteStore, init_memory};
    use crate::longterm::NoopMemory;
    use crate::memory::Emotion;

    struct Echo {
        seen: Mutex<Vec<Vec<ContextSegment>>>,
    }

    #[async_trait]
    impl ModelClient for Echo {
        async fn generate(&self, segments: &[ContextSegment]) -> Result<String> {
            self.seen.lock().unwrap().push(segments.to_vec());
            Ok("haha that's wonderful".to_string())
        }
    }

    struct Down;

    #[async_trait]
    impl ModelClient for Down {
        async fn generate(&self, _segments: &[ContextSegment]) -> Result<String> {
            Err(Error::Model("provider unavailable".to_string()))
        }
    }

    fn service(model: Arc<dyn ModelClient>) -> (ChatService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new(init_memory().unwrap(), Duration::from_secs(10)));
        let assembler = Arc::new(ContextAssembler::new(
            store.clone(),
            Arc::new(NoopMemory),
            "persona",
            ContextConfig::default(),
        ));
        let service = ChatService::new(
            store.clone(),
            model,
            Arc::new(NoopMemory),
            assembler,
            MemoryExtractor::default(),
            Duration::from_secs(60),
        );
        (service, store)
    }

    #[tokio::test]
    async fn turn_persists_both_messages_and_memories() {
        let model = Arc::new(Echo { seen: Mutex::new(Vec::new()) });
        let (service, store) = service(model.clone());

        let reply = service.run_turn("s1", "my name is Alex").await.unwrap();
        assert_eq!(reply.role, MessageRole::Agent);
        assert_eq!(reply.emotion, Emotion::Laughing);

        let history = store.recent_messages("s1", 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, MessageRole::User);
        assert_eq!(history[1].id, reply.id);

        let memories = store.recent_memories("s1", 10).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].category, MemoryCategory::Person);

        // The new user text is the last segment and not duplicated from history
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen[0].len(), 2);
        assert_eq!(seen[0][1], ContextSegment::user("my name is Alex"));
    }

    #[tokio::test]
    async fn model_failure_writes_nothing() {
        let (service, store) = service(Arc::new(Down));

        let err = service.run_turn("s1", "today I went hiking").await.unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert_eq!(store.count("s1", RecordKind::Messages).await.unwrap(), 0);
        assert_eq!(store.count("s1", RecordKind::Memories).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn blank_input_is_rejected() {
        let (service, _store) = service(Arc::new(Down));
        assert!(matches!(
            service.run_turn("s1", "   ").await,
            Err(Error::InvalidFrame(_))
        ));
    }
}
