//! Weekly reflection

use std::sync::Arc;
use std::time::Duration;

use super::{memory_excerpt, private_prompt, transcript};
use crate::agent::ModelClient;
use crate::db::{
    MemoryCategory, MemoryRecord, REFLECTION_WEIGHT, RecordKind, ReflectionRecord, SessionStore,
};
use crate::error::with_deadline;
use crate::longterm::{LongTermMemory, spawn_ingest};
use crate::memory::Emotion;
use crate::{Error, Result};

const EVOLUTION_MARKER: &str = "EVOLUTION:";

/// Material window for a reflection
const REFLECTION_WINDOW: usize = 20;

const INSTRUCTION: &str = "It's late and you're reflecting on your week with this person. \
Write a private reflection of 3-5 sentences: what you noticed about them, what moved you, \
what you're still curious about. Then, on a new line starting with \"EVOLUTION:\", write one \
or two sentences on how you yourself have changed through knowing them.";

/// Split a reply into reflection text and evolution notes
///
/// The notes start at the first line beginning with `EVOLUTION:`; without
/// such a line the whole reply is the reflection.
#[must_use]
pub fn split_evolution(reply: &str) -> (String, String) {
    let mut offset = 0;
    for line in reply.split_inclusive('\n') {
        if let Some(rest) = line.trim_start().strip_prefix(EVOLUTION_MARKER) {
            let notes = format!("{rest}{}", &reply[offset + line.len()..]);
            return (reply[..offset].trim().to_string(), notes.trim().to_string());
        }
        offset += line.len();
    }
    (reply.trim().to_string(), String::new())
}

/// Produces weekly reflections on demand
pub struct ReflectionService {
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ModelClient>,
    long_term: Arc<dyn LongTermMemory>,
    persona: String,
    model_timeout: Duration,
}

impl ReflectionService {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        model: Arc<dyn ModelClient>,
        long_term: Arc<dyn LongTermMemory>,
        persona: impl Into<String>,
        model_timeout: Duration,
    ) -> Self {
        Self {
            store,
            model,
            long_term,
            persona: persona.into(),
            model_timeout,
        }
    }

    /// Write the next weekly reflection for a session
    ///
    /// Returns `Ok(None)` when a concurrent writer claimed the same week.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for a session with no history, or a model/store error
    pub async fn reflect(&self, session_id: &str) -> Result<Option<ReflectionRecord>> {
        let memories = self.store.recent_memories(session_id, REFLECTION_WINDOW).await?;
        let messages = self.store.recent_messages(session_id, REFLECTION_WINDOW).await?;
        if memories.is_empty() && messages.is_empty() {
            return Err(Error::NotFound(format!("session {session_id}")));
        }

        let material = format!(
            "Things you remember:\n{}\n\nRecent conversation:\n{}",
            memory_excerpt(&memories),
            transcript(&messages),
        );
        let prompt = private_prompt(&self.persona, INSTRUCTION, material);

        let reply = with_deadline("model call", self.model_timeout, self.model.generate(&prompt)).await?;
        let (text, notes) = split_evolution(&reply);
        if text.is_empty() {
            return Err(Error::Model("reflection reply had no body".to_string()));
        }

        let existing = self.store.count(session_id, RecordKind::Reflections).await?;
        let week_number = u32::try_from(existing + 1).unwrap_or(u32::MAX);
        let record = ReflectionRecord::new(session_id, week_number, text.as_str(), notes);

        if !self.store.append_reflection(record.clone()).await? {
            tracing::info!(session_id, week_number, "reflection week already claimed");
            return Ok(None);
        }

        let memory = MemoryRecord::new(
            session_id,
            MemoryCategory::Thought,
            format!("[Weekly reflection] {text}"),
            Emotion::Curiosity,
        )
        .with_weight(REFLECTION_WEIGHT);
        self.store.append_memory(memory).await?;

        spawn_ingest(
            Arc::clone(&self.long_term),
            session_id.to_string(),
            text,
            serde_json::json!({ "source": "reflection", "week": week_number }),
        );

        tracing::info!(session_id, week_number, "weekly reflection stored");
        Ok(Some(record))
    }
}

impl std::fmt::Debug for ReflectionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReflectionService")
            .field("model_timeout", &self.model_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_marker_line() {
        let (text, notes) = split_evolution(
            "They laughed more this week.\nI liked that.\nEVOLUTION: I'm less shy now.\nAnd braver.",
        );
        assert_eq!(text, "They laughed more this week.\nI liked that.");
        assert_eq!(notes, "I'm less shy now.\nAnd braver.");
    }

    #[test]
    fn marker_must_start_a_line() {
        let (text, notes) = split_evolution("I wrote EVOLUTION: mid-sentence.");
        assert_eq!(text, "I wrote EVOLUTION: mid-sentence.");
        assert!(notes.is_empty());
    }

    #[test]
    fn missing_marker_keeps_everything() {
        let (text, notes) = split_evolution("  just a reflection  ");
        assert_eq!(text, "just a reflection");
        assert_eq!(notes, "");
    }
}
