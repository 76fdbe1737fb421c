//! Context assembler for a single conversational turn

use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Timelike};

use super::mood::Mood;
use crate::agent::ContextSegment;
use crate::db::{
    MemoryRecord, MemoryRepo, Message, MessageRole, ReflectionRecord, SessionStore, truncate_chars,
};
use crate::longterm::{LongTermMemory, search_or_empty};
use crate::Result;

/// Placeholder for an empty "what you know" sub-block
pub const NOTHING_YET: &str = "(nothing yet)";

/// Configuration for context assembly
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Messages fetched from history
    pub history_window: usize,
    /// Fetched messages replayed as dialogue turns
    pub prompt_history: usize,
    /// Recent memory records listed in the system segment
    pub memory_window: usize,
    /// Long-term search result cap
    pub search_limit: usize,
    /// Long-term similarity floor
    pub search_threshold: f32,
    /// Deadline for the long-term search
    pub search_timeout: Duration,
    /// Per-item cap for memories and search hits
    pub memory_chars: usize,
    /// Cap for the reflection excerpt
    pub reflection_chars: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_window: 40,
            prompt_history: 20,
            memory_window: 8,
            search_limit: 5,
            search_threshold: 0.3,
            search_timeout: Duration::from_secs(5),
            memory_chars: 200,
            reflection_chars: 400,
        }
    }
}

/// Assembles the ordered prompt for a turn
pub struct ContextAssembler {
    store: Arc<dyn SessionStore>,
    long_term: Arc<dyn LongTermMemory>,
    persona: String,
    config: ContextConfig,
}

impl ContextAssembler {
    /// Create a new assembler
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        long_term: Arc<dyn LongTermMemory>,
        persona: impl Into<String>,
        config: ContextConfig,
    ) -> Self {
        Self {
            store,
            long_term,
            persona: persona.into(),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Persona text that opens every system segment
    #[must_use]
    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Assemble using the local wall-clock hour for the mood
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails
    pub async fn assemble(&self, session_id: &str, user_text: &str) -> Result<Vec<ContextSegment>> {
        self.assemble_at(session_id, user_text, Local::now().hour()).await
    }

    /// Assemble for an explicit hour of day
    ///
    /// # Errors
    ///
    /// Returns error if the session store fails. Long-term search failures
    /// are logged and yield an empty eternal-memory block.
    pub async fn assemble_at(
        &self,
        session_id: &str,
        user_text: &str,
        hour: u32,
    ) -> Result<Vec<ContextSegment>> {
        let history = self
            .store
            .recent_messages(session_id, self.config.history_window)
            .await?;
        let memories = self
            .store
            .recent_memories(session_id, self.config.memory_window)
            .await?;
        let reflection = self.store.latest_reflection(session_id).await?;
        let hits = search_or_empty(
            self.long_term.as_ref(),
            session_id,
            user_text,
            self.config.search_limit,
            self.config.search_threshold,
            self.config.search_timeout,
        )
        .await;

        tracing::debug!(
            session_id,
            history = history.len(),
            memories = memories.len(),
            hits = hits.len(),
            reflection = reflection.is_some(),
            "assembled context"
        );

        let system = self.system_prompt(&memories, &hits, reflection.as_ref(), Mood::for_hour(hour));

        let skip = history.len().saturating_sub(self.config.prompt_history);
        let mut segments = Vec::with_capacity(history.len() - skip + 2);
        segments.push(ContextSegment::system(system));
        segments.extend(history.iter().skip(skip).map(history_segment));
        segments.push(ContextSegment::user(user_text));

        Ok(segments)
    }

    fn system_prompt(
        &self,
        memories: &[MemoryRecord],
        hits: &[String],
        reflection: Option<&ReflectionRecord>,
        mood: Mood,
    ) -> String {
        let mut out = String::new();

        if !self.persona.is_empty() {
            out.push_str(self.persona.trim_end());
            out.push_str("\n\n");
        }

        out.push_str("<what-you-know>\n");
        out.push_str(&self.knowledge_block(memories, hits, reflection));
        out.push_str("</what-you-know>\n\n");

        let _ = write!(out, "<mood>\n{}\n</mood>", mood.annotation());
        out
    }

    /// The "what you know" block: eternal memory, recent memories, reflection
    fn knowledge_block(
        &self,
        memories: &[MemoryRecord],
        hits: &[String],
        reflection: Option<&ReflectionRecord>,
    ) -> String {
        let cap = self.config.memory_chars;
        let mut out = String::from("Eternal memory:\n");

        if hits.is_empty() {
            let _ = writeln!(out, "{NOTHING_YET}");
        } else {
            for hit in hits {
                let _ = writeln!(out, "- {}", truncate_chars(hit, cap));
            }
        }

        out.push_str("\nRecent memories:\n");
        if memories.is_empty() {
            let _ = writeln!(out, "{NOTHING_YET}");
        } else {
            out.push_str(&MemoryRepo::format_for_prompt(memories, cap));
        }

        out.push_str("\nLatest reflection:\n");
        match reflection {
            Some(r) => {
                let _ = writeln!(
                    out,
                    "(week {}) {}",
                    r.week_number,
                    truncate_chars(&r.reflection_text, self.config.reflection_chars)
                );
            }
            None => {
                let _ = writeln!(out, "{NOTHING_YET}");
            }
        }

        out
    }
}

fn history_segment(message: &Message) -> ContextSegment {
    match message.role {
        MessageRole::User => ContextSegment::user(message.content.clone()),
        MessageRole::Agent => ContextSegment::agent(message.content.clone()),
    }
}

impl std::fmt::Debug for ContextAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAssembler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
