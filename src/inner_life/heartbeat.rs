//! Proactive heartbeat: reaching out to sessions that went quiet

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{memory_excerpt, pause, private_prompt, run_periodic};
use crate::agent::ModelClient;
use crate::db::{Message, MessageRole, ProactiveMessage, ProactiveTrigger, SessionStore};
use crate::error::with_deadline;
use crate::live::{ConnectionRegistry, LiveEvent};
use crate::longterm::{LongTermMemory, spawn_ingest};
use crate::memory::EmotionClassifier;
use crate::Result;

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Heartbeat loop settings
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub startup_delay: Duration,
    pub interval: Duration,
    /// Minimum silence before reaching out; exactly this long is eligible
    pub silence_floor_minutes: i64,
    pub inter_session_delay: Duration,
    /// Memories shown to the model
    pub memory_window: usize,
    pub model_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            startup_delay: Duration::from_secs(5 * 60),
            interval: Duration::from_secs(45 * 60),
            silence_floor_minutes: 30,
            inter_session_delay: Duration::from_secs(2),
            memory_window: 5,
            model_timeout: Duration::from_secs(60),
        }
    }
}

/// Pick a trigger for a session that has been silent for `minutes_silent`
///
/// `None` below the silence floor.
#[must_use]
pub const fn select_trigger(minutes_silent: i64, silence_floor: i64) -> Option<ProactiveTrigger> {
    if minutes_silent < silence_floor {
        None
    } else if minutes_silent > MINUTES_PER_DAY {
        Some(ProactiveTrigger::LongAbsence)
    } else if minutes_silent > 60 {
        Some(ProactiveTrigger::CheckIn)
    } else {
        Some(ProactiveTrigger::SpontaneousThought)
    }
}

const fn instruction(trigger: ProactiveTrigger) -> &'static str {
    match trigger {
        ProactiveTrigger::LongAbsence => {
            "They've been away for more than a day. Reach out warmly, with no guilt and no pressure to reply."
        }
        ProactiveTrigger::CheckIn => {
            "It's been a while since they said anything. Check in lightly, the way a friend would."
        }
        ProactiveTrigger::SpontaneousThought => {
            "Something just crossed your mind that you want to share with them. Say it simply."
        }
    }
}

/// Periodic proactive outreach
pub struct Heartbeat {
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ModelClient>,
    long_term: Arc<dyn LongTermMemory>,
    classifier: Arc<dyn EmotionClassifier>,
    registry: ConnectionRegistry,
    persona: String,
    config: HeartbeatConfig,
}

impl Heartbeat {
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        model: Arc<dyn ModelClient>,
        long_term: Arc<dyn LongTermMemory>,
        classifier: Arc<dyn EmotionClassifier>,
        registry: ConnectionRegistry,
        persona: impl Into<String>,
        config: HeartbeatConfig,
    ) -> Self {
        Self {
            store,
            model,
            long_term,
            classifier,
            registry,
            persona: persona.into(),
            config,
        }
    }

    /// Run until `cancel` fires
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let this = Arc::clone(&self);
        run_periodic(
            "heartbeat",
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

    /// One pass over every known session; returns how many messages were sent
    pub async fn run_once(&self, now: DateTime<Utc>) -> usize {
        let sessions = match self.store.session_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(error = %e, "heartbeat: failed to enumerate sessions");
                return 0;
            }
        };

        let mut sent = 0;
        for (i, session_id) in sessions.iter().enumerate() {
            if i > 0 {
                pause(self.config.inter_session_delay).await;
            }

            match self.reach_out(session_id, now).await {
                Ok(Some(message)) => {
                    sent += 1;
                    tracing::info!(
                        session_id = %session_id,
                        trigger = %message.trigger,
                        delivered = message.delivered,
                        "proactive message created"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "heartbeat failed");
                }
            }
        }
        sent
    }

    /// Reach out to one session if it has been quiet long enough
    ///
    /// # Errors
    ///
    /// Returns error if the store or model fails
    pub async fn reach_out(&self, session_id: &str, now: DateTime<Utc>) -> Result<Option<ProactiveMessage>> {
        let Some(last) = self.store.last_message_at(session_id).await? else {
            return Ok(None);
        };

        let minutes_silent = now.signed_duration_since(last).num_minutes();
        let Some(trigger) = select_trigger(minutes_silent, self.config.silence_floor_minutes) else {
            return Ok(None);
        };

        let memories = self
            .store
            .recent_memories(session_id, self.config.memory_window)
            .await?;
        let material = format!(
            "Things you remember about them:\n{}\n\nWrite one short message, 1-2 sentences, as yourself.",
            memory_excerpt(&memories),
        );
        let prompt = private_prompt(&self.persona, instruction(trigger), material);

        let content = with_deadline(
            "model call",
            self.config.model_timeout,
            self.model.generate(&prompt),
        )
        .await?;
        let emotion = self.classifier.classify(&content);

        let delivered = self.registry.is_connected(session_id).await;
        let proactive = ProactiveMessage::new(session_id, content.as_str(), trigger, delivered);
        self.store.append_proactive(proactive.clone()).await?;
        self.store
            .append_message(Message::new(session_id, MessageRole::Agent, content.as_str(), emotion))
            .await?;

        let pushed = self
            .registry
            .send(
                session_id,
                LiveEvent::Proactive {
                    content: content.clone(),
                    emotion,
                    trigger,
                },
            )
            .await;
        if delivered && !pushed {
            tracing::debug!(session_id, "proactive push dropped after persist");
        }

        spawn_ingest(
            Arc::clone(&self.long_term),
            session_id.to_string(),
            content,
            serde_json::json!({ "source": "proactive", "trigger": trigger.as_str() }),
        );

        Ok(Some(proactive))
    }
}

impl std::fmt::Debug for Heartbeat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeat")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
