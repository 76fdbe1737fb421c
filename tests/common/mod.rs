//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sam_companion::agent::{ChatService, ContextSegment, ModelClient};
use sam_companion::api::ApiState;
use sam_companion::context::{ContextAssembler, ContextConfig};
use sam_companion::db::{self, SessionStore, SqliteStore};
use sam_companion::inner_life::ReflectionService;
use sam_companion::live::ConnectionRegistry;
use sam_companion::longterm::{LongTermMemory, NoopMemory};
use sam_companion::memory::MemoryExtractor;
use sam_companion::{Error, Result};

pub const PERSONA: &str = "You are Sam.";

/// Set up a store over an in-memory database
#[must_use]
pub fn setup_store() -> Arc<dyn SessionStore> {
    let pool = db::init_memory().expect("failed to init test db");
    Arc::new(SqliteStore::new(pool, Duration::from_secs(10)))
}

/// Model that plays back queued replies and records every prompt
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String>>>,
    fallback: String,
    prompts: Mutex<Vec<Vec<ContextSegment>>>,
}

impl ScriptedModel {
    pub fn new(fallback: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn push_reply(&self, reply: &str) {
        self.replies.lock().unwrap().push_back(Ok(reply.to_string()));
    }

    pub fn push_failure(&self) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Err(Error::Model("scripted failure".to_string())));
    }

    pub fn prompts(&self) -> Vec<Vec<ContextSegment>> {
        self.prompts.lock().unwrap().clone()
    }

    /// System segment of the most recent prompt
    pub fn last_system(&self) -> String {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .and_then(|p| p.first())
            .map(|s| s.content.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, segments: &[ContextSegment]) -> Result<String> {
        self.prompts.lock().unwrap().push(segments.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Long-term memory that fails every call
pub struct FailingMemory;

#[async_trait]
impl LongTermMemory for FailingMemory {
    async fn ingest(&self, _session_id: &str, _text: &str, _metadata: serde_json::Value) -> Result<()> {
        Err(Error::LongTermMemory("ingest unavailable".to_string()))
    }

    async fn search(
        &self,
        _session_id: &str,
        _query: &str,
        _limit: usize,
        _threshold: f32,
    ) -> Result<Vec<String>> {
        Err(Error::LongTermMemory("search unavailable".to_string()))
    }
}

/// Chat service over the given collaborators with default windows
pub fn chat_service(
    store: &Arc<dyn SessionStore>,
    model: Arc<dyn ModelClient>,
    long_term: Arc<dyn LongTermMemory>,
) -> ChatService {
    let assembler = Arc::new(ContextAssembler::new(
        Arc::clone(store),
        Arc::clone(&long_term),
        PERSONA,
        ContextConfig::default(),
    ));
    ChatService::new(
        Arc::clone(store),
        model,
        long_term,
        assembler,
        MemoryExtractor::default(),
        Duration::from_secs(5),
    )
}

/// API state over an in-memory store and the given model
pub fn api_state(store: &Arc<dyn SessionStore>, model: Arc<dyn ModelClient>) -> Arc<ApiState> {
    let long_term: Arc<dyn LongTermMemory> = Arc::new(NoopMemory);
    let chat = chat_service(store, Arc::clone(&model), Arc::clone(&long_term));
    let reflection = ReflectionService::new(
        Arc::clone(store),
        model,
        long_term,
        PERSONA,
        Duration::from_secs(5),
    );
    Arc::new(ApiState {
        store: Arc::clone(store),
        registry: ConnectionRegistry::new(),
        chat: Arc::new(chat),
        reflection: Arc::new(reflection),
    })
}
