//! Daemon - the main gateway service
//!
//! Wires the store, model, long-term memory and connection registry into the
//! API server and the two background loops, then runs until ctrl-c.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{ChatService, ModelClient, OpenAiChatClient};
use crate::api::ApiServerBuilder;
use crate::context::ContextAssembler;
use crate::db::{self, DbPool, Embedder, SessionStore, SqliteStore};
use crate::inner_life::{Heartbeat, ReflectionService, Rumination};
use crate::live::ConnectionRegistry;
use crate::longterm::{EmbeddingMemory, LongTermMemory, NoopMemory};
use crate::memory::{EmotionClassifier, KeywordClassifier, MemoryExtractor};
use crate::{Config, Error, Result};

/// Collaborators shared by the API server and the loops
pub struct Services {
    pub store: Arc<dyn SessionStore>,
    pub registry: ConnectionRegistry,
    pub chat: Arc<ChatService>,
    pub reflection: Arc<ReflectionService>,
    pub rumination: Arc<Rumination>,
    pub heartbeat: Arc<Heartbeat>,
}

/// Handles of the background loops, owned by the daemon
pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    /// Spawn rumination and heartbeat under a child of `parent`
    #[must_use]
    pub fn spawn(services: &Services, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        let handles = vec![
            (
                "rumination",
                tokio::spawn(Arc::clone(&services.rumination).run(cancel.clone())),
            ),
            (
                "heartbeat",
                tokio::spawn(Arc::clone(&services.heartbeat).run(cancel.clone())),
            ),
        ];
        Self { cancel, handles }
    }

    /// Cancel the loops and wait for them to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                tracing::warn!(task = name, error = %e, "background task ended abnormally");
            }
        }
        tracing::info!("background tasks stopped");
    }
}

/// The companion daemon
pub struct Daemon {
    config: Config,
    db: DbPool,
}

impl Daemon {
    /// Create a new daemon instance, opening the database
    ///
    /// # Errors
    ///
    /// Returns error if the data directory or database cannot be initialized
    pub fn new(config: Config) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let db_path = config.db_path();
        let db = db::init(&db_path)?;

        tracing::info!(path = %db_path.display(), "database opened");

        Ok(Self { config, db })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Build the shared collaborators
    ///
    /// # Errors
    ///
    /// Returns error if an HTTP client cannot be built
    pub fn services(&self) -> Result<Services> {
        let config = &self.config;
        let store: Arc<dyn SessionStore> =
            Arc::new(SqliteStore::new(self.db.clone(), config.store_timeout));

        if config.model.api_key.is_none() {
            tracing::warn!(url = %config.model.base_url, "no model API key configured");
        }
        let model_client = OpenAiChatClient::new(
            &config.model.base_url,
            config.model.api_key.clone(),
            config.model.name.clone(),
            config.model.timeout,
        )?;
        let model_client = match config.model.max_tokens {
            Some(max_tokens) => model_client.with_max_tokens(max_tokens),
            None => model_client,
        };
        let model: Arc<dyn ModelClient> = Arc::new(model_client);

        let long_term = self.long_term()?;
        let classifier: Arc<dyn EmotionClassifier> = Arc::new(KeywordClassifier);
        let registry = ConnectionRegistry::new();
        let persona = config.persona.prompt().to_string();

        let assembler = Arc::new(ContextAssembler::new(
            Arc::clone(&store),
            Arc::clone(&long_term),
            persona.as_str(),
            config.context.clone(),
        ));
        let chat = Arc::new(ChatService::new(
            Arc::clone(&store),
            Arc::clone(&model),
            Arc::clone(&long_term),
            assembler,
            MemoryExtractor::new(Arc::clone(&classifier)),
            config.model.timeout,
        ));
        let reflection = Arc::new(ReflectionService::new(
            Arc::clone(&store),
            Arc::clone(&model),
            Arc::clone(&long_term),
            persona.as_str(),
            config.model.timeout,
        ));
        let rumination = Arc::new(Rumination::new(
            Arc::clone(&store),
            Arc::clone(&model),
            Arc::clone(&long_term),
            persona.as_str(),
            config.rumination.clone(),
        ));
        let heartbeat = Arc::new(Heartbeat::new(
            Arc::clone(&store),
            model,
            long_term,
            classifier,
            registry.clone(),
            persona,
            config.heartbeat.clone(),
        ));

        Ok(Services {
            store,
            registry,
            chat,
            reflection,
            rumination,
            heartbeat,
        })
    }

    fn long_term(&self) -> Result<Arc<dyn LongTermMemory>> {
        let Some(embedding) = &self.config.embedding else {
            tracing::info!("long-term memory disabled - no embedding key configured");
            return Ok(Arc::new(NoopMemory));
        };

        let embedder = Embedder::new(
            &embedding.base_url,
            embedding.api_key.clone(),
            embedding.model.clone(),
            embedding.timeout,
        )?;
        tracing::info!(model = %embedding.model, "long-term memory enabled");
        Ok(Arc::new(EmbeddingMemory::new(
            embedder,
            self.db.clone(),
            embedding.candidate_window,
        )))
    }

    /// Run the API server and background loops until ctrl-c
    ///
    /// # Errors
    ///
    /// Returns error if the server cannot bind or collaborators cannot be built
    pub async fn run(self) -> Result<()> {
        let services = self.services()?;
        let shutdown = CancellationToken::new();

        tracing::info!(
            port = self.config.api_server.port,
            persona = self.config.persona.name(),
            model = %self.config.model.name,
            "daemon running"
        );

        let tasks = BackgroundTasks::spawn(&services, &shutdown);

        let server = ApiServerBuilder::new(
            Arc::clone(&services.store),
            services.registry.clone(),
            Arc::clone(&services.chat),
            Arc::clone(&services.reflection),
        )
        .port(self.config.api_server.port)
        .cors_origins(self.config.api_server.cors_origins.clone())
        .build();

        // Set up shutdown signal
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("shutdown requested");
                    signal.cancel();
                }
                Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c"),
            }
        });

        let result = server.run(shutdown.clone()).await;
        if let Err(ref e) = result {
            tracing::error!(error = %e, "API server failed");
        }

        shutdown.cancel();
        tasks.shutdown().await;

        tracing::info!("daemon stopped");
        result
    }
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("data_dir", &self.config.data_dir)
            .finish_non_exhaustive()
    }
}

/// Open the configured database without starting anything
///
/// # Errors
///
/// Returns error if the database cannot be opened
pub fn open_store(config: &Config) -> Result<Arc<dyn SessionStore>> {
    let path = config.db_path();
    if !path.exists() {
        return Err(Error::NotFound(format!("database {}", path.display())));
    }
    let pool = db::init(&path)?;
    Ok(Arc::new(SqliteStore::new(pool, config.store_timeout)))
}
