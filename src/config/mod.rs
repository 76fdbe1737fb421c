//! Configuration management for the companion gateway

pub mod file;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::context::ContextConfig;
use crate::db::embedder::DEFAULT_EMBEDDING_MODEL;
use crate::inner_life::{HeartbeatConfig, RuminationConfig};
use crate::{Error, Persona, Result};

/// Default API server port
pub const DEFAULT_PORT: u16 = 8001;

/// Default `OpenAI`-compatible endpoint
pub const DEFAULT_MODEL_URL: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Long-term entries scored per search
pub const DEFAULT_CANDIDATE_WINDOW: usize = 500;

/// Companion gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Persona text that opens every prompt
    pub persona: Persona,

    /// Path to data directory (database)
    pub data_dir: PathBuf,

    /// HTTP API server configuration
    pub api_server: ApiServerConfig,

    /// Chat model collaborator
    pub model: ModelConfig,

    /// Long-term memory collaborator; `None` when no key is configured
    pub embedding: Option<EmbeddingConfig>,

    /// Context assembly windows
    pub context: ContextConfig,

    pub rumination: RuminationConfig,

    pub heartbeat: HeartbeatConfig,

    /// Deadline for a single store call
    pub store_timeout: Duration,
}

/// HTTP API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,
}

/// Chat model settings
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub name: String,
    pub timeout: Duration,
    pub max_tokens: Option<u32>,
}

/// Embedding settings for long-term memory
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    /// Newest entries scored per search
    pub candidate_window: usize,
}

/// Read and parse an environment variable, ignoring unparsable values
fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment variable");
            None
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

const fn secs(value: u64) -> Duration {
    Duration::from_secs(value)
}

/// Default data directory (`~/.local/share/sam` on Linux)
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(|| PathBuf::from(".sam"), |d| d.data_dir().join("sam"))
}

impl Config {
    /// Load configuration: environment over the TOML file over defaults
    ///
    /// # Errors
    ///
    /// Returns error if a configured persona file cannot be read
    pub fn load() -> Result<Self> {
        Self::from_file(file::load_config_file())
    }

    /// Build configuration from an already loaded file overlay
    ///
    /// # Errors
    ///
    /// Returns error if a configured persona file cannot be read
    pub fn from_file(fc: file::SamConfigFile) -> Result<Self> {
        // Persona (env > toml > built-in)
        let persona = match env_string("SAM_PERSONA_FILE").or(fc.persona) {
            Some(path) => Persona::from_file(&path)?,
            None => Persona::default(),
        };

        let data_dir = env_string("SAM_DATA_DIR")
            .or(fc.server.data_dir)
            .map_or_else(default_data_dir, PathBuf::from);

        let api_server = ApiServerConfig {
            port: env_parse("SAM_PORT")
                .or_else(|| env_parse("PORT"))
                .or(fc.server.port)
                .unwrap_or(DEFAULT_PORT),
            cors_origins: env_string("SAM_CORS_ORIGINS")
                .unwrap_or_else(|| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let model = ModelConfig {
            base_url: env_string("SAM_MODEL_URL")
                .or(fc.model.base_url)
                .unwrap_or_else(|| DEFAULT_MODEL_URL.to_string()),
            api_key: env_string("SAM_MODEL_API_KEY")
                .or_else(|| env_string("OPENAI_API_KEY"))
                .or(fc.model.api_key),
            name: env_string("SAM_MODEL")
                .or(fc.model.name)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: secs(
                env_parse("SAM_MODEL_TIMEOUT_SECS")
                    .or(fc.model.timeout_secs)
                    .unwrap_or(60),
            ),
            max_tokens: env_parse("SAM_MODEL_MAX_TOKENS").or(fc.model.max_tokens),
        };

        let embedding_key = env_string("SAM_EMBEDDING_API_KEY")
            .or(fc.embedding.api_key)
            .or_else(|| model.api_key.clone());
        let embedding = embedding_key.map(|api_key| EmbeddingConfig {
            base_url: env_string("SAM_EMBEDDING_URL")
                .or(fc.embedding.base_url)
                .unwrap_or_else(|| model.base_url.clone()),
            api_key,
            model: env_string("SAM_EMBEDDING_MODEL")
                .or(fc.embedding.model)
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            timeout: secs(fc.embedding.timeout_secs.unwrap_or(30)),
            candidate_window: env_parse("SAM_EMBEDDING_WINDOW")
                .or(fc.embedding.candidate_window)
                .unwrap_or(DEFAULT_CANDIDATE_WINDOW),
        });

        let context_defaults = ContextConfig::default();
        let context = ContextConfig {
            history_window: env_parse("SAM_HISTORY_WINDOW")
                .or(fc.context.history_window)
                .unwrap_or(context_defaults.history_window),
            prompt_history: env_parse("SAM_PROMPT_HISTORY")
                .or(fc.context.prompt_history)
                .unwrap_or(context_defaults.prompt_history),
            memory_window: env_parse("SAM_MEMORY_WINDOW")
                .or(fc.context.memory_window)
                .unwrap_or(context_defaults.memory_window),
            search_limit: env_parse("SAM_SEARCH_LIMIT")
                .or(fc.embedding.search_limit)
                .unwrap_or(context_defaults.search_limit),
            search_threshold: env_parse("SAM_SEARCH_THRESHOLD")
                .or(fc.embedding.search_threshold)
                .unwrap_or(context_defaults.search_threshold),
            search_timeout: fc
                .embedding
                .search_timeout_secs
                .map_or(context_defaults.search_timeout, secs),
            ..context_defaults
        };

        let rumination_defaults = RuminationConfig::default();
        let rumination = RuminationConfig {
            startup_delay: env_parse("SAM_RUMINATION_STARTUP_SECS")
                .or(fc.rumination.startup_delay_secs)
                .map_or(rumination_defaults.startup_delay, secs),
            interval: env_parse("SAM_RUMINATION_INTERVAL_SECS")
                .or(fc.rumination.interval_secs)
                .map_or(rumination_defaults.interval, secs),
            recency_cutoff: env_parse::<u64>("SAM_RECENCY_CUTOFF_HOURS")
                .or(fc.rumination.recency_cutoff_hours)
                .map_or(rumination_defaults.recency_cutoff, |h| secs(h * 3600)),
            inter_session_delay: env_parse("SAM_INTER_SESSION_DELAY_SECS")
                .or(fc.rumination.inter_session_delay_secs)
                .map_or(rumination_defaults.inter_session_delay, secs),
            model_timeout: model.timeout,
            ..rumination_defaults
        };

        let heartbeat_defaults = HeartbeatConfig::default();
        let heartbeat = HeartbeatConfig {
            startup_delay: env_parse("SAM_HEARTBEAT_STARTUP_SECS")
                .or(fc.heartbeat.startup_delay_secs)
                .map_or(heartbeat_defaults.startup_delay, secs),
            interval: env_parse("SAM_HEARTBEAT_INTERVAL_SECS")
                .or(fc.heartbeat.interval_secs)
                .map_or(heartbeat_defaults.interval, secs),
            silence_floor_minutes: env_parse("SAM_SILENCE_FLOOR_MINUTES")
                .or(fc.heartbeat.silence_floor_minutes)
                .unwrap_or(heartbeat_defaults.silence_floor_minutes),
            inter_session_delay: env_parse("SAM_INTER_SESSION_DELAY_SECS")
                .or(fc.heartbeat.inter_session_delay_secs)
                .map_or(heartbeat_defaults.inter_session_delay, secs),
            model_timeout: model.timeout,
            ..heartbeat_defaults
        };

        let store_timeout = secs(
            env_parse("SAM_STORE_TIMEOUT_SECS")
                .or(fc.store.timeout_secs)
                .unwrap_or(10),
        );

        let config = Self {
            persona,
            data_dir,
            api_server,
            model,
            embedding,
            context,
            rumination,
            heartbeat,
            store_timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the loops and assembler cannot work with
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending setting
    pub fn validate(&self) -> Result<()> {
        if self.context.prompt_history > self.context.history_window {
            return Err(Error::Config(format!(
                "prompt history ({}) exceeds history window ({})",
                self.context.prompt_history, self.context.history_window
            )));
        }
        if self.rumination.interval.is_zero() || self.heartbeat.interval.is_zero() {
            return Err(Error::Config("loop intervals must be non-zero".to_string()));
        }
        if self.heartbeat.silence_floor_minutes < 0 {
            return Err(Error::Config("silence floor must not be negative".to_string()));
        }
        Ok(())
    }

    /// Path of the `SQLite` database inside the data directory
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("sam.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_with(toml_src: &str) -> file::SamConfigFile {
        toml::from_str(toml_src).unwrap()
    }

    #[test]
    fn file_values_override_defaults() {
        let config = Config::from_file(file_with(
            r#"
[server]
port = 9100
data_dir = "/tmp/sam-test"

[context]
history_window = 30
prompt_history = 10

[heartbeat]
silence_floor_minutes = 45
interval_secs = 600
"#,
        ))
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/sam-test"));
        assert_eq!(config.db_path(), PathBuf::from("/tmp/sam-test/sam.db"));
        assert_eq!(config.context.history_window, 30);
        assert_eq!(config.context.prompt_history, 10);
        assert_eq!(config.context.memory_window, 8);
        assert_eq!(config.heartbeat.silence_floor_minutes, 45);
        assert_eq!(config.heartbeat.interval, Duration::from_secs(600));
        assert_eq!(config.rumination.interval, Duration::from_secs(12 * 60));
    }

    #[test]
    fn embedding_window_from_file() {
        let config = Config::from_file(file_with(
            r#"
[embedding]
api_key = "sk-test"
candidate_window = 50
"#,
        ))
        .unwrap();

        let embedding = config.embedding.unwrap();
        assert_eq!(embedding.candidate_window, 50);
        assert_eq!(embedding.timeout, Duration::from_secs(30));
    }

    #[test]
    fn prompt_history_cannot_exceed_window() {
        let err = Config::from_file(file_with(
            r"
[context]
history_window = 5
prompt_history = 10
",
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_persona_file_is_an_error() {
        let err = Config::from_file(file_with(r#"persona = "/nonexistent/persona.txt""#)).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
