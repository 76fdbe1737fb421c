//! TOML configuration file loading
//!
//! Supports `~/.config/sam/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct SamConfigFile {
    /// Path to a persona text file
    #[serde(default)]
    pub persona: Option<String>,

    #[serde(default)]
    pub server: ServerFileConfig,

    #[serde(default)]
    pub model: ModelFileConfig,

    #[serde(default)]
    pub embedding: EmbeddingFileConfig,

    #[serde(default)]
    pub context: ContextFileConfig,

    #[serde(default)]
    pub rumination: RuminationFileConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatFileConfig,

    #[serde(default)]
    pub store: StoreFileConfig,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// API server port
    pub port: Option<u16>,

    /// Directory holding the database
    pub data_dir: Option<String>,
}

/// Chat model configuration
#[derive(Debug, Default, Deserialize)]
pub struct ModelFileConfig {
    /// `OpenAI`-compatible base URL (e.g. "https://api.openai.com/v1")
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Model identifier
    pub name: Option<String>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
}

/// Embedding (long-term memory) configuration
#[derive(Debug, Default, Deserialize)]
pub struct EmbeddingFileConfig {
    pub base_url: Option<String>,
    /// Without a key long-term memory is disabled
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub search_limit: Option<usize>,
    pub search_threshold: Option<f32>,
    pub search_timeout_secs: Option<u64>,
    /// Newest entries scored per search
    pub candidate_window: Option<usize>,
}

/// Context window sizes
#[derive(Debug, Default, Deserialize)]
pub struct ContextFileConfig {
    pub history_window: Option<usize>,
    pub prompt_history: Option<usize>,
    pub memory_window: Option<usize>,
}

/// Rumination loop timing
#[derive(Debug, Default, Deserialize)]
pub struct RuminationFileConfig {
    pub startup_delay_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub recency_cutoff_hours: Option<u64>,
    pub inter_session_delay_secs: Option<u64>,
}

/// Heartbeat loop timing
#[derive(Debug, Default, Deserialize)]
pub struct HeartbeatFileConfig {
    pub startup_delay_secs: Option<u64>,
    pub interval_secs: Option<u64>,
    pub silence_floor_minutes: Option<i64>,
    pub inter_session_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StoreFileConfig {
    pub timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `SamConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> SamConfigFile {
    config_file_path().map_or_else(SamConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_config_file_from(path: &Path) -> SamConfigFile {
    if !path.exists() {
        return SamConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                SamConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            SamConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/sam/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("sam").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_overlays_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
persona = "/etc/sam/persona.txt"

[server]
port = 9000

[heartbeat]
silence_floor_minutes = 45
"#
        )
        .unwrap();

        let config = load_config_file_from(file.path());
        assert_eq!(config.persona.as_deref(), Some("/etc/sam/persona.txt"));
        assert_eq!(config.server.port, Some(9000));
        assert_eq!(config.heartbeat.silence_floor_minutes, Some(45));
        assert!(config.model.base_url.is_none());
        assert!(config.rumination.interval_secs.is_none());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = nope").unwrap();

        let config = load_config_file_from(file.path());
        assert!(config.server.port.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let config = load_config_file_from(Path::new("/nonexistent/sam/config.toml"));
        assert!(config.persona.is_none());
    }
}
