//! YAML configuration
//!
//! Every field has a default so an absent or partial `config.yaml` is valid.
//! Secrets never live in the YAML: the completion API key is read from the
//! environment, then from a `.env` file beside the config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::fetch::{HostAllowList, DEFAULT_ALLOWED_HOSTS};
use crate::transcript::{Host, SpeakerRoster};

pub const APP_DIR: &str = "hallway-ingest";
const CONFIG_FILE: &str = "config.yaml";
const DATABASE_FILE: &str = "hallway.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    pub feed_url: String,
    pub show_name: String,
    pub allowed_hosts: Vec<String>,
    /// First entry is the primary host.
    pub hosts: Vec<Host>,
    /// Local hour (0-23) of the daily feed sync in `watch` mode.
    pub sync_hour: u32,
    pub completion: CompletionConfig,
    pub summarization: SummarizationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_data_dir().join(DATABASE_FILE),
            feed_url: "https://feeds.transistor.fm/hallway-chat".to_string(),
            show_name: "Hallway Chat".to_string(),
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
            hosts: SpeakerRoster::default().hosts,
            sync_hour: 1,
            completion: CompletionConfig::default(),
            summarization: SummarizationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    pub provider: CompletionProvider,
    pub model: String,
    pub base_url: String,
    /// Name of the environment / `.env` variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: CompletionProvider::OpenAi,
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 500,
            temperature: 0.3,
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationConfig {
    /// Chapters summarized concurrently per group.
    pub batch_size: usize,
    pub max_transcript_chars: usize,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_transcript_chars: crate::transcript::MAX_TRANSCRIPT_CHARS,
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

impl Config {
    /// Load from `path`, or the default location. A missing file yields defaults;
    /// a present but malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config = Self::from_yaml(&content)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, AppError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.summarization.batch_size == 0 {
            return Err(AppError::Config(
                "summarization.batch_size must be at least 1".to_string(),
            ));
        }
        if self.summarization.max_transcript_chars == 0 {
            return Err(AppError::Config(
                "summarization.max_transcript_chars must be at least 1".to_string(),
            ));
        }
        if self.sync_hour > 23 {
            return Err(AppError::Config(format!(
                "sync_hour must be 0-23, got {}",
                self.sync_hour
            )));
        }
        Ok(())
    }

    pub fn allow_list(&self) -> HostAllowList {
        HostAllowList::new(self.allowed_hosts.iter().cloned())
    }

    pub fn roster(&self) -> SpeakerRoster {
        if self.hosts.is_empty() {
            SpeakerRoster::default()
        } else {
            SpeakerRoster {
                hosts: self
                    .hosts
                    .iter()
                    .map(|h| Host::new(&h.key, &h.display_name))
                    .collect(),
            }
        }
    }

    /// API key from the process environment, else from `.env` in `env_dir`.
    pub fn completion_api_key(&self, env_dir: &Path) -> Option<String> {
        let key = &self.completion.api_key_env;
        if let Ok(value) = std::env::var(key) {
            if !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
        let value = load_env_value(env_dir, key);
        if value.is_some() {
            log::info!("Completion API key loaded from .env ({})", key);
        }
        value
    }
}

/// Read `key` from a `.env` file in `dir`. Quotes around the value are stripped.
pub fn load_env_value(dir: &Path, key: &str) -> Option<String> {
    let content = std::fs::read_to_string(dir.join(".env")).ok()?;
    let prefix = format!("{}=", key);
    content.lines().find_map(|line| {
        let value = line
            .trim()
            .strip_prefix(&prefix)?
            .trim()
            .trim_matches('"')
            .trim_matches('\'');
        (!value.is_empty()).then(|| value.to_string())
    })
}
