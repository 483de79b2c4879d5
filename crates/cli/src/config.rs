//! Configuration loading from switchyard.toml.

use orchestrator::{GenerationConfig, HttpConfig, LoopConfig, PollConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// System prompt for chat sessions.
    pub system: Option<String>,

    /// Conversational model used by `chat`.
    pub endpoint: EndpointConfig,

    /// Run service used by `run`.
    pub jobs: EndpointConfig,

    #[serde(rename = "loop")]
    pub tool_loop: LoopConfig,

    pub poll: PollConfig,

    /// Overrides `loop.generation` when set.
    pub generation: Option<GenerationConfig>,

    pub journal: JournalConfig,

    pub logging: LoggingConfig,
}

/// Where an HTTP endpoint lives and how to authenticate.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,
    pub headers: BTreeMap<String, String>,
}

impl EndpointConfig {
    /// Resolve into an [`HttpConfig`], reading the token from the environment.
    pub fn http_config(&self, section: &str) -> Result<HttpConfig, ConfigError> {
        let base_url = self
            .base_url
            .clone()
            .ok_or_else(|| ConfigError::Missing(format!("{section}.base_url")))?;

        let mut config = HttpConfig::new(base_url);
        if let Some(var) = &self.token_env {
            let token = std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.clone()))?;
            config = config.with_token(token);
        }
        config.headers = self.headers.clone();
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Defaults to `events.db` under the platform data directory.
    pub path: Option<PathBuf>,
}

impl JournalConfig {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            data_dir()
                .unwrap_or_else(|| ".switchyard".into())
                .join("events.db")
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config
            .loop_config()
            .validate()
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(config)
    }

    /// Loop settings with the top-level `[generation]` table folded in.
    pub fn loop_config(&self) -> LoopConfig {
        let mut config = self.tool_loop.clone();
        if let Some(generation) = &self.generation {
            config.generation = Some(generation.clone());
        }
        config
    }
}

fn data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/switchyard"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("switchyard"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("switchyard"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("missing config value: {0}")]
    Missing(String),

    #[error("environment variable {0} is not set")]
    MissingEnv(String),
}
