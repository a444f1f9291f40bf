//! Configuration loading, validation, and management for DawnAgent.
//!
//! Loads configuration from `~/.dawnagent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Memory document filename inside the agent directory.
pub const MEMORY_FILE: &str = "memory.md";

/// The root configuration structure.
///
/// Maps directly to `~/.dawnagent/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the six template documents
    #[serde(default = "default_agent_dir")]
    pub agent_dir: PathBuf,

    /// Directory of alternate persona documents
    #[serde(default = "default_personas_dir")]
    pub personas_dir: PathBuf,

    /// Memory document override (default: `<agent_dir>/memory.md`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_file: Option<PathBuf>,

    /// Static weather line injected into the session block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weather: Option<String>,

    /// Generation provider: "local" or an OpenAI-compatible name
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name or local preset alias
    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint override for OpenAI-compatible providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// API key for remote providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Session lifecycle settings
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_agent_dir() -> PathBuf {
    AppConfig::config_dir().join("agents").join("default-morning")
}
fn default_personas_dir() -> PathBuf {
    AppConfig::config_dir().join("agents").join("personas")
}
fn default_provider() -> String {
    "deepseek".into()
}
fn default_model() -> String {
    "deepseek-chat".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    512
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("agent_dir", &self.agent_dir)
            .field("personas_dir", &self.personas_dir)
            .field("memory_file", &self.memory_file)
            .field("weather", &self.weather)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("session", &self.session)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Prompt size estimate above which start() logs an advisory
    #[serde(default = "default_context_warn_tokens")]
    pub context_warn_tokens: usize,

    /// Memory document size estimate above which end() recommends archiving
    #[serde(default = "default_memory_budget_tokens")]
    pub memory_budget_tokens: usize,

    /// Write memory update blocks back to the memory document
    #[serde(default = "default_true")]
    pub persist_memory: bool,
}

fn default_context_warn_tokens() -> usize {
    3000
}
fn default_memory_budget_tokens() -> usize {
    600
}
fn default_true() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_warn_tokens: default_context_warn_tokens(),
            memory_budget_tokens: default_memory_budget_tokens(),
            persist_memory: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.dawnagent/config.toml).
    ///
    /// Also checks environment variables:
    /// - `DAWNAGENT_API_KEY`, then `DEEPSEEK_API_KEY` (when the file has no key)
    /// - `DAWNAGENT_PROVIDER`, `DAWNAGENT_MODEL`, `DAWNAGENT_AGENT_DIR`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through a lookup function.
    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = var("DAWNAGENT_API_KEY").or_else(|| var("DEEPSEEK_API_KEY"));
        }
        if let Some(provider) = var("DAWNAGENT_PROVIDER") {
            self.provider = provider;
        }
        if let Some(model) = var("DAWNAGENT_MODEL") {
            self.model = model;
        }
        if let Some(dir) = var("DAWNAGENT_AGENT_DIR") {
            self.agent_dir = PathBuf::from(dir);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".dawnagent")
    }

    /// Path of the persistent memory document.
    pub fn memory_path(&self) -> PathBuf {
        self.memory_file
            .clone()
            .unwrap_or_else(|| self.agent_dir.join(MEMORY_FILE))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "max_tokens must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            agent_dir: default_agent_dir(),
            personas_dir: default_personas_dir(),
            memory_file: None,
            weather: None,
            provider: default_provider(),
            model: default_model(),
            api_url: None,
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            session: SessionConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "deepseek");
        assert_eq!(config.session.context_warn_tokens, 3000);
        assert_eq!(config.session.memory_budget_tokens, 600);
        assert!(config.session.persist_memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.provider, config.provider);
        assert_eq!(parsed.agent_dir, config.agent_dir);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let config = AppConfig {
            max_tokens: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.model, "deepseek-chat");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
agent_dir = "/srv/agents/morning"
provider = "local"
model = "qwen:0.5b"

[session]
persist_memory = false
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.agent_dir, PathBuf::from("/srv/agents/morning"));
        assert_eq!(config.provider, "local");
        assert!(!config.session.persist_memory);
        assert_eq!(config.session.memory_budget_tokens, 600);
        assert_eq!(config.memory_path(), PathBuf::from("/srv/agents/morning/memory.md"));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "provider = [unterminated").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("DEEPSEEK_API_KEY", "sk-test"),
            ("DAWNAGENT_MODEL", "deepseek-reasoner"),
            ("DAWNAGENT_AGENT_DIR", "/tmp/agent"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "deepseek-reasoner");
        assert_eq!(config.agent_dir, PathBuf::from("/tmp/agent"));
        assert_eq!(config.provider, "deepseek");
    }

    #[test]
    fn file_api_key_wins_over_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(|k| (k == "DAWNAGENT_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("deepseek"));
        assert!(toml_str.contains("[session]"));
    }
}
