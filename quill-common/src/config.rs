//! Configuration for Quill services.
//!
//! Loaded from a TOML file. Every field has a serde default so a partial
//! (or empty) config file is always valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Completion provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Session management configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Outbound dispatch configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Run-polling configuration
    #[serde(default)]
    pub poll: PollConfig,

    /// Structured-output validation retry configuration
    #[serde(default)]
    pub json_retry: JsonRetryConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("failed to parse config: {e}")))
    }

    /// Load from the given path, or from the default location, or fall
    /// back to built-in defaults when no file exists.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = Self::default_path();
        if default.exists() {
            return Self::load(&default);
        }
        Ok(Self::default())
    }

    /// Default config file location: `{config_dir}/quill/config.toml`.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "quill")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("quill.toml"))
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base log level (default: "info")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "pretty" (default: "pretty")
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path (default: `{data_dir}/quill/profiles.db`)
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Temp-artifact directory (default: `{cache_dir}/quill/artifacts`)
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "quill")
        .map(|dirs| dirs.data_dir().join("profiles.db"))
        .unwrap_or_else(|| PathBuf::from("profiles.db"))
}

fn default_artifact_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "quill")
        .map(|dirs| dirs.cache_dir().join("artifacts"))
        .unwrap_or_else(|| std::env::temp_dir().join("quill-artifacts"))
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

/// Completion provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider kind: "openai" or "anthropic" (default: "openai")
    #[serde(default = "default_provider_kind")]
    pub kind: String,

    /// API key (default: empty, read from env by the binary)
    #[serde(default)]
    pub api_key: String,

    /// Base URL override (default: provider-specific)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model used when a session has no bound profile (default: "gpt-4o-mini")
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_provider_kind() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            api_key: String::new(),
            base_url: None,
            model: default_model(),
        }
    }
}

/// Session management configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Maximum concurrent sessions across all users (default: 64)
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle timeout in milliseconds, used when a profile does not
    /// specify its own (default: 300000 = 5 minutes)
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Exact phrase (case-insensitive) that ends a session (default: "goodbye")
    #[serde(default = "default_termination_phrase")]
    pub termination_phrase: String,

    /// Maximum prior turns replayed to the provider per request (default: 40)
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
}

fn default_max_sessions() -> usize {
    64
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}

fn default_termination_phrase() -> String {
    "goodbye".to_string()
}

fn default_context_turns() -> usize {
    40
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_ms: default_idle_timeout_ms(),
            termination_phrase: default_termination_phrase(),
            context_turns: default_context_turns(),
        }
    }
}

/// Outbound dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum characters per outbound platform message (default: 2000)
    #[serde(default = "default_message_limit")]
    pub message_limit: usize,
}

fn default_message_limit() -> usize {
    2000
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            message_limit: default_message_limit(),
        }
    }
}

/// Run-polling configuration.
///
/// The poll loop backs off exponentially: `base_delay_ms` doubling per
/// attempt, capped at `max_delay_ms`, for up to `max_attempts` attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Base delay before the first status check in ms (default: 3000)
    #[serde(default = "default_poll_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Delay cap in ms (default: 120000)
    #[serde(default = "default_poll_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Maximum status-check attempts (default: 10)
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
}

fn default_poll_base_delay_ms() -> u64 {
    3000
}

fn default_poll_max_delay_ms() -> u64 {
    120_000
}

fn default_poll_max_attempts() -> u32 {
    10
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_poll_base_delay_ms(),
            max_delay_ms: default_poll_max_delay_ms(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

/// Structured-output validation retry configuration.
///
/// Distinct from [`PollConfig`]: this is a fixed-delay policy for
/// re-requesting a completion whose payload failed to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRetryConfig {
    /// Maximum completion attempts (default: 5)
    #[serde(default = "default_json_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in ms (default: 2000)
    #[serde(default = "default_json_delay_ms")]
    pub delay_ms: u64,
}

fn default_json_attempts() -> u32 {
    5
}

fn default_json_delay_ms() -> u64 {
    2000
}

impl Default for JsonRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_json_attempts(),
            delay_ms: default_json_delay_ms(),
        }
    }
}
