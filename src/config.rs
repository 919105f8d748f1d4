use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_FILE: &str = ".issue-triage.toml";
pub const ORACLE_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{0} is not set; it is required before any classification call")]
    MissingCredential(&'static str),
}

/// Top-level configuration loaded from .issue-triage.toml.
///
/// Every field is optional; the tool works with zero config as long as the
/// oracle credential is in the environment when classifying.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Repository to triage, `owner/name`
    pub repo: String,
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            repo: "vaadin/flow".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// API key. If None, falls back to ANTHROPIC_API_KEY env var.
    pub api_key: Option<String>,
    pub model: String,
    pub max_output_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "claude-sonnet-4-20250514".to_string(),
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".triage"),
        }
    }
}

/// Chunking and throttling defaults; CLI flags override these per run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunk_size: usize,
    /// Seconds between consecutive oracle calls
    pub rate_limit_secs: f64,
    pub batch_size: usize,
    /// Seconds to pause between apply batches
    pub batch_delay_secs: f64,
    pub verify_sample: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 10,
            rate_limit_secs: 1.0,
            batch_size: 10,
            batch_delay_secs: 5.0,
            verify_sample: 10,
        }
    }
}

impl Config {
    /// Load configuration from .issue-triage.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// falls back to GITHUB_TOKEN env var.
    pub fn github_token(&self) -> Option<String> {
        self.tracker
            .token
            .clone()
            .or_else(|| std::env::var(GITHUB_TOKEN_ENV).ok())
            .filter(|t| !t.trim().is_empty())
    }

    /// Resolve the oracle API key, failing if neither config nor environment has one.
    pub fn oracle_api_key(&self) -> Result<String, ConfigError> {
        self.oracle
            .api_key
            .clone()
            .or_else(|| std::env::var(ORACLE_KEY_ENV).ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential(ORACLE_KEY_ENV))
    }
}

/// Convert a non-negative seconds value from config or CLI into a Duration.
pub fn secs(value: f64) -> Duration {
    Duration::from_secs_f64(value.max(0.0))
}
