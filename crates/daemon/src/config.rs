// Daemon configuration.
//
// Loaded from `~/.cadence/config.toml`, with environment variable
// overrides for container deployments. Validation failures at startup
// are fatal: a scheduler pointed at a missing repository must not spin.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root directory for cadence state: `~/.cadence/`.
pub fn base_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".cadence"))
}

/// Path to the config file: `~/.cadence/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    base_dir().map(|d| d.join("config.toml"))
}

/// Path to the history database: `~/.cadence/history.db`.
pub fn history_db_path() -> Option<PathBuf> {
    base_dir().map(|d| d.join("history.db"))
}

/// Full daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct DaemonConfig {
    pub repository: RepositoryConfig,
    pub schedule: ScheduleConfig,
    pub push: PushConfig,
    pub ai: AiConfig,
    pub commit: CommitConfig,
    pub server: ServerConfig,
}

/// The managed repository.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    pub path: PathBuf,
    pub branch: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("."), branch: "main".into() }
    }
}

/// Timing parameters for the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Base seconds between commit attempts.
    pub base_interval_secs: u64,
    /// Uniform jitter applied per re-arm: interval lands in
    /// `[base - jitter, base + jitter]`.
    pub jitter_range_secs: u64,
    /// Start the timer on daemon launch (otherwise wait for a `start`
    /// control action).
    pub autostart: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { base_interval_secs: 600, jitter_range_secs: 50, autostart: true }
    }
}

/// Push behaviour after a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    pub remote: String,
    pub retry_attempts: u32,
    pub retry_delay_secs: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self { enabled: false, remote: "origin".into(), retry_attempts: 3, retry_delay_secs: 30 }
    }
}

impl PushConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

/// AI message backend (Ollama).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    /// Opaque vocabulary hint forwarded to the message provider.
    pub theme: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://localhost:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: 30,
            max_tokens: 100,
            theme: None,
        }
    }
}

/// Commit authorship overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CommitConfig {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

/// REST API listener.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "127.0.0.1:7870".into() }
    }
}

impl DaemonConfig {
    /// Load from `~/.cadence/config.toml`, apply env overrides. Returns
    /// defaults (plus overrides) if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::load_from(&path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Environment overrides, mirroring the deployment knobs the
    /// dashboard container exposes.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CADENCE_REPO_PATH") {
            self.repository.path = PathBuf::from(path);
        }
        if let Ok(branch) = std::env::var("CADENCE_REPO_BRANCH") {
            self.repository.branch = branch;
        }
        if let Some(secs) = env_u64("CADENCE_BASE_INTERVAL") {
            self.schedule.base_interval_secs = secs;
        }
        if let Some(secs) = env_u64("CADENCE_JITTER_RANGE") {
            self.schedule.jitter_range_secs = secs;
        }
        if let Ok(url) = std::env::var("CADENCE_OLLAMA_URL") {
            self.ai.url = url;
        }
        if let Ok(model) = std::env::var("CADENCE_OLLAMA_MODEL") {
            self.ai.model = model;
        }
        if let Ok(theme) = std::env::var("CADENCE_THEME") {
            self.ai.theme = if theme.is_empty() { None } else { Some(theme) };
        }
        if let Ok(name) = std::env::var("CADENCE_AUTHOR_NAME") {
            self.commit.author_name = Some(name);
        }
        if let Ok(email) = std::env::var("CADENCE_AUTHOR_EMAIL") {
            self.commit.author_email = Some(email);
        }
        if let Ok(bind) = std::env::var("CADENCE_BIND") {
            self.server.bind = bind;
        }
    }

    /// Startup validation. Violations abort the daemon rather than
    /// letting a misconfigured scheduler retry forever.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.schedule.base_interval_secs == 0 {
            return Err(ConfigError::Invalid("schedule.base_interval_secs must be > 0".into()));
        }
        if self.schedule.jitter_range_secs >= self.schedule.base_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "schedule.jitter_range_secs ({}) must be smaller than base_interval_secs ({})",
                self.schedule.jitter_range_secs, self.schedule.base_interval_secs
            )));
        }
        if self.push.enabled && self.push.retry_attempts == 0 {
            return Err(ConfigError::Invalid("push.retry_attempts must be > 0".into()));
        }
        if !self.repository.path.join(".git").exists() {
            return Err(ConfigError::Invalid(format!(
                "repository.path `{}` is not a git repository",
                self.repository.path.display()
            )));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
            Self::Invalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
