//! Configuration management for freegate.
//!
//! Loads settings from `~/.config/freegate/config.toml` with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 11434;
pub const DEFAULT_UPSTREAM_URL: &str = "https://openrouter.ai/api/v1";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Route across the free-tier catalog with fallback and cooldowns.
    #[serde(default = "default_true")]
    pub free_mode: bool,
    /// Direct mode only: list upstream models that accept tool calls.
    #[serde(default)]
    pub tool_use_only: bool,
    /// Upper bound for a single upstream attempt. Unset means unbounded.
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    #[serde(default = "default_free_models_file")]
    pub free_models_file: PathBuf,
    #[serde(default = "default_cooldown_db")]
    pub cooldown_db: PathBuf,
    #[serde(default = "default_filter_file")]
    pub filter_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LoggingConfig {
    /// Emit structured JSON log lines instead of the human format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_verbosity")]
    pub log_verbosity: LogVerbosity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    Minimal,
    #[default]
    Compact,
    Verbose,
}

// Default value functions
fn default_port() -> u16 { DEFAULT_PORT }
fn default_true() -> bool { true }
fn default_upstream_url() -> String { DEFAULT_UPSTREAM_URL.to_string() }
fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("freegate")
}
fn default_free_models_file() -> PathBuf { data_dir().join("free-models") }
fn default_cooldown_db() -> PathBuf { data_dir().join("failures.db") }
fn default_filter_file() -> PathBuf { PathBuf::from("/models-filter/filter") }
fn default_verbosity() -> LogVerbosity { LogVerbosity::Compact }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            free_mode: true,
            tool_use_only: false,
            attempt_timeout_secs: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            api_key: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            free_models_file: default_free_models_file(),
            cooldown_db: default_cooldown_db(),
            filter_file: default_filter_file(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_verbosity: default_verbosity(),
        }
    }
}

impl GatewayConfig {
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("freegate")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        // OPENAI_API_KEY is what existing deployments of the gateway set.
        for var in ["OPENAI_API_KEY", "OPENROUTER_API_KEY"] {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    self.upstream.api_key = Some(key);
                }
            }
        }
        if let Ok(val) = std::env::var("FREE_MODE") {
            self.gateway.free_mode = !val.eq_ignore_ascii_case("false");
        }
        if let Ok(val) = std::env::var("TOOL_USE_ONLY") {
            self.gateway.tool_use_only = val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("FREEGATE_PORT") {
            if let Ok(port) = val.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(val) = std::env::var("FREEGATE_ATTEMPT_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.gateway.attempt_timeout_secs = Some(secs);
            }
        }
        if let Ok(path) = std::env::var("FREEGATE_FILTER_FILE") {
            self.paths.filter_file = PathBuf::from(path);
        }
        self
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn loads_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[gateway]
port = 9090
free_mode = false
attempt_timeout_secs = 45

[upstream]
api_key = "sk-or-test-key"
"#).unwrap();

        let config = Config::load_from(config_path).unwrap();

        assert_eq!(config.gateway.port, 9090);
        assert!(!config.gateway.free_mode);
        assert_eq!(config.gateway.attempt_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(config.upstream.api_key, Some("sk-or-test-key".to_string()));
        assert_eq!(config.upstream.base_url, DEFAULT_UPSTREAM_URL);
    }

    #[test]
    fn returns_defaults_when_file_missing() {
        let config = Config::load_from(PathBuf::from("/nonexistent/path/config.toml")).unwrap();

        assert_eq!(config.gateway.port, 11434); // Ollama-compatible default
        assert!(config.gateway.free_mode);
        assert!(!config.gateway.tool_use_only);
        assert_eq!(config.gateway.attempt_timeout(), None);
        assert_eq!(config.paths.filter_file, PathBuf::from("/models-filter/filter"));
        assert!(!config.logging.json);
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let gateway = GatewayConfig {
            attempt_timeout_secs: Some(0),
            ..GatewayConfig::default()
        };
        assert_eq!(gateway.attempt_timeout(), None);
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[gateway\nport = ").unwrap();

        let result = Config::load_from(config_path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_take_precedence_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[gateway]
port = 8000
"#).unwrap();

        std::env::set_var("FREEGATE_PORT", "8123");
        std::env::set_var("FREEGATE_FILTER_FILE", "/tmp/freegate-filter");
        let config = Config::load_from(config_path).unwrap().with_env_overrides();
        std::env::remove_var("FREEGATE_PORT");
        std::env::remove_var("FREEGATE_FILTER_FILE");

        assert_eq!(config.gateway.port, 8123);
        assert_eq!(config.paths.filter_file, PathBuf::from("/tmp/freegate-filter"));
    }

    #[test]
    fn saves_config_to_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.toml");

        let config = Config {
            gateway: GatewayConfig { port: 3000, ..GatewayConfig::default() },
            ..Config::default()
        };

        config.save_to(config_path.clone()).unwrap();

        let loaded = Config::load_from(config_path).unwrap();
        assert_eq!(loaded.gateway.port, 3000);
        assert_eq!(loaded, config);
    }

    #[test]
    fn parses_all_log_verbosity_levels() {
        let dir = tempfile::tempdir().unwrap();

        for (value, expected) in [
            ("minimal", LogVerbosity::Minimal),
            ("compact", LogVerbosity::Compact),
            ("verbose", LogVerbosity::Verbose),
        ] {
            let config_path = dir.path().join(format!("config_{}.toml", value));
            fs::write(&config_path, format!(r#"
[app]
log_verbosity = "{}"
"#, value)).unwrap();

            let config = Config::load_from(config_path).unwrap();
            assert_eq!(config.app.log_verbosity, expected);
        }
    }
}
