//! Configuration data structures

use crate::models::provider::find_provider;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Logging level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

/// Timing of the simulated stage and step executors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Lower bound of the simulated stage delay
    pub min_delay_ms: u64,
    /// Upper bound of the simulated stage delay
    pub max_delay_ms: u64,
    /// Fixed delay of one pipeline step
    pub step_delay_ms: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            min_delay_ms: 500,
            max_delay_ms: 2000,
            step_delay_ms: 1000,
        }
    }
}

impl ExecutorSettings {
    /// Zero delays, for tests and scripted runs
    pub fn instant() -> Self {
        Self {
            min_delay_ms: 0,
            max_delay_ms: 0,
            step_delay_ms: 0,
        }
    }
}

/// A configured provider; the key itself lives in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCredentialConfig {
    /// Catalog id, e.g. `openai-dalle`
    pub provider_id: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    /// Overrides the catalog base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default)]
    pub active: bool,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    /// Server bind address
    pub server_host: String,
    /// Server port number
    pub server_port: u16,
    /// Maximum request body size in bytes
    pub max_body_bytes: u64,
    pub executor: ExecutorSettings,
    /// Budget for one SSE text stream
    pub stream_timeout_ms: u64,
    /// Timeout for live provider requests
    pub provider_timeout_secs: u64,
    /// YAML file with extra pipeline templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub templates_path: Option<PathBuf>,
    /// Snapshot file used by local CLI sessions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_store_path: Option<PathBuf>,
    pub providers: Vec<ProviderCredentialConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            max_body_bytes: 64 * 1024,
            executor: ExecutorSettings::default(),
            stream_timeout_ms: 60_000,
            provider_timeout_secs: 30,
            templates_path: None,
            session_store_path: None,
            providers: Vec::new(),
        }
    }
}

impl Configuration {
    /// Load configuration from file, falling back to defaults when it is missing
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Configuration::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Configuration = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("creative-hub").join("config.toml"))
    }

    /// Default location of the CLI session snapshot file
    pub fn default_session_store_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir().context("Could not determine data directory")?;
        Ok(data_dir.join("creative-hub").join("sessions.json"))
    }

    /// Snapshot file from config, or the default location
    pub fn session_store_path(&self) -> Result<PathBuf> {
        match &self.session_store_path {
            Some(path) => Ok(path.clone()),
            None => Self::default_session_store_path(),
        }
    }

    /// Bind address as `host:port`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Validate configuration values, collecting every violation
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server_port < 1024 {
            errors.push(
                "server_port must be at least 1024 (privileged ports not allowed)".to_string(),
            );
        }

        if self.max_body_bytes == 0 {
            errors.push("max_body_bytes must be greater than 0".to_string());
        }

        if self.executor.min_delay_ms > self.executor.max_delay_ms {
            errors.push("executor.min_delay_ms cannot exceed executor.max_delay_ms".to_string());
        }
        if self.executor.max_delay_ms > 60_000 {
            errors.push("executor.max_delay_ms cannot exceed 60000".to_string());
        }

        if self.stream_timeout_ms == 0 {
            errors.push("stream_timeout_ms must be greater than 0".to_string());
        }
        if self.provider_timeout_secs == 0 {
            errors.push("provider_timeout_secs must be greater than 0".to_string());
        }

        for provider in &self.providers {
            if find_provider(&provider.provider_id).is_none() {
                errors.push(format!("unknown provider '{}'", provider.provider_id));
            }
            if provider.api_key_env.trim().is_empty() {
                errors.push(format!(
                    "provider '{}' must name an api_key_env variable",
                    provider.provider_id
                ));
            }
            if let Some(base_url) = &provider.base_url {
                if let Err(e) = url::Url::parse(base_url) {
                    errors.push(format!(
                        "provider '{}' has an invalid base_url: {}",
                        provider.provider_id, e
                    ));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.executor.min_delay_ms, 500);
        assert_eq!(config.executor.max_delay_ms, 2000);
        assert_eq!(config.stream_timeout_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = Configuration {
            server_port: 80,
            ..Configuration::default()
        };
        config.executor.min_delay_ms = 5000;
        config.providers.push(ProviderCredentialConfig {
            provider_id: "made-up".to_string(),
            api_key_env: "".to_string(),
            base_url: Some("not a url".to_string()),
            active: true,
        });

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("server_port")));
        assert!(errors.iter().any(|e| e.contains("made-up")));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Configuration::default();
        config.server_port = 9100;
        config.providers.push(ProviderCredentialConfig {
            provider_id: "openai-dalle".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
            active: true,
        });
        config.save_to_file(&path).unwrap();

        let loaded = Configuration::load_from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let loaded = Configuration::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(loaded, Configuration::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "server_port = 9000\n[executor]\nstep_delay_ms = 5\n").unwrap();

        let loaded = Configuration::load_from_file(&path).unwrap();
        assert_eq!(loaded.server_port, 9000);
        assert_eq!(loaded.executor.step_delay_ms, 5);
        assert_eq!(loaded.executor.max_delay_ms, 2000);
    }
}
