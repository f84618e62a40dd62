//! Configuration management for seekloop.
//!
//! Settings live in `<project>/.seekloop/settings.json`. Every key is optional;
//! missing keys take the defaults below and command-line flags override
//! whatever the file says.
//!
//! # Example settings.json
//!
//! ```json
//! {
//!   "maxIterations": 5,
//!   "model": "gpt-4o-mini",
//!   "successPatterns": ["All tests passed"],
//!   "errorPatterns": ["error", "FAILED"],
//!   "checkExitCode": true,
//!   "saveHistory": true,
//!   "historyPath": ".seekloop/history"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SeekError};

/// Environment variables consulted for the API key, in order.
pub const API_KEY_ENV_VARS: &[&str] = &["SEEKLOOP_API_KEY", "OPENAI_API_KEY"];

/// Seek loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeekConfig {
    /// Upper bound on loop iterations.
    #[serde(default = "default_max_iterations", rename = "maxIterations")]
    pub max_iterations: u32,

    /// Sampling temperature forwarded to the oracle.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Model identifier forwarded to the oracle.
    #[serde(default = "default_model")]
    pub model: String,

    /// Case-insensitive patterns; a non-empty list makes success explicit-match-only.
    #[serde(default, rename = "successPatterns")]
    pub success_patterns: Vec<String>,

    /// Case-insensitive patterns that force failure regardless of exit code.
    #[serde(default = "default_error_patterns", rename = "errorPatterns")]
    pub error_patterns: Vec<String>,

    /// Whether a non-zero or missing exit code alone forces failure.
    #[serde(default = "default_true", rename = "checkExitCode")]
    pub check_exit_code: bool,

    /// Whether failed-iteration snapshots are persisted.
    #[serde(default = "default_true", rename = "saveHistory")]
    pub save_history: bool,

    /// Snapshot directory, relative to the project root.
    #[serde(default = "default_history_path", rename = "historyPath")]
    pub history_path: PathBuf,

    /// Credential for the generative service.
    #[serde(default, rename = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the chat completions API.
    #[serde(default = "default_api_base", rename = "apiBase")]
    pub api_base: String,

    /// Timeout for a single oracle request.
    #[serde(default = "default_request_timeout", rename = "requestTimeoutSecs")]
    pub request_timeout_secs: u64,

    /// Delay after a failed iteration before the next one starts.
    #[serde(default = "default_retry_delay", rename = "retryDelayMs")]
    pub retry_delay_ms: u64,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_temperature() -> f32 {
    0.2
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_error_patterns() -> Vec<String> {
    vec![
        "error".to_string(),
        "failed".to_string(),
        "exception".to_string(),
    ]
}

fn default_true() -> bool {
    true
}

fn default_history_path() -> PathBuf {
    PathBuf::from(".seekloop/history")
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_retry_delay() -> u64 {
    1000
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            temperature: default_temperature(),
            model: default_model(),
            success_patterns: Vec::new(),
            error_patterns: default_error_patterns(),
            check_exit_code: true,
            save_history: true,
            history_path: default_history_path(),
            api_key: None,
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

impl SeekConfig {
    /// Load configuration from a project directory.
    ///
    /// A missing settings file yields the defaults.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let settings_path = Self::settings_path(project_dir);

        if !settings_path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&settings_path)
            .map_err(|e| SeekError::config_with_path(e.to_string(), settings_path.clone()))?;
        serde_json::from_str(&content)
            .map_err(|e| SeekError::config_with_path(e.to_string(), settings_path))
    }

    /// Get the settings.json path for a project
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".seekloop/settings.json")
    }

    /// Resolve the snapshot directory against the project root.
    pub fn history_dir(&self, project_dir: &Path) -> PathBuf {
        if self.history_path.is_absolute() {
            self.history_path.clone()
        } else {
            project_dir.join(&self.history_path)
        }
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(SeekError::invalid_config(
                "maxIterations",
                "must be at least 1",
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(SeekError::invalid_config(
                "temperature",
                format!("{} is outside 0.0..=2.0", self.temperature),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(SeekError::invalid_config("model", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(SeekError::invalid_config(
                "requestTimeoutSecs",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Resolve the API key from the config or the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`SeekError::Config`] when no credential is available.
    pub fn resolve_api_key(&self) -> Result<String> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Resolve the API key using a custom environment lookup.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Result<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.to_string());
        }

        API_KEY_ENV_VARS
            .iter()
            .find_map(|name| lookup(name).filter(|k| !k.trim().is_empty()))
            .ok_or_else(|| {
                SeekError::config(format!(
                    "missing API key: set apiKey in settings or one of {}",
                    API_KEY_ENV_VARS.join(", ")
                ))
            })
    }

    /// Copy of this config with the API key masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.api_key.is_some() {
            copy.api_key = Some("********".to_string());
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = SeekConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert!(config.check_exit_code);
        assert!(config.save_history);
        assert!(config.success_patterns.is_empty());
        assert_eq!(config.error_patterns.len(), 3);
        assert_eq!(config.retry_delay_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_returns_default() {
        let temp = TempDir::new().unwrap();
        let config = SeekConfig::load(temp.path()).unwrap();
        assert_eq!(config, SeekConfig::default());
    }

    #[test]
    fn test_load_partial_settings() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".seekloop")).unwrap();
        std::fs::write(
            SeekConfig::settings_path(temp.path()),
            r#"{
                "maxIterations": 3,
                "successPatterns": ["All tests passed"],
                "checkExitCode": false,
                "historyPath": "snapshots"
            }"#,
        )
        .unwrap();

        let config = SeekConfig::load(temp.path()).unwrap();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.success_patterns, vec!["All tests passed"]);
        assert!(!config.check_exit_code);
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(
            config.history_dir(temp.path()),
            temp.path().join("snapshots")
        );
    }

    #[test]
    fn test_load_invalid_json_is_config_error() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".seekloop")).unwrap();
        std::fs::write(SeekConfig::settings_path(temp.path()), "{ not json").unwrap();

        let err = SeekConfig::load(temp.path()).unwrap_err();
        assert!(matches!(err, SeekError::Config { path: Some(_), .. }));
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let config = SeekConfig {
            max_iterations: 0,
            ..SeekConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("maxIterations"));
    }

    #[test]
    fn test_validate_rejects_temperature_out_of_range() {
        let config = SeekConfig {
            temperature: 3.5,
            ..SeekConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SeekError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_api_key_prefers_config_value() {
        let config = SeekConfig {
            api_key: Some("from-config".to_string()),
            ..SeekConfig::default()
        };
        let key = config
            .resolve_api_key_with(|_| Some("from-env".to_string()))
            .unwrap();
        assert_eq!(key, "from-config");
    }

    #[test]
    fn test_api_key_env_fallback_order() {
        let config = SeekConfig::default();
        let key = config
            .resolve_api_key_with(|name| match name {
                "OPENAI_API_KEY" => Some("openai".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(key, "openai");

        let key = config
            .resolve_api_key_with(|name| Some(format!("{name}-value")))
            .unwrap();
        assert_eq!(key, "SEEKLOOP_API_KEY-value");
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let config = SeekConfig {
            api_key: Some("   ".to_string()),
            ..SeekConfig::default()
        };
        let err = config.resolve_api_key_with(|_| None).unwrap_err();
        assert!(matches!(err, SeekError::Config { .. }));
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_redacted_hides_key() {
        let config = SeekConfig {
            api_key: Some("sk-secret".to_string()),
            ..SeekConfig::default()
        };
        let shown = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-secret"));
    }

    #[test]
    fn test_absolute_history_path_kept() {
        let config = SeekConfig {
            history_path: PathBuf::from("/var/seek"),
            ..SeekConfig::default()
        };
        assert_eq!(
            config.history_dir(Path::new("/project")),
            PathBuf::from("/var/seek")
        );
    }
}
