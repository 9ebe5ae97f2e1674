//! Configuration for the relay: remote API, polling cadence, target cache
//! and session bounds.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const API_BASE_ENV: &str = "API_BASE";
pub const DEFAULT_REPOSITORY_ENV: &str = "CURSOR_REPOSITORY_URL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("required environment variable {var} is not set")]
    MissingApiKey { var: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub targets: TargetsConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.cursor.com/v0".to_string(),
            api_key_env: "CURSOR_API_KEY".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub notify_interval_secs: u64,
    /// How often a still-COMPLETED agent is re-checked for new messages after
    /// a follow-up.
    pub completed_check_interval_secs: u64,
    pub notify_timeout_secs: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_secs: 5,
            notify_interval_secs: 10,
            completed_check_interval_secs: 15,
            notify_timeout_secs: 5,
        }
    }
}

impl PollingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn notify_interval(&self) -> Duration {
        Duration::from_secs(self.notify_interval_secs)
    }

    pub fn completed_check_interval(&self) -> Duration {
        Duration::from_secs(self.completed_check_interval_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetsConfig {
    pub cache_ttl_secs: u64,
    /// Used when no target is selected and the remote listing is empty or
    /// unavailable.
    pub default_repository: Option<String>,
}

impl Default for TargetsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            default_repository: None,
        }
    }
}

impl TargetsConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    pub max_users: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self { max_users: 256 }
    }
}

impl RelayConfig {
    /// Applies `API_BASE` and `CURSOR_REPOSITORY_URL` overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base) = non_empty(lookup(API_BASE_ENV)) {
            self.api.base_url = base;
        }
        if let Some(repo) = non_empty(lookup(DEFAULT_REPOSITORY_ENV)) {
            self.targets.default_repository = Some(repo);
        }
    }

    pub fn api_key(&self) -> Result<String, ConfigError> {
        self.api_key_from(|key| std::env::var(key).ok())
    }

    pub fn api_key_from(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<String, ConfigError> {
        non_empty(lookup(&self.api.api_key_env)).ok_or_else(|| ConfigError::MissingApiKey {
            var: self.api.api_key_env.clone(),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn parse_relay_config(contents: &str) -> Result<RelayConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_relay_config(path: impl AsRef<Path>) -> Result<RelayConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_relay_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

/// Loads the file when it exists, otherwise starts from defaults.
pub fn load_relay_config_or_default(path: impl AsRef<Path>) -> Result<RelayConfig, ConfigError> {
    let path_ref = path.as_ref();
    if path_ref.exists() {
        load_relay_config(path_ref)
    } else {
        Ok(RelayConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        load_relay_config, load_relay_config_or_default, parse_relay_config, ConfigError,
        RelayConfig,
    };
    use std::collections::HashMap;
    use std::fs;
    use std::time::Duration;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_relay_config("").expect("parse empty");
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.polling.timeout(), Duration::from_secs(300));
        assert_eq!(config.polling.poll_interval(), Duration::from_secs(5));
        assert_eq!(config.targets.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.sessions.max_users, 256);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = parse_relay_config(
            r#"
[api]
base_url = "http://localhost:8080/v0"

[polling]
timeout_secs = 600
completed_check_interval_secs = 20

[targets]
default_repository = "https://github.com/acme/api"
"#,
        )
        .expect("parse config");

        assert_eq!(config.api.base_url, "http://localhost:8080/v0");
        assert_eq!(config.api.api_key_env, "CURSOR_API_KEY");
        assert_eq!(config.polling.timeout_secs, 600);
        assert_eq!(config.polling.poll_interval_secs, 5);
        assert_eq!(config.polling.completed_check_interval_secs, 20);
        assert_eq!(
            config.targets.default_repository.as_deref(),
            Some("https://github.com/acme/api")
        );
    }

    #[test]
    fn env_overrides_replace_base_url_and_default_repository() {
        let env: HashMap<&str, &str> = [
            ("API_BASE", "https://staging.example/v0"),
            ("CURSOR_REPOSITORY_URL", "  "),
        ]
        .into_iter()
        .collect();
        let mut config = RelayConfig::default();
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.api.base_url, "https://staging.example/v0");
        assert_eq!(config.targets.default_repository, None);
    }

    #[test]
    fn missing_api_key_names_the_variable() {
        let config = RelayConfig::default();
        let err = config.api_key_from(|_| None).expect_err("key missing");
        assert!(matches!(err, ConfigError::MissingApiKey { ref var } if var == "CURSOR_API_KEY"));

        let key = config
            .api_key_from(|key| (key == "CURSOR_API_KEY").then(|| "secret".to_string()))
            .expect("key present");
        assert_eq!(key, "secret");
    }

    #[test]
    fn load_reports_path_on_parse_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("relay.toml");
        fs::write(&path, "[polling\ntimeout_secs = 1").expect("write config");

        let err = load_relay_config(&path).expect_err("invalid toml");
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("relay.toml"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config =
            load_relay_config_or_default(dir.path().join("absent.toml")).expect("defaults");
        assert_eq!(config, RelayConfig::default());
    }
}
