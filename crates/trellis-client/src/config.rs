// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Session configuration: defaults, environment overrides and a
//! filesystem-backed store.

use directories::ProjectDirs;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Endpoint path used when none is configured.
pub const DEFAULT_API_ENDPOINT: &str = "/api";
/// Request timeout used when none is configured.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Prefix of generated client tokens.
pub const CLIENT_TOKEN_PREFIX: &str = "trellis-rust-api--";
/// Store key the session config is saved under.
pub const SESSION_CONFIG_KEY: &str = "session";

/// Environment variable names read by [`SessionConfig::from_env`].
pub mod env {
    /// Server base URL.
    pub const SERVER: &str = "TRELLIS_SERVER";
    /// API user name.
    pub const API_USER: &str = "TRELLIS_API_USER";
    /// API key.
    pub const API_KEY: &str = "TRELLIS_API_KEY";
    /// Endpoint path override.
    pub const API_ENDPOINT: &str = "TRELLIS_API_ENDPOINT";
    /// Timeout override, whole seconds.
    pub const TIMEOUT_SECS: &str = "TRELLIS_TIMEOUT_SECS";
}

/// Error type for config operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required settings are empty.
    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    /// A setting could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// Offending text.
        value: String,
    },
    /// Nothing stored under the requested key.
    #[error("no stored settings")]
    NotFound,
    /// Settings file could not be read or written.
    #[error("settings file i/o: {0}")]
    Io(#[from] std::io::Error),
    /// Settings file is not valid JSON for the requested type.
    #[error("settings file is not valid: {0}")]
    Serde(#[from] serde_json::Error),
    /// The platform has no per-user config directory (no home directory).
    #[error("no per-user config directory for trellis settings")]
    NoConfigDir,
}

/// Connection settings for one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Server base URL, e.g. `https://studio.example.com`.
    pub server_url: String,
    /// API user name.
    pub api_user: String,
    /// API key.
    pub api_key: String,
    /// Endpoint path appended to `server_url`.
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Token identifying this client instance to the server.
    #[serde(default = "default_client_token")]
    pub client_token: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_endpoint() -> String {
    DEFAULT_API_ENDPOINT.to_owned()
}

fn default_client_token() -> String {
    format!("{CLIENT_TOKEN_PREFIX}{}", Uuid::new_v4())
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl SessionConfig {
    /// Config with the three required settings and defaults for the rest.
    pub fn new(
        server_url: impl Into<String>,
        api_user: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            server_url: server_url.into(),
            api_user: api_user.into(),
            api_key: api_key.into(),
            api_endpoint: default_api_endpoint(),
            client_token: default_client_token(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, then validate.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::new(
            lookup(env::SERVER).unwrap_or_default(),
            lookup(env::API_USER).unwrap_or_default(),
            lookup(env::API_KEY).unwrap_or_default(),
        );
        if let Some(endpoint) = lookup(env::API_ENDPOINT).filter(|e| !e.is_empty()) {
            config.api_endpoint = endpoint;
        }
        if let Some(text) = lookup(env::TIMEOUT_SECS) {
            config.timeout_secs = text.trim().parse().map_err(|_| ConfigError::Invalid {
                name: env::TIMEOUT_SECS,
                value: text.clone(),
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Fail with every empty required setting listed at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let missing: Vec<&'static str> = [
            ("server_url", &self.server_url),
            ("api_user", &self.api_user),
            ("api_key", &self.api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Missing(missing))
        }
    }

    /// Full request URL.
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.api_endpoint)
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Storage port for raw config blobs (keyed by logical name).
pub trait ConfigStore {
    /// Load a raw config blob. Returns `NotFound` when missing.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Serializes config values as JSON and delegates storage to a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S: ConfigStore> ConfigService<S> {
    /// Create a new service using the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Load and deserialize the value for `key`. `Ok(None)` if missing.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) if bytes.is_empty() => Ok(None),
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist the value for `key`.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }

    /// Load the stored session config, validated.
    pub fn load_session(&self) -> Result<Option<SessionConfig>, ConfigError> {
        let config: Option<SessionConfig> = self.load(SESSION_CONFIG_KEY)?;
        if let Some(config) = &config {
            config.validate()?;
        }
        Ok(config)
    }
}

/// Store configs as JSON files under a directory.
#[derive(Debug, Clone)]
pub struct FsConfigStore {
    base: PathBuf,
}

impl FsConfigStore {
    /// Store rooted at the user config directory (e.g. `~/.config/trellis`).
    pub fn new() -> Result<Self, ConfigError> {
        let proj = ProjectDirs::from("dev", "trellis", "trellis")
            .ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::at(proj.config_dir()))
    }

    /// Store rooted at `base`. The directory is created on first save.
    pub fn at(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    /// File backing `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.base.join(format!("{key}.json"))
    }
}

impl ConfigStore for FsConfigStore {
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
        match fs::read(self.path_for(key)) {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(ConfigError::NotFound),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.base)?;
        fs::write(self.path_for(key), data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_fill_optional_settings() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"server_url": "https://s.test", "api_user": "jane", "api_key": "k"}"#,
        )
        .unwrap();
        assert_eq!(config.api_endpoint, "/api");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.client_token.starts_with(CLIENT_TOKEN_PREFIX));
        assert_eq!(config.endpoint_url(), "https://s.test/api");
    }

    #[test]
    fn validation_lists_every_empty_field() {
        let config = SessionConfig::new("", "jane", " ");
        match config.validate() {
            Err(ConfigError::Missing(fields)) => assert_eq!(fields, vec!["server_url", "api_key"]),
            other => panic!("expected Missing, got {other:?}"),
        }
    }

    #[test]
    fn lookup_overrides_and_rejects_bad_timeouts() {
        let vars: HashMap<&str, &str> = [
            (env::SERVER, "https://s.test/"),
            (env::API_USER, "jane"),
            (env::API_KEY, "k"),
            (env::API_ENDPOINT, "/v2/api"),
            (env::TIMEOUT_SECS, "30"),
        ]
        .into();
        let config = SessionConfig::from_lookup(|n| vars.get(n).map(|v| (*v).to_owned())).unwrap();
        assert_eq!(config.endpoint_url(), "https://s.test/v2/api");
        assert_eq!(config.timeout_secs, 30);

        let err = SessionConfig::from_lookup(|n| {
            if n == env::TIMEOUT_SECS {
                Some("soon".into())
            } else {
                vars.get(n).map(|v| (*v).to_owned())
            }
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: env::TIMEOUT_SECS, .. }));
    }

    #[test]
    fn fs_store_round_trips_session_config() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(FsConfigStore::at(dir.path().join("nested")));
        assert!(service.load_session().unwrap().is_none());

        let config = SessionConfig::new("https://s.test", "jane", "k");
        service.save(SESSION_CONFIG_KEY, &config).unwrap();
        assert_eq!(service.load_session().unwrap(), Some(config));
    }

    #[test]
    fn stored_configs_are_validated() {
        let dir = tempfile::tempdir().unwrap();
        let service = ConfigService::new(FsConfigStore::at(dir.path()));
        service
            .save(SESSION_CONFIG_KEY, &SessionConfig::new("https://s.test", "", "k"))
            .unwrap();
        assert!(matches!(service.load_session(), Err(ConfigError::Missing(_))));
    }

    #[test]
    fn corrupt_settings_files_are_reported_not_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsConfigStore::at(dir.path());
        store.save_raw(SESSION_CONFIG_KEY, b"{ not json").unwrap();
        let err = ConfigService::new(store).load_session().unwrap_err();
        assert!(matches!(err, ConfigError::Serde(_)));
        assert!(err.to_string().starts_with("settings file is not valid: "));
        assert_eq!(
            ConfigError::NoConfigDir.to_string(),
            "no per-user config directory for trellis settings"
        );
    }
}
