//! Layered configuration.
//!
//! Defaults, then an optional `relsync.toml`, then `RELSYNC_*` environment
//! variables. Command-line flags are applied on top by the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use relsync_schema::Channel;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryPolicy;

/// Name of the config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "relsync.toml";

/// Default hosted API endpoint.
pub const DEFAULT_HOSTED_URL: &str = "https://api.velopack.io/";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("Invalid config {path}: {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// An environment variable has a value of the wrong type.
    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv {
        /// Variable name.
        var: String,
        /// Offending value.
        value: String,
    },
}

/// S3-compatible bucket settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Endpoint URL (e.g. `https://<account>.r2.cloudflarestorage.com`).
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret_key: String,
    /// Region, `auto` when unset.
    pub region: Option<String>,
    /// Key prefix inside the bucket.
    pub root: Option<String>,
}

impl StoreConfig {
    /// Load store settings from `RELSYNC_STORE_*` environment variables.
    ///
    /// Returns `None` unless endpoint, bucket and both keys are all set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            endpoint: lookup("RELSYNC_STORE_ENDPOINT")?,
            bucket: lookup("RELSYNC_STORE_BUCKET")?,
            access_key: lookup("RELSYNC_STORE_ACCESS_KEY")?,
            secret_key: lookup("RELSYNC_STORE_SECRET_KEY")?,
            region: lookup("RELSYNC_STORE_REGION"),
            root: lookup("RELSYNC_STORE_ROOT"),
        })
    }
}

/// Hosted release-group backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostedConfig {
    /// API base URL.
    pub base_url: String,
    /// API key sent as a bearer token.
    pub api_key: Option<String>,
    /// Poll after publishing until every upload is processed.
    pub wait_for_live: bool,
}

impl Default for HostedConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_HOSTED_URL.to_string(),
            api_key: None,
            wait_for_live: false,
        }
    }
}

/// Everything the sync commands need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Release channel; the OS default when unset.
    pub channel: Option<String>,
    /// Local directory holding build output and index files.
    pub release_dir: PathBuf,
    /// Full releases to keep on the remote; 0 keeps all.
    pub keep_max_full: usize,
    /// Replace remote artifacts whose checksum differs.
    pub overwrite_remote: bool,
    /// Attempts per remote operation.
    pub retry_attempts: u32,
    /// Delay between attempts, in milliseconds.
    pub retry_backoff_ms: u64,
    /// Object store to sync against.
    pub store: Option<StoreConfig>,
    /// Read-only HTTP mirror for downloads.
    pub mirror_url: Option<String>,
    /// Hosted backend.
    pub hosted: HostedConfig,
    /// Where the staged-rollout user id is kept.
    pub user_id_path: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            channel: None,
            release_dir: PathBuf::from("releases"),
            keep_max_full: 0,
            overwrite_remote: false,
            retry_attempts: 3,
            retry_backoff_ms: 1000,
            store: None,
            mirror_url: None,
            hosted: HostedConfig::default(),
            user_id_path: None,
        }
    }
}

impl SyncConfig {
    /// Parse a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file is unreadable or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the full layering: defaults, then `path` (or `relsync.toml`
    /// in the working directory if present), then the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an unreadable file or a malformed variable.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(CONFIG_FILE_NAME).is_file() => Self::load(Path::new(CONFIG_FILE_NAME))?,
            None => Self::default(),
        };
        config.apply_env_from(|k| std::env::var(k).ok())?;
        Ok(config)
    }

    /// Overlay `RELSYNC_*` variables read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] for values that fail to parse.
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(channel) = lookup("RELSYNC_CHANNEL") {
            self.channel = Some(channel);
        }
        if let Some(dir) = lookup("RELSYNC_RELEASE_DIR") {
            self.release_dir = PathBuf::from(dir);
        }
        if let Some(n) = lookup("RELSYNC_KEEP_MAX_FULL") {
            self.keep_max_full = parse_env("RELSYNC_KEEP_MAX_FULL", &n)?;
        }
        if let Some(flag) = lookup("RELSYNC_OVERWRITE_REMOTE") {
            self.overwrite_remote = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Some(n) = lookup("RELSYNC_RETRY_ATTEMPTS") {
            self.retry_attempts = parse_env("RELSYNC_RETRY_ATTEMPTS", &n)?;
        }
        if let Some(url) = lookup("RELSYNC_MIRROR_URL") {
            self.mirror_url = Some(url);
        }
        if let Some(url) = lookup("RELSYNC_API_URL") {
            self.hosted.base_url = url;
        }
        if let Some(key) = lookup("RELSYNC_API_KEY") {
            self.hosted.api_key = Some(key);
        }
        if let Some(store) = StoreConfig::from_lookup(&lookup) {
            self.store = Some(store);
        }
        Ok(())
    }

    /// The configured channel, or the platform default.
    pub fn channel(&self) -> Channel {
        self.channel
            .as_deref()
            .map_or_else(Channel::current_default, Channel::new)
    }

    /// Retry policy for remote operations.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Path of the persisted rollout user id.
    pub fn user_id_path(&self) -> PathBuf {
        self.user_id_path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("relsync")
                .join("userid")
        })
    }
}

fn parse_env<T: std::str::FromStr>(var: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var: var.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn toml_file_then_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
channel = "beta"
keep_max_full = 3

[hosted]
wait_for_live = true

[store]
endpoint = "https://s3.example.com"
bucket = "releases"
"#,
        )
        .unwrap();

        let mut config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.channel().as_str(), "beta");
        assert_eq!(config.keep_max_full, 3);
        assert!(config.hosted.wait_for_live);
        assert_eq!(config.hosted.base_url, DEFAULT_HOSTED_URL);
        assert_eq!(config.store.as_ref().unwrap().bucket, "releases");
        assert_eq!(config.retry_attempts, 3);

        config
            .apply_env_from(env(&[
                ("RELSYNC_KEEP_MAX_FULL", "5"),
                ("RELSYNC_API_KEY", "secret"),
            ]))
            .unwrap();
        assert_eq!(config.keep_max_full, 5);
        assert_eq!(config.hosted.api_key.as_deref(), Some("secret"));
        assert_eq!(config.channel().as_str(), "beta");
    }

    #[test]
    fn store_from_env_requires_all_credentials() {
        let partial = env(&[("RELSYNC_STORE_ENDPOINT", "https://s3"), ("RELSYNC_STORE_BUCKET", "b")]);
        assert!(StoreConfig::from_lookup(&partial).is_none());

        let full = env(&[
            ("RELSYNC_STORE_ENDPOINT", "https://s3"),
            ("RELSYNC_STORE_BUCKET", "b"),
            ("RELSYNC_STORE_ACCESS_KEY", "ak"),
            ("RELSYNC_STORE_SECRET_KEY", "sk"),
        ]);
        let store = StoreConfig::from_lookup(&full).unwrap();
        assert_eq!(store.access_key, "ak");
        assert_eq!(store.region, None);
    }

    #[test]
    fn malformed_env_is_rejected() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_env_from(env(&[("RELSYNC_KEEP_MAX_FULL", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn retry_policy_never_zero() {
        let config = SyncConfig {
            retry_attempts: 0,
            retry_backoff_ms: 5,
            ..SyncConfig::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1);
        assert_eq!(config.retry_policy().backoff, Duration::from_millis(5));
    }
}
