//! Layered configuration for blobrob.
//!
//! Resolution order (later wins):
//! 1. Compiled defaults
//! 2. User config (`<config dir>/blobrob/config.toml`)
//! 3. Explicit file passed on the command line (TOML, YAML or JSON)
//! 4. Environment variables (`BLOBROB_*`, `__` separates sections, e.g.
//!    `BLOBROB_SCAN__CONCURRENCY=50`)
//!
//! Command line flags are applied on top by the binary.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "BLOBROB_";
pub const DEFAULT_TEMPLATE: &str = "{{ date }}/{{ account }}/{{ container }}/{{ name }}";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scan: ScanConfig,
    pub http: HttpConfig,
    pub download: DownloadConfig,
    pub wordlists: WordlistConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Accounts probed in parallel.
    pub concurrency: usize,
    /// Discovery events buffered before workers have to wait for the consumer.
    pub channel_capacity: usize,
}
impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            channel_capacity: 100,
        }
    }
}

/// Unset values fall back to the client's own defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub endpoint: Option<String>,
    pub user_agent: Option<String>,
    pub token: Option<String>,
    pub api_version: Option<String>,
    pub probe_timeout_secs: u64,
}
impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            user_agent: None,
            token: None,
            api_version: None,
            probe_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    pub directory: PathBuf,
    /// `upon` template for paths below `directory`.
    pub template: String,
    pub chunk_size: usize,
    pub overwrite: bool,
}
impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("downloads"),
            template: DEFAULT_TEMPLATE.to_string(),
            chunk_size: 32 * 1024,
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordlistConfig {
    pub accounts: PathBuf,
    pub containers: PathBuf,
}
impl Default for WordlistConfig {
    fn default() -> Self {
        Self {
            accounts: PathBuf::from("wordlists/accounts.txt"),
            containers: PathBuf::from("wordlists/containers.txt"),
        }
    }
}

impl Config {
    /// Load and validate the full layered configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let config: Self = Self::figment(explicit)?.extract().or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        Ok(config)
    }

    /// The merged providers, before extraction.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(user) = Self::user_config_path()
            && user.is_file()
        {
            tracing::debug!(path = %user.display(), "Loading user configuration");
            figment = figment.merge(Toml::file(user));
        }
        if let Some(path) = explicit {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            tracing::debug!(path = %path.display(), "Loading configuration file");
            figment = match path.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => figment.merge(Toml::file(path)),
                Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
                Some("json") => figment.merge(Json::file(path)),
                _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
            };
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "blobrob").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |field, reason| exn::Exn::from(ErrorKind::Invalid { field, reason });
        if self.scan.concurrency == 0 {
            return Err(invalid("scan.concurrency", "must be at least 1"));
        }
        if self.scan.channel_capacity == 0 {
            return Err(invalid("scan.channel_capacity", "must be at least 1"));
        }
        if self.download.chunk_size == 0 {
            return Err(invalid("download.chunk_size", "must be at least 1"));
        }
        if self.download.template.trim().is_empty() {
            return Err(invalid("download.template", "must not be empty"));
        }
        if let Some(endpoint) = &self.http.endpoint
            && !endpoint.contains("{account}")
        {
            return Err(invalid("http.endpoint", "must contain an {account} placeholder"));
        }
        Ok(())
    }
}
