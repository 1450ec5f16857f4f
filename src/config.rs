//! Configuration
//!
//! Settings are read from an optional TOML file and overridden by
//! `CADENCE_*` environment variables, e.g. `CADENCE_POOL__INITIAL_THREADS=8`.
//! The file path comes from `--config` or `CADENCE_CONFIG_PATH`, falling back
//! to `cadence.toml` in the working directory when it exists.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CADENCE_CONFIG_PATH";

const DEFAULT_CONFIG_FILE: &str = "cadence.toml";
const ENV_PREFIX: &str = "CADENCE";

/// Thread pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Threads created up front
    pub initial_threads: usize,

    /// Idle threads kept warm; threads returned beyond this are released
    pub max_idle_threads: usize,

    /// Accept errored threads back into the free list instead of requiring
    /// them to be terminated
    pub recycle_errored: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_threads: 100,
            max_idle_threads: 100,
            recycle_errored: false,
        }
    }
}

impl PoolConfig {
    pub fn with_initial_threads(mut self, threads: usize) -> Self {
        self.initial_threads = threads;
        self
    }

    pub fn with_max_idle_threads(mut self, threads: usize) -> Self {
        self.max_idle_threads = threads;
        self
    }

    pub fn with_recycle_errored(mut self, recycle: bool) -> Self {
        self.recycle_errored = recycle;
        self
    }
}

/// Settings of the bundled timer host used by the CLI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Virtual milliseconds a script may spend suspended before it is
    /// terminated; `None` disables the timeout
    pub timeout_ms: Option<u64>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Some(30_000),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pool: PoolConfig,
    pub host: HostConfig,
}

impl Config {
    /// Load from `CADENCE_CONFIG_PATH` (or `cadence.toml`) plus the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        Self::load_from(path.as_deref())
    }

    /// Load from an explicit file, which must then exist, plus the environment
    pub fn load_from(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => ::config::File::with_name(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration")?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Render as TOML, e.g. for `cadence config`
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}
