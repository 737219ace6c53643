//! Runner configuration
//!
//! Defines the tunables of the runner: where the backend lives, how
//! ingestion authenticates, per-call timeouts, the default cadence, and the
//! optional streaming transport.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend base URL (e.g., "http://localhost:5000")
    pub backend_url: String,

    /// Key sent with every ingestion request
    pub api_key: Option<String>,

    /// Overall timeout for one backend HTTP request
    pub http_timeout: Duration,

    /// Bound on one register read and on one measurement push
    pub read_timeout: Duration,

    /// Cadence used when neither the command nor the device suggests one
    pub default_interval: Duration,

    /// Listen address of the streaming transport, disabled when unset
    pub stream_addr: Option<String>,

    /// How often the streaming transport samples the pushed configuration
    pub stream_tick: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(backend_url: impl Into<String>) -> Self {
        Self {
            backend_url: backend_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            default_interval: Duration::from_secs(1),
            stream_addr: None,
            stream_tick: Duration::from_secs(2),
        }
    }

    /// Sets the ingestion key; blank keys count as unset
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend_url.is_empty() {
            anyhow::bail!("backend_url cannot be empty");
        }

        if !self.backend_url.starts_with("http://") && !self.backend_url.starts_with("https://") {
            anyhow::bail!("backend_url must start with http:// or https://");
        }

        if self.http_timeout.is_zero() {
            anyhow::bail!("http_timeout must be greater than 0");
        }

        if self.read_timeout.is_zero() {
            anyhow::bail!("read_timeout must be greater than 0");
        }

        if self.default_interval.is_zero() {
            anyhow::bail!("default_interval must be greater than 0");
        }

        if self.stream_tick.is_zero() {
            anyhow::bail!("stream_tick must be greater than 0");
        }

        if matches!(&self.stream_addr, Some(addr) if addr.trim().is_empty()) {
            anyhow::bail!("stream_addr cannot be blank");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("http://localhost:5000")
    }
}

/// Loads the nearest `.env` file into the process environment
///
/// Walks from the working directory up to the filesystem root and loads the
/// first `.env` found. Values from the file override variables already set.
/// Returns the loaded file, or `None` when there is none.
///
/// Must run before any other thread exists.
pub fn load_dotenv() -> Result<Option<PathBuf>, dotenvy::Error> {
    let cwd = std::env::current_dir().map_err(dotenvy::Error::Io)?;
    load_dotenv_from(&cwd)
}

fn load_dotenv_from(start: &Path) -> Result<Option<PathBuf>, dotenvy::Error> {
    let Some(path) = find_dotenv(start) else {
        return Ok(None);
    };

    dotenvy::from_path_override(&path)?;
    Ok(Some(path))
}

fn find_dotenv(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(".env"))
        .find(|candidate| candidate.is_file())
}
