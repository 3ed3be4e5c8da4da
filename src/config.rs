use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATABASE: &str = "/tmp/app_db.db";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:3333";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

pub fn default_config_path() -> PathBuf {
    PathBuf::from("fetcher.toml")
}

/// Contents of `fetcher.toml`. Every field is optional; unset fields fall
/// back to the defaults above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FetcherConfig {
    pub database: Option<String>,
    pub listen: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub busy_timeout_ms: Option<u64>,
}

impl FetcherConfig {
    /// Config with every default written out, as produced by `fetcher init`.
    pub fn with_defaults() -> Self {
        Self {
            database: Some(DEFAULT_DATABASE.to_string()),
            listen: Some(DEFAULT_LISTEN.to_string()),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
            busy_timeout_ms: Some(DEFAULT_BUSY_TIMEOUT_MS),
        }
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(self.database.as_deref().unwrap_or(DEFAULT_DATABASE))
    }

    pub fn listen_addr(&self) -> anyhow::Result<SocketAddr> {
        let raw = self.listen.as_deref().unwrap_or(DEFAULT_LISTEN);
        raw.parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {:?}: {}", raw, e))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Read `path` (or `./fetcher.toml`). A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if !path.is_file() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Write this config as TOML. Refuses to replace an existing file unless `force`.
    pub fn save(&self, path: &Path, force: bool) -> anyhow::Result<()> {
        if path.exists() && !force {
            anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
        }
        std::fs::write(path, toml::to_string_pretty(self)?)
            .with_context(|| format!("writing config {}", path.display()))
    }
}

/// Make sure `db_path` can be opened as a database file: its directory is
/// created if missing, and the path itself must not be a directory.
pub fn prepare_database_path(db_path: &Path) -> anyhow::Result<()> {
    if db_path.is_dir() {
        anyhow::bail!("database path {} is a directory", db_path.display());
    }
    match db_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display())),
        _ => Ok(()),
    }
}
