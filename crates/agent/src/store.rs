//! Time-bounded cache of the layered configuration document.
//!
//! The cache is a single whole-document slot. Requests that observe an
//! expired slot each fetch on their own; there is no single-flight
//! coordination, and a failed fetch never falls back to the stale copy.

use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miled_core::{Clock, ConfigRoot};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ConfigSourceError {
    #[error("config source returned status {status}")]
    Status { status: u16 },
    #[error("config source transport failed: {0}")]
    Transport(String),
    #[error("could not read config document `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("config document is not valid: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Unavailable(#[from] ConfigSourceError),
    #[error("config cache lock poisoned")]
    CachePoisoned,
}

/// Where the configuration document comes from.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn fetch(&self) -> Result<ConfigRoot, ConfigSourceError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Reads the document from a local JSON file.
#[derive(Clone, Debug)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn fetch(&self) -> Result<ConfigRoot, ConfigSourceError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ConfigSourceError::Read { path: self.path.clone(), source })?;
        serde_json::from_str(&raw).map_err(|error| ConfigSourceError::Parse(error.to_string()))
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Fetches the document over HTTP(S).
#[derive(Clone, Debug)]
pub struct HttpConfigSource {
    client: reqwest::Client,
    url: String,
}

impl HttpConfigSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ConfigSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ConfigSourceError::Transport(error.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl ConfigSource for HttpConfigSource {
    async fn fetch(&self) -> Result<ConfigRoot, ConfigSourceError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|error| ConfigSourceError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConfigSourceError::Status { status: status.as_u16() });
        }

        // Parsed from text rather than `Response::json` so object key order is
        // read straight from the wire.
        let body =
            response.text().await.map_err(|error| ConfigSourceError::Transport(error.to_string()))?;
        serde_json::from_str(&body).map_err(|error| ConfigSourceError::Parse(error.to_string()))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

struct CachedConfig {
    root: Arc<ConfigRoot>,
    fetched_at: DateTime<Utc>,
}

pub struct ConfigStore {
    source: Arc<dyn ConfigSource>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    cache: RwLock<Option<CachedConfig>>,
}

impl ConfigStore {
    pub fn new(source: Arc<dyn ConfigSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self { source, clock, ttl, cache: RwLock::new(None) }
    }

    /// Cached document while it is younger than the TTL, otherwise a fresh fetch.
    pub async fn load(&self) -> Result<Arc<ConfigRoot>, StoreError> {
        if let Some(root) = self.fresh_copy(self.clock.now())? {
            debug!(event_name = "config.cache.hit", "serving cached config document");
            return Ok(root);
        }

        let root = match self.source.fetch().await {
            Ok(root) => Arc::new(root),
            Err(error) => {
                warn!(
                    event_name = "config.fetch.failed",
                    source = %self.source.describe(),
                    error = %error,
                    "config document fetch failed"
                );
                return Err(error.into());
            }
        };

        for (layer, entry) in root.skipped_entries() {
            warn!(
                event_name = "config.entry.skipped",
                source = %self.source.describe(),
                layer = %layer,
                key = %entry.key,
                reason = %entry.reason,
                "config entry is not a readable agent and was skipped"
            );
        }

        self.replace(Arc::clone(&root), self.clock.now())?;
        debug!(
            event_name = "config.fetch.succeeded",
            source = %self.source.describe(),
            "config document refreshed"
        );
        Ok(root)
    }

    fn fresh_copy(&self, now: DateTime<Utc>) -> Result<Option<Arc<ConfigRoot>>, StoreError> {
        let cache = self.cache.read().map_err(|_| StoreError::CachePoisoned)?;
        Ok(cache
            .as_ref()
            .filter(|cached| now.signed_duration_since(cached.fetched_at) < self.ttl)
            .map(|cached| Arc::clone(&cached.root)))
    }

    fn replace(&self, root: Arc<ConfigRoot>, fetched_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut cache = self.cache.write().map_err(|_| StoreError::CachePoisoned)?;
        *cache = Some(CachedConfig { root, fetched_at });
        Ok(())
    }
}
