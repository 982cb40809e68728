//! Persistent storage for rate limit state
//!
//! The rate limiter keeps one JSON document mapping command names to lists of
//! invocation timestamps (epoch milliseconds). The [`RateLimitStateStore`]
//! trait is the seam between enforcement logic and storage so tests can run
//! against an in-memory store.

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{ResilienceError, ResilienceResult};

/// File name for the persisted rate limit state
const STATE_FILE_NAME: &str = "rate-limits.json";

/// Persisted rate limit state: command name to invocation timestamps
pub type RateLimitState = HashMap<String, Vec<u64>>;

/// Storage backend for rate limit state
#[async_trait]
pub trait RateLimitStateStore: Send + Sync {
    /// Load the full state map
    ///
    /// Implementations must degrade to an empty map when the underlying
    /// storage is absent or unreadable; a load never blocks enforcement.
    async fn load(&self) -> ResilienceResult<RateLimitState>;

    /// Persist the full state map, replacing previous contents
    async fn save(&self, state: &RateLimitState) -> ResilienceResult<()>;
}

/// File-backed state store
///
/// Each enforcement check performs its own load-mutate-save cycle against the
/// state file. Concurrent processes can interleave those cycles and lose
/// updates; callers that need strict multi-process enforcement must add
/// advisory locking around the cycle.
pub struct FileStateStore {
    /// Path of the JSON state file
    path: PathBuf,
}

impl FileStateStore {
    /// Create a store backed by the given file path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default per-user state file location
    ///
    /// `$MC_STATE_DIR/rate-limits.json` when the override is set, otherwise
    /// `$HOME/.mc/rate-limits.json`.
    pub fn default_path() -> ResilienceResult<PathBuf> {
        if let Ok(dir) = env::var("MC_STATE_DIR") {
            return Ok(PathBuf::from(dir).join(STATE_FILE_NAME));
        }
        let home = env::var("HOME").map_err(|_| {
            ResilienceError::ConfigError(
                "Cannot resolve the rate limit state path: HOME is not set".to_string(),
            )
        })?;
        Ok(PathBuf::from(home).join(".mc").join(STATE_FILE_NAME))
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RateLimitStateStore for FileStateStore {
    async fn load(&self) -> ResilienceResult<RateLimitState> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No rate limit state file at {}, starting empty", self.path.display());
                return Ok(RateLimitState::new());
            }
            Err(e) => {
                warn!(
                    "Failed to read rate limit state file {}, treating as empty: {}",
                    self.path.display(),
                    e
                );
                return Ok(RateLimitState::new());
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(
                    "Rate limit state file {} is not valid JSON, treating as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(RateLimitState::new())
            }
        }
    }

    async fn save(&self, state: &RateLimitState) -> ResilienceResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&self.path, bytes).await?;
        debug!("Saved rate limit state to {}", self.path.display());
        Ok(())
    }
}

/// In-memory state store for tests and ephemeral runs
#[derive(Default)]
pub struct InMemoryStateStore {
    state: RwLock<RateLimitState>,
}

impl InMemoryStateStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimitStateStore for InMemoryStateStore {
    async fn load(&self) -> ResilienceResult<RateLimitState> {
        Ok(self.state.read().await.clone())
    }

    async fn save(&self, state: &RateLimitState) -> ResilienceResult<()> {
        *self.state.write().await = state.clone();
        Ok(())
    }
}

/// Create a state store from a URL-style string
///
/// `memory://` selects the in-memory store. `file://<path>` or a bare path
/// selects the file store; `file://` with no path (or an empty string) uses
/// the default per-user location.
pub fn create_state_store(url: &str) -> ResilienceResult<Arc<dyn RateLimitStateStore>> {
    if url.starts_with("memory://") {
        info!("Using in-memory rate limit state store");
        return Ok(Arc::new(InMemoryStateStore::new()));
    }

    let path = if let Some(rest) = url.strip_prefix("file://") {
        if rest.is_empty() {
            FileStateStore::default_path()?
        } else {
            PathBuf::from(rest)
        }
    } else if url.is_empty() {
        FileStateStore::default_path()?
    } else {
        PathBuf::from(url)
    };

    info!("Using file rate limit state store at {}", path.display());
    Ok(Arc::new(FileStateStore::new(path)))
}
