//! Cache adapter contract used by the read path.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Key holding the serialized full todo list.
pub const CACHE_KEY_TODOS: &str = "todos";

/// Lifetime of a cached todo list.
pub const DEFAULT_TODOS_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache could not be reached or rejected the command. Distinct from a
    /// missing key, which is `Ok(None)`.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

impl CacheError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any existing entry, expiring after `ttl`.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;
}
