//! [`SessionStore`]: the persistence contract sessions are saved through, and
//! [`MemoryStore`], an in-process implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors produced by the session persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store did not answer within the configured duration.
    #[error("session store did not respond within {0:?}")]
    Timeout(Duration),

    /// Session data could not be encoded for storage.
    #[error("session data could not be encoded: {0}")]
    Corrupt(String),
}

/// Opaque key-value persistence for session data.
///
/// Keys are session tokens; values are encoded session data. Implementations
/// own expiry: an entry past its expiry must behave as if it had been deleted.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    /// Return the data stored under `token`, or `None` if absent or expired.
    async fn find(&self, token: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or replace the data stored under `token`.
    async fn commit(&self, token: &str, data: &[u8], expiry: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Remove `token`. Removing an absent token is not an error.
    async fn delete(&self, token: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expiry: DateTime<Utc>,
}

/// Entry count below which commits never sweep.
const MIN_SWEEP_LEN: usize = 64;

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    /// Size at which the next commit sweeps out expired entries.
    sweep_at: usize,
}

impl Default for Entries {
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            sweep_at: MIN_SWEEP_LEN,
        }
    }
}

impl Entries {
    /// Drop every expired entry once the map has doubled since the last
    /// sweep, so the cost stays amortised over the commits in between.
    fn sweep_if_due(&mut self, now: DateTime<Utc>) {
        if self.map.len() < self.sweep_at {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, entry| entry.expiry > now);
        self.sweep_at = (self.map.len() * 2).max(MIN_SWEEP_LEN);
        debug!(
            removed = before - self.map.len(),
            remaining = self.map.len(),
            "swept expired sessions"
        );
    }
}

/// Session store held in process memory.
///
/// Wraps an `Arc<RwLock<..>>` so that concurrent requests for different
/// sessions only contend for the duration of a map operation. Expired entries
/// are purged when looked up, and in bulk by commits once the map has grown.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired or not.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn find(&self, token: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let now = Utc::now();
        {
            let entries = self.inner.read().await;
            match entries.map.get(token) {
                None => return Ok(None),
                Some(entry) if entry.expiry > now => return Ok(Some(entry.data.clone())),
                Some(_) => {}
            }
        }
        let mut entries = self.inner.write().await;
        if entries.map.get(token).is_some_and(|entry| entry.expiry <= now) {
            entries.map.remove(token);
        }
        Ok(None)
    }

    async fn commit(
        &self,
        token: &str,
        data: &[u8],
        expiry: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            data: data.to_vec(),
            expiry,
        };
        let mut entries = self.inner.write().await;
        entries.map.insert(token.to_owned(), entry);
        entries.sweep_if_due(Utc::now());
        Ok(())
    }

    async fn delete(&self, token: &str) -> Result<(), StoreError> {
        self.inner.write().await.map.remove(token);
        Ok(())
    }
}
