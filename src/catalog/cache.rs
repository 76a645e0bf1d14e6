//! Two-tier lookup cache
//!
//! An in-process map in front of an optional durable store. Both tiers hold
//! the same [`CacheEntry`] shape and apply the same TTL; expired entries are
//! evicted when they are read. The durable tier is best-effort: its failures
//! are logged and treated as misses.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use super::types::{Card, MatchType};
use crate::error::CacheError;

/// Wall-clock source for entry timestamps
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_ms(&self) -> u64;
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Cached card keyed by `"<kind>:<lowercase name or id>"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Card,
    pub timestamp_ms: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) > ttl_ms
    }
}

/// Cache key for a lookup kind and a name or id
pub fn cache_key(kind: MatchType, value: &str) -> String {
    let prefix = match kind {
        MatchType::Exact => "exact",
        MatchType::Fuzzy => "fuzzy",
        MatchType::Id => "id",
    };
    format!("{}:{}", prefix, value.trim().to_lowercase())
}

/// Persistent key-value store backing the second tier
pub trait DurableCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;
    fn put(&self, entry: &CacheEntry) -> Result<(), CacheError>;
    fn remove(&self, key: &str) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

/// Session-lifetime map
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn insert(&self, entry: CacheEntry) {
        self.entries.lock().insert(entry.key.clone(), entry);
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// In-process tier in front of an optional durable tier
pub struct TieredCache {
    memory: MemoryCache,
    durable: Option<Arc<dyn DurableCache>>,
    clock: Arc<dyn Clock>,
    ttl_ms: u64,
}

impl TieredCache {
    pub fn new(durable: Option<Arc<dyn DurableCache>>, clock: Arc<dyn Clock>, ttl_ms: u64) -> Self {
        Self {
            memory: MemoryCache::new(),
            durable,
            clock,
            ttl_ms,
        }
    }

    pub fn memory(&self) -> &MemoryCache {
        &self.memory
    }

    /// Run a durable-tier call on the blocking pool
    ///
    /// `None` when there is no durable tier.
    async fn durable<T, F>(&self, call: F) -> Option<Result<T, CacheError>>
    where
        T: Send + 'static,
        F: FnOnce(&dyn DurableCache) -> Result<T, CacheError> + Send + 'static,
    {
        let durable = self.durable.clone()?;
        let result = tokio::task::spawn_blocking(move || call(durable.as_ref()))
            .await
            .unwrap_or_else(|e| Err(CacheError::Io(std::io::Error::other(e))));
        Some(result)
    }

    /// Check the in-process tier, then the durable tier
    ///
    /// A durable hit is copied into the in-process tier with its original
    /// timestamp.
    pub async fn get(&self, key: &str) -> Option<Card> {
        let now = self.clock.now_ms();

        if let Some(entry) = self.memory.get(key) {
            if !entry.is_expired(now, self.ttl_ms) {
                debug!("Memory cache hit: {}", key);
                return Some(entry.data);
            }
            debug!("Evicting expired memory entry: {}", key);
            self.memory.remove(key);
        }

        let owned = key.to_string();
        match self.durable(move |store| store.get(&owned)).await? {
            Ok(Some(entry)) if !entry.is_expired(now, self.ttl_ms) => {
                debug!("Durable cache hit: {}", key);
                let card = entry.data.clone();
                self.memory.insert(entry);
                Some(card)
            }
            Ok(Some(_)) => {
                debug!("Evicting expired durable entry: {}", key);
                let owned = key.to_string();
                if let Some(Err(e)) = self.durable(move |store| store.remove(&owned)).await {
                    debug!("Failed to evict {}: {}", key, e);
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!("Durable cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    /// Write to both tiers
    pub async fn put(&self, key: &str, card: &Card) {
        let entry = CacheEntry {
            key: key.to_string(),
            data: card.clone(),
            timestamp_ms: self.clock.now_ms(),
        };

        let stored = entry.clone();
        if let Some(Err(e)) = self.durable(move |store| store.put(&stored)).await {
            warn!("Durable cache write failed for {}: {}", key, e);
        }
        self.memory.insert(entry);
    }

    /// Empty the in-process tier; the durable tier is cleared best-effort
    pub async fn clear(&self) {
        self.memory.clear();
        if let Some(Err(e)) = self.durable(|store| store.clear()).await {
            warn!("Failed to clear durable cache: {}", e);
        }
    }
}
