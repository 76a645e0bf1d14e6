//! Card catalog lookup
//!
//! Resolves a candidate name against the remote catalog: normalize, check the
//! cache tiers, then exact -> fuzzy -> autocomplete, with every request going
//! through the rate-limited queue.

pub mod cache;
pub mod client;
pub mod queue;
pub mod types;

pub use cache::{CacheEntry, Clock, DurableCache, MemoryCache, SystemClock, TieredCache};
pub use client::{CatalogService, ScryfallClient};
pub use queue::RequestQueue;
pub use types::{Card, ImageUris, LookupResult, MatchType, Prices};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::CatalogError;
use crate::text::{is_valid_name, normalize_name, NameRules};
use cache::cache_key;
use types::{ERR_INVALID_NAME, ERR_NAME_TOO_SHORT, ERR_NOT_FOUND};

/// Catalog lookup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Catalog API root
    pub base_url: String,
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Cache entry lifetime in hours
    pub cache_ttl_hours: u64,
    /// Minimum spacing between request starts (ms)
    pub min_request_interval_ms: u64,
    /// Sleep before retrying a rate-limited request (ms)
    pub rate_limit_backoff_ms: u64,
    /// Maximum suggestions returned when nothing matched
    pub max_suggestions: usize,
    /// Keep a durable cache on disk
    pub durable_cache: bool,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.scryfall.com".to_string(),
            user_agent: format!("cardscan/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 10,
            cache_ttl_hours: 24,
            min_request_interval_ms: 100,
            rate_limit_backoff_ms: 1000,
            max_suggestions: 5,
            durable_cache: true,
        }
    }
}

impl LookupConfig {
    pub fn ttl_ms(&self) -> u64 {
        self.cache_ttl_hours.saturating_mul(60 * 60 * 1000)
    }
}

/// Owns the cache tiers and the request queue
pub struct LookupOrchestrator {
    service: Arc<dyn CatalogService>,
    cache: TieredCache,
    queue: RequestQueue,
    rules: NameRules,
    max_suggestions: usize,
}

impl LookupOrchestrator {
    pub fn new(
        service: Arc<dyn CatalogService>,
        durable: Option<Arc<dyn DurableCache>>,
        config: &LookupConfig,
        rules: NameRules,
    ) -> Self {
        Self::with_clock(service, durable, config, rules, Arc::new(SystemClock))
    }

    pub fn with_clock(
        service: Arc<dyn CatalogService>,
        durable: Option<Arc<dyn DurableCache>>,
        config: &LookupConfig,
        rules: NameRules,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            cache: TieredCache::new(durable, clock, config.ttl_ms()),
            queue: RequestQueue::new(
                Duration::from_millis(config.min_request_interval_ms),
                Duration::from_millis(config.rate_limit_backoff_ms),
            ),
            rules,
            max_suggestions: config.max_suggestions,
        }
    }

    /// Resolve a candidate name
    pub async fn lookup(&self, candidate: &str) -> LookupResult {
        let name = normalize_name(candidate, &self.rules);
        if name.chars().count() < self.rules.min_length.max(2) {
            debug!("Rejecting candidate {:?}: too short", candidate);
            return LookupResult::failed(ERR_NAME_TOO_SHORT);
        }
        if !is_valid_name(&name, &self.rules) {
            debug!("Rejecting candidate {:?}: not a name", candidate);
            return LookupResult::failed(ERR_INVALID_NAME);
        }

        for kind in [MatchType::Exact, MatchType::Fuzzy] {
            if let Some(card) = self.cache.get(&cache_key(kind, &name)).await {
                info!("Cache hit for {:?} ({:?})", name, kind);
                return LookupResult::found(card, kind, true);
            }
        }

        let service = self.service.as_ref();
        let query = name.as_str();
        for kind in [MatchType::Exact, MatchType::Fuzzy] {
            let outcome = self
                .queue
                .execute(move || async move {
                    match kind {
                        MatchType::Fuzzy => service.named_fuzzy(query).await,
                        _ => service.named_exact(query).await,
                    }
                })
                .await;

            match outcome {
                Ok(Some(card)) => {
                    info!("Found {:?} by {:?} match: {}", name, kind, card.name);
                    self.cache.put(&cache_key(kind, &name), &card).await;
                    return LookupResult::found(card, kind, false);
                }
                Ok(None) => debug!("No {:?} match for {:?}", kind, name),
                Err(e) => return self.failure(&name, e),
            }
        }

        match self.queue.execute(move || service.autocomplete(query)).await {
            Ok(candidates) => {
                let suggestions = rank_suggestions(&name, candidates, self.max_suggestions);
                info!("No match for {:?}, {} suggestions", name, suggestions.len());
                LookupResult::not_found(suggestions)
            }
            Err(e) => self.failure(&name, e),
        }
    }

    /// Resolve a catalog id
    pub async fn lookup_by_id(&self, id: &str) -> LookupResult {
        let id = id.trim();
        if id.is_empty() {
            return LookupResult::failed("invalid card id");
        }

        let key = cache_key(MatchType::Id, id);
        if let Some(card) = self.cache.get(&key).await {
            return LookupResult::found(card, MatchType::Id, true);
        }

        let service = self.service.as_ref();
        match self.queue.execute(move || service.card_by_id(id)).await {
            Ok(Some(card)) => {
                self.cache.put(&key, &card).await;
                LookupResult::found(card, MatchType::Id, false)
            }
            Ok(None) => LookupResult::failed(ERR_NOT_FOUND),
            Err(e) => self.failure(id, e),
        }
    }

    /// Name completions for manual entry
    pub async fn autocomplete(&self, prefix: &str) -> Result<Vec<String>, CatalogError> {
        let prefix = prefix.trim();
        if prefix.chars().count() < 2 {
            return Ok(Vec::new());
        }
        let service = self.service.as_ref();
        self.queue.execute(move || service.autocomplete(prefix)).await
    }

    /// Drop every cached entry
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("Lookup cache cleared");
    }

    fn failure(&self, query: &str, error: CatalogError) -> LookupResult {
        warn!("Catalog lookup for {:?} failed: {}", query, error);
        LookupResult::failed(error.to_string())
    }
}

/// Closest candidates first (Jaro-Winkler, case-insensitive)
fn rank_suggestions(query: &str, candidates: Vec<String>, limit: usize) -> Vec<String> {
    let query = query.to_lowercase();
    let mut scored: Vec<(f64, String)> = candidates
        .into_iter()
        .map(|c| (strsim::jaro_winkler(&query, &c.to_lowercase()), c))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}
