//! Relationship Cache - fetch deduplication keyed by entity type and filter
//!
//! Entries never expire; they live as long as the cache instance, which is
//! normally created once per application session and injected into the
//! loader. The lock is never held while a fetch is in flight, so two callers
//! missing on the same key may both fetch; the value that resolves last is
//! the one that stays cached.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Instant;

use tokio::sync::RwLock;
use tracing::debug;

use crate::entity::{EntityRecord, EntityType};
use crate::error::RelationResult;
use crate::gateway::EntityFilter;

/// Cache key: `(entity_type, filter_field, filter_value)`
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheKey {
    pub entity_type: EntityType,
    pub filter_field: String,
    pub filter_value: String,
}

impl CacheKey {
    pub fn new(
        entity_type: EntityType,
        filter_field: impl Into<String>,
        filter_value: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            filter_field: filter_field.into(),
            filter_value: filter_value.into(),
        }
    }

    pub fn from_filter(entity_type: EntityType, filter: &EntityFilter) -> Self {
        let (field, value) = filter.query_pair();
        Self::new(entity_type, field, value)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}?{}={}", self.entity_type, self.filter_field, self.filter_value)
    }
}

/// Cached fetch result
#[derive(Debug, Clone)]
struct CacheEntry {
    records: Vec<EntityRecord>,
    stored_at: Instant,
}

impl CacheEntry {
    fn new(records: Vec<EntityRecord>) -> Self {
        Self {
            records,
            stored_at: Instant::now(),
        }
    }
}

/// Process-lifetime cache of entity fetch results
#[derive(Debug, Default)]
pub struct RelationshipCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    metrics: RwLock<CacheMetrics>,
}

impl RelationshipCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, or run `fetch_fn` and cache its result.
    ///
    /// With `bypass` set the fetch always runs and overwrites any cached
    /// value. A failed fetch leaves the cache untouched.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey,
        fetch_fn: F,
        bypass: bool,
    ) -> RelationResult<Vec<EntityRecord>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RelationResult<Vec<EntityRecord>>>,
    {
        if bypass {
            self.metrics.write().await.bypasses += 1;
        } else if let Some(records) = self.lookup(&key).await {
            debug!(%key, count = records.len(), "Relationship cache hit");
            return Ok(records);
        } else {
            debug!(%key, "Relationship cache miss");
        }

        match fetch_fn().await {
            Ok(records) => {
                self.store(key, records.clone()).await;
                Ok(records)
            }
            Err(err) => {
                self.metrics.write().await.failures += 1;
                debug!(%key, error = %err, "Fetch failed, key left uncached");
                Err(err)
            }
        }
    }

    /// Cached value for `key`, counting the hit or miss
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<EntityRecord>> {
        self.lookup(key).await
    }

    /// Check presence without touching metrics
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    /// Store a value directly, overwriting any previous one
    pub async fn store(&self, key: CacheKey, records: Vec<EntityRecord>) {
        self.entries.write().await.insert(key, CacheEntry::new(records));
        self.metrics.write().await.stores += 1;
    }

    /// Remove one key
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Remove every key for an entity type, e.g. after a create/update/delete
    pub async fn invalidate_entity_type(&self, entity_type: EntityType) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| key.entity_type != entity_type);
        let removed = before - entries.len();
        debug!(%entity_type, removed, "Invalidated cached fetches");
        removed
    }

    /// Clear all cached entries and reset metrics
    pub async fn clear(&self) {
        self.entries.write().await.clear();
        *self.metrics.write().await = CacheMetrics::default();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Get cache statistics
    pub async fn stats(&self) -> CacheStatistics {
        let entries = self.entries.read().await;
        let metrics = self.metrics.read().await;

        let mut entity_type_counts = HashMap::new();
        for key in entries.keys() {
            *entity_type_counts.entry(key.entity_type).or_insert(0) += 1;
        }

        CacheStatistics {
            total_entries: entries.len(),
            total_records: entries.values().map(|e| e.records.len()).sum(),
            oldest_entry_age: entries.values().map(|e| e.stored_at.elapsed()).max(),
            entity_type_counts,
            hits: metrics.hits,
            misses: metrics.misses,
            bypasses: metrics.bypasses,
            stores: metrics.stores,
            failures: metrics.failures,
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Vec<EntityRecord>> {
        let found = self
            .entries
            .read()
            .await
            .get(key)
            .map(|entry| entry.records.clone());

        let mut metrics = self.metrics.write().await;
        if found.is_some() {
            metrics.hits += 1;
        } else {
            metrics.misses += 1;
        }
        found
    }
}

/// Cache metrics for monitoring and debugging
#[derive(Debug, Clone, Default)]
struct CacheMetrics {
    hits: usize,
    misses: usize,
    bypasses: usize,
    stores: usize,
    failures: usize,
}

/// Public cache statistics
#[derive(Debug, Clone)]
pub struct CacheStatistics {
    pub total_entries: usize,
    pub total_records: usize,
    pub oldest_entry_age: Option<std::time::Duration>,
    pub entity_type_counts: HashMap<EntityType, usize>,
    pub hits: usize,
    pub misses: usize,
    pub bypasses: usize,
    pub stores: usize,
    pub failures: usize,
}

impl CacheStatistics {
    pub fn hit_ratio(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelationError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn league_key() -> CacheKey {
        CacheKey::new(EntityType::League, "id", "league-1")
    }

    fn league() -> Vec<EntityRecord> {
        vec![EntityRecord::new("league-1", "Premier")]
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let cache = RelationshipCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let records = cache
                .get_or_fetch(
                    league_key(),
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(league())
                    },
                    false,
                )
                .await
                .unwrap();
            assert_eq!(records, league());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.stores, 1);
    }

    #[tokio::test]
    async fn test_bypass_always_fetches_and_overwrites() {
        let cache = RelationshipCache::new();
        cache.store(league_key(), league()).await;

        let renamed = vec![EntityRecord::new("league-1", "Premier League")];
        let records = cache
            .get_or_fetch(league_key(), || async { Ok(renamed.clone()) }, true)
            .await
            .unwrap();
        assert_eq!(records[0].name(), "Premier League");
        assert_eq!(cache.get(&league_key()).await.unwrap()[0].name(), "Premier League");
        assert_eq!(cache.stats().await.bypasses, 1);
    }

    #[tokio::test]
    async fn test_failure_does_not_populate() {
        let cache = RelationshipCache::new();

        let result = cache
            .get_or_fetch(
                league_key(),
                || async { Err(RelationError::transport(Some(500), "boom")) },
                false,
            )
            .await;
        assert!(result.is_err());
        assert!(!cache.contains(&league_key()).await);

        let retried = cache
            .get_or_fetch(league_key(), || async { Ok(league()) }, false)
            .await
            .unwrap();
        assert_eq!(retried, league());
        assert_eq!(cache.stats().await.failures, 1);
    }

    #[tokio::test]
    async fn test_failed_bypass_keeps_previous_value() {
        let cache = RelationshipCache::new();
        cache.store(league_key(), league()).await;

        let result = cache
            .get_or_fetch(
                league_key(),
                || async { Err(RelationError::transport(None, "offline")) },
                true,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(cache.get(&league_key()).await, Some(league()));
    }

    #[tokio::test]
    async fn test_concurrent_misses_keep_last_resolved() {
        let cache = Arc::new(RelationshipCache::new());

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(
                        league_key(),
                        || async {
                            tokio::time::sleep(std::time::Duration::from_millis(40)).await;
                            Ok(vec![EntityRecord::new("league-1", "Slow")])
                        },
                        false,
                    )
                    .await
            })
        };
        let fast = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_fetch(
                        league_key(),
                        || async { Ok(vec![EntityRecord::new("league-1", "Fast")]) },
                        false,
                    )
                    .await
            })
        };

        let fast = fast.await.unwrap().unwrap();
        let slow = slow.await.unwrap().unwrap();
        assert_eq!(fast.len(), 1);
        assert_eq!(slow.len(), 1);

        let cached = cache.get(&league_key()).await.unwrap();
        assert_eq!(cached[0].name(), "Slow");
    }

    #[tokio::test]
    async fn test_invalidate_entity_type() {
        let cache = RelationshipCache::new();
        cache.store(league_key(), league()).await;
        cache
            .store(CacheKey::new(EntityType::League, "limit", "100"), league())
            .await;
        cache
            .store(CacheKey::new(EntityType::Team, "league_id", "league-1"), Vec::new())
            .await;

        assert_eq!(cache.invalidate_entity_type(EntityType::League).await, 2);
        assert_eq!(cache.len().await, 1);
        assert!(cache.invalidate(&CacheKey::new(EntityType::Team, "league_id", "league-1")).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let cache = RelationshipCache::new();
        cache.store(league_key(), league()).await;
        cache.get(&league_key()).await;
        cache.get(&CacheKey::new(EntityType::Stadium, "id", "s-1")).await;

        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.entity_type_counts.get(&EntityType::League), Some(&1));
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);

        cache.clear().await;
        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_key_from_filter() {
        let key = CacheKey::from_filter(EntityType::Team, &EntityFilter::equals("league_id", "l-1"));
        assert_eq!(key, CacheKey::new(EntityType::Team, "league_id", "l-1"));
        assert_eq!(key.to_string(), "team?league_id=l-1");
    }
}
