use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use super::AnalysisCache;
use crate::models::analysis::RepositoryAnalysis;

struct Entry {
    analysis: Arc<RepositoryAnalysis>,
    stored_at: Instant,
    ttl: Duration,
}

/// Bounded in-process cache. Hits hand back the stored `Arc` itself.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl AnalysisCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<RepositoryAnalysis>>> {
        let mut entries = self.entries();
        if let Some(entry) = entries.get(key)
            && entry.stored_at.elapsed() < entry.ttl
        {
            return Ok(Some(Arc::clone(&entry.analysis)));
        }
        entries.pop(key);
        Ok(None)
    }

    async fn put(&self, key: &str, analysis: Arc<RepositoryAnalysis>, ttl: Duration) -> Result<()> {
        self.entries().put(
            key.to_string(),
            Entry {
                analysis,
                stored_at: Instant::now(),
                ttl,
            },
        );
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        self.entries().pop(key);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::analysis::RepositoryAnalysis;

    pub(crate) fn sample(id: &str) -> Arc<RepositoryAnalysis> {
        Arc::new(RepositoryAnalysis::empty(id, "hash"))
    }

    #[tokio::test]
    async fn test_hit_returns_same_arc() {
        let cache = MemoryCache::new(4);
        let a = sample("r");
        cache.put("k", Arc::clone(&a), Duration::from_secs(60)).await.unwrap();
        let hit = cache.get("k").await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &hit));
    }

    #[tokio::test]
    async fn test_expired_entry_is_dropped() {
        let cache = MemoryCache::new(4);
        cache.put("k", sample("r"), Duration::ZERO).await.unwrap();
        assert!(cache.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let cache = MemoryCache::new(1);
        let ttl = Duration::from_secs(60);
        cache.put("a", sample("a"), ttl).await.unwrap();
        cache.put("b", sample("b"), ttl).await.unwrap();
        assert!(cache.get("a").await.unwrap().is_none());
        assert!(cache.get("b").await.unwrap().is_some());
        cache.invalidate("b").await.unwrap();
        assert!(cache.get("b").await.unwrap().is_none());
    }
}
