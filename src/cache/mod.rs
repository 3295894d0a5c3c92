//! Analysis cache seam.
//!
//! Entries are keyed by [`cache_key`] and expire after their TTL. Content
//! validity (fingerprint match) is checked by the analyzer, not here.

pub mod memory;
pub mod store;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CacheBackend, CacheConfig};
use crate::models::analysis::RepositoryAnalysis;

#[async_trait]
pub trait AnalysisCache: Send + Sync {
    /// Live entry for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Arc<RepositoryAnalysis>>>;

    async fn put(&self, key: &str, analysis: Arc<RepositoryAnalysis>, ttl: Duration) -> Result<()>;

    async fn invalidate(&self, key: &str) -> Result<()>;
}

/// BLAKE3 hash of the repository identity.
pub fn cache_key(repository_id: &str) -> String {
    blake3::hash(repository_id.as_bytes()).to_hex().to_string()
}

/// Build the configured cache backend.
pub fn from_config(config: &CacheConfig) -> Result<Arc<dyn AnalysisCache>> {
    Ok(match config.backend {
        CacheBackend::Memory => Arc::new(memory::MemoryCache::new(config.capacity)),
        CacheBackend::File => Arc::new(store::FileCache::new(config.dir.clone())?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_is_stable_hex() {
        let a = cache_key("/work/web");
        assert_eq!(a, cache_key("/work/web"));
        assert_ne!(a, cache_key("/work/api"));
        assert_eq!(a.len(), 64);
    }
}
