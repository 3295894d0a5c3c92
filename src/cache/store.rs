use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::AnalysisCache;
use crate::error::{ErrorCode, PipelineError};
use crate::models::analysis::RepositoryAnalysis;
use crate::models::now_unix;

/// Content-addressed file cache, sharded by the first two hex characters
/// of the key.
pub struct FileCache {
    dir: PathBuf,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    stored_at: u64,
    ttl_secs: u64,
    analysis: RepositoryAnalysis,
}

impl FileCache {
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(|e| {
            PipelineError::new(
                ErrorCode::CacheError,
                format!("Cannot create cache directory {}: {e}", dir.display()),
            )
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Clear the entire cache.
    pub fn clear(&self) -> Result<()> {
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
            fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        let (prefix, rest) = key.split_at(2.min(key.len()));
        self.dir.join(prefix).join(format!("{rest}.analysis.json"))
    }

    fn read(&self, key: &str) -> Option<Arc<RepositoryAnalysis>> {
        let path = self.cache_path(key);
        let bytes = fs::read(&path).ok()?;
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry, discarding");
                let _ = fs::remove_file(&path);
                return None;
            }
        };
        if now_unix().saturating_sub(envelope.stored_at) >= envelope.ttl_secs {
            debug!(key, "cache entry expired");
            let _ = fs::remove_file(&path);
            return None;
        }
        Some(Arc::new(envelope.analysis))
    }

    fn write(&self, key: &str, analysis: &RepositoryAnalysis, ttl: Duration) -> Result<()> {
        let path = self.cache_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let envelope = Envelope {
            stored_at: now_unix(),
            ttl_secs: ttl.as_secs(),
            analysis: analysis.clone(),
        };
        // Write-then-rename so a concurrent reader never sees a partial file.
        let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
        fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
        fs::rename(&tmp, &path).context("Failed to publish cache entry")?;
        Ok(())
    }
}

#[async_trait]
impl AnalysisCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<Arc<RepositoryAnalysis>>> {
        Ok(self.read(key))
    }

    async fn put(&self, key: &str, analysis: Arc<RepositoryAnalysis>, ttl: Duration) -> Result<()> {
        self.write(key, &analysis, ttl).map_err(|e| {
            PipelineError::new(ErrorCode::CacheError, format!("Cache write failed: {e}")).into()
        })
    }

    async fn invalidate(&self, key: &str) -> Result<()> {
        let path = self.cache_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::new(
                ErrorCode::CacheError,
                format!("Cache invalidation failed: {e}"),
            )
            .into()),
        }
    }
}
