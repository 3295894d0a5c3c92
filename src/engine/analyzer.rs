//! Repository analyzer.
//!
//! Builds a [`RepositoryAnalysis`] from a listing, a content sample and the
//! manifest, and serves it from the injected cache while the store's
//! fingerprint is unchanged. Only listing failures are fatal; every other
//! step degrades.

use anyhow::Result;
use futures::StreamExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{architecture, index, prompts, scan};
use crate::backend::{ModelBackend, request};
use crate::cache::{AnalysisCache, cache_key};
use crate::config::AnalysisConfig;
use crate::error::{ErrorCode, Phase, PipelineError, code_of};
use crate::language::{is_code_file, is_test_file};
use crate::models::analysis::{CodePatterns, PatternSource, RepositoryAnalysis};
use crate::models::now_unix;
use crate::store::{Manifest, RepositoryStore, listing_hash};

pub struct RepositoryAnalyzer {
    backend: Arc<dyn ModelBackend>,
    store: Arc<dyn RepositoryStore>,
    cache: Arc<dyn AnalysisCache>,
    config: AnalysisConfig,
    ttl: Duration,
}

impl RepositoryAnalyzer {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        store: Arc<dyn RepositoryStore>,
        cache: Arc<dyn AnalysisCache>,
        config: AnalysisConfig,
        ttl: Duration,
    ) -> Self {
        Self {
            backend,
            store,
            cache,
            config,
            ttl,
        }
    }

    pub fn store(&self) -> &Arc<dyn RepositoryStore> {
        &self.store
    }

    /// Analyze `repository_id`, reading the cache first unless
    /// `force_refresh`.
    pub async fn analyze(
        &self,
        repository_id: &str,
        force_refresh: bool,
    ) -> Result<Arc<RepositoryAnalysis>> {
        debug!(repository = repository_id, force_refresh, "analyze called");

        let mut files = self.store.list_files(repository_id).await.map_err(|e| {
            if code_of(&e) == ErrorCode::RepositoryUnavailable {
                e
            } else {
                PipelineError::repository_unavailable(repository_id, e).into()
            }
        })?;
        files.sort();
        files.dedup();

        let fingerprint = match self.store.fingerprint(repository_id, &files).await {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "store fingerprint failed, hashing the listing instead");
                listing_hash(&files)
            }
        };

        let key = cache_key(repository_id);
        if force_refresh {
            if let Err(e) = self.cache.invalidate(&key).await {
                warn!(error = %e, "cache invalidation failed");
            }
        } else {
            match self.cache.get(&key).await {
                Ok(Some(cached)) if cached.content_hash == fingerprint => {
                    debug!(repository = repository_id, "analysis served from cache");
                    return Ok(cached);
                }
                Ok(Some(_)) => debug!(repository = repository_id, "cached analysis is stale"),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "cache read failed, analyzing from scratch"),
            }
        }

        let analysis = Arc::new(self.build(repository_id, files, fingerprint).await);
        if let Err(e) = self
            .cache
            .put(&key, Arc::clone(&analysis), self.ttl)
            .await
        {
            warn!(error = %e, "cache write failed");
        }
        debug!(
            repository = repository_id,
            files = analysis.structure.files.len(),
            "analyze completed"
        );
        Ok(analysis)
    }

    async fn build(
        &self,
        repository_id: &str,
        files: Vec<String>,
        fingerprint: String,
    ) -> RepositoryAnalysis {
        let code_files: Vec<String> = files.iter().filter(|f| is_code_file(f)).cloned().collect();
        let sample = sample_files(&code_files, self.config.sample_limit);

        // Sample first so its files are never crowded out of the index.
        let mut to_fetch: Vec<String> = sample.clone();
        let sampled: BTreeSet<&String> = sample.iter().collect();
        to_fetch.extend(
            code_files
                .iter()
                .filter(|f| !sampled.contains(f))
                .take(self.config.max_indexed_files.saturating_sub(sample.len()))
                .cloned(),
        );
        let contents = self.fetch_all(repository_id, to_fetch).await;

        let samples: Vec<(String, String)> = sample
            .iter()
            .filter_map(|p| contents.get(p).map(|c| (p.clone(), c.clone())))
            .collect();
        let patterns = self.extract_patterns(&samples).await;

        let manifest = self.manifest(repository_id).await;
        let pairs: Vec<(String, String)> = contents
            .iter()
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        let scans = scan::scan_all(&pairs);

        RepositoryAnalysis {
            repository_id: repository_id.to_string(),
            content_hash: fingerprint,
            analyzed_at: now_unix(),
            structure: architecture::structure(&files, &contents),
            patterns,
            dependencies: scan::dependency_map(&scans, &files, manifest.as_ref()),
            architecture: architecture::detect(&files, manifest.as_ref()),
            search_index: index::build(&scans),
        }
    }

    /// Fetch contents with bounded concurrency. Failed reads are skipped.
    async fn fetch_all(&self, repository_id: &str, paths: Vec<String>) -> BTreeMap<String, String> {
        let concurrency = self.config.fetch_concurrency.max(1);
        futures::stream::iter(paths)
            .map(|path| async move {
                let result = self.store.get_file_content(repository_id, &path).await;
                (path, result)
            })
            .buffer_unordered(concurrency)
            .filter_map(|(path, result)| async move {
                match result {
                    Ok(content) => Some((path, content)),
                    Err(e) => {
                        warn!(phase = %Phase::DependencyScan, path = %path, error = %e, "file fetch failed, skipping");
                        None
                    }
                }
            })
            .collect()
            .await
    }

    async fn extract_patterns(&self, samples: &[(String, String)]) -> CodePatterns {
        if samples.is_empty() {
            return CodePatterns::default();
        }
        let prompt = prompts::pattern_extraction(samples);
        match request::<CodePatterns>(self.backend.as_ref(), &prompt, Phase::PatternExtraction).await
        {
            Ok(patterns) => CodePatterns {
                source: PatternSource::Model,
                ..patterns.normalized()
            },
            Err(e) => {
                warn!(phase = %Phase::PatternExtraction, error = %e, "pattern extraction failed, falling back to defaults");
                CodePatterns::default()
            }
        }
    }

    async fn manifest(&self, repository_id: &str) -> Option<Manifest> {
        match self.store.get_manifest(repository_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!(phase = %Phase::DependencyScan, error = %e, "manifest unreadable, falling back to import scan");
                None
            }
        }
    }
}

/// One code file per leaf directory, then filled in listing order up to
/// `limit`. Test files are only used when nothing else is left.
pub fn sample_files(code_files: &[String], limit: usize) -> Vec<String> {
    let dir_of = |f: &str| f.rsplit_once('/').map(|(d, _)| d.to_string()).unwrap_or_default();
    let dirs: BTreeSet<String> = code_files.iter().map(|f| dir_of(f)).collect();
    let is_leaf = |dir: &str| {
        !dirs
            .iter()
            .any(|other| other.len() > dir.len() && (dir.is_empty() || other.starts_with(&format!("{dir}/"))))
    };

    let ordered: Vec<&String> = code_files
        .iter()
        .filter(|f| !is_test_file(f))
        .chain(code_files.iter().filter(|f| is_test_file(f)))
        .collect();

    let mut picked: Vec<String> = Vec::new();
    let mut seen_dirs = BTreeSet::new();
    for f in &ordered {
        if picked.len() >= limit {
            break;
        }
        let dir = dir_of(f);
        if is_leaf(&dir) && seen_dirs.insert(dir) {
            picked.push((*f).clone());
        }
    }
    for f in &ordered {
        if picked.len() >= limit {
            break;
        }
        if !picked.contains(f) {
            picked.push((*f).clone());
        }
    }
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::offline::OfflineBackend;
    use crate::backend::scripted::ScriptedBackend;
    use crate::cache::memory::MemoryCache;
    use crate::store::memory::InMemoryRepository;

    fn repo() -> Arc<InMemoryRepository> {
        Arc::new(
            InMemoryRepository::new()
                .with_file("r", "src/auth/login.ts", "import { check } from './session';\nexport function login() {}\n")
                .with_file("r", "src/auth/session.ts", "export function check() {}\n")
                .with_file("r", "src/ui/Button.tsx", "export function Button() { return null; }\n")
                .with_file("r", "src/index.ts", "export * from './auth/login';\n")
                .with_file("r", "package.json", r#"{"dependencies":{"react":"18"}}"#),
        )
    }

    fn analyzer(backend: Arc<dyn ModelBackend>, store: Arc<InMemoryRepository>) -> RepositoryAnalyzer {
        RepositoryAnalyzer::new(
            backend,
            store,
            Arc::new(MemoryCache::new(8)),
            AnalysisConfig::default(),
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_sample_prefers_leaf_directories() {
        let files: Vec<String> = ["src/a/x.ts", "src/a/y.ts", "src/b/z.ts", "src/root.ts", "src/a/x.test.ts"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(sample_files(&files, 2), vec!["src/a/x.ts", "src/b/z.ts"]);
        assert_eq!(
            sample_files(&files, 4),
            vec!["src/a/x.ts", "src/b/z.ts", "src/a/y.ts", "src/root.ts"]
        );
        assert!(sample_files(&files, 0).is_empty());
    }

    #[tokio::test]
    async fn test_offline_analysis_uses_defaults_and_scans() {
        let a = analyzer(Arc::new(OfflineBackend), repo());
        let analysis = a.analyze("r", false).await.unwrap();
        assert_eq!(analysis.patterns.source, PatternSource::Default);
        assert_eq!(analysis.patterns.naming.functions, "camelCase");
        assert_eq!(analysis.architecture.framework.as_deref(), Some("React"));
        assert_eq!(
            analysis.dependencies.importers_of("src/auth/session.ts"),
            vec!["src/auth/login.ts"]
        );
        assert_eq!(analysis.search_index.components["Button"], vec!["src/ui/Button.tsx"]);
        assert_eq!(analysis.structure.primary_language.as_deref(), Some("typescript"));
    }

    #[tokio::test]
    async fn test_model_patterns_are_used() {
        let backend = ScriptedBackend::new().on(
            prompts::PATTERN_EXTRACTION,
            r#"{"naming":{"functions":"snake_case","consistency":0.9}}"#,
        );
        let a = analyzer(Arc::new(backend), repo());
        let analysis = a.analyze("r", false).await.unwrap();
        assert_eq!(analysis.patterns.source, PatternSource::Model);
        assert_eq!(analysis.patterns.naming.functions, "snake_case");
        assert_eq!(analysis.patterns.naming.classes, "PascalCase");
    }

    #[tokio::test]
    async fn test_cache_hit_and_invalidation() {
        let store = repo();
        let backend = Arc::new(ScriptedBackend::new());
        let a = analyzer(backend.clone(), Arc::clone(&store));

        let first = a.analyze("r", false).await.unwrap();
        let second = a.analyze("r", false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.calls_matching(prompts::PATTERN_EXTRACTION), 1);

        store.insert("r", "src/auth/reset.ts", "export function reset() {}\n");
        let third = a.analyze("r", false).await.unwrap();
        assert_ne!(first.content_hash, third.content_hash);
        assert!(third.structure.files.contains(&"src/auth/reset.ts".to_string()));

        let forced = a.analyze("r", true).await.unwrap();
        assert!(!Arc::ptr_eq(&third, &forced));
        assert_eq!(backend.calls_matching(prompts::PATTERN_EXTRACTION), 3);
    }

    #[tokio::test]
    async fn test_unknown_repository_is_fatal() {
        let a = analyzer(Arc::new(OfflineBackend), repo());
        let err = a.analyze("missing", false).await.unwrap_err();
        let pe = err.downcast_ref::<PipelineError>().unwrap();
        assert_eq!(pe.code, ErrorCode::RepositoryUnavailable);
        assert_eq!(pe.phase, Some(Phase::Listing));
    }
}
