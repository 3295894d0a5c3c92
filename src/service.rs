use anyhow::{Result, bail};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::backend::ModelBackend;
use crate::backend::anthropic::AnthropicBackend;
use crate::backend::offline::OfflineBackend;
use crate::cache::{self, AnalysisCache};
use crate::config::{Config, GenerationConfig};
use crate::engine::analyzer::RepositoryAnalyzer;
use crate::engine::bug::BugAnalyzer;
use crate::engine::generator::CodeGenerator;
use crate::engine::orchestrator::Orchestrator;
use crate::engine::ranker::RelevanceRanker;
use crate::engine::testgen::TestGenerator;
use crate::error::PipelineError;
use crate::models::analysis::RepositoryAnalysis;
use crate::models::bug::{BugAnalysis, Priority};
use crate::models::development::{DevelopmentRequest, DevelopmentResult};
use crate::models::generation::{GeneratedCode, GenerationOptions, OptimizeFor, Specification};
use crate::models::relevance::RelevantFile;
use crate::models::testing::{TestGeneration, TestGenerationRequest};
use crate::store::RepositoryStore;
use crate::store::local::LocalRepository;

/// Default number of ranked files returned by `rank`.
pub const DEFAULT_RANK_LIMIT: usize = 10;

/// Environment variable that confines session and MCP requests to one tree.
pub const WORKSPACE_ENV: &str = "REPO_SIGHT_WORKSPACE";

// ---------------------------------------------------------------------------
// AppService: unified core logic for CLI / Session / MCP
// ---------------------------------------------------------------------------

pub struct AppService {
    backend: Arc<dyn ModelBackend>,
    analyzer: Arc<RepositoryAnalyzer>,
    ranker: RelevanceRanker,
    bugs: Arc<BugAnalyzer>,
    generator: Arc<CodeGenerator>,
    tests: Arc<TestGenerator>,
    orchestrator: Orchestrator,
    generation: GenerationConfig,
    workspace_root: Option<PathBuf>,
}

impl AppService {
    /// Local-filesystem service. Without `offline`, missing model
    /// credentials fail here, before any repository is touched.
    pub fn from_config(config: &Config, offline: bool) -> Result<Self> {
        let backend: Arc<dyn ModelBackend> = if offline {
            Arc::new(OfflineBackend)
        } else {
            Arc::new(AnthropicBackend::from_config(&config.model)?)
        };
        let cache = cache::from_config(&config.cache)?;
        Ok(Self::with_parts(
            config,
            backend,
            Arc::new(LocalRepository::new()),
            cache,
        ))
    }

    pub fn with_parts(
        config: &Config,
        backend: Arc<dyn ModelBackend>,
        store: Arc<dyn RepositoryStore>,
        cache: Arc<dyn AnalysisCache>,
    ) -> Self {
        let analyzer = Arc::new(RepositoryAnalyzer::new(
            Arc::clone(&backend),
            store,
            cache,
            config.analysis.clone(),
            config.cache.ttl(),
        ));
        let bugs = Arc::new(BugAnalyzer::new(Arc::clone(&backend), Arc::clone(&analyzer)));
        let generator = Arc::new(CodeGenerator::new(
            Arc::clone(&backend),
            Arc::clone(&analyzer),
            std::time::Duration::from_secs(config.model.stream_timeout_secs),
        ));
        let tests = Arc::new(TestGenerator::new(Arc::clone(&backend), Arc::clone(&analyzer)));
        let orchestrator = Orchestrator::new(
            Arc::clone(&analyzer),
            Arc::clone(&bugs),
            Arc::clone(&generator),
            Arc::clone(&tests),
            config.generation.clone(),
        );
        Self {
            ranker: RelevanceRanker::new(Arc::clone(&backend)),
            backend,
            analyzer,
            bugs,
            generator,
            tests,
            orchestrator,
            generation: config.generation.clone(),
            workspace_root: None,
        }
    }

    /// Restrict repository ids to directories under `root`.
    /// The root is canonicalized and must exist.
    pub fn sandboxed(mut self, root: PathBuf) -> Result<Self> {
        let canonical_root = std::fs::canonicalize(&root).map_err(|_| {
            PipelineError::invalid_request(format!("Invalid workspace root: {}", root.display()))
        })?;
        self.workspace_root = Some(canonical_root);
        Ok(self)
    }

    /// Apply [`WORKSPACE_ENV`] when it names a usable directory.
    pub fn sandbox_from_env(self) -> Result<Self> {
        match std::env::var(WORKSPACE_ENV) {
            Ok(ws) if !ws.is_empty() => self.sandboxed(PathBuf::from(ws)),
            _ => Ok(self),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // -----------------------------------------------------------------------
    // Validation helpers
    // -----------------------------------------------------------------------

    fn check_repository(&self, repository: &str) -> Result<()> {
        if repository.trim().is_empty() {
            bail!(PipelineError::invalid_request("Repository must not be empty"));
        }
        if let Some(root) = &self.workspace_root {
            let canonical = std::fs::canonicalize(repository)
                .map_err(|e| PipelineError::repository_unavailable(repository, e))?;
            if !canonical.starts_with(root) {
                warn!(repository, "check_repository: outside workspace boundary");
                bail!(
                    PipelineError::invalid_request(format!(
                        "Repository outside workspace boundary: {repository}"
                    ))
                    .for_repository(repository)
                );
            }
        }
        Ok(())
    }

    /// Generation options from configuration plus per-request overrides.
    pub fn generation_options(
        &self,
        follow_patterns: Option<bool>,
        optimize_for: Option<OptimizeFor>,
    ) -> GenerationOptions {
        let mut options = GenerationOptions::from_config(&self.generation);
        if let Some(follow) = follow_patterns {
            options.follow_patterns = follow;
        }
        if let Some(target) = optimize_for {
            options.optimize_for = target;
        }
        options
    }

    // -----------------------------------------------------------------------
    // Core operations
    // -----------------------------------------------------------------------

    pub async fn analyze(&self, repository: &str, refresh: bool) -> Result<Arc<RepositoryAnalysis>> {
        debug!(repository, refresh, backend = self.backend.name(), "analyze called");
        self.check_repository(repository)?;
        let analysis = self.analyzer.analyze(repository, refresh).await?;
        debug!(repository, files = analysis.structure.files.len(), "analyze completed");
        Ok(analysis)
    }

    pub async fn rank(&self, repository: &str, query: &str, limit: usize) -> Result<Vec<RelevantFile>> {
        debug!(repository, query, limit, "rank called");
        if query.trim().is_empty() {
            bail!(PipelineError::invalid_request("Query must not be empty").for_repository(repository));
        }
        self.check_repository(repository)?;
        let analysis = self.analyzer.analyze(repository, false).await?;
        let ranked = self.ranker.find_relevant_files(query, &analysis, limit).await;
        debug!(repository, ranked = ranked.len(), "rank completed");
        Ok(ranked)
    }

    pub async fn analyze_bug(
        &self,
        repository: &str,
        description: &str,
        steps: Vec<String>,
        priority: Priority,
    ) -> Result<BugAnalysis> {
        debug!(repository, ?priority, "analyze_bug called");
        self.check_repository(repository)?;
        let analysis = self
            .bugs
            .analyze_bug_report(description, repository, steps, priority)
            .await?;
        info!(id = %analysis.id, category = ?analysis.category, status = %analysis.status, "analyze_bug completed");
        Ok(analysis)
    }

    pub async fn generate(
        &self,
        repository: &str,
        spec: &Specification,
        options: &GenerationOptions,
    ) -> Result<GeneratedCode> {
        debug!(repository, title = %spec.title, "generate called");
        self.check_repository(repository)?;
        self.generator.generate(spec, repository, options).await
    }

    pub async fn generate_streaming(
        &self,
        repository: &str,
        spec: &Specification,
        options: &GenerationOptions,
        progress: UnboundedSender<String>,
    ) -> Result<GeneratedCode> {
        debug!(repository, title = %spec.title, "generate_streaming called");
        self.check_repository(repository)?;
        self.generator
            .generate_streaming(spec, repository, options, progress)
            .await
    }

    pub async fn generate_tests(&self, req: &TestGenerationRequest) -> Result<TestGeneration> {
        debug!(repository = %req.repository_id, "generate_tests called");
        self.check_repository(&req.repository_id)?;
        self.tests.generate_tests(req).await
    }

    pub async fn develop(&self, req: &DevelopmentRequest) -> Result<DevelopmentResult> {
        debug!(repository = %req.repository_id, kind = %req.kind, "develop called");
        self.check_repository(&req.repository_id)?;
        self.orchestrator.process(req).await
    }
}
