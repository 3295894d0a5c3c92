use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::schemars;
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Config;
use crate::doctor;
use crate::models::bug::Priority;
use crate::models::development::DevelopmentRequest;
use crate::models::generation::{GeneratedImplementation, OptimizeFor, Specification, TaskKind};
use crate::models::testing::{TestGenerationRequest, TestType};
use crate::service::{AppService, DEFAULT_RANK_LIMIT};

// ---------------------------------------------------------------------------
// Tool parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RepoAnalyzeParams {
    /// Repository directory
    pub repository: String,
    /// Ignore any cached analysis
    #[serde(default)]
    pub refresh: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FilesRankParams {
    /// Repository directory
    pub repository: String,
    /// Free-text query, e.g. a feature or bug description
    pub query: String,
    /// Maximum number of files (default: 10)
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_RANK_LIMIT
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BugAnalyzeParams {
    /// Repository directory
    pub repository: String,
    /// Bug description
    pub description: String,
    /// Reproduction steps
    #[serde(default)]
    pub steps: Vec<String>,
    /// low, medium, high or critical (default: medium)
    #[serde(default)]
    pub priority: Option<Priority>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CodeGenerateParams {
    /// Repository directory
    pub repository: String,
    #[serde(default)]
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Set to false to skip exemplar lookup and auto-fix
    #[serde(default)]
    pub follow_patterns: Option<bool>,
    #[serde(default)]
    pub optimize_for: Option<OptimizeFor>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TestsGenerateParams {
    /// Repository directory
    pub repository: String,
    /// Change set to cover
    pub implementation: GeneratedImplementation,
    /// Defaults to unit only
    #[serde(default)]
    pub test_types: Option<Vec<TestType>>,
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct RepoSightServer {
    tool_router: ToolRouter<Self>,
    service: Arc<AppService>,
    config: Arc<Config>,
    config_path: PathBuf,
}

#[tool_router]
impl RepoSightServer {
    pub fn new(service: Arc<AppService>, config: Config, config_path: PathBuf) -> Self {
        Self {
            tool_router: Self::tool_router(),
            service,
            config: Arc::new(config),
            config_path,
        }
    }

    #[tool(
        name = "repo_analyze",
        description = "Analyze a repository: structure, code patterns, import graph and search index (cached)"
    )]
    async fn repo_analyze(
        &self,
        params: Parameters<RepoAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(self.service.analyze(&p.repository, p.refresh).await)
    }

    #[tool(
        name = "files_rank",
        description = "Rank repository files by relevance to a free-text query"
    )]
    async fn files_rank(
        &self,
        params: Parameters<FilesRankParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(self.service.rank(&p.repository, &p.query, p.limit).await)
    }

    #[tool(
        name = "bug_analyze",
        description = "Triage a bug report: relevant files, root cause, fix suggestions and impact"
    )]
    async fn bug_analyze(
        &self,
        params: Parameters<BugAnalyzeParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        Self::to_tool_result(
            self.service
                .analyze_bug(
                    &p.repository,
                    &p.description,
                    p.steps,
                    p.priority.unwrap_or_default(),
                )
                .await,
        )
    }

    #[tool(
        name = "code_generate",
        description = "Generate a validated, pattern-following change set from a specification"
    )]
    async fn code_generate(
        &self,
        params: Parameters<CodeGenerateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let spec = Specification {
            title: p.title,
            description: p.description,
            kind: p.kind,
            requirements: p.requirements,
            ..Default::default()
        };
        let options = self
            .service
            .generation_options(p.follow_patterns, p.optimize_for);
        Self::to_tool_result(self.service.generate(&p.repository, &spec, &options).await)
    }

    #[tool(
        name = "tests_generate",
        description = "Generate tests for a change set and report coverage and quality"
    )]
    async fn tests_generate(
        &self,
        params: Parameters<TestsGenerateParams>,
    ) -> Result<CallToolResult, McpError> {
        let p = params.0;
        let mut req = TestGenerationRequest::new(p.repository, p.implementation);
        if let Some(types) = p.test_types.filter(|t| !t.is_empty()) {
            req.test_types = types;
        }
        Self::to_tool_result(self.service.generate_tests(&req).await)
    }

    #[tool(
        name = "develop",
        description = "Run the full flow for a requirement (bug triage when needed, generation, tests) and apply the quality gate"
    )]
    async fn develop(
        &self,
        params: Parameters<DevelopmentRequest>,
    ) -> Result<CallToolResult, McpError> {
        Self::to_tool_result(self.service.develop(&params.0).await)
    }

    #[tool(
        name = "doctor",
        description = "Check configuration, credentials, cache directory and supported languages"
    )]
    async fn doctor_tool(&self) -> Result<CallToolResult, McpError> {
        let report = doctor::run_doctor(&self.config, &self.config_path);
        let json = serde_json::to_string(&report)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }
}

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

impl RepoSightServer {
    fn to_tool_result<T: serde::Serialize>(
        result: anyhow::Result<T>,
    ) -> Result<CallToolResult, McpError> {
        match result {
            Ok(value) => {
                let json = serde_json::to_string(&value)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => Err(McpError::internal_error(
                e.to_string(),
                Some(crate::error::envelope(&e)),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// ServerHandler implementation
// ---------------------------------------------------------------------------

#[tool_handler]
impl ServerHandler for RepoSightServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_protocol_version(ProtocolVersion::V_2024_11_05)
            .with_server_info(Implementation::new(
                "repo-sight",
                env!("CARGO_PKG_VERSION"),
            ))
    }
}
