//! End-to-end development flow and the pull-request quality gate.

use anyhow::Result;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info};

use super::analyzer::RepositoryAnalyzer;
use super::bug::BugAnalyzer;
use super::generator::CodeGenerator;
use super::keywords::KeywordTable;
use super::testgen::TestGenerator;
use super::quality;
use crate::config::GenerationConfig;
use crate::error::{Phase, PipelineError};
use crate::models::bug::Priority;
use crate::models::development::{DevelopmentRequest, DevelopmentResult};
use crate::models::generation::{GenerationOptions, Specification, SuggestionKind, TaskKind};
use crate::models::testing::TestGenerationRequest;
use crate::models::{new_id, unit};

const GENERATION_WEIGHT: f64 = 0.5;
const TESTS_WEIGHT: f64 = 0.3;
const COMPLIANCE_WEIGHT: f64 = 0.2;
/// Coverage required when tests were requested.
pub const MIN_COVERAGE: f64 = 0.8;
const REVIEW_MINUTES_PER_FILE: u32 = 5;

static BUG_KEYWORDS: LazyLock<KeywordTable<()>> = LazyLock::new(|| {
    KeywordTable::new(&[(
        &["bug", "fix", "error", "issue", "broken", "not working", "fails", "crash"],
        (),
    )])
    .expect("static keyword table")
});

/// Gate decision and the advice that goes with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub ready: bool,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
}

pub struct Orchestrator {
    analyzer: Arc<RepositoryAnalyzer>,
    bugs: Arc<BugAnalyzer>,
    generator: Arc<CodeGenerator>,
    tests: Arc<TestGenerator>,
    config: GenerationConfig,
}

impl Orchestrator {
    pub fn new(
        analyzer: Arc<RepositoryAnalyzer>,
        bugs: Arc<BugAnalyzer>,
        generator: Arc<CodeGenerator>,
        tests: Arc<TestGenerator>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            analyzer,
            bugs,
            generator,
            tests,
            config,
        }
    }

    pub async fn process(&self, req: &DevelopmentRequest) -> Result<DevelopmentResult> {
        debug!(repository = %req.repository_id, kind = %req.kind, include_tests = req.include_tests, "process called");
        if req.requirement.trim().is_empty() {
            anyhow::bail!(
                PipelineError::invalid_request("Requirement must not be empty")
                    .in_phase(Phase::Orchestration)
                    .for_repository(req.repository_id.as_str())
            );
        }
        let repository_id = req.repository_id.as_str();
        self.analyzer.analyze(repository_id, false).await?;

        let is_bug_fix = is_bug_fix(req.kind, &req.requirement);
        let bug_analysis = if is_bug_fix {
            Some(
                self.bugs
                    .analyze_bug_report(&req.requirement, repository_id, Vec::new(), Priority::Medium)
                    .await?,
            )
        } else {
            None
        };

        let kind = if is_bug_fix { TaskKind::BugFix } else { req.kind };
        let spec = Specification {
            bug_analysis: bug_analysis.clone().map(Box::new),
            ..Specification::from_description(&req.requirement, None, kind)
        };
        let options = GenerationOptions {
            optimize_for: req.optimize_for,
            ..GenerationOptions::from_config(&self.config)
        };
        let generation = self.generator.generate(&spec, repository_id, &options).await?;

        let tests = if req.include_tests {
            Some(
                self.tests
                    .generate_tests(&TestGenerationRequest::new(
                        repository_id,
                        generation.implementation.clone(),
                    ))
                    .await?,
            )
        } else {
            None
        };

        let overall_quality = quality::blend(&[
            (GENERATION_WEIGHT, Some(generation.quality_score)),
            (TESTS_WEIGHT, tests.as_ref().map(|t| t.quality_score)),
            (COMPLIANCE_WEIGHT, Some(generation.pattern_compliance.overall)),
        ]);
        let quality_threshold = unit(req.quality_threshold.unwrap_or(self.config.quality_threshold));
        let unresolved: Vec<&str> = generation
            .suggestions
            .iter()
            .filter(|s| s.kind == SuggestionKind::UnresolvedIssue)
            .map(|s| s.message.as_str())
            .collect();
        let assessment = assess(
            overall_quality,
            quality_threshold,
            req.include_tests,
            tests.as_ref().map(|t| t.coverage.overall),
            &unresolved,
        );

        let touched = generation.implementation.touched_paths().len()
            + tests.as_ref().map_or(0, |t| t.tests.len());
        let estimated_review_minutes = REVIEW_MINUTES_PER_FILE * touched as u32;

        info!(
            is_bug_fix,
            overall = overall_quality,
            threshold = quality_threshold,
            ready = assessment.ready,
            "development request processed"
        );
        Ok(DevelopmentResult {
            request_id: new_id("dev"),
            is_bug_fix,
            bug_analysis,
            generation,
            tests,
            overall_quality,
            quality_threshold,
            pull_request_ready: assessment.ready,
            recommendations: assessment.recommendations,
            next_steps: assessment.next_steps,
            estimated_review_minutes,
        })
    }
}

/// Bug path: explicit `bug_fix` kind or a bug keyword in the requirement.
pub fn is_bug_fix(kind: TaskKind, requirement: &str) -> bool {
    kind == TaskKind::BugFix || BUG_KEYWORDS.matches(requirement)
}

/// The quality gate: ready when `overall >= threshold` and, if tests were
/// requested, their coverage reaches [`MIN_COVERAGE`].
pub fn assess(
    overall: f64,
    threshold: f64,
    include_tests: bool,
    coverage: Option<f64>,
    unresolved: &[&str],
) -> Assessment {
    let quality_ok = overall >= threshold;
    let coverage = coverage.unwrap_or(0.0);
    let coverage_ok = !include_tests || coverage >= MIN_COVERAGE;
    let ready = quality_ok && coverage_ok;

    if ready {
        let mut next_steps = vec![
            "Open the pull request".to_string(),
            "Run the validation steps in CI".to_string(),
        ];
        if !unresolved.is_empty() {
            next_steps.push(format!("Track {} open suggestion(s) as follow-ups", unresolved.len()));
        }
        return Assessment {
            ready,
            recommendations: vec![
                "Create pull request".to_string(),
                "Request code review".to_string(),
            ],
            next_steps,
        };
    }

    let mut recommendations = vec!["Address quality issues".to_string()];
    let mut next_steps = vec!["Review the generated changes manually as a draft".to_string()];
    if !quality_ok {
        next_steps.push(format!(
            "Raise overall quality from {overall:.2} to at least {threshold:.2}"
        ));
    }
    if !coverage_ok {
        recommendations.push("Improve test coverage".to_string());
        next_steps.push(format!(
            "Add tests until coverage reaches {:.0}% (currently {:.0}%)",
            MIN_COVERAGE * 100.0,
            coverage * 100.0
        ));
    }
    recommendations.extend(unresolved.iter().map(|u| format!("Resolve: {u}")));
    Assessment {
        ready,
        recommendations,
        next_steps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ModelBackend;
    use crate::engine::prompts;
    use crate::backend::scripted::ScriptedBackend;
    use crate::cache::memory::MemoryCache;
    use crate::config::AnalysisConfig;
    use crate::store::memory::InMemoryRepository;
    use std::time::Duration;

    const ONE_FILE: &str = r#"{"summary":"s","files_to_create":[{"path":"src/auth/reset.ts","content":"export function reset() { return 1; }"}],"validation_steps":["npm test"]}"#;
    const CLEAN: &str = r#"{"is_valid":true,"score":0.9,"pattern_compliance":0.8,"issues":[]}"#;

    fn orchestrator(backend: Arc<dyn ModelBackend>) -> Orchestrator {
        let store = Arc::new(
            InMemoryRepository::new()
                .with_file("r", "src/auth/login.ts", "export function login() {}\n")
                .with_file("r", "src/auth/session.ts", "export function check() {}\n"),
        );
        let analyzer = Arc::new(RepositoryAnalyzer::new(
            Arc::clone(&backend),
            store,
            Arc::new(MemoryCache::new(4)),
            AnalysisConfig::default(),
            Duration::from_secs(60),
        ));
        Orchestrator::new(
            Arc::clone(&analyzer),
            Arc::new(BugAnalyzer::new(Arc::clone(&backend), Arc::clone(&analyzer))),
            Arc::new(CodeGenerator::new(
                Arc::clone(&backend),
                Arc::clone(&analyzer),
                Duration::from_secs(5),
            )),
            Arc::new(TestGenerator::new(Arc::clone(&backend), Arc::clone(&analyzer))),
            GenerationConfig::default(),
        )
    }

    fn request(requirement: &str, include_tests: bool) -> DevelopmentRequest {
        DevelopmentRequest {
            repository_id: "r".into(),
            requirement: requirement.into(),
            kind: TaskKind::Feature,
            include_tests,
            quality_threshold: None,
            optimize_for: Default::default(),
        }
    }

    #[test]
    fn test_gate_blocks_below_threshold() {
        let a = assess(0.72, 0.8, false, None, &[]);
        assert!(!a.ready);
        assert!(!a.next_steps.is_empty());
        assert_eq!(a.recommendations, vec!["Address quality issues"]);
    }

    #[test]
    fn test_gate_requires_coverage_when_tests_requested() {
        let a = assess(0.9, 0.8, true, Some(0.5), &["token never expires"]);
        assert!(!a.ready);
        assert_eq!(
            a.recommendations,
            vec![
                "Address quality issues",
                "Improve test coverage",
                "Resolve: token never expires"
            ]
        );
        let ok = assess(0.9, 0.8, true, Some(0.85), &[]);
        assert!(ok.ready);
        assert_eq!(ok.recommendations[0], "Create pull request");
        assert!(!ok.next_steps.is_empty());
        assert!(assess(0.8, 0.8, false, None, &[]).ready);
    }

    #[test]
    fn test_bug_keyword_detection() {
        assert!(is_bug_fix(TaskKind::Feature, "Checkout fails for guests"));
        assert!(is_bug_fix(TaskKind::Feature, "search is not working"));
        assert!(is_bug_fix(TaskKind::BugFix, "Polish the header"));
        assert!(!is_bug_fix(TaskKind::Feature, "Add a dark mode toggle"));
        assert!(!is_bug_fix(TaskKind::Feature, "Add prefix support"));
    }

    #[tokio::test]
    async fn test_feature_request_without_tests() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on(prompts::GENERATION, ONE_FILE)
                .on(prompts::VALIDATION, CLEAN),
        );
        let result = orchestrator(backend.clone())
            .process(&request("Add a password strength meter", false))
            .await
            .unwrap();
        assert!(!result.is_bug_fix);
        assert!(result.bug_analysis.is_none());
        assert_eq!(backend.calls_matching(prompts::ROOT_CAUSE), 0);
        assert!(result.tests.is_none());
        // (0.5 * 1.0 + 0.2 * 0.65) / 0.7
        assert!((result.overall_quality - 0.9).abs() < 1e-9);
        assert!(result.pull_request_ready);
        assert_eq!(result.estimated_review_minutes, 5);
    }

    #[tokio::test]
    async fn test_bug_request_runs_triage_and_gates_on_coverage() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on(prompts::ROOT_CAUSE, r#"{"root_cause":"session not cleared","complexity":3}"#)
                .on(prompts::GENERATION, ONE_FILE)
                .on(prompts::VALIDATION, CLEAN)
                .on(
                    prompts::TEST_GENERATION,
                    r#"{"test_type":"unit","test_cases":[{"name":"a"}],"coverage":[{"target":"reset","coverage":0.5}]}"#,
                ),
        );
        let result = orchestrator(backend.clone())
            .process(&request("Login fails after logout", true))
            .await
            .unwrap();
        assert!(result.is_bug_fix);
        assert_eq!(result.generation.specification.kind, TaskKind::BugFix);
        assert_eq!(
            result.bug_analysis.as_ref().unwrap().root_cause.root_cause,
            "session not cleared"
        );
        assert!(
            backend
                .calls()
                .iter()
                .any(|p| p.starts_with(prompts::GENERATION) && p.contains("session not cleared"))
        );
        let tests = result.tests.as_ref().unwrap();
        assert_eq!(tests.coverage.overall, 0.5);
        assert!(!result.pull_request_ready);
        assert!(result.recommendations.contains(&"Improve test coverage".to_string()));
        assert!((0.0..=1.0).contains(&result.overall_quality));
        assert_eq!(result.estimated_review_minutes, 10);
    }
}
