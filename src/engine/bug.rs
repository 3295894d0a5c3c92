//! Bug triage and fix application.
//!
//! `analyze_bug_report` is side-effect free and leaves the analysis in
//! `analyzed`. `apply_bug_fix` is the explicit second step: it walks the
//! status through `fix_suggested` to `fix_applied`, assembles the change set
//! and optionally opens a pull request.

use anyhow::Result;
use schemars::JsonSchema;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::impact::fallback_impact;
use super::keywords::KeywordTable;
use super::ranker::RelevanceRanker;
use super::{analyzer::RepositoryAnalyzer, prompts};
use crate::backend::{ModelBackend, request, request_or};
use crate::error::{Phase, PipelineError, with_repository};
use crate::models::bug::{
    BugAnalysis, BugCategory, BugFixResult, BugStatus, ChangeType, CodeChange, FixApproach,
    FixOutcome, FixSuggestion, ImpactAnalysis, Priority, RiskLevel, RootCauseAnalysis,
};
use crate::models::generation::{GeneratedFile, GeneratedImplementation, ModifiedFile};
use crate::models::testing::TestCase;
use crate::models::{new_id, now_unix, unit};
use crate::store::{PullRequestSpec, SourceHost};

/// Ranked candidates kept on the analysis.
const RELEVANT_LIMIT: usize = 8;
/// Candidates whose content is embedded in the prompts.
const CONTEXT_FILES: usize = 5;
const MAX_FIXES: usize = 3;
const BASE_BRANCH: &str = "main";

static CATEGORY_KEYWORDS: LazyLock<KeywordTable<BugCategory>> = LazyLock::new(|| {
    KeywordTable::new(&[
        (
            &[
                "security",
                "auth",
                "authentication",
                "authorization",
                "permission",
                "login",
                "password",
                "token",
            ],
            BugCategory::Security,
        ),
        (
            &["performance", "slow", "timeout", "memory leak"],
            BugCategory::Performance,
        ),
        (&["ui", "display", "render", "layout"], BugCategory::Ui),
        (&["data", "database", "storage", "query"], BugCategory::Data),
        (
            &["api", "integration", "service", "webhook"],
            BugCategory::Integration,
        ),
        (
            &["config", "environment", "setting"],
            BugCategory::Configuration,
        ),
        (&["dependency", "package", "version"], BugCategory::Dependency),
    ])
    .expect("static keyword table")
});

static CRITICAL_KEYWORDS: LazyLock<KeywordTable<()>> = LazyLock::new(|| {
    KeywordTable::new(&[(&["security", "data loss", "crash", "critical"], ())])
        .expect("static keyword table")
});

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
struct FixAnswer {
    fixes: Vec<FixSuggestion>,
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
struct FixTestsAnswer {
    test_cases: Vec<TestCase>,
}

pub struct BugAnalyzer {
    backend: Arc<dyn ModelBackend>,
    analyzer: Arc<RepositoryAnalyzer>,
    ranker: RelevanceRanker,
    host: Option<Arc<dyn SourceHost>>,
}

impl BugAnalyzer {
    pub fn new(backend: Arc<dyn ModelBackend>, analyzer: Arc<RepositoryAnalyzer>) -> Self {
        Self {
            ranker: RelevanceRanker::new(Arc::clone(&backend)),
            backend,
            analyzer,
            host: None,
        }
    }

    /// Source host used when a pull request is requested.
    pub fn with_host(mut self, host: Arc<dyn SourceHost>) -> Self {
        self.host = Some(host);
        self
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    pub async fn analyze_bug_report(
        &self,
        description: &str,
        repository_id: &str,
        steps: Vec<String>,
        priority: Priority,
    ) -> Result<BugAnalysis> {
        debug!(repository = repository_id, steps = steps.len(), "analyze_bug_report called");
        if description.trim().is_empty() {
            anyhow::bail!(
                PipelineError::invalid_request("Bug description must not be empty")
                    .in_phase(Phase::RootCause)
                    .for_repository(repository_id)
            );
        }

        let analysis = self.analyzer.analyze(repository_id, false).await?;
        let mut status = BugStatus::Analyzing;

        let query = if steps.is_empty() {
            description.to_string()
        } else {
            format!("{description} {}", steps.join(" "))
        };
        let relevant = self
            .ranker
            .find_relevant_files(&query, &analysis, RELEVANT_LIMIT)
            .await;
        let files = self
            .fetch(
                repository_id,
                relevant.iter().take(CONTEXT_FILES).map(|f| f.path.as_str()),
            )
            .await;

        let root_cause = request_or(
            self.backend.as_ref(),
            &prompts::root_cause(description, &steps, &relevant, &files),
            Phase::RootCause,
            RootCauseAnalysis::default,
        )
        .await
        .normalized();
        status = status.transition(BugStatus::Analyzed)?;

        let suggested_fixes = self.suggest_fixes(description, &root_cause, &files).await;
        let impact_analysis = match request::<ImpactAnalysis>(
            self.backend.as_ref(),
            &prompts::impact(description, &suggested_fixes, &analysis.dependencies),
            Phase::Impact,
        )
        .await
        {
            Ok(impact) => impact,
            Err(e) => {
                warn!(phase = %Phase::Impact, error = %e, "impact analysis failed, falling back to the import graph");
                fallback_impact(&suggested_fixes, &analysis.dependencies, &analysis.search_index)
            }
        };

        // Keyword heuristics read both the report and the model's diagnosis.
        let signals = format!("{query}\n{}", root_cause.root_cause);
        let category = root_cause
            .category
            .unwrap_or_else(|| categorize(&signals));
        let priority = calculate_priority(priority, root_cause.complexity, &signals);

        let bug = BugAnalysis {
            id: new_id("bug"),
            repository_id: repository_id.to_string(),
            description: description.to_string(),
            reproduction_steps: steps,
            relevant_files: relevant,
            estimated_fix_time: estimate_fix_time(root_cause.complexity),
            root_cause,
            suggested_fixes,
            impact_analysis,
            priority,
            category,
            status,
            created_at: now_unix(),
        };
        info!(id = %bug.id, ?category, ?priority, fixes = bug.suggested_fixes.len(), "bug analyzed");
        Ok(bug)
    }

    async fn fetch<'a>(
        &self,
        repository_id: &str,
        paths: impl Iterator<Item = &'a str>,
    ) -> Vec<(String, String)> {
        let store = self.analyzer.store();
        let reads = paths.map(|path| async move {
            match store.get_file_content(repository_id, path).await {
                Ok(content) => Some((path.to_string(), content)),
                Err(e) => {
                    warn!(path, error = %e, "candidate file unreadable, skipping");
                    None
                }
            }
        });
        futures::future::join_all(reads)
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn suggest_fixes(
        &self,
        description: &str,
        root_cause: &RootCauseAnalysis,
        files: &[(String, String)],
    ) -> Vec<FixSuggestion> {
        let answer = request::<FixAnswer>(
            self.backend.as_ref(),
            &prompts::fix_suggestions(description, root_cause, files),
            Phase::FixSuggestion,
        )
        .await;
        match answer {
            Ok(answer) if !answer.fixes.is_empty() => answer
                .fixes
                .into_iter()
                .take(MAX_FIXES)
                .enumerate()
                .map(|(i, mut fix)| {
                    fix.id = format!("fix_{}", i + 1);
                    fix.confidence = unit(fix.confidence);
                    fix
                })
                .collect(),
            Ok(_) => {
                warn!(phase = %Phase::FixSuggestion, "model proposed no fixes, falling back to a generic suggestion");
                vec![generic_fix(root_cause)]
            }
            Err(e) => {
                warn!(phase = %Phase::FixSuggestion, error = %e, "fix suggestion failed, falling back to a generic suggestion");
                vec![generic_fix(root_cause)]
            }
        }
    }

    // -----------------------------------------------------------------------
    // Application
    // -----------------------------------------------------------------------

    /// Apply `fix` to `analysis`. The status reaches `fix_applied` once the
    /// change set exists; a failed pull request is reported on the result.
    ///
    /// An analysis already in `fix_applied` accepts further attempts, e.g. a
    /// retry after `pr_failed`. A fix without changes is rejected before the
    /// status moves.
    pub async fn apply_bug_fix(
        &self,
        analysis: &mut BugAnalysis,
        fix: &FixSuggestion,
        create_pr: bool,
    ) -> Result<BugFixResult> {
        debug!(id = %analysis.id, fix = %fix.id, create_pr, "apply_bug_fix called");
        let repository_id = analysis.repository_id.clone();

        let entry = match analysis.status {
            BugStatus::Analyzed | BugStatus::FixApplied => {
                analysis.status.transition(BugStatus::FixSuggested)?
            }
            current => current,
        };
        entry.transition(BugStatus::FixApplied)?;

        if !has_applicable_changes(fix) {
            anyhow::bail!(
                PipelineError::invalid_request(format!(
                    "Fix {} has no applicable changes",
                    fix.id
                ))
                .in_phase(Phase::FixApplication)
                .for_repository(repository_id)
            );
        }
        if analysis.status != entry {
            analysis.advance(entry)?;
        }

        let change_set = self.assemble_change_set(&repository_id, fix).await;

        let test_cases = match request::<FixTestsAnswer>(
            self.backend.as_ref(),
            &prompts::fix_tests(analysis, fix),
            Phase::FixApplication,
        )
        .await
        {
            Ok(answer) => answer.test_cases,
            Err(e) => {
                warn!(phase = %Phase::FixApplication, error = %e, "fix test generation failed, continuing without tests");
                Vec::new()
            }
        };

        analysis.advance(BugStatus::FixApplied)?;
        let branch = format!("bugfix/{}", analysis.id);
        let pr_description = pr_description(analysis, fix, &change_set, &test_cases);

        let mut result = BugFixResult {
            analysis_id: analysis.id.clone(),
            fix: fix.clone(),
            change_set,
            test_cases,
            branch,
            pr_description,
            pull_request: None,
            status: FixOutcome::FixCreated,
            integration_error: None,
        };
        if !create_pr {
            return Ok(result);
        }

        match self.open_pull_request(&repository_id, analysis, fix, &result).await {
            Ok(pr) => {
                info!(url = %pr.url, "pull request opened");
                result.pull_request = Some(pr);
                result.status = FixOutcome::PrCreated;
            }
            Err(e) => {
                warn!(error = %e, branch = %result.branch, "pull request creation failed");
                result.status = FixOutcome::PrFailed;
                result.integration_error = Some(e.to_string());
            }
        }
        Ok(result)
    }

    async fn assemble_change_set(
        &self,
        repository_id: &str,
        fix: &FixSuggestion,
    ) -> GeneratedImplementation {
        let mut set = GeneratedImplementation {
            summary: fix.description.clone(),
            validation_steps: if fix.testing_notes.is_empty() {
                Vec::new()
            } else {
                vec![fix.testing_notes.clone()]
            },
            ..Default::default()
        };
        for change in fix.changes.iter().filter(|c| is_applicable(c)) {
            match change.change_type {
                ChangeType::Create => set.files_to_create.push(GeneratedFile {
                    path: change.file.clone(),
                    content: change.new_code.clone().unwrap_or_default(),
                    description: change.description.clone(),
                }),
                ChangeType::Modify => {
                    let current = match self
                        .analyzer
                        .store()
                        .get_file_content(repository_id, &change.file)
                        .await
                    {
                        Ok(content) => Some(content),
                        Err(e) => {
                            warn!(path = %change.file, error = %e, "file to modify unreadable, using the proposed code");
                            None
                        }
                    };
                    set.files_to_modify.push(ModifiedFile {
                        path: change.file.clone(),
                        content: apply_change(current.as_deref(), change),
                        description: change.description.clone(),
                    });
                }
                ChangeType::Delete => set.files_to_delete.push(change.file.clone()),
            }
        }
        set
    }

    async fn open_pull_request(
        &self,
        repository_id: &str,
        analysis: &BugAnalysis,
        fix: &FixSuggestion,
        result: &BugFixResult,
    ) -> Result<crate::models::bug::PullRequest> {
        let Some(host) = &self.host else {
            anyhow::bail!(PipelineError::new(
                crate::error::ErrorCode::IntegrationError,
                "no source host configured"
            ));
        };
        let message = format!("fix: {}", prompts::clip(&analysis.description, 60));
        host.create_branch(repository_id, &result.branch, BASE_BRANCH)
            .await
            .map_err(|e| with_repository(e, repository_id))?;
        let set = &result.change_set;
        let writes = set
            .files_to_create
            .iter()
            .map(|f| (&f.path, &f.content))
            .chain(set.files_to_modify.iter().map(|f| (&f.path, &f.content)));
        for (path, content) in writes {
            host.write_file(repository_id, &result.branch, path, content, &message)
                .await?;
        }
        host.open_pull_request(
            repository_id,
            &PullRequestSpec {
                title: format!("Fix: {}", prompts::clip(&analysis.description, 72)),
                body: result.pr_description.clone(),
                head: result.branch.clone(),
                base: BASE_BRANCH.to_string(),
                draft: fix.risk_level == RiskLevel::High,
            },
        )
        .await
    }
}

fn is_applicable(change: &CodeChange) -> bool {
    !change.file.trim().is_empty()
}

fn has_applicable_changes(fix: &FixSuggestion) -> bool {
    fix.changes.iter().any(is_applicable)
}

/// Move a fixed bug to its terminal `resolved` state.
pub fn resolve(analysis: &mut BugAnalysis) -> Result<()> {
    analysis.advance(BugStatus::Resolved)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Heuristics
// ---------------------------------------------------------------------------

/// Keyword category of free text; `logic` when nothing matches.
pub fn categorize(text: &str) -> BugCategory {
    CATEGORY_KEYWORDS.classify(text).unwrap_or(BugCategory::Logic)
}

/// Raise `initial` for hard or critical bugs. Never lowers it.
pub fn calculate_priority(initial: Priority, complexity: u8, text: &str) -> Priority {
    let mut priority = initial;
    if complexity >= 8 {
        priority = priority.max(Priority::High);
    }
    if CRITICAL_KEYWORDS.matches(text) {
        priority = Priority::Critical;
    }
    priority
}

pub fn estimate_fix_time(complexity: u8) -> String {
    let (quick, proper) = match complexity {
        0..=2 => ("15 minutes", "1 hour"),
        3..=4 => ("30 minutes", "2 hours"),
        5..=6 => ("1 hour", "4 hours"),
        7..=8 => ("2 hours", "1 day"),
        _ => ("4 hours", "3 days"),
    };
    format!("{quick} (quick) - {proper} (proper)")
}

fn generic_fix(root_cause: &RootCauseAnalysis) -> FixSuggestion {
    FixSuggestion {
        id: "fix_1".to_string(),
        approach: FixApproach::Proper,
        description: format!(
            "Investigate and correct the logic identified by the analysis: {}",
            root_cause.root_cause
        ),
        changes: Vec::new(),
        pros: vec!["Addresses the underlying cause".to_string()],
        cons: vec!["Requires manual investigation before changes can be made".to_string()],
        risk_level: RiskLevel::Medium,
        testing_notes: "Add a regression test reproducing the report before changing code."
            .to_string(),
        estimated_time: estimate_fix_time(root_cause.complexity),
        confidence: 0.3,
    }
}

/// New content for a `modify` change. `old_code` is replaced when found,
/// then a line range is tried, then `new_code` stands in for the file.
fn apply_change(current: Option<&str>, change: &CodeChange) -> String {
    let new_code = change.new_code.as_deref().unwrap_or_default();
    let Some(current) = current else {
        return new_code.to_string();
    };
    if let Some(old) = change.old_code.as_deref().filter(|o| !o.is_empty())
        && current.contains(old)
    {
        return current.replacen(old, new_code, 1);
    }
    if let (Some(start), Some(end)) = (change.start_line, change.end_line)
        && start >= 1
        && start <= end
    {
        let lines: Vec<&str> = current.lines().collect();
        let from = (start as usize - 1).min(lines.len());
        let to = (end as usize).min(lines.len());
        let mut out: Vec<&str> = lines[..from].to_vec();
        out.extend(new_code.lines());
        out.extend_from_slice(&lines[to..]);
        let mut text = out.join("\n");
        if current.ends_with('\n') {
            text.push('\n');
        }
        return text;
    }
    if new_code.is_empty() {
        current.to_string()
    } else {
        new_code.to_string()
    }
}

fn pr_description(
    analysis: &BugAnalysis,
    fix: &FixSuggestion,
    change_set: &GeneratedImplementation,
    tests: &[TestCase],
) -> String {
    let mut d = String::new();
    let _ = writeln!(d, "## Issue\n{}\n", analysis.description);
    if !analysis.reproduction_steps.is_empty() {
        d.push_str("## Reproduction Steps\n");
        for (i, step) in analysis.reproduction_steps.iter().enumerate() {
            let _ = writeln!(d, "{}. {step}", i + 1);
        }
        d.push('\n');
    }
    let _ = writeln!(
        d,
        "## Root Cause\n{}\n\n{}\n",
        analysis.root_cause.root_cause, analysis.root_cause.explanation
    );
    let _ = writeln!(
        d,
        "## Fix Approach\n**{:?}** (risk: {:?}, confidence: {:.0}%)\n\n{}\n",
        fix.approach,
        fix.risk_level,
        fix.confidence * 100.0,
        fix.description
    );
    let impact = &analysis.impact_analysis;
    let _ = writeln!(
        d,
        "## Impact\n- Affected files: {}\n- Breaking changes: {}\n",
        if impact.affected_files.is_empty() {
            "none identified".to_string()
        } else {
            impact.affected_files.join(", ")
        },
        if impact.breaking_changes.is_empty() {
            "none".to_string()
        } else {
            impact.breaking_changes.join("; ")
        }
    );
    d.push_str("## Changes\n");
    for f in &change_set.files_to_create {
        let _ = writeln!(d, "- create `{}`", f.path);
    }
    for f in &change_set.files_to_modify {
        let _ = writeln!(d, "- modify `{}`", f.path);
    }
    for path in &change_set.files_to_delete {
        let _ = writeln!(d, "- delete `{path}`");
    }
    d.push_str("\n## Testing\n");
    if !fix.testing_notes.is_empty() {
        let _ = writeln!(d, "{}", fix.testing_notes);
    }
    for t in tests {
        let _ = writeln!(d, "- [ ] {}", t.name);
    }
    if !fix.pros.is_empty() {
        let _ = writeln!(d, "\n## Pros\n- {}", fix.pros.join("\n- "));
    }
    if !fix.cons.is_empty() {
        let _ = writeln!(d, "\n## Considerations\n- {}", fix.cons.join("\n- "));
    }
    d
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::offline::OfflineBackend;
    use crate::backend::scripted::ScriptedBackend;
    use crate::cache::memory::MemoryCache;
    use crate::config::AnalysisConfig;
    use crate::error::ErrorCode;
    use crate::store::memory::{InMemoryRepository, InMemorySourceHost};
    use std::time::Duration;

    pub(crate) fn sample_analysis() -> BugAnalysis {
        BugAnalysis {
            id: "bug_test".to_string(),
            repository_id: "r".to_string(),
            description: "Login fails after password reset".to_string(),
            reproduction_steps: vec!["Reset password".into(), "Log in".into()],
            relevant_files: Vec::new(),
            root_cause: RootCauseAnalysis::default(),
            suggested_fixes: Vec::new(),
            impact_analysis: ImpactAnalysis::default(),
            priority: Priority::Medium,
            category: BugCategory::Security,
            status: BugStatus::Analyzed,
            estimated_fix_time: estimate_fix_time(5),
            created_at: 0,
        }
    }

    fn repo() -> Arc<InMemoryRepository> {
        Arc::new(
            InMemoryRepository::new()
                .with_file("r", "auth/login.ts", "import { check } from './session';\nexport function login() { return check(); }\n")
                .with_file("r", "auth/resetPassword.ts", "export function resetPassword(user) {\n  user.token = null;\n}\n")
                .with_file("r", "auth/session.ts", "export function check() { return true; }\n"),
        )
    }

    fn bug_analyzer(backend: Arc<dyn ModelBackend>) -> BugAnalyzer {
        let analyzer = RepositoryAnalyzer::new(
            Arc::clone(&backend),
            repo(),
            Arc::new(MemoryCache::new(4)),
            AnalysisConfig::default(),
            Duration::from_secs(60),
        );
        BugAnalyzer::new(backend, Arc::new(analyzer))
    }

    fn modify_fix() -> FixSuggestion {
        FixSuggestion {
            id: "fix_1".into(),
            description: "Keep the token until login".into(),
            changes: vec![CodeChange {
                file: "auth/resetPassword.ts".into(),
                change_type: ChangeType::Modify,
                old_code: Some("user.token = null;".into()),
                new_code: Some("user.token = user.token;".into()),
                ..Default::default()
            }],
            pros: vec!["small".into()],
            cons: vec!["touches auth".into()],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_offline_triage_degrades_and_ends_analyzed() {
        let bugs = bug_analyzer(Arc::new(OfflineBackend));
        let bug = bugs
            .analyze_bug_report(
                "Login fails with 500 error after password reset",
                "r",
                Vec::new(),
                Priority::Medium,
            )
            .await
            .unwrap();
        assert_eq!(bug.status, BugStatus::Analyzed);
        assert_eq!(bug.category, BugCategory::Security);
        let reset = bug
            .relevant_files
            .iter()
            .find(|f| f.path == "auth/resetPassword.ts")
            .unwrap();
        assert!(reset.confidence > 0.0);
        assert_eq!(bug.suggested_fixes.len(), 1);
        assert_eq!(bug.suggested_fixes[0].approach, FixApproach::Proper);
        assert_eq!(bug.suggested_fixes[0].confidence, 0.3);
        assert_eq!(bug.root_cause.complexity, 5);
        assert!(bug.impact_analysis.rollback_plan.contains("nothing"));
    }

    #[tokio::test]
    async fn test_model_answers_are_normalized() {
        let backend = ScriptedBackend::new()
            .on(prompts::ROOT_CAUSE, r#"{"root_cause":"stale cache","complexity":9,"category":"data"}"#)
            .on(
                prompts::FIX_SUGGESTIONS,
                r#"{"fixes":[{"approach":"quick","confidence":1.7},{"approach":"proper"},{"approach":"comprehensive"},{"approach":"quick"}]}"#,
            )
            .fail_on(prompts::IMPACT, "503");
        let bugs = bug_analyzer(Arc::new(backend));
        let bug = bugs
            .analyze_bug_report("Dashboard shows wrong totals", "r", vec!["open".into()], Priority::Low)
            .await
            .unwrap();
        assert_eq!(bug.category, BugCategory::Data);
        assert_eq!(bug.priority, Priority::High);
        assert_eq!(
            bug.suggested_fixes.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            vec!["fix_1", "fix_2", "fix_3"]
        );
        assert_eq!(bug.suggested_fixes[0].confidence, 1.0);
        assert_eq!(bug.estimated_fix_time, "4 hours (quick) - 3 days (proper)");
    }

    #[tokio::test]
    async fn test_empty_description_is_rejected() {
        let bugs = bug_analyzer(Arc::new(OfflineBackend));
        let err = bugs
            .analyze_bug_report("  ", "r", Vec::new(), Priority::Low)
            .await
            .unwrap_err();
        assert_eq!(crate::error::code_of(&err), ErrorCode::InvalidRequest);
    }

    #[test]
    fn test_priority_is_never_lowered() {
        assert_eq!(calculate_priority(Priority::Low, 9, "typo"), Priority::High);
        assert_eq!(calculate_priority(Priority::Critical, 1, "typo"), Priority::Critical);
        assert_eq!(calculate_priority(Priority::Low, 2, "app crash on save"), Priority::Critical);
        assert_eq!(calculate_priority(Priority::Medium, 7, "button misaligned"), Priority::Medium);
    }

    #[test]
    fn test_categorize_keyword_order() {
        assert_eq!(categorize("Request timeout on login"), BugCategory::Security);
        assert_eq!(categorize("Page is slow"), BugCategory::Performance);
        assert_eq!(categorize("Layout breaks on mobile"), BugCategory::Ui);
        assert_eq!(categorize("Wrong result"), BugCategory::Logic);
        assert_eq!(categorize("Authorization header dropped on redirect"), BugCategory::Security);
        assert_eq!(categorize("authentication loop"), BugCategory::Security);
    }

    #[test]
    fn test_apply_change_strategies() {
        let change = CodeChange {
            old_code: Some("b".into()),
            new_code: Some("B".into()),
            ..Default::default()
        };
        assert_eq!(apply_change(Some("a\nb\nc\n"), &change), "a\nB\nc\n");

        let ranged = CodeChange {
            start_line: Some(2),
            end_line: Some(3),
            new_code: Some("X".into()),
            ..Default::default()
        };
        assert_eq!(apply_change(Some("a\nb\nc\nd\n"), &ranged), "a\nX\nd\n");
        assert_eq!(apply_change(None, &ranged), "X");
    }

    #[tokio::test]
    async fn test_apply_fix_opens_pull_request() {
        let host = Arc::new(InMemorySourceHost::new());
        let bugs = bug_analyzer(Arc::new(OfflineBackend)).with_host(host.clone());
        let mut bug = sample_analysis();

        let result = bugs.apply_bug_fix(&mut bug, &modify_fix(), true).await.unwrap();
        assert_eq!(result.status, FixOutcome::PrCreated);
        assert_eq!(bug.status, BugStatus::FixApplied);
        assert_eq!(result.branch, "bugfix/bug_test");
        assert_eq!(host.branches(), vec!["bugfix/bug_test"]);
        let writes = host.writes();
        assert_eq!(writes.len(), 1);
        assert!(writes[0].content.contains("user.token = user.token;"));
        for section in ["## Issue", "## Reproduction Steps", "## Root Cause", "## Fix Approach", "## Changes", "## Pros", "## Considerations"] {
            assert!(result.pr_description.contains(section), "{section}");
        }
        assert!(result.test_cases.is_empty());

        resolve(&mut bug).unwrap();
        assert_eq!(bug.status, BugStatus::Resolved);
    }

    #[tokio::test]
    async fn test_pr_failure_still_applies_fix() {
        let host = Arc::new(InMemorySourceHost::rejecting_pull_requests());
        let bugs = bug_analyzer(Arc::new(OfflineBackend)).with_host(host);
        let mut bug = sample_analysis();
        let result = bugs.apply_bug_fix(&mut bug, &modify_fix(), true).await.unwrap();
        assert_eq!(result.status, FixOutcome::PrFailed);
        assert!(result.integration_error.unwrap().contains("INTEGRATION_ERROR"));
        assert_eq!(bug.status, BugStatus::FixApplied);
    }

    #[tokio::test]
    async fn test_fix_without_pr_and_with_tests() {
        let backend = ScriptedBackend::new().on(
            prompts::FIX_TESTS,
            r#"{"test_cases":[{"name":"keeps token","kind":"happy_path","code":"expect(1)"}]}"#,
        );
        let bugs = bug_analyzer(Arc::new(backend));
        let mut bug = sample_analysis();
        let result = bugs.apply_bug_fix(&mut bug, &modify_fix(), false).await.unwrap();
        assert_eq!(result.status, FixOutcome::FixCreated);
        assert_eq!(result.test_cases.len(), 1);
        assert!(result.pull_request.is_none());
    }

    #[tokio::test]
    async fn test_empty_fix_is_rejected_without_moving_status() {
        let bugs = bug_analyzer(Arc::new(OfflineBackend));
        let mut bug = bugs
            .analyze_bug_report("Login fails after password reset", "r", Vec::new(), Priority::Medium)
            .await
            .unwrap();
        let generic = bug.suggested_fixes[0].clone();
        assert!(generic.changes.is_empty());

        let err = bugs.apply_bug_fix(&mut bug, &generic, true).await.unwrap_err();
        let pe = err.downcast_ref::<PipelineError>().unwrap();
        assert_eq!(pe.code, ErrorCode::InvalidRequest);
        assert_eq!(pe.phase, Some(Phase::FixApplication));
        assert_eq!(bug.status, BugStatus::Analyzed);

        // A concrete fix still applies afterwards.
        let result = bugs.apply_bug_fix(&mut bug, &modify_fix(), false).await.unwrap();
        assert_eq!(result.status, FixOutcome::FixCreated);
        assert_eq!(bug.status, BugStatus::FixApplied);
    }

    #[tokio::test]
    async fn test_retry_after_failed_pull_request() {
        let rejecting = bug_analyzer(Arc::new(OfflineBackend))
            .with_host(Arc::new(InMemorySourceHost::rejecting_pull_requests()));
        let mut bug = sample_analysis();
        let first = rejecting.apply_bug_fix(&mut bug, &modify_fix(), true).await.unwrap();
        assert_eq!(first.status, FixOutcome::PrFailed);
        assert_eq!(bug.status, BugStatus::FixApplied);

        let host = Arc::new(InMemorySourceHost::new());
        let accepting = bug_analyzer(Arc::new(OfflineBackend)).with_host(host.clone());
        let second = accepting.apply_bug_fix(&mut bug, &modify_fix(), true).await.unwrap();
        assert_eq!(second.status, FixOutcome::PrCreated);
        assert_eq!(bug.status, BugStatus::FixApplied);
        assert_eq!(host.branches(), vec!["bugfix/bug_test"]);

        let third = accepting.apply_bug_fix(&mut bug, &modify_fix(), false).await.unwrap();
        assert_eq!(third.status, FixOutcome::FixCreated);
    }

    #[tokio::test]
    async fn test_diagnosis_drives_category_and_priority() {
        let backend = ScriptedBackend::new().on(
            prompts::ROOT_CAUSE,
            r#"{"root_cause":"SQL injection in the search filter is a security hole that can cause data loss","complexity":4}"#,
        );
        let bugs = bug_analyzer(Arc::new(backend));
        let bug = bugs
            .analyze_bug_report("Search results look odd", "r", Vec::new(), Priority::Low)
            .await
            .unwrap();
        assert_eq!(bug.category, BugCategory::Security);
        assert_eq!(bug.priority, Priority::Critical);
    }

    #[tokio::test]
    async fn test_resolved_bug_cannot_be_reapplied() {
        let bugs = bug_analyzer(Arc::new(OfflineBackend));
        let mut bug = sample_analysis();
        bug.status = BugStatus::Resolved;
        let err = bugs.apply_bug_fix(&mut bug, &modify_fix(), false).await.unwrap_err();
        assert_eq!(crate::error::code_of(&err), ErrorCode::InvalidTransition);
    }
}
