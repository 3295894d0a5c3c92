//! Pattern-aware code generation with a bounded validate/auto-fix loop.
//!
//! Order within one call is fixed: exemplars, generation, validation, then
//! at most `max_correction_passes` corrective regenerations. Only the first
//! generation call is fatal; every later step falls back.

use anyhow::Result;
use camino::Utf8Path;
use regex::Regex;
use schemars::JsonSchema;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use super::analyzer::RepositoryAnalyzer;
use super::ranker::RelevanceRanker;
use super::{prompts, quality};
use crate::backend::{ModelBackend, lenient, request, stream};
use crate::error::{Phase, PipelineError, with_repository};
use crate::language::{LangId, is_code_file};
use crate::models::analysis::RepositoryAnalysis;
use crate::models::generation::{
    CodeSuggestion, ExtractedPattern, GeneratedCode, GeneratedImplementation, GenerationOptions,
    IssueSeverity, IssueType, PatternCompliance, PatternViolation, SimilarImplementation,
    Specification, SuggestionKind, ValidationIssue, ValidationResult,
};
use crate::models::{new_id, unit};

/// Candidates considered as exemplars.
const EXEMPLAR_CANDIDATES: usize = 5;
/// Characters of an exemplar embedded in the generation prompt.
const EXCERPT_CHARS: usize = 1_500;
/// Similarity assigned when an exemplar's patterns could not be extracted.
const UNKNOWN_SIMILARITY: f64 = 0.1;
const COMPLETENESS_BONUS: f64 = 0.05;

static SAFE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_\-/.]+$").expect("static regex"));

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
struct SuggestionsAnswer {
    suggestions: Vec<CodeSuggestion>,
}

pub struct CodeGenerator {
    backend: Arc<dyn ModelBackend>,
    analyzer: Arc<RepositoryAnalyzer>,
    ranker: RelevanceRanker,
    stream_ceiling: Duration,
}

impl CodeGenerator {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        analyzer: Arc<RepositoryAnalyzer>,
        stream_ceiling: Duration,
    ) -> Self {
        Self {
            ranker: RelevanceRanker::new(Arc::clone(&backend)),
            backend,
            analyzer,
            stream_ceiling,
        }
    }

    pub async fn generate(
        &self,
        spec: &Specification,
        repository_id: &str,
        options: &GenerationOptions,
    ) -> Result<GeneratedCode> {
        debug!(repository = repository_id, title = %spec.title, kind = %spec.kind, "generate called");
        let (analysis, exemplars) = self.prepare(spec, repository_id, options).await?;

        let prompt = prompts::generation(spec, &analysis, &exemplars, options);
        let implementation =
            request::<GeneratedImplementation>(self.backend.as_ref(), &prompt, Phase::Generation)
                .await
                .map_err(|e| with_repository(e, repository_id))?;
        let implementation = non_empty(implementation, repository_id)?;

        self.refine(spec, &analysis, exemplars, implementation, options)
            .await
    }

    /// Streaming variant. Accepted text is forwarded to `progress` in order;
    /// the structured result is the same as [`CodeGenerator::generate`].
    pub async fn generate_streaming(
        &self,
        spec: &Specification,
        repository_id: &str,
        options: &GenerationOptions,
        progress: UnboundedSender<String>,
    ) -> Result<GeneratedCode> {
        debug!(repository = repository_id, title = %spec.title, "generate_streaming called");
        let (analysis, exemplars) = self.prepare(spec, repository_id, options).await?;

        let prompt = prompts::generation_stream(spec, &analysis, &exemplars, options);
        let tokens = self.backend.stream(&prompt).await.map_err(|e| {
            anyhow::Error::from(
                PipelineError::upstream(e.to_string())
                    .in_phase(Phase::Generation)
                    .for_repository(repository_id),
            )
        })?;
        let text = stream::collect(tokens, self.stream_ceiling, Some(&progress))
            .await
            .map_err(|e| with_repository(e, repository_id))?;
        drop(progress);

        let implementation = non_empty(parse_streamed(&text), repository_id)?;
        self.refine(spec, &analysis, exemplars, implementation, options)
            .await
    }

    async fn prepare(
        &self,
        spec: &Specification,
        repository_id: &str,
        options: &GenerationOptions,
    ) -> Result<(Arc<RepositoryAnalysis>, Vec<SimilarImplementation>)> {
        if spec.title.trim().is_empty() && spec.description.trim().is_empty() {
            anyhow::bail!(
                PipelineError::invalid_request("Specification needs a title or a description")
                    .in_phase(Phase::Generation)
                    .for_repository(repository_id)
            );
        }
        let analysis = self.analyzer.analyze(repository_id, false).await?;
        let exemplars = if options.follow_patterns {
            self.find_similar(spec, &analysis, options.similarity_threshold)
                .await
        } else {
            Vec::new()
        };
        Ok((analysis, exemplars))
    }

    // -----------------------------------------------------------------------
    // Exemplars
    // -----------------------------------------------------------------------

    async fn find_similar(
        &self,
        spec: &Specification,
        analysis: &RepositoryAnalysis,
        threshold: f64,
    ) -> Vec<SimilarImplementation> {
        let query = format!("{} {}", spec.title, spec.description);
        let candidates: Vec<String> = self
            .ranker
            .find_relevant_files(&query, analysis, EXEMPLAR_CANDIDATES * 2)
            .await
            .into_iter()
            .map(|f| f.path)
            .filter(|p| is_code_file(p))
            .take(EXEMPLAR_CANDIDATES)
            .collect();

        let store = self.analyzer.store();
        let repository_id = analysis.repository_id.as_str();
        let extractions = candidates.iter().map(|path| async move {
            let content = match store.get_file_content(repository_id, path).await {
                Ok(c) => c,
                Err(e) => {
                    warn!(phase = %Phase::SimilarCode, path = %path, error = %e, "exemplar unreadable, skipping");
                    return None;
                }
            };
            let patterns = match request::<ExtractedPattern>(
                self.backend.as_ref(),
                &prompts::exemplar_patterns(spec, path, &content),
                Phase::SimilarCode,
            )
            .await
            {
                Ok(p) => ExtractedPattern {
                    similarity: unit(p.similarity),
                    ..p
                },
                Err(e) => {
                    warn!(phase = %Phase::SimilarCode, path = %path, error = %e, "exemplar pattern extraction failed, falling back to low similarity");
                    ExtractedPattern {
                        similarity: UNKNOWN_SIMILARITY,
                        ..Default::default()
                    }
                }
            };
            Some(SimilarImplementation {
                path: path.clone(),
                similarity: patterns.similarity,
                excerpt: prompts::clip(&content, EXCERPT_CHARS),
                patterns,
            })
        });

        let exemplars: Vec<SimilarImplementation> = futures::future::join_all(extractions)
            .await
            .into_iter()
            .flatten()
            .filter(|s| s.similarity >= threshold)
            .collect();
        debug!(candidates = candidates.len(), kept = exemplars.len(), "exemplars selected");
        exemplars
    }

    // -----------------------------------------------------------------------
    // Validation and correction
    // -----------------------------------------------------------------------

    async fn refine(
        &self,
        spec: &Specification,
        analysis: &RepositoryAnalysis,
        exemplars: Vec<SimilarImplementation>,
        mut implementation: GeneratedImplementation,
        options: &GenerationOptions,
    ) -> Result<GeneratedCode> {
        let mut validation = self.validate(&implementation, analysis).await;
        let mut passes = 0usize;
        let mut sent: Vec<ValidationIssue> = Vec::new();

        while options.follow_patterns && passes < options.max_correction_passes {
            let fixable: Vec<ValidationIssue> = validation
                .issues
                .iter()
                .filter(|i| i.is_fixable())
                .cloned()
                .collect();
            if fixable.is_empty() {
                break;
            }
            let prompt = prompts::auto_fix(&implementation, &fixable, &analysis.patterns);
            match request::<GeneratedImplementation>(self.backend.as_ref(), &prompt, Phase::AutoFix)
                .await
            {
                Ok(fixed) if !fixed.is_empty() => {
                    implementation = fixed;
                    passes += 1;
                    sent = fixable;
                }
                Ok(_) => {
                    warn!(phase = %Phase::AutoFix, "auto-fix returned an empty change set, keeping the previous one");
                    break;
                }
                Err(e) => {
                    warn!(phase = %Phase::AutoFix, error = %e, "auto-fix failed, keeping the previous change set");
                    break;
                }
            }
            if passes < options.max_correction_passes {
                validation = self.validate(&implementation, analysis).await;
                sent.clear();
            }
        }

        let unresolved: Vec<&ValidationIssue> = validation
            .issues
            .iter()
            .filter(|i| !sent.contains(i))
            .collect();

        let mut suggestions = if options.generate_suggestions {
            self.suggest(spec, &implementation, &validation).await
        } else {
            Vec::new()
        };
        suggestions.extend(unresolved.iter().map(|issue| CodeSuggestion {
            kind: SuggestionKind::UnresolvedIssue,
            message: match &issue.suggestion {
                Some(s) => format!("{} ({s})", issue.message),
                None => issue.message.clone(),
            },
            file: issue.file.clone(),
        }));

        let pattern_compliance = compliance(&validation, &exemplars, &sent);
        let quality_score = quality_score(&validation, &implementation);
        info!(
            passes,
            issues = validation.issues.len(),
            unresolved = unresolved.len(),
            quality = quality_score,
            "generation completed"
        );

        Ok(GeneratedCode {
            id: new_id("gen"),
            specification: spec.clone(),
            implementation,
            validation,
            pattern_compliance,
            similar_implementations: exemplars,
            suggestions,
            quality_score,
            correction_passes: passes,
        })
    }

    async fn validate(
        &self,
        implementation: &GeneratedImplementation,
        analysis: &RepositoryAnalysis,
    ) -> ValidationResult {
        let prompt = prompts::validation(implementation, &analysis.patterns);
        match request::<ValidationResult>(self.backend.as_ref(), &prompt, Phase::Validation).await {
            Ok(v) => v.normalized(),
            Err(e) => {
                warn!(phase = %Phase::Validation, error = %e, "validation failed, falling back to basic checks");
                basic_validation(implementation, analysis.structure.primary_language.as_deref())
            }
        }
    }

    async fn suggest(
        &self,
        spec: &Specification,
        implementation: &GeneratedImplementation,
        validation: &ValidationResult,
    ) -> Vec<CodeSuggestion> {
        match request::<SuggestionsAnswer>(
            self.backend.as_ref(),
            &prompts::suggestions(spec, implementation, validation),
            Phase::Suggestions,
        )
        .await
        {
            Ok(answer) => answer.suggestions,
            Err(e) => {
                warn!(phase = %Phase::Suggestions, error = %e, "suggestions failed, continuing without");
                Vec::new()
            }
        }
    }
}

fn non_empty(
    implementation: GeneratedImplementation,
    repository_id: &str,
) -> Result<GeneratedImplementation> {
    if implementation.is_empty() {
        anyhow::bail!(
            PipelineError::upstream("Model produced an empty change set")
                .in_phase(Phase::Generation)
                .for_repository(repository_id)
        );
    }
    Ok(implementation)
}

/// JSON first, then fenced code blocks.
pub fn parse_streamed(text: &str) -> GeneratedImplementation {
    if let Some(value) = lenient::extract_json(text)
        && let Ok(implementation) = serde_json::from_value::<GeneratedImplementation>(value)
        && !implementation.is_empty()
    {
        return implementation;
    }
    let files = stream::extract_files(text);
    if !files.is_empty() {
        warn!(files = files.len(), "stream ignored the JSON protocol, recovered fenced blocks");
    }
    GeneratedImplementation {
        summary: "Recovered from streamed output".to_string(),
        files_to_create: files,
        ..Default::default()
    }
}

/// Path-character and language checks used when the validation call fails.
pub fn basic_validation(
    implementation: &GeneratedImplementation,
    primary_language: Option<&str>,
) -> ValidationResult {
    let mut issues = Vec::new();
    let written = implementation
        .files_to_create
        .iter()
        .map(|f| f.path.as_str())
        .chain(implementation.files_to_modify.iter().map(|f| f.path.as_str()));

    for path in written {
        if !SAFE_PATH.is_match(path) {
            issues.push(ValidationIssue {
                issue_type: IssueType::Naming,
                severity: IssueSeverity::Error,
                file: Some(path.to_string()),
                line: None,
                message: format!("File path contains unsupported characters: {path}"),
                suggestion: Some("Use letters, digits, '-', '_', '.' and '/' only".to_string()),
            });
        }
        let lang = LangId::from_path(Utf8Path::new(path)).map(LangId::name);
        if let (Some(lang), Some(primary)) = (lang, primary_language)
            && lang != primary
        {
            issues.push(ValidationIssue {
                issue_type: IssueType::Pattern,
                severity: IssueSeverity::Warning,
                file: Some(path.to_string()),
                line: None,
                message: format!(
                    "{path} is {lang} but the repository is primarily {primary}"
                ),
                suggestion: None,
            });
        }
    }

    ValidationResult {
        is_valid: !issues.iter().any(|i| i.severity == IssueSeverity::Error),
        score: unit(1.0 - 0.2 * issues.len() as f64),
        pattern_compliance: 0.5,
        issues,
    }
}

fn compliance(
    validation: &ValidationResult,
    exemplars: &[SimilarImplementation],
    addressed: &[ValidationIssue],
) -> PatternCompliance {
    let exemplar_similarity =
        quality::mean(exemplars.iter().map(|e| e.similarity)).unwrap_or(0.5);
    PatternCompliance {
        overall: unit((validation.pattern_compliance + exemplar_similarity) / 2.0),
        exemplar_similarity: unit(exemplar_similarity),
        violations: validation
            .issues
            .iter()
            .filter(|i| matches!(i.issue_type, IssueType::Pattern | IssueType::Naming | IssueType::Structure))
            .map(|i| PatternViolation {
                file: i.file.clone(),
                message: i.message.clone(),
                severity: i.severity.into(),
                auto_fixable: i.issue_type == IssueType::Pattern,
                addressed: addressed.contains(i),
            })
            .collect(),
    }
}

/// Validation score plus small bonuses for a complete change set.
fn quality_score(validation: &ValidationResult, implementation: &GeneratedImplementation) -> f64 {
    let bonuses = [
        !implementation.is_empty(),
        !implementation.validation_steps.is_empty(),
        !implementation.dependencies.is_empty(),
    ];
    let bonus = bonuses.iter().filter(|b| **b).count() as f64 * COMPLETENESS_BONUS;
    unit(validation.score + bonus)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::offline::OfflineBackend;
    use crate::backend::scripted::ScriptedBackend;
    use crate::cache::memory::MemoryCache;
    use crate::config::AnalysisConfig;
    use crate::error::ErrorCode;
    use crate::store::memory::InMemoryRepository;

    const ONE_FILE: &str = r#"{"summary":"reset","files_to_create":[{"path":"src/auth/resetToken.ts","content":"export function resetToken() {}"}],"validation_steps":["npm test"]}"#;
    const FIXED: &str = r#"{"summary":"reset","files_to_create":[{"path":"src/auth/reset-token.ts","content":"export function resetToken() {}"}]}"#;

    fn generator(backend: Arc<dyn ModelBackend>) -> CodeGenerator {
        let store = Arc::new(
            InMemoryRepository::new()
                .with_file("r", "src/auth/login.ts", "export function login() {}\n")
                .with_file("r", "src/auth/password.ts", "export function hashPassword() {}\n")
                .with_file("r", "src/auth/token.ts", "export function createToken() {}\n"),
        );
        let analyzer = RepositoryAnalyzer::new(
            Arc::clone(&backend),
            store,
            Arc::new(MemoryCache::new(4)),
            AnalysisConfig::default(),
            Duration::from_secs(60),
        );
        CodeGenerator::new(backend, Arc::new(analyzer), Duration::from_secs(5))
    }

    fn spec() -> Specification {
        Specification {
            title: "Password reset token".into(),
            description: "Issue a reset token for the password flow".into(),
            ..Default::default()
        }
    }

    fn issues(n: usize) -> String {
        let list: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"type":"pattern","severity":"warning","message":"naming {i}"}}"#))
            .collect();
        format!(r#"{{"is_valid":false,"score":0.6,"pattern_compliance":0.4,"issues":[{}]}}"#, list.join(","))
    }

    #[tokio::test]
    async fn test_one_fix_pass_and_unresolved_suggestions() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on(prompts::GENERATION, ONE_FILE)
                .on(
                    prompts::VALIDATION,
                    r#"{"is_valid":false,"score":0.7,"pattern_compliance":0.6,"issues":[
                        {"type":"pattern","severity":"warning","message":"file should be kebab-case"},
                        {"type":"logic","severity":"error","message":"token never expires","suggestion":"add a TTL"}]}"#,
                )
                .on(prompts::AUTO_FIX, FIXED)
                .on(prompts::SUGGESTIONS, r#"{"suggestions":[{"kind":"testing","message":"cover expiry"}]}"#),
        );
        let result = generator(backend.clone())
            .generate(&spec(), "r", &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(result.correction_passes, 1);
        assert_eq!(backend.calls_matching(prompts::AUTO_FIX), 1);
        assert_eq!(backend.calls_matching(prompts::VALIDATION), 1);
        assert_eq!(result.implementation.files_to_create[0].path, "src/auth/reset-token.ts");

        let unresolved: Vec<&CodeSuggestion> = result
            .suggestions
            .iter()
            .filter(|s| s.kind == SuggestionKind::UnresolvedIssue)
            .collect();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].message, "token never expires (add a TTL)");
        assert_eq!(result.suggestions[0].kind, SuggestionKind::Testing);

        assert_eq!(result.pattern_compliance.violations.len(), 1);
        assert!(result.pattern_compliance.violations[0].auto_fixable);
        assert!(result.pattern_compliance.violations[0].addressed);
        assert!((0.0..=1.0).contains(&result.quality_score));
        assert!((result.quality_score - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_correction_passes_are_bounded() {
        for (max, expected) in [(1usize, 1usize), (2, 2), (0, 0)] {
            let backend = Arc::new(
                ScriptedBackend::new()
                    .on(prompts::GENERATION, ONE_FILE)
                    .on(prompts::VALIDATION, issues(6))
                    .on(prompts::AUTO_FIX, FIXED),
            );
            let options = GenerationOptions {
                max_correction_passes: max,
                ..Default::default()
            };
            let result = generator(backend.clone())
                .generate(&spec(), "r", &options)
                .await
                .unwrap();
            assert_eq!(result.correction_passes, expected);
            assert_eq!(backend.calls_matching(prompts::AUTO_FIX), expected);
            // Only a fix with no validation after it counts as addressed.
            let addressed = result
                .pattern_compliance
                .violations
                .iter()
                .filter(|v| v.addressed)
                .count();
            assert_eq!(addressed, if expected == 0 { 0 } else { 6 });
        }
    }

    #[tokio::test]
    async fn test_not_following_patterns_skips_exemplars_and_fixes() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on(prompts::GENERATION, ONE_FILE)
                .on(prompts::VALIDATION, issues(2))
                .on(prompts::AUTO_FIX, FIXED),
        );
        let options = GenerationOptions {
            follow_patterns: false,
            ..Default::default()
        };
        let result = generator(backend.clone()).generate(&spec(), "r", &options).await.unwrap();
        assert_eq!(result.correction_passes, 0);
        assert_eq!(backend.calls_matching(prompts::AUTO_FIX), 0);
        assert_eq!(backend.calls_matching(prompts::EXEMPLAR_PATTERNS), 0);
        assert_eq!(
            result
                .suggestions
                .iter()
                .filter(|s| s.kind == SuggestionKind::UnresolvedIssue)
                .count(),
            2
        );
    }

    #[tokio::test]
    async fn test_exemplar_threshold() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .on(prompts::GENERATION, ONE_FILE)
                .on_sequence(
                    prompts::EXEMPLAR_PATTERNS,
                    vec![r#"{"similarity":0.9,"naming":["camelCase"]}"#.into(), "not json".into()],
                ),
        );
        let result = generator(backend.clone())
            .generate(&spec(), "r", &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(backend.calls_matching(prompts::EXEMPLAR_PATTERNS), 2);
        assert_eq!(result.similar_implementations.len(), 1);
        assert_eq!(result.similar_implementations[0].similarity, 0.9);
        assert!(backend.calls().iter().any(|p| p.starts_with(prompts::GENERATION) && p.contains("similarity 0.90")));
    }

    #[tokio::test]
    async fn test_first_generation_failure_is_fatal() {
        let err = generator(Arc::new(OfflineBackend))
            .generate(&spec(), "r", &GenerationOptions::default())
            .await
            .unwrap_err();
        let pe = err.downcast_ref::<PipelineError>().unwrap();
        assert_eq!(pe.code, ErrorCode::UpstreamModelError);
        assert_eq!(pe.phase, Some(Phase::Generation));
        assert_eq!(pe.repository.as_deref(), Some("r"));

        let empty = ScriptedBackend::new().on(prompts::GENERATION, r#"{"summary":"nothing"}"#);
        let err = generator(Arc::new(empty))
            .generate(&spec(), "r", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("empty change set"));
    }

    #[tokio::test]
    async fn test_validation_falls_back_to_basic_checks() {
        let backend = ScriptedBackend::new().on(
            prompts::GENERATION,
            r#"{"files_to_create":[{"path":"src/bad name.ts","content":"x"},{"path":"scripts/seed.py","content":"y"}]}"#,
        );
        let result = generator(Arc::new(backend))
            .generate(&spec(), "r", &GenerationOptions::default())
            .await
            .unwrap();
        let v = &result.validation;
        assert_eq!(v.issues.len(), 2);
        assert!(!v.is_valid);
        assert!((v.score - 0.6).abs() < 1e-9);
        assert_eq!(v.pattern_compliance, 0.5);
        assert_eq!(result.pattern_compliance.overall, 0.5);
    }

    #[tokio::test]
    async fn test_streaming_forwards_progress() {
        let reply = format!("{ONE_FILE}\n[DONE]\nignored tail");
        let backend = ScriptedBackend::new()
            .on(prompts::GENERATION, reply)
            .with_chunk_size(7);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let result = generator(Arc::new(backend))
            .generate_streaming(&spec(), "r", &GenerationOptions::default(), tx)
            .await
            .unwrap();
        let mut seen = String::new();
        while let Some(part) = rx.recv().await {
            seen.push_str(&part);
        }
        assert!(seen.starts_with("{\"summary\""));
        assert!(!seen.contains("ignored tail"));
        assert_eq!(result.implementation.files_to_create.len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_recovers_fenced_blocks_or_fails() {
        let backend = ScriptedBackend::new().on(
            prompts::GENERATION,
            "### src/auth/reset.ts\n```ts\nexport const reset = 1;\n```\n",
        );
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let result = generator(Arc::new(backend))
            .generate_streaming(&spec(), "r", &GenerationOptions::default(), tx)
            .await
            .unwrap();
        assert_eq!(result.implementation.files_to_create[0].path, "src/auth/reset.ts");

        let silent = ScriptedBackend::new().on(prompts::GENERATION, "I cannot help with that.");
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let err = generator(Arc::new(silent))
            .generate_streaming(&spec(), "r", &GenerationOptions::default(), tx)
            .await
            .unwrap_err();
        assert_eq!(crate::error::code_of(&err), ErrorCode::UpstreamModelError);
    }

    #[test]
    fn test_scores_stay_in_unit_range() {
        let empty = GeneratedImplementation::default();
        let v = basic_validation(&empty, None);
        assert_eq!(v.score, 1.0);
        assert_eq!(quality_score(&v, &empty), 1.0);
        let c = compliance(&v, &[], &[]);
        assert_eq!(c.overall, 0.5);
        assert!(c.violations.is_empty());
    }
}
