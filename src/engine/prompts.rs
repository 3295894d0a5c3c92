//! Prompt construction.
//!
//! Every prompt opens with a task marker line such as
//! `[task:root-cause]`, so backends and logs can tell the steps apart.

use std::fmt::Write as _;

use crate::models::analysis::{ArchitectureInfo, CodePatterns, DependencyMap, RepositoryAnalysis};
use crate::models::bug::{BugAnalysis, FixSuggestion, RootCauseAnalysis};
use crate::models::generation::{
    GeneratedImplementation, GenerationOptions, SimilarImplementation, Specification,
    ValidationIssue, ValidationResult,
};
use crate::models::relevance::RelevantFile;
use crate::models::testing::{TestGenerationRequest, TestPatterns};

pub const PATTERN_EXTRACTION: &str = "[task:pattern-extraction]";
pub const SEMANTIC_SEARCH: &str = "[task:semantic-search]";
pub const ROOT_CAUSE: &str = "[task:root-cause]";
pub const FIX_SUGGESTIONS: &str = "[task:fix-suggestions]";
pub const IMPACT: &str = "[task:impact]";
pub const FIX_TESTS: &str = "[task:fix-tests]";
pub const EXEMPLAR_PATTERNS: &str = "[task:exemplar-patterns]";
pub const GENERATION: &str = "[task:generation]";
pub const VALIDATION: &str = "[task:validation]";
pub const AUTO_FIX: &str = "[task:auto-fix]";
pub const SUGGESTIONS: &str = "[task:suggestions]";
pub const TEST_PATTERNS: &str = "[task:test-patterns]";
pub const TEST_GENERATION: &str = "[task:test-generation]";

/// Characters of a single file embedded in a prompt.
const MAX_FILE_CHARS: usize = 6_000;

/// Truncate on a char boundary, marking the cut.
pub fn clip(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n... [truncated]", &text[..end])
}

fn push_files(out: &mut String, files: &[(String, String)]) {
    for (path, content) in files {
        let _ = write!(out, "\n--- {path} ---\n{}\n", clip(content, MAX_FILE_CHARS));
    }
}

fn json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn naming_line(patterns: &CodePatterns) -> String {
    let n = &patterns.naming;
    format!(
        "files {}, functions {}, variables {}, classes {}, components {}, constants {}",
        n.files, n.functions, n.variables, n.classes, n.components, n.constants
    )
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

pub fn pattern_extraction(samples: &[(String, String)]) -> String {
    let mut p = format!(
        "{PATTERN_EXTRACTION}\nYou are reviewing a code base. From the sample files below, describe \
         the conventions the repository follows: naming (files, functions, variables, classes, \
         components, constants), file organization, import style, export style, error handling \
         and testing. Give each convention a confidence between 0 and 1 and a short example.\n"
    );
    push_files(&mut p, samples);
    p
}

pub fn semantic_search(query: &str, index_summary: &str) -> String {
    format!(
        "{SEMANTIC_SEARCH}\nQuery: {query}\n\nRepository index (path: symbols | keywords):\n\
         {index_summary}\n\nList the files most likely related to the query, with a relevance \
         between 0 and 1 and a one-line reason. Only use paths that appear in the index."
    )
}

// ---------------------------------------------------------------------------
// Bug analysis
// ---------------------------------------------------------------------------

fn bug_header(description: &str, steps: &[String]) -> String {
    let mut p = format!("Bug report: {description}\n");
    if !steps.is_empty() {
        p.push_str("Reproduction steps:\n");
        for (i, step) in steps.iter().enumerate() {
            let _ = writeln!(p, "{}. {step}", i + 1);
        }
    }
    p
}

pub fn root_cause(
    description: &str,
    steps: &[String],
    relevant: &[RelevantFile],
    files: &[(String, String)],
) -> String {
    let mut p = format!("{ROOT_CAUSE}\n{}", bug_header(description, steps));
    p.push_str("\nCandidate files by relevance:\n");
    for f in relevant {
        let _ = writeln!(p, "- {} (score {})", f.path, f.score);
    }
    p.push_str(
        "\nTrace the execution path that produces the bug as ordered steps, name the root cause, \
         list the affected code spans with severity, explain the data flow, rate the fix \
         complexity from 1 to 10 and classify the bug as one of logic, data, ui, performance, \
         security, integration, configuration or dependency.\n",
    );
    push_files(&mut p, files);
    p
}

pub fn fix_suggestions(
    description: &str,
    root: &RootCauseAnalysis,
    files: &[(String, String)],
) -> String {
    let mut p = format!(
        "{FIX_SUGGESTIONS}\nBug report: {description}\nRoot cause: {}\nExplanation: {}\n\
         Complexity: {}/10\n\nPropose two or three fixes spanning the quick, proper and \
         comprehensive approaches. For each give concrete per-file changes (type create, modify \
         or delete; old and new code), pros, cons, risk level, testing notes, an estimated time \
         and a confidence between 0 and 1.\n",
        root.root_cause, root.explanation, root.complexity
    );
    push_files(&mut p, files);
    p
}

pub fn impact(description: &str, fixes: &[FixSuggestion], deps: &DependencyMap) -> String {
    let changed: Vec<&str> = fixes
        .iter()
        .flat_map(|f| f.changes.iter().map(|c| c.file.as_str()))
        .collect();
    let mut p = format!(
        "{IMPACT}\nBug report: {description}\nFiles changed by the proposed fixes: {}\n\n\
         Import graph around those files:\n",
        changed.join(", ")
    );
    for file in &changed {
        let _ = writeln!(
            p,
            "- {file} imports [{}]; imported by [{}]",
            deps.imports_of(file).join(", "),
            deps.importers_of(file).join(", ")
        );
    }
    p.push_str(
        "\nDescribe the impact: affected files, functions and components, breaking changes, \
         required test types (unit, integration, e2e, regression), deployment considerations \
         and a rollback plan.",
    );
    p
}

pub fn fix_tests(analysis: &BugAnalysis, fix: &FixSuggestion) -> String {
    format!(
        "{FIX_TESTS}\nBug report: {}\nRoot cause: {}\nSelected fix ({:?}): {}\nChanges:\n{}\n\n\
         Write regression test cases proving the bug is fixed: at least one happy path, one \
         edge case and one error case. Each case has a name, description, kind and code.",
        analysis.description,
        analysis.root_cause.root_cause,
        fix.approach,
        fix.description,
        json(&fix.changes)
    )
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

pub fn exemplar_patterns(spec: &Specification, path: &str, content: &str) -> String {
    format!(
        "{EXEMPLAR_PATTERNS}\nTask: {}\n{}\n\nExisting file {path}:\n{}\n\nExtract the concrete \
         naming, structure, import and export patterns this file uses, and rate its similarity \
         to the task between 0 and 1.",
        spec.title,
        spec.description,
        clip(content, MAX_FILE_CHARS)
    )
}

fn spec_block(spec: &Specification) -> String {
    let mut p = format!(
        "Title: {}\nKind: {}\nDescription: {}\n",
        spec.title, spec.kind, spec.description
    );
    if !spec.requirements.is_empty() {
        let _ = writeln!(p, "Requirements:\n- {}", spec.requirements.join("\n- "));
    }
    if !spec.constraints.is_empty() {
        let _ = writeln!(p, "Constraints:\n- {}", spec.constraints.join("\n- "));
    }
    if let Some(lang) = &spec.target_language {
        let _ = writeln!(p, "Target language: {lang}");
    }
    if let Some(bug) = &spec.bug_analysis {
        let _ = writeln!(
            p,
            "Bug analysis:\n  root cause: {}\n  explanation: {}\n  category: {:?}\n  \
             relevant files: {}",
            bug.root_cause.root_cause,
            bug.root_cause.explanation,
            bug.category,
            bug.relevant_files
                .iter()
                .map(|f| f.path.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Some(fix) = bug.suggested_fixes.first() {
            let _ = writeln!(p, "  preferred fix: {}", fix.description);
        }
    }
    p
}

fn context_block(
    analysis: &RepositoryAnalysis,
    exemplars: &[SimilarImplementation],
    options: &GenerationOptions,
) -> String {
    let arch: &ArchitectureInfo = &analysis.architecture;
    let mut p = format!(
        "Repository conventions: {}\nFile organization: {} (depth {})\nArchitecture: framework {}, \
         build {}, tests {}\nOptimize for: {}\n",
        naming_line(&analysis.patterns),
        analysis.patterns.file_organization.kind,
        analysis.patterns.file_organization.depth,
        arch.framework.as_deref().unwrap_or("none"),
        arch.build_tool,
        arch.test_framework.as_deref().unwrap_or("unknown"),
        options.optimize_for
    );
    if let Some(dir) = &options.target_directory {
        let _ = writeln!(p, "Place new files under: {dir}");
    }
    if !exemplars.is_empty() {
        p.push_str("\nMatch these existing implementations exactly:\n");
        for ex in exemplars {
            let _ = write!(
                p,
                "\n--- {} (similarity {:.2}) ---\nnaming: {}\nstructure: {}\nimports: {}\n{}\n",
                ex.path,
                ex.similarity,
                ex.patterns.naming.join("; "),
                ex.patterns.structure.join("; "),
                ex.patterns.imports.join("; "),
                ex.excerpt
            );
        }
    }
    p
}

pub fn generation(
    spec: &Specification,
    analysis: &RepositoryAnalysis,
    exemplars: &[SimilarImplementation],
    options: &GenerationOptions,
) -> String {
    format!(
        "{GENERATION}\n{}\n{}\nProduce the complete change set: files to create (full content), \
         files to modify (full new content), files to delete, new dependencies and the steps to \
         validate the change.",
        spec_block(spec),
        context_block(analysis, exemplars, options)
    )
}

/// Streaming variant: same request, with an explicit output protocol.
pub fn generation_stream(
    spec: &Specification,
    analysis: &RepositoryAnalysis,
    exemplars: &[SimilarImplementation],
    options: &GenerationOptions,
) -> String {
    format!(
        "{}\n\nRespond with one JSON object with the keys summary, files_to_create, \
         files_to_modify, files_to_delete, dependencies and validation_steps, then emit [DONE] \
         on its own line.",
        generation(spec, analysis, exemplars, options)
    )
}

pub fn validation(implementation: &GeneratedImplementation, patterns: &CodePatterns) -> String {
    format!(
        "{VALIDATION}\nRepository conventions: {}\n\nGenerated change set:\n{}\n\nCompare the \
         generated files against the conventions. Report every issue with its type (pattern, \
         naming, structure, syntax, logic, security, style), severity (error, warning, info), \
         file, line and a suggestion. Score overall quality and pattern compliance between 0 \
         and 1.",
        naming_line(patterns),
        json(implementation)
    )
}

pub fn auto_fix(
    implementation: &GeneratedImplementation,
    issues: &[ValidationIssue],
    patterns: &CodePatterns,
) -> String {
    format!(
        "{AUTO_FIX}\nRepository conventions: {}\n\nOriginal change set:\n{}\n\nIssues to fix:\n{}\n\n\
         Return the corrected change set in full. Change only what the issues require.",
        naming_line(patterns),
        json(implementation),
        json(&issues)
    )
}

pub fn suggestions(
    spec: &Specification,
    implementation: &GeneratedImplementation,
    validation: &ValidationResult,
) -> String {
    format!(
        "{SUGGESTIONS}\nTask: {}\nValidation score: {:.2}\nFiles: {}\n\nSuggest follow-up \
         improvements (performance, security, testing, documentation). Keep each to one sentence.",
        spec.title,
        validation.score,
        implementation.touched_paths().join(", ")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

pub fn test_patterns(samples: &[(String, String)]) -> String {
    let mut p = format!(
        "{TEST_PATTERNS}\nFrom the existing test files below, describe the test conventions: \
         framework, file naming pattern (use * for the source stem and {{{{ext}}}} for its \
         extension), structure keywords, mocking, assertion style, test data generation, whether \
         tests are co-located and the test directory name.\n"
    );
    push_files(&mut p, samples);
    p
}

pub fn test_generation(
    path: &str,
    content: &str,
    test_file: &str,
    patterns: &TestPatterns,
    request: &TestGenerationRequest,
) -> String {
    let types: Vec<String> = request
        .test_types
        .iter()
        .map(|t| format!("{t:?}").to_lowercase())
        .collect();
    let mut p = format!(
        "{TEST_GENERATION}\nSource file: {path}\nTest file: {test_file}\nFramework: {}\n\
         Structure: {}\nMocking: {}\nAssertions: {}\nTest data: {}\nTest types: {}\n",
        patterns.framework,
        patterns.structure.join(", "),
        patterns.mocking.join(", "),
        patterns.assertions.join(", "),
        patterns.data_generation,
        types.join(", ")
    );
    p.push_str("Write happy-path");
    if request.include_edge_cases {
        p.push_str(", edge-case and error-case");
    }
    p.push_str(" test cases");
    if request.include_mocks {
        p.push_str(", mocking external collaborators");
    }
    p.push_str(
        ". Include setup and teardown when needed, the full test file content, and an estimated \
         coverage between 0 and 1 per tested function.\n",
    );
    push_files(&mut p, &[(path.to_string(), content.to_string())]);
    p
}
