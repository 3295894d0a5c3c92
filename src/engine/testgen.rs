//! Test generation following the repository's own test conventions.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::analyzer::RepositoryAnalyzer;
use super::{prompts, quality};
use crate::backend::{ModelBackend, request, request_or};
use crate::error::Phase;
use crate::language::{is_manifest_or_data, is_test_file};
use crate::models::analysis::RepositoryAnalysis;
use crate::models::testing::{
    GeneratedTest, TestCoverage, TestGeneration, TestGenerationRequest, TestPatterns, TestType,
    TypeCoverage,
};
use crate::models::unit;

/// Existing test files sampled for conventions.
const PATTERN_SAMPLES: usize = 5;
/// Sources shorter than this are not worth a test file.
const MIN_SOURCE_CHARS: usize = 10;
/// Test cases per file that count as full density.
const FULL_DENSITY_CASES: f64 = 5.0;

pub struct TestGenerator {
    backend: Arc<dyn ModelBackend>,
    analyzer: Arc<RepositoryAnalyzer>,
}

impl TestGenerator {
    pub fn new(backend: Arc<dyn ModelBackend>, analyzer: Arc<RepositoryAnalyzer>) -> Self {
        Self { backend, analyzer }
    }

    pub async fn generate_tests(&self, req: &TestGenerationRequest) -> Result<TestGeneration> {
        debug!(repository = %req.repository_id, "generate_tests called");
        let analysis = self.analyzer.analyze(&req.repository_id, false).await?;
        let patterns = self.test_patterns(&analysis).await;

        let eligible = eligible_sources(req);
        let jobs = eligible.iter().map(|(path, content)| {
            let patterns = &patterns;
            async move {
                let test_file = test_file_path(path, patterns);
                let prompt = prompts::test_generation(path, content, &test_file, patterns, req);
                match request::<GeneratedTest>(self.backend.as_ref(), &prompt, Phase::TestGeneration)
                    .await
                {
                    Ok(mut test) => {
                        test.source_file = path.to_string();
                        if test.test_file.trim().is_empty() {
                            test.test_file = test_file;
                        }
                        if test.framework.trim().is_empty() {
                            test.framework = patterns.framework.clone();
                        }
                        Some(test)
                    }
                    Err(e) => {
                        warn!(phase = %Phase::TestGeneration, path = %path, error = %e, "test generation failed, skipping file");
                        None
                    }
                }
            }
        });
        let tests: Vec<GeneratedTest> = futures::future::join_all(jobs)
            .await
            .into_iter()
            .flatten()
            .collect();

        let sources: Vec<&str> = eligible.iter().map(|(p, _)| *p).collect();
        let coverage = coverage(&tests, &sources);
        let quality_score = quality_score(&tests, coverage.overall);
        info!(
            eligible = sources.len(),
            generated = tests.len(),
            coverage = coverage.overall,
            quality = quality_score,
            "tests generated"
        );
        Ok(TestGeneration {
            tests,
            coverage,
            quality_score,
            patterns,
        })
    }

    async fn test_patterns(&self, analysis: &RepositoryAnalysis) -> TestPatterns {
        let store = self.analyzer.store();
        let mut samples = Vec::new();
        for path in analysis
            .structure
            .files
            .iter()
            .filter(|f| is_test_file(f))
            .take(PATTERN_SAMPLES)
        {
            match store.get_file_content(&analysis.repository_id, path).await {
                Ok(content) => samples.push((path.clone(), content)),
                Err(e) => warn!(path = %path, error = %e, "test sample unreadable, skipping"),
            }
        }
        if samples.is_empty() {
            debug!("no existing tests, using default test patterns");
            return TestPatterns::default();
        }
        request_or(
            self.backend.as_ref(),
            &prompts::test_patterns(&samples),
            Phase::TestPatterns,
            TestPatterns::default,
        )
        .await
    }
}

/// Created and modified files worth testing, in declaration order.
fn eligible_sources(req: &TestGenerationRequest) -> Vec<(&str, &str)> {
    let imp = &req.implementation;
    imp.files_to_create
        .iter()
        .map(|f| (f.path.as_str(), f.content.as_str()))
        .chain(
            imp.files_to_modify
                .iter()
                .map(|f| (f.path.as_str(), f.content.as_str())),
        )
        .filter(|(path, content)| {
            !is_test_file(path)
                && !is_manifest_or_data(path)
                && content.trim().chars().count() >= MIN_SOURCE_CHARS
        })
        .collect()
}

/// Test file for `source`: `*` in the naming pattern becomes the stem and
/// `{{ext}}` the extension.
pub fn test_file_path(source: &str, patterns: &TestPatterns) -> String {
    let (dir, file) = match source.rsplit_once('/') {
        Some((d, f)) => (Some(d), f),
        None => (None, source),
    };
    let (stem, ext) = file.rsplit_once('.').unwrap_or((file, ""));
    let name = patterns
        .naming_pattern
        .replace("{{ext}}", ext)
        .replace('*', stem);

    let mut parts: Vec<&str> = dir.into_iter().collect();
    if !patterns.co_location && !patterns.test_directory.is_empty() {
        parts.push(patterns.test_directory.trim_matches('/'));
    }
    parts.push(&name);
    parts.join("/")
}

fn file_coverage(test: &GeneratedTest) -> f64 {
    quality::mean(test.coverage.iter().map(|c| unit(c.coverage))).unwrap_or_else(|| {
        (test.test_cases.len() as f64 / FULL_DENSITY_CASES).min(1.0)
    })
}

fn coverage(tests: &[GeneratedTest], sources: &[&str]) -> TestCoverage {
    let mut by_file: BTreeMap<String, f64> = BTreeMap::new();
    for test in tests {
        let entry = by_file.entry(test.source_file.clone()).or_insert(0.0);
        *entry = entry.max(file_coverage(test));
    }
    let overall = if sources.is_empty() {
        0.0
    } else {
        unit(by_file.values().sum::<f64>() / sources.len() as f64)
    };
    let of_type = |t: TestType| {
        quality::ratio(tests.iter().filter(|x| x.test_type == t).count(), tests.len())
    };
    TestCoverage {
        overall,
        by_type: TypeCoverage {
            unit: of_type(TestType::Unit),
            integration: of_type(TestType::Integration),
            e2e: of_type(TestType::E2e),
        },
        untested_files: sources
            .iter()
            .filter(|s| !by_file.contains_key(**s))
            .map(|s| s.to_string())
            .collect(),
        by_file,
    }
}

/// 40% coverage, 30% type completeness, 20% case density, 10% extras.
fn quality_score(tests: &[GeneratedTest], coverage: f64) -> f64 {
    if tests.is_empty() {
        return 0.0;
    }
    let has = |t: TestType| tests.iter().any(|x| x.test_type == t);
    let completeness = [
        (TestType::Unit, 0.6),
        (TestType::Integration, 0.3),
        (TestType::E2e, 0.1),
    ]
    .iter()
    .filter(|(t, _)| has(*t))
    .map(|(_, w)| w)
    .sum::<f64>();

    let cases = tests.iter().map(|t| t.test_cases.len()).sum::<usize>() as f64;
    let density = (cases / tests.len() as f64 / FULL_DENSITY_CASES).min(1.0);

    let mut extras = 0.0;
    if tests.iter().any(|t| t.setup.as_deref().is_some_and(|s| !s.trim().is_empty())) {
        extras += 0.4;
    }
    if tests.iter().any(|t| t.teardown.as_deref().is_some_and(|s| !s.trim().is_empty())) {
        extras += 0.2;
    }
    if tests.iter().any(|t| !t.mocks.is_empty()) {
        extras += 0.4;
    }

    unit(0.4 * coverage + 0.3 * completeness + 0.2 * density + 0.1 * extras)
}
