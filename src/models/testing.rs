use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::generation::GeneratedImplementation;
use crate::backend::lenient;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    #[default]
    Unit,
    Integration,
    E2e,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TestCaseKind {
    #[default]
    HappyPath,
    EdgeCase,
    ErrorCase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TestCase {
    pub name: String,
    pub description: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub kind: TestCaseKind,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
}

/// Test conventions derived from existing test files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TestPatterns {
    pub framework: String,
    /// e.g. `*.test.{{ext}}`; `*` is the source stem.
    pub naming_pattern: String,
    pub structure: Vec<String>,
    pub mocking: Vec<String>,
    pub assertions: Vec<String>,
    pub data_generation: String,
    pub co_location: bool,
    pub test_directory: String,
}

impl Default for TestPatterns {
    fn default() -> Self {
        Self {
            framework: "Jest".to_string(),
            naming_pattern: "*.test.ts".to_string(),
            structure: vec![
                "describe".to_string(),
                "it".to_string(),
                "beforeEach".to_string(),
                "afterEach".to_string(),
            ],
            mocking: vec!["jest.mock".to_string()],
            assertions: vec!["expect(...).toBe".to_string(), "expect(...).toEqual".to_string()],
            data_generation: "factory".to_string(),
            co_location: true,
            test_directory: "__tests__".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CoverageItem {
    pub target: String,
    pub coverage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GeneratedTest {
    pub source_file: String,
    pub test_file: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub test_type: TestType,
    pub framework: String,
    pub test_cases: Vec<TestCase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teardown: Option<String>,
    pub mocks: Vec<String>,
    pub coverage: Vec<CoverageItem>,
    /// Full test file content.
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TypeCoverage {
    pub unit: f64,
    pub integration: f64,
    pub e2e: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestCoverage {
    /// `[0, 1]`; 0 when nothing was eligible.
    pub overall: f64,
    pub by_file: BTreeMap<String, f64>,
    /// Fraction of generated tests per type.
    pub by_type: TypeCoverage,
    pub untested_files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestGeneration {
    pub tests: Vec<GeneratedTest>,
    pub coverage: TestCoverage,
    pub quality_score: f64,
    pub patterns: TestPatterns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestGenerationRequest {
    pub repository_id: String,
    pub implementation: GeneratedImplementation,
    #[serde(default = "default_test_types")]
    pub test_types: Vec<TestType>,
    #[serde(default = "default_true")]
    pub include_edge_cases: bool,
    #[serde(default = "default_true")]
    pub include_mocks: bool,
}

fn default_test_types() -> Vec<TestType> {
    vec![TestType::Unit]
}

fn default_true() -> bool {
    true
}

impl TestGenerationRequest {
    pub fn new(repository_id: impl Into<String>, implementation: GeneratedImplementation) -> Self {
        Self {
            repository_id: repository_id.into(),
            implementation,
            test_types: default_test_types(),
            include_edge_cases: true,
            include_mocks: true,
        }
    }
}
