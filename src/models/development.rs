use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::bug::BugAnalysis;
use super::generation::{GeneratedCode, OptimizeFor, TaskKind};
use super::testing::TestGeneration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DevelopmentRequest {
    pub repository_id: String,
    pub requirement: String,
    #[serde(default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub include_tests: bool,
    /// Falls back to the configured gate threshold.
    #[serde(default)]
    pub quality_threshold: Option<f64>,
    #[serde(default)]
    pub optimize_for: OptimizeFor,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DevelopmentResult {
    pub request_id: String,
    pub is_bug_fix: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug_analysis: Option<BugAnalysis>,
    pub generation: GeneratedCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tests: Option<TestGeneration>,
    /// Convex blend of the present sub-scores.
    pub overall_quality: f64,
    pub quality_threshold: f64,
    pub pull_request_ready: bool,
    pub recommendations: Vec<String>,
    pub next_steps: Vec<String>,
    pub estimated_review_minutes: u32,
}
