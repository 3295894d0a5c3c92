use serde::{Deserialize, Serialize};

use super::bug::Priority;
use super::generation::{GeneratedImplementation, OptimizeFor, TaskKind};

/// A request to the repo-sight engine (one NDJSON line in session mode).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SightRequest {
    pub command: Command,
    /// Repository id (a directory for the local store)
    #[serde(default)]
    pub repository: String,
    #[serde(default)]
    pub refresh: bool,
    /// Free-text query (for rank)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Bug description, spec description or requirement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<TaskKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimize_for: Option<OptimizeFor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_patterns: Option<bool>,
    #[serde(default)]
    pub include_tests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_threshold: Option<f64>,
    /// Change set to cover (for tests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation: Option<GeneratedImplementation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Analyze,
    Rank,
    Bug,
    Generate,
    Tests,
    Develop,
    Doctor,
}
