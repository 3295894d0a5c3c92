use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::generation::GeneratedImplementation;
use super::relevance::RelevantFile;
use super::testing::TestCase;
use crate::backend::lenient;
use crate::error::{ErrorCode, PipelineError};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Priority {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(PipelineError::invalid_request(format!(
                "Unknown priority: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum BugCategory {
    Logic,
    Data,
    Ui,
    Performance,
    Security,
    Integration,
    Configuration,
    Dependency,
}

// ---------------------------------------------------------------------------
// Status state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BugStatus {
    Analyzing,
    Analyzed,
    FixSuggested,
    FixApplied,
    Resolved,
    Failed,
}

impl fmt::Display for BugStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::FixSuggested => "fix_suggested",
            Self::FixApplied => "fix_applied",
            Self::Resolved => "resolved",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl BugStatus {
    /// Legal edges: the forward chain, `fix_applied -> fix_suggested` for a
    /// further fix attempt, and `failed` from any non-terminal state.
    pub fn can_transition_to(self, next: BugStatus) -> bool {
        use BugStatus::*;
        matches!(
            (self, next),
            (Analyzing, Analyzed)
                | (Analyzed, FixSuggested)
                | (FixSuggested, FixApplied)
                | (FixApplied, FixSuggested)
                | (FixApplied, Resolved)
                | (Analyzing | Analyzed | FixSuggested | FixApplied, Failed)
        )
    }

    pub fn transition(self, next: BugStatus) -> Result<BugStatus, PipelineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(PipelineError::new(
                ErrorCode::InvalidTransition,
                format!("Illegal bug status transition: {self} -> {next}"),
            ))
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Root cause
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExecutionStep {
    pub step: u32,
    pub description: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct AffectedCode {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub code: String,
    pub issue: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RootCauseAnalysis {
    pub execution_trace: Vec<ExecutionStep>,
    pub root_cause: String,
    pub affected_code: Vec<AffectedCode>,
    pub explanation: String,
    /// 1 (trivial) to 10 (very hard)
    #[serde(deserialize_with = "lenient::complexity")]
    pub complexity: u8,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional"
    )]
    pub category: Option<BugCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_flow: Option<String>,
}

impl Default for RootCauseAnalysis {
    fn default() -> Self {
        Self {
            execution_trace: Vec::new(),
            root_cause: "Root cause could not be determined automatically".to_string(),
            affected_code: Vec::new(),
            explanation: "Manual investigation of the relevant files is required.".to_string(),
            complexity: 5,
            category: None,
            data_flow: None,
        }
    }
}

impl RootCauseAnalysis {
    pub fn normalized(mut self) -> Self {
        self.complexity = self.complexity.clamp(1, 10);
        self.execution_trace.sort_by_key(|s| s.step);
        self
    }
}

// ---------------------------------------------------------------------------
// Fix suggestions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum FixApproach {
    Quick,
    #[default]
    Proper,
    Comprehensive,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    #[default]
    Modify,
    Create,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CodeChange {
    pub file: String,
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub change_type: ChangeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_code: Option<String>,
    pub description: String,
}

/// Immutable once generated; selecting it for application never mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FixSuggestion {
    pub id: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub approach: FixApproach,
    pub description: String,
    pub changes: Vec<CodeChange>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub risk_level: RiskLevel,
    pub testing_notes: String,
    pub estimated_time: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequiredTest {
    Unit,
    Integration,
    E2e,
    Regression,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ImpactAnalysis {
    pub affected_files: Vec<String>,
    pub affected_functions: Vec<String>,
    pub affected_components: Vec<String>,
    pub breaking_changes: Vec<String>,
    #[serde(deserialize_with = "lenient::vec_skip_invalid")]
    pub testing_required: Vec<RequiredTest>,
    pub deployment_considerations: Vec<String>,
    pub rollback_plan: String,
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// One per bug report. Fix attempts transition `status`; they never fork it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BugAnalysis {
    pub id: String,
    pub repository_id: String,
    pub description: String,
    pub reproduction_steps: Vec<String>,
    pub relevant_files: Vec<RelevantFile>,
    pub root_cause: RootCauseAnalysis,
    pub suggested_fixes: Vec<FixSuggestion>,
    pub impact_analysis: ImpactAnalysis,
    pub priority: Priority,
    pub category: BugCategory,
    pub status: BugStatus,
    pub estimated_fix_time: String,
    pub created_at: u64,
}

impl BugAnalysis {
    /// Apply a validated status transition in place.
    pub fn advance(&mut self, next: BugStatus) -> Result<(), PipelineError> {
        self.status = self.status.transition(next)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FixOutcome {
    /// Change set assembled, no pull request requested.
    FixCreated,
    PrCreated,
    /// Change set assembled, pull request creation failed.
    PrFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PullRequest {
    pub url: String,
    pub number: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BugFixResult {
    pub analysis_id: String,
    pub fix: FixSuggestion,
    pub change_set: GeneratedImplementation,
    pub test_cases: Vec<TestCase>,
    pub branch: String,
    pub pr_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<PullRequest>,
    pub status: FixOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integration_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_chain_is_legal() {
        let mut s = BugStatus::Analyzing;
        for next in [
            BugStatus::Analyzed,
            BugStatus::FixSuggested,
            BugStatus::FixApplied,
            BugStatus::Resolved,
        ] {
            s = s.transition(next).unwrap();
        }
        assert_eq!(s, BugStatus::Resolved);
        assert!(s.is_terminal());
    }

    #[test]
    fn test_skipping_analysis_is_rejected() {
        let err = BugStatus::Analyzing
            .transition(BugStatus::FixApplied)
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTransition);
        assert!(err.message.contains("analyzing -> fix_applied"));
    }

    #[test]
    fn test_applied_fix_can_be_reattempted() {
        let s = BugStatus::FixApplied
            .transition(BugStatus::FixSuggested)
            .unwrap()
            .transition(BugStatus::FixApplied)
            .unwrap();
        assert_eq!(s, BugStatus::FixApplied);
        assert!(!BugStatus::Resolved.can_transition_to(BugStatus::FixSuggested));
        assert!(!BugStatus::FixApplied.can_transition_to(BugStatus::FixApplied));
    }

    #[test]
    fn test_failed_reachable_until_terminal() {
        assert!(BugStatus::Analyzing.can_transition_to(BugStatus::Failed));
        assert!(BugStatus::FixApplied.can_transition_to(BugStatus::Failed));
        assert!(!BugStatus::Resolved.can_transition_to(BugStatus::Failed));
        assert!(!BugStatus::Failed.can_transition_to(BugStatus::Analyzing));
    }

    #[test]
    fn test_priority_ordering_and_parse() {
        assert!(Priority::Low < Priority::High);
        assert!(Priority::High < Priority::Critical);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_root_cause_lenient_parse() {
        let rc: RootCauseAnalysis = serde_json::from_str(
            r#"{"root_cause":"token not refreshed","complexity":14,"category":"auth",
                "execution_trace":[{"step":2},{"step":1}],
                "affected_code":[{"file":"a.ts","severity":"catastrophic"}]}"#,
        )
        .unwrap();
        let rc = rc.normalized();
        assert_eq!(rc.complexity, 10);
        assert_eq!(rc.execution_trace[0].step, 1);
        assert_eq!(rc.category, None);
        assert_eq!(rc.affected_code[0].severity, Severity::Medium);
    }
}
