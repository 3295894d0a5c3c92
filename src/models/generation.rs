use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::bug::BugAnalysis;
use crate::backend::lenient;
use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Feature,
    Enhancement,
    BugFix,
    Refactor,
    Component,
    Api,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Feature => "feature",
            Self::Enhancement => "enhancement",
            Self::BugFix => "bug_fix",
            Self::Refactor => "refactor",
            Self::Component => "component",
            Self::Api => "api",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "feature" => Ok(Self::Feature),
            "enhancement" => Ok(Self::Enhancement),
            "bug_fix" | "bugfix" => Ok(Self::BugFix),
            "refactor" => Ok(Self::Refactor),
            "component" => Ok(Self::Component),
            "api" => Ok(Self::Api),
            other => Err(PipelineError::invalid_request(format!("Unknown task kind: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptimizeFor {
    Readability,
    Performance,
    #[default]
    Maintainability,
}

impl std::fmt::Display for OptimizeFor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Readability => "readability",
            Self::Performance => "performance",
            Self::Maintainability => "maintainability",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for OptimizeFor {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "readability" => Ok(Self::Readability),
            "performance" => Ok(Self::Performance),
            "maintainability" => Ok(Self::Maintainability),
            other => Err(PipelineError::invalid_request(format!(
                "Unknown optimization target: {other}"
            ))),
        }
    }
}

/// What to build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Specification {
    pub title: String,
    pub description: String,
    pub kind: TaskKind,
    pub requirements: Vec<String>,
    pub constraints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    /// Present when the specification was derived from a bug report.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bug_analysis: Option<Box<BugAnalysis>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GenerationOptions {
    /// Drive the auto-fix loop from validation issues.
    pub follow_patterns: bool,
    pub max_correction_passes: usize,
    pub similarity_threshold: f64,
    pub optimize_for: OptimizeFor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_directory: Option<String>,
    pub generate_suggestions: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            follow_patterns: true,
            max_correction_passes: 1,
            similarity_threshold: 0.4,
            optimize_for: OptimizeFor::default(),
            target_directory: None,
            generate_suggestions: true,
        }
    }
}

impl Specification {
    /// Specification whose title defaults to the first line of `description`,
    /// cut at 80 characters.
    pub fn from_description(description: &str, title: Option<String>, kind: TaskKind) -> Self {
        let title = title.filter(|t| !t.trim().is_empty()).unwrap_or_else(|| {
            description
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .chars()
                .take(80)
                .collect()
        });
        Self {
            title,
            description: description.to_string(),
            kind,
            ..Self::default()
        }
    }
}

impl GenerationOptions {
    /// Defaults taken from the `[generation]` config table.
    pub fn from_config(config: &crate::config::GenerationConfig) -> Self {
        Self {
            max_correction_passes: config.max_correction_passes,
            similarity_threshold: config.similarity_threshold,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Change set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ModifiedFile {
    pub path: String,
    /// Full replacement content or the changed region.
    pub content: String,
    pub description: String,
}

/// File-level change set. Each auto-fix pass yields a new value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct GeneratedImplementation {
    pub summary: String,
    pub files_to_create: Vec<GeneratedFile>,
    pub files_to_modify: Vec<ModifiedFile>,
    pub files_to_delete: Vec<String>,
    pub dependencies: Vec<String>,
    pub validation_steps: Vec<String>,
}

impl GeneratedImplementation {
    pub fn is_empty(&self) -> bool {
        self.files_to_create.is_empty()
            && self.files_to_modify.is_empty()
            && self.files_to_delete.is_empty()
    }

    /// Paths touched by the change set, in declaration order.
    pub fn touched_paths(&self) -> Vec<&str> {
        self.files_to_create
            .iter()
            .map(|f| f.path.as_str())
            .chain(self.files_to_modify.iter().map(|f| f.path.as_str()))
            .chain(self.files_to_delete.iter().map(String::as_str))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    #[default]
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum IssueType {
    Pattern,
    Naming,
    Structure,
    Syntax,
    Logic,
    Security,
    Style,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ValidationIssue {
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub issue_type: IssueType,
    #[serde(deserialize_with = "lenient::or_default")]
    pub severity: IssueSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Pattern violations below error severity are eligible for auto-fix.
    pub fn is_fixable(&self) -> bool {
        self.issue_type == IssueType::Pattern && self.severity != IssueSeverity::Error
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub score: f64,
    pub pattern_compliance: f64,
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self {
            is_valid: true,
            issues: Vec::new(),
            score: 1.0,
            pattern_compliance: 0.5,
        }
    }
}

impl ValidationResult {
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }

    pub fn normalized(mut self) -> Self {
        self.score = super::unit(self.score);
        self.pattern_compliance = super::unit(self.pattern_compliance);
        self
    }
}

// ---------------------------------------------------------------------------
// Exemplars and compliance
// ---------------------------------------------------------------------------

/// Patterns the model extracted from one existing file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ExtractedPattern {
    pub similarity: f64,
    pub naming: Vec<String>,
    pub structure: Vec<String>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SimilarImplementation {
    pub path: String,
    pub similarity: f64,
    pub patterns: ExtractedPattern,
    /// Leading excerpt embedded into the generation prompt.
    pub excerpt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
}

impl From<IssueSeverity> for ViolationSeverity {
    fn from(s: IssueSeverity) -> Self {
        match s {
            IssueSeverity::Error => Self::High,
            IssueSeverity::Warning => Self::Medium,
            IssueSeverity::Info => Self::Low,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternViolation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub message: String,
    pub severity: ViolationSeverity,
    pub auto_fixable: bool,
    /// Sent to the final auto-fix pass; the returned change set carries that fix.
    #[serde(default)]
    pub addressed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PatternCompliance {
    /// Always within `[0, 1]`; 0.5 when nothing comparable exists.
    pub overall: f64,
    pub exemplar_similarity: f64,
    pub violations: Vec<PatternViolation>,
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionKind {
    #[default]
    Improvement,
    Performance,
    Security,
    Testing,
    Documentation,
    /// Validation issue still open after the auto-fix loop.
    #[serde(skip_deserializing)]
    UnresolvedIssue,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CodeSuggestion {
    #[serde(deserialize_with = "lenient::or_default")]
    pub kind: SuggestionKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GeneratedCode {
    pub id: String,
    pub specification: Specification,
    pub implementation: GeneratedImplementation,
    /// Last validation run. When the final correction pass is not followed
    /// by another validation, this describes the change set before that
    /// pass; the issues it fixed are flagged `addressed` in
    /// `pattern_compliance.violations`.
    pub validation: ValidationResult,
    pub pattern_compliance: PatternCompliance,
    pub similar_implementations: Vec<SimilarImplementation>,
    pub suggestions: Vec<CodeSuggestion>,
    /// Derived from `validation`, so it shares its pre-fix caveat.
    pub quality_score: f64,
    /// Corrective regenerations performed; never above the configured bound.
    pub correction_passes: usize,
}
