use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ConfigurationError,
    UpstreamModelError,
    ValidationFailure,
    IntegrationError,
    RepositoryUnavailable,
    InvalidTransition,
    InvalidRequest,
    CacheError,
    IoError,
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigurationError => write!(f, "CONFIGURATION_ERROR"),
            Self::UpstreamModelError => write!(f, "UPSTREAM_MODEL_ERROR"),
            Self::ValidationFailure => write!(f, "VALIDATION_FAILURE"),
            Self::IntegrationError => write!(f, "INTEGRATION_ERROR"),
            Self::RepositoryUnavailable => write!(f, "REPOSITORY_UNAVAILABLE"),
            Self::InvalidTransition => write!(f, "INVALID_TRANSITION"),
            Self::InvalidRequest => write!(f, "INVALID_REQUEST"),
            Self::CacheError => write!(f, "CACHE_ERROR"),
            Self::IoError => write!(f, "IO_ERROR"),
        }
    }
}

/// Pipeline step an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Listing,
    PatternExtraction,
    DependencyScan,
    Ranking,
    SemanticSearch,
    RootCause,
    FixSuggestion,
    Impact,
    FixApplication,
    SimilarCode,
    Generation,
    Validation,
    AutoFix,
    Suggestions,
    TestPatterns,
    TestGeneration,
    Orchestration,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Listing => "listing",
            Self::PatternExtraction => "pattern-extraction",
            Self::DependencyScan => "dependency-scan",
            Self::Ranking => "ranking",
            Self::SemanticSearch => "semantic-search",
            Self::RootCause => "root-cause",
            Self::FixSuggestion => "fix-suggestion",
            Self::Impact => "impact",
            Self::FixApplication => "fix-application",
            Self::SimilarCode => "similar-code",
            Self::Generation => "generation",
            Self::Validation => "validation",
            Self::AutoFix => "auto-fix",
            Self::Suggestions => "suggestions",
            Self::TestPatterns => "test-patterns",
            Self::TestGeneration => "test-generation",
            Self::Orchestration => "orchestration",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Serialize)]
pub struct PipelineError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        match (&self.phase, &self.repository) {
            (Some(phase), Some(repo)) => write!(f, " (phase: {phase}, repository: {repo})"),
            (Some(phase), None) => write!(f, " (phase: {phase})"),
            (None, Some(repo)) => write!(f, " (repository: {repo})"),
            (None, None) => Ok(()),
        }
    }
}

impl std::error::Error for PipelineError {}

impl PipelineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            phase: None,
            repository: None,
        }
    }

    pub fn in_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn for_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigurationError, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UpstreamModelError, message)
    }

    pub fn repository_unavailable(repository: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::RepositoryUnavailable,
            format!("Repository file listing unavailable: {reason}"),
        )
        .in_phase(Phase::Listing)
        .for_repository(repository)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }
}

/// Attach `repository` to a pipeline error that does not name one yet.
pub fn with_repository(e: anyhow::Error, repository: &str) -> anyhow::Error {
    match e.downcast::<PipelineError>() {
        Ok(pe) if pe.repository.is_none() => pe.for_repository(repository).into(),
        Ok(pe) => pe.into(),
        Err(e) => e,
    }
}

/// Recover the error code from an `anyhow` chain, defaulting to `IO_ERROR`.
pub fn code_of(e: &anyhow::Error) -> ErrorCode {
    e.downcast_ref::<PipelineError>()
        .map(|pe| pe.code)
        .unwrap_or(ErrorCode::IoError)
}

/// The `{"error": {...}}` object written by every outer surface.
pub fn envelope(e: &anyhow::Error) -> serde_json::Value {
    match e.downcast_ref::<PipelineError>() {
        Some(pe) => serde_json::json!({ "error": pe }),
        None => serde_json::json!({
            "error": { "code": ErrorCode::IoError.to_string(), "message": format!("{e:#}") }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let e = PipelineError::upstream("model returned 503")
            .in_phase(Phase::Generation)
            .for_repository("/repo");
        assert_eq!(
            e.to_string(),
            "[UPSTREAM_MODEL_ERROR] model returned 503 (phase: generation, repository: /repo)"
        );
    }

    #[test]
    fn test_code_of_downcasts() {
        let e: anyhow::Error = PipelineError::configuration("missing key").into();
        assert_eq!(code_of(&e), ErrorCode::ConfigurationError);

        let other = anyhow::anyhow!("plain");
        assert_eq!(code_of(&other), ErrorCode::IoError);
    }

    #[test]
    fn test_with_repository_keeps_existing() {
        let e: anyhow::Error = PipelineError::upstream("x").in_phase(Phase::Generation).into();
        let e = with_repository(e, "r1");
        let pe = e.downcast_ref::<PipelineError>().unwrap();
        assert_eq!(pe.repository.as_deref(), Some("r1"));
        assert_eq!(pe.phase, Some(Phase::Generation));

        let again = with_repository(e, "r2");
        let pe = again.downcast_ref::<PipelineError>().unwrap();
        assert_eq!(pe.repository.as_deref(), Some("r1"));
    }

    #[test]
    fn test_repository_unavailable_sets_phase() {
        let e = PipelineError::repository_unavailable("r1", "no such dir");
        assert_eq!(e.phase, Some(Phase::Listing));
        assert_eq!(e.repository.as_deref(), Some("r1"));
    }

    #[test]
    fn test_envelope_shape() {
        let e: anyhow::Error = PipelineError::configuration("missing key").into();
        let v = envelope(&e);
        assert_eq!(v["error"]["code"], "CONFIGURATION_ERROR");
        assert_eq!(v["error"]["message"], "missing key");
        assert!(v["error"].get("phase").is_none());

        let plain = envelope(&anyhow::anyhow!("disk full"));
        assert_eq!(plain["error"]["code"], "IO_ERROR");
    }
}
