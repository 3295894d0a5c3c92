use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Signal that contributed to a file's relevance score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    PathMatch,
    SymbolMatch,
    SemanticMatch,
    DependencyMatch,
}

impl MatchReason {
    /// Fixed score contributed by one occurrence of this signal.
    pub const fn weight(self) -> u32 {
        match self {
            Self::PathMatch => 40,
            Self::SymbolMatch => 60,
            Self::SemanticMatch => 80,
            Self::DependencyMatch => 50,
        }
    }
}

/// A ranked candidate file for one query. Never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelevantFile {
    pub path: String,
    /// Additive sum of signal weights.
    pub score: u32,
    pub reasons: Vec<MatchReason>,
    /// `min(score / 100, 1)`
    pub confidence: f64,
}

impl RelevantFile {
    pub fn confidence_for(score: u32) -> f64 {
        (f64::from(score) / 100.0).min(1.0)
    }
}

/// One entry of the semantic search answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SemanticHit {
    pub path: String,
    pub relevance: f64,
    pub reason: String,
}
