//! Multi-signal relevance ranking.
//!
//! Four independent signals add fixed weights per file: path match,
//! symbol match, semantic search and one-hop dependency propagation. Scores
//! are summed, never max'd. Equal scores are ordered by path.

use schemars::JsonSchema;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{index, prompts, scan};
use crate::backend::{ModelBackend, request};
use crate::error::Phase;
use crate::models::analysis::RepositoryAnalysis;
use crate::models::relevance::{MatchReason, RelevantFile, SemanticHit};

/// Files summarized in the semantic search prompt.
const SEMANTIC_INDEX_FILES: usize = 300;

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(default)]
struct SemanticAnswer {
    files: Vec<SemanticHit>,
}

#[derive(Debug, Default)]
struct Candidate {
    score: u32,
    reasons: Vec<MatchReason>,
}

impl Candidate {
    fn credit(&mut self, reason: MatchReason) {
        if !self.reasons.contains(&reason) {
            self.score += reason.weight();
            self.reasons.push(reason);
        }
    }
}

pub struct RelevanceRanker {
    backend: Arc<dyn ModelBackend>,
}

impl RelevanceRanker {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    /// Rank files of `analysis` against `query`. Never fails: a semantic
    /// search failure only removes that signal.
    pub async fn find_relevant_files(
        &self,
        query: &str,
        analysis: &RepositoryAnalysis,
        limit: usize,
    ) -> Vec<RelevantFile> {
        debug!(query, limit, "find_relevant_files called");
        if limit == 0 {
            return Vec::new();
        }
        let tokens = scan::tokenize(query);
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();

        path_signal(&tokens, analysis, &mut candidates);
        symbol_signal(&tokens, analysis, &mut candidates);
        for path in self.semantic_signal(query, analysis).await {
            candidates
                .entry(path)
                .or_default()
                .credit(MatchReason::SemanticMatch);
        }
        dependency_signal(analysis, &mut candidates);

        let ranked = rank(candidates, limit);
        debug!(results = ranked.len(), "find_relevant_files completed");
        ranked
    }

    /// Paths named by the model that exist in the index, deduplicated.
    async fn semantic_signal(&self, query: &str, analysis: &RepositoryAnalysis) -> Vec<String> {
        let index = &analysis.search_index;
        if index.files.is_empty() || query.trim().is_empty() {
            return Vec::new();
        }
        let prompt = prompts::semantic_search(query, &index::summary(index, SEMANTIC_INDEX_FILES));
        match request::<SemanticAnswer>(self.backend.as_ref(), &prompt, Phase::SemanticSearch).await {
            Ok(answer) => {
                let mut paths: Vec<String> = answer
                    .files
                    .into_iter()
                    .map(|hit| hit.path)
                    .filter(|p| index.files.contains_key(p))
                    .collect();
                paths.sort();
                paths.dedup();
                paths
            }
            Err(e) => {
                warn!(phase = %Phase::SemanticSearch, error = %e, "semantic search failed, falling back to lexical signals");
                Vec::new()
            }
        }
    }
}

fn singular(token: &str) -> Option<&str> {
    token.strip_suffix('s').filter(|s| s.len() >= 3)
}

fn path_signal(
    tokens: &[String],
    analysis: &RepositoryAnalysis,
    candidates: &mut BTreeMap<String, Candidate>,
) {
    for path in &analysis.structure.files {
        let lower = path.to_lowercase();
        let hit = tokens.iter().any(|t| {
            lower.contains(t.as_str()) || singular(t).is_some_and(|s| lower.contains(s))
        });
        if hit {
            candidates
                .entry(path.clone())
                .or_default()
                .credit(MatchReason::PathMatch);
        }
    }
}

fn symbol_signal(
    tokens: &[String],
    analysis: &RepositoryAnalysis,
    candidates: &mut BTreeMap<String, Candidate>,
) {
    for (path, entry) in &analysis.search_index.files {
        let hit = entry.symbols().any(|symbol| {
            let lower = symbol.to_lowercase();
            tokens.iter().any(|t| lower.contains(t.as_str()))
        });
        if hit {
            candidates
                .entry(path.clone())
                .or_default()
                .credit(MatchReason::SymbolMatch);
        }
    }
}

/// Credit files adjacent in the import graph to a higher-scoring candidate.
/// Scores are read from a snapshot so propagation does not chain.
fn dependency_signal(analysis: &RepositoryAnalysis, candidates: &mut BTreeMap<String, Candidate>) {
    let snapshot: BTreeMap<String, u32> = candidates
        .iter()
        .map(|(path, c)| (path.clone(), c.score))
        .collect();
    let deps = &analysis.dependencies;

    let mut credited: Vec<String> = Vec::new();
    for (path, &score) in &snapshot {
        let neighbours = deps
            .imports_of(path)
            .iter()
            .map(String::as_str)
            .chain(deps.importers_of(path));
        for neighbour in neighbours {
            let own = snapshot.get(neighbour).copied().unwrap_or(0);
            if own < score && !credited.iter().any(|c| c == neighbour) {
                credited.push(neighbour.to_string());
            }
        }
    }
    for path in credited {
        candidates
            .entry(path)
            .or_default()
            .credit(MatchReason::DependencyMatch);
    }
}

fn rank(candidates: BTreeMap<String, Candidate>, limit: usize) -> Vec<RelevantFile> {
    let mut ranked: Vec<RelevantFile> = candidates
        .into_iter()
        .filter(|(_, c)| c.score > 0)
        .map(|(path, c)| RelevantFile {
            confidence: RelevantFile::confidence_for(c.score),
            path,
            score: c.score,
            reasons: c.reasons,
        })
        .collect();
    // BTreeMap iteration is path-ordered and the sort is stable, so equal
    // scores stay in lexical path order.
    ranked.sort_by(|a, b| b.score.cmp(&a.score));
    ranked.truncate(limit);
    ranked
}
