use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::unit;

/// Immutable snapshot of a repository, keyed by `(repository_id, content_hash)`.
///
/// Every map is ordered so two analyses of the same input serialize to the
/// same bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RepositoryAnalysis {
    pub repository_id: String,
    pub content_hash: String,
    pub analyzed_at: u64,
    pub structure: RepoStructure,
    pub patterns: CodePatterns,
    pub dependencies: DependencyMap,
    pub architecture: ArchitectureInfo,
    pub search_index: SearchIndex,
}

impl RepositoryAnalysis {
    /// Snapshot with no files, default patterns and empty maps.
    pub fn empty(repository_id: &str, content_hash: &str) -> Self {
        Self {
            repository_id: repository_id.to_string(),
            content_hash: content_hash.to_string(),
            analyzed_at: super::now_unix(),
            structure: RepoStructure::default(),
            patterns: CodePatterns::default(),
            dependencies: DependencyMap::default(),
            architecture: ArchitectureInfo::default(),
            search_index: SearchIndex::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RepoStructure {
    pub files: Vec<String>,
    pub directories: Vec<String>,
    /// language name -> stats
    pub languages: BTreeMap<String, LanguageStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_language: Option<String>,
    pub entry_points: Vec<String>,
    pub config_files: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LanguageStats {
    pub files: usize,
    /// Lines across the files whose content was fetched.
    pub lines: usize,
}

// ---------------------------------------------------------------------------
// Pattern catalogue
// ---------------------------------------------------------------------------

/// Where a pattern catalogue came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PatternSource {
    Model,
    #[default]
    Default,
}

/// Conventions observed in the repository. Missing fields in a model
/// response are filled from the documented defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct CodePatterns {
    pub naming: NamingConventions,
    pub file_organization: FileOrganization,
    pub imports: Vec<ConventionPattern>,
    pub exports: Vec<ConventionPattern>,
    pub error_handling: Vec<ConventionPattern>,
    pub testing: Vec<ConventionPattern>,
    #[schemars(skip)]
    pub source: PatternSource,
}

impl Default for CodePatterns {
    fn default() -> Self {
        Self {
            naming: NamingConventions::default(),
            file_organization: FileOrganization::default(),
            imports: Vec::new(),
            exports: Vec::new(),
            error_handling: Vec::new(),
            testing: Vec::new(),
            source: PatternSource::Default,
        }
    }
}

impl CodePatterns {
    /// Clamp every confidence/consistency into `[0, 1]`.
    pub fn normalized(mut self) -> Self {
        self.naming.consistency = unit(self.naming.consistency);
        self.file_organization.consistency = unit(self.file_organization.consistency);
        for p in self
            .imports
            .iter_mut()
            .chain(self.exports.iter_mut())
            .chain(self.error_handling.iter_mut())
            .chain(self.testing.iter_mut())
        {
            p.confidence = unit(p.confidence);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NamingConventions {
    pub files: String,
    pub functions: String,
    pub variables: String,
    pub classes: String,
    pub components: String,
    pub constants: String,
    pub consistency: f64,
}

impl Default for NamingConventions {
    fn default() -> Self {
        Self {
            files: "kebab-case".to_string(),
            functions: "camelCase".to_string(),
            variables: "camelCase".to_string(),
            classes: "PascalCase".to_string(),
            components: "PascalCase".to_string(),
            constants: "UPPER_CASE".to_string(),
            consistency: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FileOrganization {
    /// "feature", "layer", "mixed", ...
    #[serde(rename = "type")]
    pub kind: String,
    pub depth: u32,
    pub consistency: f64,
}

impl Default for FileOrganization {
    fn default() -> Self {
        Self {
            kind: "mixed".to_string(),
            depth: 3,
            consistency: 0.5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct ConventionPattern {
    pub pattern: String,
    pub description: String,
    pub example: String,
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Dependencies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DependencyMap {
    /// file -> raw import specifiers
    pub imports: BTreeMap<String, Vec<String>>,
    /// file -> exported names
    pub exports: BTreeMap<String, Vec<String>>,
    /// file -> imported repository files (resolved specifiers only)
    pub internal: BTreeMap<String, Vec<String>>,
    /// symbol -> defining file (first definition wins)
    pub symbols: BTreeMap<String, String>,
    pub external: Vec<ExternalDependency>,
}

impl DependencyMap {
    /// Files that import `path`.
    pub fn importers_of(&self, path: &str) -> Vec<&str> {
        self.internal
            .iter()
            .filter(|(_, targets)| targets.iter().any(|t| t == path))
            .map(|(file, _)| file.as_str())
            .collect()
    }

    /// Repository files imported by `path`.
    pub fn imports_of(&self, path: &str) -> &[String] {
        self.internal.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn external_names(&self) -> impl Iterator<Item = &str> {
        self.external.iter().map(|d| d.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExternalDependency {
    pub name: String,
    pub version: String,
    pub dev: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArchitectureInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    pub build_tool: String,
    pub package_manager: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_framework: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub styling: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_management: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,
}

// ---------------------------------------------------------------------------
// Search index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SearchIndex {
    pub files: BTreeMap<String, FileIndexEntry>,
    /// function name -> files
    pub functions: BTreeMap<String, Vec<String>>,
    pub classes: BTreeMap<String, Vec<String>>,
    pub components: BTreeMap<String, Vec<String>>,
    /// keyword -> files
    pub keywords: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FileIndexEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub functions: Vec<String>,
    pub classes: Vec<String>,
    pub components: Vec<String>,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub keywords: Vec<String>,
}

impl FileIndexEntry {
    /// Every symbol name the file defines.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.functions
            .iter()
            .chain(&self.classes)
            .chain(&self.components)
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_patterns_fill_defaults() {
        let json = r#"{"naming":{"files":"snake_case"},"imports":[{"pattern":"absolute","confidence":1.7}]}"#;
        let patterns: CodePatterns = serde_json::from_str(json).unwrap();
        let patterns = patterns.normalized();
        assert_eq!(patterns.naming.files, "snake_case");
        assert_eq!(patterns.naming.functions, "camelCase");
        assert_eq!(patterns.file_organization.depth, 3);
        assert_eq!(patterns.imports[0].confidence, 1.0);
    }

    #[test]
    fn test_importers_of() {
        let mut deps = DependencyMap::default();
        deps.internal
            .insert("a.ts".into(), vec!["b.ts".into(), "c.ts".into()]);
        deps.internal.insert("d.ts".into(), vec!["b.ts".into()]);
        assert_eq!(deps.importers_of("b.ts"), vec!["a.ts", "d.ts"]);
        assert!(deps.importers_of("a.ts").is_empty());
        assert_eq!(deps.imports_of("a.ts").len(), 2);
        assert!(deps.imports_of("zzz.ts").is_empty());
    }
}
