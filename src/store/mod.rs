//! Repository and source-host seams.
//!
//! The pipeline never fetches raw bytes itself: it asks a
//! [`RepositoryStore`] for listings and content, and hands change sets to a
//! [`SourceHost`] when a pull request is requested.

pub mod local;
pub mod memory;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::bug::PullRequest;

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Flat listing of repository-relative paths using `/` separators.
    async fn list_files(&self, repository_id: &str) -> Result<Vec<String>>;

    async fn get_file_content(&self, repository_id: &str, path: &str) -> Result<String>;

    /// Parsed dependency manifest, if the repository has one.
    async fn get_manifest(&self, repository_id: &str) -> Result<Option<Manifest>>;

    /// Snapshot fingerprint used to invalidate cached analyses.
    ///
    /// Defaults to a BLAKE3 hash of the sorted listing; stores that can see
    /// sizes or revisions should mix them in.
    async fn fingerprint(&self, _repository_id: &str, files: &[String]) -> Result<String> {
        Ok(listing_hash(files))
    }
}

/// BLAKE3 over the sorted, newline-joined listing.
pub fn listing_hash(files: &[String]) -> String {
    let mut sorted: Vec<&str> = files.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    let mut hasher = blake3::Hasher::new();
    for path in sorted {
        hasher.update(path.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Npm,
    Cargo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub kind: ManifestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// name -> version requirement
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
}

impl Manifest {
    pub fn from_package_json(text: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct PackageJson {
            name: Option<String>,
            #[serde(default)]
            dependencies: BTreeMap<String, serde_json::Value>,
            #[serde(default, rename = "devDependencies")]
            dev_dependencies: BTreeMap<String, serde_json::Value>,
        }

        let pkg: PackageJson = serde_json::from_str(text).context("Invalid package.json")?;
        let versions = |deps: BTreeMap<String, serde_json::Value>| {
            deps.into_iter()
                .map(|(name, v)| (name, v.as_str().unwrap_or("*").to_string()))
                .collect()
        };
        Ok(Self {
            kind: ManifestKind::Npm,
            name: pkg.name,
            dependencies: versions(pkg.dependencies),
            dev_dependencies: versions(pkg.dev_dependencies),
        })
    }

    pub fn from_cargo_toml(text: &str) -> Result<Self> {
        let doc: toml::Table = toml::from_str(text).context("Invalid Cargo.toml")?;
        let name = doc
            .get("package")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .map(str::to_string);
        let table = |key: &str| -> BTreeMap<String, String> {
            doc.get(key)
                .and_then(|v| v.as_table())
                .map(|t| {
                    t.iter()
                        .map(|(name, spec)| {
                            let version = match spec {
                                toml::Value::String(s) => s.clone(),
                                toml::Value::Table(t) => t
                                    .get("version")
                                    .and_then(|v| v.as_str())
                                    .unwrap_or("*")
                                    .to_string(),
                                _ => "*".to_string(),
                            };
                            (name.clone(), version)
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        Ok(Self {
            kind: ManifestKind::Cargo,
            name,
            dependencies: table("dependencies"),
            dev_dependencies: table("dev-dependencies"),
        })
    }

    /// Every dependency name, runtime first.
    pub fn all_names(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .keys()
            .chain(self.dev_dependencies.keys())
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Source host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSpec {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
    pub draft: bool,
}

/// Branch, write and open pull requests on a source-control host.
#[async_trait]
pub trait SourceHost: Send + Sync {
    async fn create_branch(&self, repository_id: &str, name: &str, base: &str) -> Result<()>;

    async fn write_file(
        &self,
        repository_id: &str,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<()>;

    async fn open_pull_request(
        &self,
        repository_id: &str,
        request: &PullRequestSpec,
    ) -> Result<PullRequest>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_json_manifest() {
        let m = Manifest::from_package_json(
            r#"{"name":"web","dependencies":{"react":"^18.2.0"},"devDependencies":{"jest":"^29.0.0","weird":{"x":1}}}"#,
        )
        .unwrap();
        assert_eq!(m.kind, ManifestKind::Npm);
        assert_eq!(m.dependencies["react"], "^18.2.0");
        assert_eq!(m.dev_dependencies["weird"], "*");
        assert_eq!(m.all_names().collect::<Vec<_>>(), vec!["react", "jest", "weird"]);
    }

    #[test]
    fn test_cargo_manifest() {
        let m = Manifest::from_cargo_toml(
            "[package]\nname = \"svc\"\n[dependencies]\naxum = \"0.7\"\ntokio = { version = \"1\", features = [\"full\"] }\n[dev-dependencies]\ntempfile = \"3\"\n",
        )
        .unwrap();
        assert_eq!(m.name.as_deref(), Some("svc"));
        assert_eq!(m.dependencies["tokio"], "1");
        assert_eq!(m.dev_dependencies["tempfile"], "3");
    }

    #[test]
    fn test_listing_hash_ignores_order() {
        let a = listing_hash(&["b.ts".to_string(), "a.ts".to_string()]);
        let b = listing_hash(&["a.ts".to_string(), "b.ts".to_string()]);
        assert_eq!(a, b);
        assert_ne!(a, listing_hash(&["a.ts".to_string()]));
    }
}
