//! In-memory store and host, used by tests and embedding callers.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{Manifest, PullRequestSpec, RepositoryStore, SourceHost};
use crate::error::{ErrorCode, PipelineError};
use crate::models::bug::PullRequest;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Repositories keyed by identifier, each a map of path to content.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    repos: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(self, repository_id: &str, path: &str, content: &str) -> Self {
        self.insert(repository_id, path, content);
        self
    }

    pub fn insert(&self, repository_id: &str, path: &str, content: &str) {
        lock(&self.repos)
            .entry(repository_id.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
    }

    pub fn remove(&self, repository_id: &str, path: &str) {
        if let Some(files) = lock(&self.repos).get_mut(repository_id) {
            files.remove(path);
        }
    }

    fn with_repo<T>(
        &self,
        repository_id: &str,
        f: impl FnOnce(&BTreeMap<String, String>) -> Result<T>,
    ) -> Result<T> {
        let repos = lock(&self.repos);
        let files = repos.get(repository_id).ok_or_else(|| {
            PipelineError::repository_unavailable(repository_id, "unknown repository")
        })?;
        f(files)
    }
}

#[async_trait]
impl RepositoryStore for InMemoryRepository {
    async fn list_files(&self, repository_id: &str) -> Result<Vec<String>> {
        self.with_repo(repository_id, |files| Ok(files.keys().cloned().collect()))
    }

    async fn get_file_content(&self, repository_id: &str, path: &str) -> Result<String> {
        self.with_repo(repository_id, |files| {
            files.get(path).cloned().ok_or_else(|| {
                PipelineError::new(ErrorCode::IoError, format!("No such file: {path}")).into()
            })
        })
    }

    async fn get_manifest(&self, repository_id: &str) -> Result<Option<Manifest>> {
        self.with_repo(repository_id, |files| {
            if let Some(text) = files.get("package.json") {
                return Manifest::from_package_json(text).map(Some);
            }
            if let Some(text) = files.get("Cargo.toml") {
                return Manifest::from_cargo_toml(text).map(Some);
            }
            Ok(None)
        })
    }

    /// Content-sensitive, so tests can observe invalidation on edits.
    async fn fingerprint(&self, repository_id: &str, _files: &[String]) -> Result<String> {
        self.with_repo(repository_id, |files| {
            let mut hasher = blake3::Hasher::new();
            for (path, content) in files {
                hasher.update(path.as_bytes());
                hasher.update(&[0]);
                hasher.update(content.as_bytes());
                hasher.update(&[0]);
            }
            Ok(hasher.finalize().to_hex().to_string())
        })
    }
}

// ---------------------------------------------------------------------------
// Source host
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub branch: String,
    pub path: String,
    pub content: String,
}

/// Records every host interaction; optionally fails pull-request creation.
#[derive(Debug, Default)]
pub struct InMemorySourceHost {
    branches: Mutex<Vec<String>>,
    writes: Mutex<Vec<WrittenFile>>,
    pull_requests: Mutex<Vec<PullRequestSpec>>,
    fail_pull_requests: bool,
}

impl InMemorySourceHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host whose `open_pull_request` always fails.
    pub fn rejecting_pull_requests() -> Self {
        Self {
            fail_pull_requests: true,
            ..Self::default()
        }
    }

    pub fn branches(&self) -> Vec<String> {
        lock(&self.branches).clone()
    }

    pub fn writes(&self) -> Vec<WrittenFile> {
        lock(&self.writes).clone()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestSpec> {
        lock(&self.pull_requests).clone()
    }
}

#[async_trait]
impl SourceHost for InMemorySourceHost {
    async fn create_branch(&self, _repository_id: &str, name: &str, _base: &str) -> Result<()> {
        lock(&self.branches).push(name.to_string());
        Ok(())
    }

    async fn write_file(
        &self,
        _repository_id: &str,
        branch: &str,
        path: &str,
        content: &str,
        _message: &str,
    ) -> Result<()> {
        lock(&self.writes).push(WrittenFile {
            branch: branch.to_string(),
            path: path.to_string(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn open_pull_request(
        &self,
        repository_id: &str,
        request: &PullRequestSpec,
    ) -> Result<PullRequest> {
        if self.fail_pull_requests {
            anyhow::bail!(PipelineError::new(
                ErrorCode::IntegrationError,
                "pull request rejected by host"
            ));
        }
        let mut prs = lock(&self.pull_requests);
        prs.push(request.clone());
        let number = prs.len() as u64;
        Ok(PullRequest {
            url: format!("memory://{repository_id}/pull/{number}"),
            number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_repository_is_unavailable() {
        let repo = InMemoryRepository::new();
        let err = repo.list_files("nope").await.unwrap_err();
        assert_eq!(crate::error::code_of(&err), ErrorCode::RepositoryUnavailable);
    }

    #[tokio::test]
    async fn test_fingerprint_tracks_content() {
        let repo = InMemoryRepository::new().with_file("r", "a.ts", "one");
        let before = repo.fingerprint("r", &[]).await.unwrap();
        repo.insert("r", "a.ts", "two");
        assert_ne!(before, repo.fingerprint("r", &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_host_numbers_pull_requests() {
        let host = InMemorySourceHost::new();
        let spec = PullRequestSpec {
            title: "t".into(),
            body: "b".into(),
            head: "bugfix/x".into(),
            base: "main".into(),
            draft: true,
        };
        let pr = host.open_pull_request("r", &spec).await.unwrap();
        assert_eq!(pr.number, 1);
        assert_eq!(host.pull_requests().len(), 1);

        let failing = InMemorySourceHost::rejecting_pull_requests();
        assert!(failing.open_pull_request("r", &spec).await.is_err());
    }
}
