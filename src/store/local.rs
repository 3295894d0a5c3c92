//! Working-tree backed repository store.
//!
//! The repository identifier is a directory path. Listings honour
//! `.gitignore`; content is read through a zero-copy buffer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use tracing::debug;

use super::{Manifest, RepositoryStore};
use crate::error::{ErrorCode, PipelineError};

/// Maximum file size: 100 MB.
const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Files above this size are memory-mapped instead of copied.
const MMAP_THRESHOLD: u64 = 64 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalRepository;

impl LocalRepository {
    pub fn new() -> Self {
        Self
    }
}

/// Zero-copy capable source buffer.
pub enum SourceBuf {
    Mmap(memmap2::Mmap),
    Vec(Vec<u8>),
}

impl std::ops::Deref for SourceBuf {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        match self {
            SourceBuf::Mmap(m) => m,
            SourceBuf::Vec(v) => v,
        }
    }
}

/// Read a file, mapping it when large.
pub fn read_source(path: &Utf8Path) -> Result<SourceBuf> {
    use std::fs::File;
    let file = File::open(path.as_std_path()).map_err(|e| {
        PipelineError::new(ErrorCode::IoError, format!("Cannot open {path}: {e}"))
    })?;
    let len = file.metadata()?.len();

    if len == 0 {
        return Ok(SourceBuf::Vec(Vec::new()));
    }
    if len > MAX_FILE_SIZE {
        anyhow::bail!(PipelineError::invalid_request(format!(
            "File too large ({len} bytes > {MAX_FILE_SIZE} bytes): {path}"
        )));
    }

    if len > MMAP_THRESHOLD {
        // SAFETY: the map is read-only and dropped once its decoded copy is
        // made. The file must not be truncated while mapped: reading pages
        // past the new end raises SIGBUS, which this process does not handle.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(SourceBuf::Mmap(mmap))
    } else {
        use std::io::Read;
        let mut buf = Vec::with_capacity(len as usize);
        std::io::BufReader::new(file).read_to_end(&mut buf)?;
        Ok(SourceBuf::Vec(buf))
    }
}

/// Join a repository-relative path, rejecting anything that escapes the root.
fn resolve(root: &Utf8Path, relative: &str) -> Result<Utf8PathBuf> {
    let rel = Utf8Path::new(relative);
    let escapes = rel
        .components()
        .any(|c| !matches!(c, Utf8Component::Normal(_) | Utf8Component::CurDir));
    if relative.is_empty() || escapes {
        anyhow::bail!(PipelineError::invalid_request(format!(
            "Path must be relative to the repository root: {relative}"
        )));
    }
    Ok(root.join(rel))
}

fn walk(root: &Utf8Path) -> Result<Vec<(String, u64, u64)>> {
    let mut builder = WalkBuilder::new(root);
    builder
        .hidden(true)
        .git_ignore(true)
        .git_global(true)
        .require_git(false);

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let Ok(path) = Utf8PathBuf::from_path_buf(entry.path().to_path_buf()) else {
            continue;
        };
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join("/");
        let (size, mtime) = entry
            .metadata()
            .map(|m| {
                let mtime = m
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                (m.len(), mtime)
            })
            .unwrap_or((0, 0));
        files.push((rel, size, mtime));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn root_of(repository_id: &str) -> Result<Utf8PathBuf> {
    let root = Utf8PathBuf::from(repository_id);
    if !root.is_dir() {
        anyhow::bail!(PipelineError::repository_unavailable(
            repository_id,
            "not a directory"
        ));
    }
    Ok(root)
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("blocking task panicked")?
}

#[async_trait]
impl RepositoryStore for LocalRepository {
    async fn list_files(&self, repository_id: &str) -> Result<Vec<String>> {
        let root = root_of(repository_id)?;
        let id = repository_id.to_string();
        let files = blocking(move || {
            walk(&root).map_err(|e| PipelineError::repository_unavailable(&id, e).into())
        })
        .await?;
        debug!(repository = repository_id, count = files.len(), "listed files");
        Ok(files.into_iter().map(|(path, _, _)| path).collect())
    }

    async fn get_file_content(&self, repository_id: &str, path: &str) -> Result<String> {
        let full = resolve(&root_of(repository_id)?, path)?;
        blocking(move || {
            let buf = read_source(&full)?;
            Ok(String::from_utf8_lossy(&buf).into_owned())
        })
        .await
    }

    async fn get_manifest(&self, repository_id: &str) -> Result<Option<Manifest>> {
        let root = root_of(repository_id)?;
        blocking(move || {
            let package = root.join("package.json");
            if package.is_file() {
                let text = std::fs::read_to_string(&package)?;
                return Manifest::from_package_json(&text).map(Some);
            }
            let cargo = root.join("Cargo.toml");
            if cargo.is_file() {
                let text = std::fs::read_to_string(&cargo)?;
                return Manifest::from_cargo_toml(&text).map(Some);
            }
            Ok(None)
        })
        .await
    }

    /// Mixes size and modification time into the listing hash so edits in
    /// place invalidate cached analyses.
    async fn fingerprint(&self, repository_id: &str, _files: &[String]) -> Result<String> {
        let root = root_of(repository_id)?;
        let id = repository_id.to_string();
        blocking(move || {
            let entries =
                walk(&root).map_err(|e| anyhow::Error::from(PipelineError::repository_unavailable(&id, e)))?;
            let mut hasher = blake3::Hasher::new();
            for (path, size, mtime) in entries {
                hasher.update(path.as_bytes());
                hasher.update(&size.to_le_bytes());
                hasher.update(&mtime.to_le_bytes());
            }
            Ok(hasher.finalize().to_hex().to_string())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src/auth")).unwrap();
        fs::write(dir.path().join("src/auth/login.ts"), "export function login() {}\n").unwrap();
        fs::write(dir.path().join("package.json"), r#"{"dependencies":{"react":"18"}}"#).unwrap();
        fs::write(dir.path().join(".gitignore"), "dist/\n").unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::write(dir.path().join("dist/bundle.js"), "x").unwrap();
        dir
    }

    fn id(dir: &TempDir) -> String {
        dir.path().to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_list_files_respects_gitignore() {
        let dir = fixture();
        let files = LocalRepository::new().list_files(&id(&dir)).await.unwrap();
        assert!(files.contains(&"src/auth/login.ts".to_string()));
        assert!(files.contains(&"package.json".to_string()));
        assert!(!files.iter().any(|f| f.starts_with("dist/")));
    }

    #[tokio::test]
    async fn test_missing_root_is_repository_unavailable() {
        let err = LocalRepository::new()
            .list_files("/definitely/not/a/repo")
            .await
            .unwrap_err();
        assert_eq!(crate::error::code_of(&err), ErrorCode::RepositoryUnavailable);
    }

    #[tokio::test]
    async fn test_content_rejects_traversal() {
        let dir = fixture();
        let repo = LocalRepository::new();
        let text = repo
            .get_file_content(&id(&dir), "src/auth/login.ts")
            .await
            .unwrap();
        assert!(text.contains("login"));
        let err = repo
            .get_file_content(&id(&dir), "../etc/passwd")
            .await
            .unwrap_err();
        assert_eq!(crate::error::code_of(&err), ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn test_manifest_and_fingerprint() {
        let dir = fixture();
        let repo = LocalRepository::new();
        let manifest = repo.get_manifest(&id(&dir)).await.unwrap().unwrap();
        assert!(manifest.dependencies.contains_key("react"));

        let before = repo.fingerprint(&id(&dir), &[]).await.unwrap();
        assert_eq!(before, repo.fingerprint(&id(&dir), &[]).await.unwrap());
        fs::write(dir.path().join("src/auth/extra.ts"), "export const y = 2;\n").unwrap();
        assert_ne!(before, repo.fingerprint(&id(&dir), &[]).await.unwrap());
    }

    #[test]
    fn test_read_source_large_file_is_mapped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, vec![b'a'; 70_000]).unwrap();
        let buf = read_source(Utf8Path::from_path(&path).unwrap()).unwrap();
        assert!(matches!(buf, SourceBuf::Mmap(_)));
        assert_eq!(buf.len(), 70_000);
    }
}
