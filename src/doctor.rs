use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{CacheBackend, Config};
use crate::language::LangId;

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub version: String,
    pub config_path: PathBuf,
    pub config_found: bool,
    pub model: ModelStatus,
    pub cache: CacheStatus,
    pub languages: Vec<LangId>,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub model: String,
    pub api_key_env: String,
    /// The key variable is set and non-empty. The key itself is never read out.
    pub credentials_present: bool,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    pub writable: bool,
}

/// Environment self-check. Never calls the model.
pub fn run_doctor(config: &Config, config_path: &Path) -> DoctorReport {
    let credentials_present = std::env::var(&config.model.api_key_env)
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);

    let cache = match config.cache.backend {
        CacheBackend::Memory => CacheStatus {
            backend: "memory",
            dir: None,
            writable: true,
        },
        CacheBackend::File => CacheStatus {
            backend: "file",
            writable: dir_writable(&config.cache.dir),
            dir: Some(config.cache.dir.clone()),
        },
    };

    DoctorReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        config_path: config_path.to_path_buf(),
        config_found: config_path.exists(),
        model: ModelStatus {
            model: config.model.model.clone(),
            api_key_env: config.model.api_key_env.clone(),
            credentials_present,
        },
        cache,
        languages: LangId::ALL.to_vec(),
    }
}

fn dir_writable(dir: &Path) -> bool {
    std::fs::create_dir_all(dir).is_ok()
        && std::fs::metadata(dir)
            .map(|m| m.is_dir() && !m.permissions().readonly())
            .unwrap_or(false)
}
