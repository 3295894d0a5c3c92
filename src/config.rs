//! Configuration loading and generation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Enable debug logging to file
    pub debug: bool,

    /// Path to log directory
    pub log_path: PathBuf,

    pub model: ModelConfig,
    pub cache: CacheConfig,
    pub analysis: AnalysisConfig,
    pub generation: GenerationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            debug: false,
            log_path: default_log_path(),
            model: ModelConfig::default(),
            cache: CacheConfig::default(),
            analysis: AnalysisConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

/// Model backend settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Environment variable that holds the API key
    pub api_key_env: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    /// Hard ceiling for a streamed generation
    pub stream_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            temperature: 0.2,
            max_tokens: 8192,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            request_timeout_secs: 120,
            stream_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    pub dir: PathBuf,
    pub ttl_hours: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            dir: default_cache_dir(),
            ttl_hours: 24,
            capacity: 64,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.ttl_hours * 60 * 60)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Files sampled for pattern extraction
    pub sample_limit: usize,
    /// Files scanned for the dependency map and search index
    pub max_indexed_files: usize,
    pub fetch_concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_limit: 10,
            max_indexed_files: 400,
            fetch_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_correction_passes: usize,
    pub similarity_threshold: f64,
    pub quality_threshold: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_correction_passes: 1,
            similarity_threshold: 0.4,
            quality_threshold: 0.8,
        }
    }
}

/// Default log path: ~/.config/repo-sight/logs
fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("repo-sight")
        .join("logs")
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("repo-sight")
}

/// Configuration service.
pub struct ConfigService;

impl ConfigService {
    /// Get the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("repo-sight")
            .join("config.toml")
    }

    /// Load configuration from file.
    ///
    /// If `path` is `None`, uses the default path.
    /// If the file doesn't exist, returns default configuration.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let path = path.map(PathBuf::from).unwrap_or_else(Self::default_path);
        let config_dir = path.parent();

        if !path.exists() {
            let mut config = Config::default();
            if let Some(dir) = config_dir {
                config.log_path = dir.join("logs");
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        // If log_path was not explicitly set, use config file's directory/logs
        if config.log_path == default_log_path()
            && let Some(dir) = config_dir
        {
            config.log_path = dir.join("logs");
        }

        Ok(config)
    }

    /// Generate default configuration file at the default path.
    pub fn generate_default() -> Result<()> {
        Self::generate_at(&Self::default_path())
    }

    /// Generate default configuration file at the specified path.
    pub fn generate_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = Self::default_config_content();
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Generate default configuration content with comments.
    fn default_config_content() -> String {
        r#"# repo-sight configuration file

# Enable debug logging to file (default: false)
debug = false

# Path to log directory (default: ~/.config/repo-sight/logs)
# log_path = "~/.config/repo-sight/logs"

[model]
model = "claude-sonnet-4-20250514"
temperature = 0.2
max_tokens = 8192
# Environment variable holding the API key
api_key_env = "ANTHROPIC_API_KEY"
# base_url = "https://api.anthropic.com"
request_timeout_secs = 120
# Hard ceiling for streamed generation
stream_timeout_secs = 120

[cache]
# "file" or "memory"
backend = "file"
# dir = "~/.cache/repo-sight"
ttl_hours = 24
capacity = 64

[analysis]
sample_limit = 10
max_indexed_files = 400
fetch_concurrency = 8

[generation]
max_correction_passes = 1
similarity_threshold = 0.4
quality_threshold = 0.8
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_path_ends_with_config_toml() {
        let path = ConfigService::default_path();
        assert!(path.ends_with("repo-sight/config.toml"));
    }

    #[test]
    fn test_generate_at_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("nested").join("dir").join("config.toml");

        ConfigService::generate_at(&config_path).unwrap();

        assert!(config_path.exists());
        let content = fs::read_to_string(&config_path).unwrap();
        assert!(content.contains("debug = false"));
        assert!(content.contains("max_correction_passes = 1"));
    }

    #[test]
    fn test_generated_content_parses_to_defaults() {
        let config: Config = toml::from_str(&ConfigService::default_config_content()).unwrap();
        assert_eq!(config.model.api_key_env, "ANTHROPIC_API_KEY");
        assert_eq!(config.cache.backend, CacheBackend::File);
        assert_eq!(config.cache.ttl_hours, 24);
        assert_eq!(config.analysis.sample_limit, 10);
        assert_eq!(config.generation.max_correction_passes, 1);
    }

    #[test]
    fn test_load_returns_defaults_when_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("nonexistent.toml");

        let config = ConfigService::load(Some(&config_path)).unwrap();

        assert!(!config_path.exists());
        assert!(!config.debug);
        assert_eq!(config.log_path, dir.path().join("logs"));
    }

    #[test]
    fn test_load_partial_tables() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "debug = true\n[cache]\nbackend = \"memory\"\n[generation]\nquality_threshold = 0.7\n",
        )
        .unwrap();

        let config = ConfigService::load(Some(&config_path)).unwrap();
        assert!(config.debug);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.capacity, 64);
        assert!((config.generation.quality_threshold - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.generation.max_correction_passes, 1);
    }

    #[test]
    fn test_load_invalid_toml_returns_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let config_path = dir.path().join("bad.toml");

        fs::write(&config_path, "not valid [[[").unwrap();

        assert!(ConfigService::load(Some(&config_path)).is_err());
    }

    #[test]
    fn test_ttl_in_seconds() {
        let cache = CacheConfig::default();
        assert_eq!(cache.ttl().as_secs(), 86_400);
    }
}
