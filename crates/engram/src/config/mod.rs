use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{EngramError, Result};

/// Main configuration structure for Engram
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Long-term store location
    #[serde(default)]
    pub storage: StorageConfig,
    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Head/tail compaction window
    #[serde(default)]
    pub compressor: CompressorConfig,
    /// Compaction threshold and retrieval defaults
    #[serde(default)]
    pub manager: ManagerConfig,
    /// Deadline and retry policy for embedding/store calls
    #[serde(default)]
    pub provider: ProviderConfig,
}

impl Config {
    /// Load configuration from an explicit path, or search the default locations.
    ///
    /// Without a path, tries `~/.engram/config.toml`, `<config_dir>/engram/config.toml`
    /// and `./config.toml` in that order, falling back to defaults when none exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".engram").join("config.toml")),
            dirs::config_dir().map(|c| c.join("engram").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    /// Parse and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngramError::InvalidConfiguration(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            EngramError::InvalidConfiguration(format!("Failed to parse config: {e}"))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would fail later at use
    pub fn validate(&self) -> Result<()> {
        if self.compressor.keep_head == 0 && self.compressor.keep_tail == 0 {
            return Err(EngramError::InvalidConfiguration(
                "compressor.keep_head and compressor.keep_tail cannot both be zero".to_string(),
            ));
        }
        if self.provider.max_attempts == 0 {
            return Err(EngramError::InvalidConfiguration(
                "provider.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.provider.timeout_secs == 0 {
            return Err(EngramError::InvalidConfiguration(
                "provider.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.storage.table_name.trim().is_empty() {
            return Err(EngramError::InvalidConfiguration(
                "storage.table_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Long-term store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the LanceDB dataset
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Table holding long-term records
    #[serde(default = "default_table_name")]
    pub table_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            table_name: default_table_name(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".engram"))
        .unwrap_or_else(|| PathBuf::from(".engram"))
}

fn default_table_name() -> String {
    "long_term_memory".to_string()
}

/// Embedding model configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// Model identifier, e.g. "intfloat/multilingual-e5-small"
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Where downloaded model files are cached (fastembed default when unset)
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: None,
        }
    }
}

fn default_embedding_model() -> String {
    "intfloat/multilingual-e5-small".to_string()
}

/// Compaction window configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CompressorConfig {
    /// Leading non-blank lines kept verbatim
    #[serde(default = "default_keep_head")]
    pub keep_head: usize,
    /// Trailing non-blank lines kept verbatim
    #[serde(default = "default_keep_tail")]
    pub keep_tail: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            keep_head: default_keep_head(),
            keep_tail: default_keep_tail(),
        }
    }
}

fn default_keep_head() -> usize {
    6
}

fn default_keep_tail() -> usize {
    6
}

/// Manager defaults used by `compress_if_due` and `recall`
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerConfig {
    /// Rendered buffer length (in characters) at which compaction happens
    #[serde(default = "default_threshold_chars")]
    pub threshold_chars: usize,
    /// Number of long-term records returned by `recall`
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            threshold_chars: default_threshold_chars(),
            retrieval_k: default_retrieval_k(),
        }
    }
}

fn default_threshold_chars() -> usize {
    2000
}

fn default_retrieval_k() -> usize {
    5
}

/// Deadline and retry policy applied at the store boundary
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Per-attempt deadline in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Total attempts per call, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after every failed attempt
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.storage.table_name, "long_term_memory");
        assert!(config.storage.data_dir.ends_with(".engram"));
        assert_eq!(config.embedding.model, "intfloat/multilingual-e5-small");
        assert!(config.embedding.cache_dir.is_none());
        assert_eq!(config.compressor.keep_head, 6);
        assert_eq!(config.compressor.keep_tail, 6);
        assert_eq!(config.manager.threshold_chars, 2000);
        assert_eq!(config.manager.retrieval_k, 5);
        assert_eq!(config.provider.timeout_secs, 30);
        assert_eq!(config.provider.max_attempts, 3);
        assert_eq!(config.provider.initial_backoff_ms, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_str = r#"
[storage]
data_dir = "/tmp/engram"
table_name = "dialogs"

[embedding]
model = "sentence-transformers/all-mpnet-base-v2"
cache_dir = "/tmp/models"

[compressor]
keep_head = 4
keep_tail = 2

[manager]
threshold_chars = 500
retrieval_k = 3

[provider]
timeout_secs = 5
max_attempts = 4
initial_backoff_ms = 50
"#;

        let config = Config::from_toml(toml_str).expect("Failed to parse TOML");

        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/engram"));
        assert_eq!(config.storage.table_name, "dialogs");
        assert_eq!(
            config.embedding.model,
            "sentence-transformers/all-mpnet-base-v2"
        );
        assert_eq!(config.embedding.cache_dir, Some(PathBuf::from("/tmp/models")));
        assert_eq!(config.compressor.keep_head, 4);
        assert_eq!(config.compressor.keep_tail, 2);
        assert_eq!(config.manager.threshold_chars, 500);
        assert_eq!(config.manager.retrieval_k, 3);
        assert_eq!(config.provider.timeout_secs, 5);
        assert_eq!(config.provider.max_attempts, 4);
        assert_eq!(config.provider.initial_backoff_ms, 50);
    }

    #[test]
    fn test_toml_partial_deserialization() {
        let toml_str = r#"
[manager]
threshold_chars = 1200
"#;

        let config = Config::from_toml(toml_str).expect("Failed to parse partial TOML");

        assert_eq!(config.manager.threshold_chars, 1200);
        assert_eq!(config.manager.retrieval_k, 5);
        assert_eq!(config.compressor.keep_head, 6);
        assert_eq!(config.storage.table_name, "long_term_memory");
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let toml_str = r#"
[compressor]
keep_head = 0
keep_tail = 0
"#;

        let err = Config::from_toml(toml_str).unwrap_err();
        assert!(matches!(err, EngramError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_one_sided_window_is_accepted() {
        let toml_str = r#"
[compressor]
keep_head = 0
keep_tail = 3
"#;

        let config = Config::from_toml(toml_str).expect("head=0 with tail>0 is valid");
        assert_eq!(config.compressor.keep_head, 0);
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        let toml_str = r#"
[provider]
max_attempts = 0
"#;

        assert!(matches!(
            Config::from_toml(toml_str),
            Err(EngramError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_malformed_toml_is_invalid_configuration() {
        let err = Config::from_toml("[manager\nthreshold_chars = ").unwrap_err();
        assert!(matches!(err, EngramError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engram.toml");
        std::fs::write(&path, "[manager]\nretrieval_k = 9\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.manager.retrieval_k, 9);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        assert!(matches!(
            Config::load(Some(&path)),
            Err(EngramError::InvalidConfiguration(_))
        ));
    }
}
