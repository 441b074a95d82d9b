use std::path::Path;

use serde::{Deserialize, Serialize};

use vger_storage::{RetryConfig, StorageConfig};
use vger_types::error::{Result, VgerError};

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "VGER_REINDEX_CONFIG";

/// Default number of concurrent pack scans.
pub const DEFAULT_WORKERS: usize = 8;
/// Default maximum number of blob records in one index shard.
pub const DEFAULT_MAX_SHARD_BLOBS: usize = 50_000;
/// Default serialized-size budget of one index shard (16 MiB).
pub const DEFAULT_MAX_SHARD_BYTES: usize = 16 * 1024 * 1024;

const MAX_WORKERS: usize = 256;
const MIN_SHARD_BYTES: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexConfig {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub rebuild: RebuildConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Filesystem path or `file://` URL of the repository.
    pub url: String,
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncryptionConfig {
    /// Path to a file holding the hex-encoded 32-byte repository key.
    #[serde(default)]
    pub key_file: Option<String>,
}

/// Tuning for the index rebuild. Passed explicitly to the rebuild; there is
/// no global state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildConfig {
    /// Concurrent pack scans (1-256).
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum blob records per index shard.
    #[serde(default = "default_max_shard_blobs")]
    pub max_shard_blobs: usize,
    /// Maximum serialized size of one index shard in bytes.
    #[serde(default = "default_max_shard_bytes")]
    pub max_shard_bytes: usize,
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_max_shard_blobs() -> usize {
    DEFAULT_MAX_SHARD_BLOBS
}

fn default_max_shard_bytes() -> usize {
    DEFAULT_MAX_SHARD_BYTES
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_shard_blobs: default_max_shard_blobs(),
            max_shard_bytes: default_max_shard_bytes(),
        }
    }
}

impl RebuildConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(VgerError::Config(format!(
                "rebuild.workers must be in [1, {MAX_WORKERS}], got {}",
                self.workers
            )));
        }
        if self.max_shard_blobs == 0 {
            return Err(VgerError::Config(
                "rebuild.max_shard_blobs must be at least 1".into(),
            ));
        }
        if self.max_shard_bytes < MIN_SHARD_BYTES {
            return Err(VgerError::Config(format!(
                "rebuild.max_shard_bytes must be at least {MIN_SHARD_BYTES}, got {}",
                self.max_shard_bytes
            )));
        }
        Ok(())
    }
}

impl ReindexConfig {
    /// Config for a repository URL with every other setting at its default.
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            repository: RepositoryConfig {
                url: url.into(),
                retry: RetryConfig::default(),
            },
            encryption: EncryptionConfig::default(),
            rebuild: RebuildConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.repository.url.trim().is_empty() {
            return Err(VgerError::Config("repository.url must not be empty".into()));
        }
        self.rebuild.validate()
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            url: self.repository.url.clone(),
            retry: self.repository.retry.clone(),
        }
    }
}

/// Load and validate a YAML config file.
pub fn load_config(path: &Path) -> Result<ReindexConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| VgerError::Config(format!("cannot read '{}': {e}", path.display())))?;
    let config: ReindexConfig = serde_yaml::from_str(&contents)
        .map_err(|e| VgerError::Config(format!("invalid config '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}
