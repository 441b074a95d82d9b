pub mod local_backend;
pub mod retry;

use serde::{Deserialize, Serialize};
use vger_types::error::{Result, VgerError};

pub use local_backend::LocalBackend;
pub use retry::RetryingBackend;

/// Raw object storage used by a repository.
///
/// Keys are `/`-separated relative paths (`config`, `packs/ab/<hex>`,
/// `index/<hex>`). A missing object is `Ok(None)`, never an error.
pub trait StorageBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete an object. Deleting a missing key succeeds.
    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// List all object keys under `prefix`.
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .list_sized(prefix)?
            .into_iter()
            .map(|(key, _)| key)
            .collect())
    }

    /// List all object keys under `prefix` together with their sizes in bytes.
    fn list_sized(&self, prefix: &str) -> Result<Vec<(String, u64)>>;

    /// Read `length` bytes starting at `offset`. Reads past the end of the
    /// object return the available bytes.
    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>>;
}

/// Retry configuration for storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries).
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

/// Everything needed to construct a backend.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub url: String,
    pub retry: RetryConfig,
}

/// Build a storage backend from a repository URL.
///
/// Accepts a bare filesystem path or a `file://` URL. Backends are wrapped
/// in a [`RetryingBackend`] unless retries are disabled.
pub fn backend_from_config(cfg: &StorageConfig) -> Result<Box<dyn StorageBackend>> {
    let path = local_path_from_url(&cfg.url)?;
    let backend = LocalBackend::new(path)?;
    if cfg.retry.max_retries == 0 {
        return Ok(Box::new(backend));
    }
    Ok(Box::new(RetryingBackend::new(
        Box::new(backend),
        cfg.retry.clone(),
    )))
}

fn local_path_from_url(url: &str) -> Result<&str> {
    if let Some(path) = url.strip_prefix("file://") {
        if path.is_empty() {
            return Err(VgerError::Config("empty path in file:// URL".into()));
        }
        return Ok(path);
    }
    if let Some((scheme, _)) = url.split_once("://") {
        return Err(VgerError::UnsupportedBackend(scheme.to_string()));
    }
    if url.is_empty() {
        return Err(VgerError::Config("repository URL is empty".into()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_from_bare_path_and_file_url() {
        assert_eq!(local_path_from_url("/srv/repo").unwrap(), "/srv/repo");
        assert_eq!(local_path_from_url("file:///srv/repo").unwrap(), "/srv/repo");
        assert_eq!(local_path_from_url("relative/repo").unwrap(), "relative/repo");
    }

    #[test]
    fn remote_schemes_are_unsupported() {
        let err = local_path_from_url("s3://bucket/repo").unwrap_err();
        assert!(matches!(err, VgerError::UnsupportedBackend(ref s) if s == "s3"));
        let cfg = StorageConfig {
            url: "sftp://host/repo".into(),
            retry: RetryConfig::default(),
        };
        assert!(matches!(
            backend_from_config(&cfg),
            Err(VgerError::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn empty_urls_are_rejected() {
        assert!(matches!(local_path_from_url(""), Err(VgerError::Config(_))));
        assert!(matches!(
            local_path_from_url("file://"),
            Err(VgerError::Config(_))
        ));
    }

    #[test]
    fn backend_from_config_roundtrips_objects() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            url: format!("file://{}", dir.path().display()),
            retry: RetryConfig::default(),
        };
        let backend = backend_from_config(&cfg).unwrap();
        backend.put("index/abc", b"data").unwrap();
        assert_eq!(backend.get("index/abc").unwrap().unwrap(), b"data");
        assert_eq!(
            backend.list_sized("index/").unwrap(),
            vec![("index/abc".to_string(), 4)]
        );
        assert_eq!(backend.list("index/").unwrap(), vec!["index/abc".to_string()]);
    }
}
