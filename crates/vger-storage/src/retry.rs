use std::time::Duration;

use vger_types::error::{Result, VgerError};

use crate::{RetryConfig, StorageBackend};

/// Whether an I/O error is transient and worth retrying.
pub fn is_retryable_io(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::TimedOut
            | std::io::ErrorKind::Interrupted
    )
}

fn is_retryable(err: &VgerError) -> bool {
    match err {
        VgerError::Io(e) => is_retryable_io(e),
        _ => false,
    }
}

/// Retry a closure on transient errors with exponential backoff + jitter.
pub fn retry_with_backoff<T>(
    config: &RetryConfig,
    op_name: &str,
    key: &str,
    f: impl Fn() -> Result<T>,
) -> Result<T> {
    let mut delay_ms = config.retry_delay_ms;

    for attempt in 0..config.max_retries {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if is_retryable(&e) => {
                tracing::warn!(
                    "storage {op_name} {key}: transient error (attempt {}/{}), retrying: {e}",
                    attempt + 1,
                    config.max_retries,
                );
            }
            Err(e) => return Err(e),
        }
        let jitter = rand::random::<u64>() % delay_ms.max(1);
        std::thread::sleep(Duration::from_millis(delay_ms + jitter));
        delay_ms = (delay_ms * 2).min(config.retry_max_delay_ms);
    }
    f()
}

/// Wraps another backend and retries transient I/O failures.
pub struct RetryingBackend {
    inner: Box<dyn StorageBackend>,
    config: RetryConfig,
}

impl RetryingBackend {
    pub fn new(inner: Box<dyn StorageBackend>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

impl StorageBackend for RetryingBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        retry_with_backoff(&self.config, "get", key, || self.inner.get(key))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        retry_with_backoff(&self.config, "put", key, || self.inner.put(key, data))
    }

    fn delete(&self, key: &str) -> Result<()> {
        retry_with_backoff(&self.config, "delete", key, || self.inner.delete(key))
    }

    fn exists(&self, key: &str) -> Result<bool> {
        retry_with_backoff(&self.config, "exists", key, || self.inner.exists(key))
    }

    fn list_sized(&self, prefix: &str) -> Result<Vec<(String, u64)>> {
        retry_with_backoff(&self.config, "list", prefix, || {
            self.inner.list_sized(prefix)
        })
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        retry_with_backoff(&self.config, "get_range", key, || {
            self.inner.get_range(key, offset, length)
        })
    }
}
