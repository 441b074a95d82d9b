use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use vger_crypto::key::MasterKey;
use vger_types::error::{Result, VgerError};

use crate::config::ReindexConfig;
use crate::repo::lock;
use crate::repo::Repository;

/// Open a repository from config, loading the key file when one is set.
pub fn open_repo(config: &ReindexConfig) -> Result<Repository> {
    let backend = vger_storage::backend_from_config(&config.storage_config())?;
    let key = config
        .encryption
        .key_file
        .as_deref()
        .map(|path| MasterKey::load(Path::new(path)))
        .transpose()?;
    Repository::open(backend, key.as_ref())
}

/// Return `Err(VgerError::Interrupted)` if the shutdown flag is set.
pub fn check_interrupted(shutdown: Option<&AtomicBool>) -> Result<()> {
    if is_interrupted(shutdown) {
        return Err(VgerError::Interrupted);
    }
    Ok(())
}

pub(crate) fn is_interrupted(shutdown: Option<&AtomicBool>) -> bool {
    shutdown.is_some_and(|f| f.load(Ordering::Relaxed))
}

/// Execute a repository mutation while holding an advisory lock.
///
/// Release is always attempted. A failed release only logs a warning; the
/// action's own outcome is returned unchanged, since its writes are already
/// in the repository.
pub fn with_repo_lock<T, E>(
    repo: &Repository,
    action: impl FnOnce(&Repository) -> std::result::Result<T, E>,
) -> std::result::Result<T, E>
where
    E: From<VgerError>,
{
    let guard = lock::acquire_lock(repo.storage.as_ref())?;
    let result = action(repo);

    if let Err(release_err) = lock::release_lock(repo.storage.as_ref(), guard) {
        tracing::warn!("failed to release repository lock: {release_err}");
    }
    result
}
