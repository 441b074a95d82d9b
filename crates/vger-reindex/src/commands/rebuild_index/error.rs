use thiserror::Error;

use vger_types::error::VgerError;
use vger_types::index_id::IndexId;

use super::RebuildStage;

/// Fatal rebuild failures. Every variant except `Repo` names the stage that
/// raised it; nothing has been deleted when one of these is returned.
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("listing packs failed: {0}")]
    BackendList(#[source] VgerError),

    #[error("listing existing index files failed: {0}")]
    StaleCollection(#[source] VgerError),

    #[error("encoding index shard failed: {0}")]
    Build(#[source] VgerError),

    #[error(
        "saving index shard {shard}/{total} failed after {} written: {source}",
        .written.len()
    )]
    Persist {
        /// 1-based number of the shard that failed.
        shard: usize,
        total: usize,
        /// Shards stored before the failure; they stay in the repository.
        written: Vec<IndexId>,
        #[source]
        source: VgerError,
    },

    #[error("rebuild interrupted while {stage}")]
    Interrupted {
        stage: RebuildStage,
        /// Shards stored before the interrupt; only set while persisting.
        written: Vec<IndexId>,
    },

    #[error(transparent)]
    Repo(#[from] VgerError),
}

impl RebuildError {
    /// Stage the error was raised in; `None` for failures before the first
    /// stage (opening the repository, taking the lock).
    pub fn stage(&self) -> Option<RebuildStage> {
        match self {
            RebuildError::BackendList(_) => Some(RebuildStage::Enumerating),
            RebuildError::StaleCollection(_) => Some(RebuildStage::CollectingStale),
            RebuildError::Build(_) => Some(RebuildStage::Building),
            RebuildError::Persist { .. } => Some(RebuildStage::Persisting),
            RebuildError::Interrupted { stage, .. } => Some(*stage),
            RebuildError::Repo(_) => None,
        }
    }

    /// Index objects written before the run failed or was interrupted.
    pub fn orphaned_indexes(&self) -> &[IndexId] {
        match self {
            RebuildError::Persist { written, .. } | RebuildError::Interrupted { written, .. } => {
                written
            }
            _ => &[],
        }
    }
}
