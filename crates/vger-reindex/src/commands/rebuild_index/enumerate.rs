use std::collections::HashSet;

use tracing::debug;

use vger_types::index_id::IndexId;
use vger_types::pack_id::PackId;

use crate::repo::Repository;

use super::RebuildError;

/// Packs selected for scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackInventory {
    /// `(pack id, size)` pairs sorted by pack id.
    pub packs: Vec<(PackId, u64)>,
    /// Listed packs dropped because they were in the ignore set.
    pub ignored: usize,
}

/// List every pack in the repository, minus the ignore set.
pub fn enumerate_packs(
    repo: &Repository,
    ignore: &HashSet<PackId>,
) -> std::result::Result<PackInventory, RebuildError> {
    let listed = repo.list_packs().map_err(RebuildError::BackendList)?;
    let total = listed.len();
    let packs: Vec<(PackId, u64)> = listed
        .into_iter()
        .filter(|(id, _)| !ignore.contains(id))
        .collect();
    let ignored = total - packs.len();
    debug!(total, ignored, "packs enumerated");
    Ok(PackInventory { packs, ignored })
}

/// Snapshot the index objects that exist before any new shard is written.
pub fn collect_stale_indexes(
    repo: &Repository,
) -> std::result::Result<Vec<IndexId>, RebuildError> {
    let ids = repo
        .list_index_ids()
        .map_err(RebuildError::StaleCollection)?;
    debug!(count = ids.len(), "existing index files collected");
    Ok(ids)
}
