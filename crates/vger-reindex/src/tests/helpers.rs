use std::sync::atomic::AtomicBool;

use vger_types::pack_id::PackId;

use crate::commands::rebuild_index::{
    rebuild_index, RebuildError, RebuildOptions, RebuildProgressEvent, RebuildResult,
};
use crate::config::RebuildConfig;
use crate::index::{BlobRecord, IndexShard};
use crate::repo::Repository;
use crate::testutil::BuiltPack;

/// Rebuild with default options and no progress callback.
pub fn rebuild(repo: &Repository) -> Result<RebuildResult, RebuildError> {
    rebuild_with(repo, &RebuildConfig::default(), &RebuildOptions::default())
}

pub fn rebuild_with(
    repo: &Repository,
    config: &RebuildConfig,
    options: &RebuildOptions,
) -> Result<RebuildResult, RebuildError> {
    rebuild_index(repo, config, options, None, None)
}

/// Rebuild while collecting every progress event.
pub fn rebuild_recording(
    repo: &Repository,
    shutdown: Option<&AtomicBool>,
    on_event: impl Fn(&RebuildProgressEvent),
) -> (Result<RebuildResult, RebuildError>, Vec<RebuildProgressEvent>) {
    let mut events = Vec::new();
    let mut callback = |event: RebuildProgressEvent| {
        on_event(&event);
        events.push(event);
    };
    let result = rebuild_index(
        repo,
        &RebuildConfig::default(),
        &RebuildOptions::default(),
        shutdown,
        Some(&mut callback),
    );
    (result, events)
}

/// Every blob record reachable from the index objects currently stored,
/// sorted for comparison.
pub fn stored_records(repo: &Repository) -> Vec<BlobRecord> {
    let mut records: Vec<BlobRecord> = load_shards(repo)
        .iter()
        .flat_map(|shard| shard.records().collect::<Vec<_>>())
        .collect();
    sort_records(&mut records);
    records
}

pub fn load_shards(repo: &Repository) -> Vec<IndexShard> {
    repo.list_index_ids()
        .unwrap()
        .iter()
        .map(|id| IndexShard::decode(&repo.load_index(id).unwrap()).unwrap())
        .collect()
}

pub fn sort_records(records: &mut [BlobRecord]) {
    records.sort_by_key(|r| (r.pack_id, r.offset, r.blob_id));
}

/// Records a correct index must contain for `pack`.
pub fn expected_records(pack: &BuiltPack) -> Vec<BlobRecord> {
    pack.entries
        .iter()
        .map(|e| BlobRecord {
            blob_id: e.blob_id,
            kind: crate::index::BlobKind::from_tag(e.obj_type).unwrap(),
            pack_id: pack.pack_id,
            offset: e.offset,
            length: e.length,
            uncompressed_length: e.uncompressed_size,
        })
        .collect()
}

/// Store `bytes` under the key of `pack_id`, regardless of content.
pub fn put_raw_pack(repo: &Repository, pack_id: &PackId, bytes: &[u8]) {
    repo.storage.put(&pack_id.storage_key(), bytes).unwrap();
}

/// Remove `count` bytes starting at `at`.
pub fn cut(bytes: &[u8], at: usize, count: usize) -> Vec<u8> {
    let mut out = bytes[..at].to_vec();
    out.extend_from_slice(&bytes[at + count..]);
    out
}
