use vger_types::index_id::IndexId;

use crate::config::RebuildConfig;
use crate::index::{estimated_shard_overhead, BlobRecord, IndexBlob, IndexPack, IndexShard};

/// Size budget of a single index shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardLimits {
    pub max_blobs: usize,
    /// Upper bound of the encoded shard size in bytes.
    pub max_bytes: usize,
}

impl From<&RebuildConfig> for ShardLimits {
    fn from(config: &RebuildConfig) -> Self {
        Self {
            max_blobs: config.max_shard_blobs,
            max_bytes: config.max_shard_bytes,
        }
    }
}

/// Fold blob records into index shards.
///
/// Records are ordered by `(pack, offset, blob)` so the output does not
/// depend on scan order. A pack's records always stay in one shard; a pack
/// that alone exceeds the budget gets a shard of its own. Every shard
/// carries the same sorted `supersedes` list. With no records, a single
/// empty shard is still emitted when there is something to supersede.
pub fn build_shards(
    mut records: Vec<BlobRecord>,
    supersedes: &[IndexId],
    limits: ShardLimits,
) -> Vec<IndexShard> {
    let mut supersedes = supersedes.to_vec();
    supersedes.sort_unstable();
    supersedes.dedup();

    records.sort_unstable_by(|a, b| {
        (a.pack_id, a.offset, a.blob_id).cmp(&(b.pack_id, b.offset, b.blob_id))
    });

    let packs = group_by_pack(records);
    if packs.is_empty() {
        if supersedes.is_empty() {
            return Vec::new();
        }
        return vec![IndexShard {
            supersedes,
            packs: Vec::new(),
        }];
    }

    let base_bytes = estimated_shard_overhead(supersedes.len());
    let mut shards = Vec::new();
    let mut current: Vec<IndexPack> = Vec::new();
    let mut blobs = 0usize;
    let mut bytes = base_bytes;

    for pack in packs {
        let pack_blobs = pack.blobs.len();
        let pack_bytes = pack.estimated_size();
        let over_budget =
            blobs + pack_blobs > limits.max_blobs || bytes + pack_bytes > limits.max_bytes;
        if !current.is_empty() && over_budget {
            shards.push(IndexShard {
                supersedes: supersedes.clone(),
                packs: std::mem::take(&mut current),
            });
            blobs = 0;
            bytes = base_bytes;
        }
        blobs += pack_blobs;
        bytes += pack_bytes;
        current.push(pack);
    }
    shards.push(IndexShard {
        supersedes,
        packs: current,
    });
    shards
}

/// Group sorted records into per-pack entries.
fn group_by_pack(records: Vec<BlobRecord>) -> Vec<IndexPack> {
    let mut packs: Vec<IndexPack> = Vec::new();
    for record in records {
        let blob = IndexBlob {
            id: record.blob_id,
            kind: record.kind,
            offset: record.offset,
            length: record.length,
            uncompressed_length: record.uncompressed_length,
        };
        match packs.last_mut() {
            Some(pack) if pack.pack_id == record.pack_id => pack.blobs.push(blob),
            _ => packs.push(IndexPack {
                pack_id: record.pack_id,
                blobs: vec![blob],
            }),
        }
    }
    packs
}
