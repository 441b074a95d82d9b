use std::fmt;

use serde::{Deserialize, Serialize};

use vger_types::blob_id::BlobId;
use vger_types::error::Result;
use vger_types::index_id::IndexId;
use vger_types::pack_id::PackId;

/// Whether a blob holds file content or tree metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BlobKind {
    Data,
    Tree,
}

impl BlobKind {
    /// Decode the `obj_type` tag of a pack header entry.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Data),
            1 => Some(Self::Tree),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            Self::Data => 0,
            Self::Tree => 1,
        }
    }
}

impl From<BlobKind> for u8 {
    fn from(kind: BlobKind) -> u8 {
        kind.tag()
    }
}

impl TryFrom<u8> for BlobKind {
    type Error = String;

    fn try_from(tag: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_tag(tag).ok_or_else(|| format!("unknown blob kind tag {tag}"))
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("data"),
            Self::Tree => f.write_str("tree"),
        }
    }
}

/// Location of one stored blob, as recovered from a pack trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobRecord {
    pub blob_id: BlobId,
    pub kind: BlobKind,
    pub pack_id: PackId,
    /// Offset of the blob bytes, past their length prefix.
    pub offset: u64,
    pub length: u32,
    pub uncompressed_length: u32,
}

/// One blob entry inside an [`IndexPack`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexBlob {
    pub id: BlobId,
    pub kind: BlobKind,
    pub offset: u64,
    pub length: u32,
    pub uncompressed_length: u32,
}

/// All indexed blobs of a single pack, in offset order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPack {
    pub pack_id: PackId,
    pub blobs: Vec<IndexBlob>,
}

/// One persisted index object.
///
/// `supersedes` names the index objects this shard replaces; readers may
/// ignore those once the shard is visible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexShard {
    pub supersedes: Vec<IndexId>,
    pub packs: Vec<IndexPack>,
}

// Upper bounds of the compact msgpack encoding produced by `rmp_serde::to_vec`.
// A 32-byte id is an array16 header plus at most two bytes per element.
const ENCODED_ID_MAX: usize = 3 + 32 * 2;
const ENCODED_ARRAY_HEADER_MAX: usize = 5;
/// fixarray(5) + id + kind + u64 + u32 + u32.
pub const ENCODED_BLOB_MAX: usize = 1 + ENCODED_ID_MAX + 1 + 9 + 5 + 5;
/// fixarray(2) + pack id + blob array header.
pub const ENCODED_PACK_OVERHEAD_MAX: usize = 1 + ENCODED_ID_MAX + ENCODED_ARRAY_HEADER_MAX;

/// Upper bound of the encoded size of a shard with no packs.
pub fn estimated_shard_overhead(supersedes: usize) -> usize {
    1 + ENCODED_ARRAY_HEADER_MAX + supersedes * ENCODED_ID_MAX + ENCODED_ARRAY_HEADER_MAX
}

impl IndexPack {
    /// Upper bound of this entry's encoded size.
    pub fn estimated_size(&self) -> usize {
        ENCODED_PACK_OVERHEAD_MAX + self.blobs.len() * ENCODED_BLOB_MAX
    }
}

impl IndexShard {
    pub fn blob_count(&self) -> usize {
        self.packs.iter().map(|p| p.blobs.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packs.is_empty()
    }

    /// Upper bound of the encoded size of the whole shard.
    pub fn estimated_size(&self) -> usize {
        estimated_shard_overhead(self.supersedes.len())
            + self.packs.iter().map(IndexPack::estimated_size).sum::<usize>()
    }

    /// Flatten the shard back into blob records.
    pub fn records(&self) -> impl Iterator<Item = BlobRecord> + '_ {
        self.packs.iter().flat_map(|pack| {
            pack.blobs.iter().map(move |blob| BlobRecord {
                blob_id: blob.id,
                kind: blob.kind,
                pack_id: pack.pack_id,
                offset: blob.offset,
                length: blob.length,
                uncompressed_length: blob.uncompressed_length,
            })
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(self)?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(data)?)
    }
}
