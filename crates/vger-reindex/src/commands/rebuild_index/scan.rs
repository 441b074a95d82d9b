use thiserror::Error;

use vger_types::error::VgerError;
use vger_types::pack_id::PackId;

use crate::index::{BlobKind, BlobRecord};
use crate::repo::pack::{decode_pack_trailer, PackHeaderEntry, LENGTH_FIELD_SIZE, PACK_HEADER_SIZE};
use crate::repo::Repository;

/// Why a pack was judged invalid. A pack is accepted or rejected as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackDefect {
    #[error("truncated: {0}")]
    Truncated(String),

    #[error("unreadable: {0}")]
    Unreadable(String),

    #[error("header failed authentication")]
    Unauthenticated,

    #[error("malformed header: {0}")]
    Malformed(String),

    #[error("entry {index} has unknown blob kind {tag}")]
    UnknownBlobKind { index: usize, tag: u8 },

    #[error("entry {index} out of bounds (offset {offset}, length {length})")]
    EntryOutOfBounds { index: usize, offset: u64, length: u32 },

    #[error("header declares {declared} bytes but pack has {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
}

/// Outcome of scanning one pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackScan {
    Valid(Vec<BlobRecord>),
    Invalid(PackDefect),
}

/// A pack excluded from the rebuilt index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidPack {
    pub pack_id: PackId,
    pub size: u64,
    pub defect: PackDefect,
}

/// Read and validate the trailer of one pack of listed size `size`.
pub fn scan_pack(repo: &Repository, pack_id: &PackId, size: u64) -> PackScan {
    match read_records(repo, pack_id, size) {
        Ok(records) => PackScan::Valid(records),
        Err(defect) => PackScan::Invalid(defect),
    }
}

fn read_records(
    repo: &Repository,
    pack_id: &PackId,
    size: u64,
) -> std::result::Result<Vec<BlobRecord>, PackDefect> {
    let trailer = repo
        .read_pack_trailer(pack_id, size)
        .map_err(|e| match e {
            VgerError::InvalidFormat(msg) => PackDefect::Truncated(msg),
            other => PackDefect::Unreadable(other.to_string()),
        })?;

    let entries = decode_pack_trailer(&trailer, repo.crypto.as_ref()).map_err(|e| match e {
        VgerError::DecryptionFailed => PackDefect::Unauthenticated,
        other => PackDefect::Malformed(other.to_string()),
    })?;

    validate_entries(pack_id, size, trailer.len() as u64, &entries)
}

/// Check decoded header entries against the pack layout.
///
/// Entries must be in offset order, each preceded by its 4-byte length
/// prefix, and all of them must end before the trailer. The sum of the
/// regions they describe plus header and trailer must equal `size`.
pub fn validate_entries(
    pack_id: &PackId,
    size: u64,
    trailer_len: u64,
    entries: &[PackHeaderEntry],
) -> std::result::Result<Vec<BlobRecord>, PackDefect> {
    let prefix = LENGTH_FIELD_SIZE as u64;
    let blobs_end = size.saturating_sub(prefix + trailer_len);

    let mut records = Vec::with_capacity(entries.len());
    let mut cursor = PACK_HEADER_SIZE as u64;
    let mut declared = PACK_HEADER_SIZE as u64 + trailer_len + prefix;

    for (index, entry) in entries.iter().enumerate() {
        let kind = BlobKind::from_tag(entry.obj_type).ok_or(PackDefect::UnknownBlobKind {
            index,
            tag: entry.obj_type,
        })?;

        let out_of_bounds = PackDefect::EntryOutOfBounds {
            index,
            offset: entry.offset,
            length: entry.length,
        };
        let end = entry.offset.checked_add(entry.length as u64);
        match end {
            Some(end) if entry.offset >= cursor + prefix && end <= blobs_end => cursor = end,
            _ => return Err(out_of_bounds),
        }
        declared += prefix + entry.length as u64;

        records.push(BlobRecord {
            blob_id: entry.blob_id,
            kind,
            pack_id: *pack_id,
            offset: entry.offset,
            length: entry.length,
            uncompressed_length: entry.uncompressed_size,
        });
    }

    if declared != size {
        return Err(PackDefect::SizeMismatch {
            declared,
            actual: size,
        });
    }
    Ok(records)
}
