use serde::{Deserialize, Serialize};

use vger_crypto::CryptoEngine;
use vger_storage::StorageBackend;
use vger_types::blob_id::BlobId;
use vger_types::error::{Result, VgerError};
use vger_types::pack_id::PackId;

use super::format::{unpack_object_expect, ObjectType};

/// Magic bytes at the start of every pack file.
pub const PACK_MAGIC: &[u8; 8] = b"VGERPACK";
/// Pack format version.
pub const PACK_VERSION: u8 = 1;
/// Size of the pack header (magic + version byte).
pub const PACK_HEADER_SIZE: usize = 9;
/// Size of every length field: the per-blob prefix and the trailer length.
pub const LENGTH_FIELD_SIZE: usize = 4;
/// Smallest well-formed pack: header plus trailer length.
pub const MIN_PACK_SIZE: u64 = (PACK_HEADER_SIZE + LENGTH_FIELD_SIZE) as u64;
/// Bytes fetched from the end of a pack in the first trailer read.
pub const TRAILER_READ_AHEAD: u64 = 16 * 1024;

/// One entry in the pack's trailing header. Describes a single blob.
///
/// `offset` points past the blob's 4-byte length prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackHeaderEntry {
    pub obj_type: u8,
    pub blob_id: BlobId,
    pub offset: u64,
    pub length: u32,
    pub uncompressed_size: u32,
}

fn read_exact_range(
    storage: &dyn StorageBackend,
    pack_id: &PackId,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>> {
    let data = storage
        .get_range(&pack_id.storage_key(), offset, length)?
        .ok_or_else(|| VgerError::Other(format!("pack not found: {pack_id}")))?;
    if data.len() as u64 != length {
        return Err(VgerError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "short read on pack {pack_id} at offset {offset}: expected {length} bytes, got {}",
                data.len()
            ),
        )));
    }
    Ok(data)
}

/// Fetch the encrypted trailer of a pack whose listed size is `size`.
///
/// Reads the last `min(size, 16 KiB)` bytes and, if the trailer is longer
/// than that, issues one more ranged read for exactly the trailer. Size and
/// length-field problems are reported as `InvalidFormat`; every other error
/// comes from the backend.
pub fn read_pack_trailer(
    storage: &dyn StorageBackend,
    pack_id: &PackId,
    size: u64,
) -> Result<Vec<u8>> {
    if size < MIN_PACK_SIZE {
        return Err(VgerError::InvalidFormat(format!(
            "pack too small: {size} bytes"
        )));
    }

    let tail_len = size.min(TRAILER_READ_AHEAD);
    let tail = read_exact_range(storage, pack_id, size - tail_len, tail_len)?;

    let len_offset = tail.len() - LENGTH_FIELD_SIZE;
    let mut len_bytes = [0u8; LENGTH_FIELD_SIZE];
    len_bytes.copy_from_slice(&tail[len_offset..]);
    let trailer_len = u32::from_le_bytes(len_bytes) as u64;

    if trailer_len + LENGTH_FIELD_SIZE as u64 > size - PACK_HEADER_SIZE as u64 {
        return Err(VgerError::InvalidFormat(format!(
            "pack header length {trailer_len} exceeds pack size {size}"
        )));
    }

    if trailer_len <= len_offset as u64 {
        let start = len_offset - trailer_len as usize;
        return Ok(tail[start..len_offset].to_vec());
    }

    let trailer_start = size - LENGTH_FIELD_SIZE as u64 - trailer_len;
    read_exact_range(storage, pack_id, trailer_start, trailer_len)
}

/// Decrypt and decode a pack trailer into its header entries.
pub fn decode_pack_trailer(
    trailer: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<PackHeaderEntry>> {
    let header_bytes = unpack_object_expect(trailer, ObjectType::PackHeader, crypto)?;
    let entries: Vec<PackHeaderEntry> = rmp_serde::from_slice(&header_bytes)?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{build_pack, MemoryBackend, PackBlob};
    use vger_crypto::PlaintextEngine;

    fn store(storage: &MemoryBackend, bytes: &[u8]) -> (PackId, u64) {
        let pack_id = PackId::compute(bytes);
        storage.put(&pack_id.storage_key(), bytes).unwrap();
        (pack_id, bytes.len() as u64)
    }

    #[test]
    fn trailer_roundtrip_small_pack() {
        let storage = MemoryBackend::new();
        let crypto = PlaintextEngine::new();
        let built = build_pack(
            &[PackBlob::data(b"alpha"), PackBlob::tree(b"beta")],
            &crypto,
        );
        let (pack_id, size) = store(&storage, &built.bytes);

        let trailer = read_pack_trailer(&storage, &pack_id, size).unwrap();
        let entries = decode_pack_trailer(&trailer, &crypto).unwrap();
        assert_eq!(entries, built.entries);
        assert_eq!(entries[0].offset, 13);
        assert_eq!(entries[1].offset, 13 + 5 + 4);
    }

    #[test]
    fn trailer_longer_than_read_ahead_needs_second_read() {
        let storage = MemoryBackend::new();
        let crypto = PlaintextEngine::new();
        // Each entry encodes to well over 40 bytes, so 600 entries push the
        // trailer past the 16 KiB read-ahead.
        let contents: Vec<Vec<u8>> = (0..600u32).map(|i| i.to_le_bytes().to_vec()).collect();
        let blobs: Vec<PackBlob> = contents.iter().map(|c| PackBlob::data(c)).collect();
        let built = build_pack(&blobs, &crypto);
        assert!(built.trailer_len as u64 > TRAILER_READ_AHEAD);
        let (pack_id, size) = store(&storage, &built.bytes);

        let trailer = read_pack_trailer(&storage, &pack_id, size).unwrap();
        assert_eq!(trailer.len(), built.trailer_len);
        assert_eq!(decode_pack_trailer(&trailer, &crypto).unwrap().len(), 600);
    }

    #[test]
    fn tiny_pack_is_invalid_format() {
        let storage = MemoryBackend::new();
        let (pack_id, size) = store(&storage, b"VGERPACK\x01");
        assert!(matches!(
            read_pack_trailer(&storage, &pack_id, size),
            Err(VgerError::InvalidFormat(_))
        ));
    }

    #[test]
    fn oversized_trailer_length_is_invalid_format() {
        let storage = MemoryBackend::new();
        let mut bytes = PACK_MAGIC.to_vec();
        bytes.push(PACK_VERSION);
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        let (pack_id, size) = store(&storage, &bytes);
        assert!(matches!(
            read_pack_trailer(&storage, &pack_id, size),
            Err(VgerError::InvalidFormat(_))
        ));
    }

    #[test]
    fn missing_pack_is_backend_error() {
        let storage = MemoryBackend::new();
        let pack_id = PackId([7; 32]);
        let err = read_pack_trailer(&storage, &pack_id, 100).unwrap_err();
        assert!(!matches!(err, VgerError::InvalidFormat(_)));
    }

    #[test]
    fn wrong_object_type_is_rejected() {
        let crypto = PlaintextEngine::new();
        let mut trailer = vec![ObjectType::Index as u8];
        trailer.extend_from_slice(&rmp_serde::to_vec(&Vec::<PackHeaderEntry>::new()).unwrap());
        assert!(matches!(
            decode_pack_trailer(&trailer, &crypto),
            Err(VgerError::InvalidFormat(_))
        ));
    }
}
