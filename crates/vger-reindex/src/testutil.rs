use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use vger_crypto::key::MasterKey;
use vger_crypto::CryptoEngine;
use vger_storage::StorageBackend;
use vger_types::blob_id::BlobId;
use vger_types::error::{Result, VgerError};
use vger_types::pack_id::PackId;

use crate::repo::format::{pack_object, ObjectType};
use crate::repo::pack::{PackHeaderEntry, PACK_HEADER_SIZE, PACK_MAGIC, PACK_VERSION};
use crate::repo::{EncryptionMode, Repository};

/// In-memory storage backend for testing. Thread-safe via Mutex.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let map = self.data.lock().unwrap();
        Ok(map.contains_key(key))
    }

    fn list_sized(&self, prefix: &str) -> Result<Vec<(String, u64)>> {
        let map = self.data.lock().unwrap();
        Ok(map
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.len() as u64))
            .collect())
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        Ok(map.get(key).map(|data| {
            let start = (offset as usize).min(data.len());
            let end = start.saturating_add(length as usize).min(data.len());
            data[start..end].to_vec()
        }))
    }
}

/// Failures a [`FaultyBackend`] injects. Shared with the test through a
/// [`FaultHandle`] so it can be changed after the repository is opened.
#[derive(Debug, Default)]
pub struct FaultPlan {
    /// `list`/`list_sized` fail for prefixes starting with any of these.
    pub fail_list: Vec<String>,
    /// The n-th (1-based) `put` under `index/` fails.
    pub fail_index_put_at: Option<usize>,
    /// `delete` fails for these exact keys.
    pub fail_delete: HashSet<String>,
    /// `get_range` fails for these exact keys.
    pub fail_get_range: HashSet<String>,
    index_puts: usize,
    /// Every key passed to `delete`, in call order.
    pub deleted: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FaultHandle(Arc<Mutex<FaultPlan>>);

impl FaultHandle {
    pub fn update(&self, f: impl FnOnce(&mut FaultPlan)) {
        f(&mut self.0.lock().unwrap());
    }

    pub fn deleted(&self) -> Vec<String> {
        self.0.lock().unwrap().deleted.clone()
    }
}

fn injected(what: &str) -> VgerError {
    VgerError::Io(std::io::Error::new(
        std::io::ErrorKind::PermissionDenied,
        format!("injected {what} failure"),
    ))
}

/// Storage wrapper around a `MemoryBackend` that fails selected operations.
pub struct FaultyBackend {
    inner: MemoryBackend,
    faults: FaultHandle,
}

impl FaultyBackend {
    pub fn new() -> (Self, FaultHandle) {
        let faults = FaultHandle::default();
        (
            Self {
                inner: MemoryBackend::new(),
                faults: faults.clone(),
            },
            faults,
        )
    }

    fn plan(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        self.faults.0.lock().unwrap()
    }
}

impl StorageBackend for FaultyBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if key.starts_with("index/") {
            let mut plan = self.plan();
            plan.index_puts += 1;
            if plan.fail_index_put_at == Some(plan.index_puts) {
                return Err(injected("put"));
            }
        }
        self.inner.put(key, data)
    }

    fn delete(&self, key: &str) -> Result<()> {
        {
            let mut plan = self.plan();
            plan.deleted.push(key.to_string());
            if plan.fail_delete.contains(key) {
                return Err(injected("delete"));
            }
        }
        self.inner.delete(key)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }

    fn list_sized(&self, prefix: &str) -> Result<Vec<(String, u64)>> {
        if self.plan().fail_list.iter().any(|p| prefix.starts_with(p.as_str())) {
            return Err(injected("list"));
        }
        self.inner.list_sized(prefix)
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        if self.plan().fail_get_range.contains(key) {
            return Err(injected("get_range"));
        }
        self.inner.get_range(key, offset, length)
    }
}

/// Fixed blob id key for deterministic tests.
pub fn test_blob_id_key() -> [u8; 32] {
    [0xAA; 32]
}

pub fn test_master_key() -> MasterKey {
    MasterKey::from_hex(&"42".repeat(32)).unwrap()
}

/// A blob to place into a test pack.
pub struct PackBlob<'a> {
    pub obj_type: u8,
    pub data: &'a [u8],
}

impl<'a> PackBlob<'a> {
    pub fn data(data: &'a [u8]) -> Self {
        Self { obj_type: 0, data }
    }

    pub fn tree(data: &'a [u8]) -> Self {
        Self { obj_type: 1, data }
    }
}

/// A fully assembled pack and the header it carries.
pub struct BuiltPack {
    pub pack_id: PackId,
    pub bytes: Vec<u8>,
    pub entries: Vec<PackHeaderEntry>,
    pub trailer_len: usize,
}

/// Header entries matching the layout `build_pack` writes for `blobs`.
pub fn entries_for(blobs: &[PackBlob]) -> Vec<PackHeaderEntry> {
    let key = test_blob_id_key();
    let mut running_offset = PACK_HEADER_SIZE as u64;
    blobs
        .iter()
        .map(|blob| {
            let offset = running_offset + 4;
            running_offset += 4 + blob.data.len() as u64;
            PackHeaderEntry {
                obj_type: blob.obj_type,
                blob_id: BlobId::compute(&key, blob.data),
                offset,
                length: blob.data.len() as u32,
                uncompressed_size: blob.data.len() as u32 * 2,
            }
        })
        .collect()
}

/// Assemble pack bytes with the given blob bodies and an arbitrary header.
pub fn seal_pack(
    blobs: &[PackBlob],
    entries: &[PackHeaderEntry],
    crypto: &dyn CryptoEngine,
) -> BuiltPack {
    let mut bytes = PACK_MAGIC.to_vec();
    bytes.push(PACK_VERSION);
    for blob in blobs {
        bytes.extend_from_slice(&(blob.data.len() as u32).to_le_bytes());
        bytes.extend_from_slice(blob.data);
    }
    let header_bytes = rmp_serde::to_vec(entries).unwrap();
    let trailer = pack_object(ObjectType::PackHeader, &header_bytes, crypto).unwrap();
    bytes.extend_from_slice(&trailer);
    bytes.extend_from_slice(&(trailer.len() as u32).to_le_bytes());
    BuiltPack {
        pack_id: PackId::compute(&bytes),
        bytes,
        entries: entries.to_vec(),
        trailer_len: trailer.len(),
    }
}

/// Assemble a well-formed pack holding `blobs`.
pub fn build_pack(blobs: &[PackBlob], crypto: &dyn CryptoEngine) -> BuiltPack {
    seal_pack(blobs, &entries_for(blobs), crypto)
}

/// Build a well-formed pack and store it in the repository.
pub fn store_pack(repo: &Repository, blobs: &[PackBlob]) -> BuiltPack {
    let built = build_pack(blobs, repo.crypto.as_ref());
    put_pack(repo, &built);
    built
}

pub fn put_pack(repo: &Repository, built: &BuiltPack) {
    repo.storage
        .put(&built.pack_id.storage_key(), &built.bytes)
        .unwrap();
}

/// Create a plaintext repository backed by MemoryBackend.
pub fn test_repo() -> Repository {
    Repository::init(Box::new(MemoryBackend::new()), EncryptionMode::None, None)
        .expect("failed to init test repo")
}

/// Create an AES-256-GCM repository backed by MemoryBackend.
pub fn test_repo_encrypted() -> Repository {
    Repository::init(
        Box::new(MemoryBackend::new()),
        EncryptionMode::Aes256Gcm,
        Some(&test_master_key()),
    )
    .expect("failed to init encrypted test repo")
}

/// Create a plaintext repository on a fault-injecting backend.
pub fn test_repo_faulty() -> (Repository, FaultHandle) {
    let (backend, faults) = FaultyBackend::new();
    let repo = Repository::init(Box::new(backend), EncryptionMode::None, None)
        .expect("failed to init faulty test repo");
    (repo, faults)
}
