pub mod format;
pub mod lock;
pub mod pack;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use vger_crypto::aes_gcm::Aes256GcmEngine;
use vger_crypto::key::MasterKey;
use vger_crypto::{CryptoEngine, PlaintextEngine};
use vger_storage::StorageBackend;
use vger_types::error::{Result, VgerError};
use vger_types::index_id::{IndexId, INDEX_PREFIX};
use vger_types::pack_id::{PackId, PACKS_PREFIX};

use self::format::{pack_object_with_context, unpack_object_expect_with_context, ObjectType};

/// Storage key of the repository config object.
pub const CONFIG_KEY: &str = "config";
/// Only supported repository format version.
pub const REPO_VERSION: u32 = 1;

const INDEX_OBJECT_CONTEXT: &[u8] = b"index";

/// Persisted (unencrypted) at the `config` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub version: u32,
    pub encryption: EncryptionMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    None,
    Aes256Gcm,
}

impl EncryptionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionMode::None => "none",
            EncryptionMode::Aes256Gcm => "aes256gcm",
        }
    }
}

/// A handle to an opened repository.
pub struct Repository {
    pub storage: Arc<dyn StorageBackend>,
    pub crypto: Arc<dyn CryptoEngine>,
    pub config: RepoConfig,
}

fn engine_for(mode: EncryptionMode, key: Option<&MasterKey>) -> Result<Arc<dyn CryptoEngine>> {
    match mode {
        EncryptionMode::None => Ok(Arc::new(PlaintextEngine::new())),
        EncryptionMode::Aes256Gcm => {
            let key = key.ok_or_else(|| {
                VgerError::Config("key file required for encrypted repository".into())
            })?;
            Ok(Arc::new(Aes256GcmEngine::new(&key.encryption_key)))
        }
    }
}

impl Repository {
    /// Initialize a new, empty repository.
    pub fn init(
        storage: Box<dyn StorageBackend>,
        encryption: EncryptionMode,
        key: Option<&MasterKey>,
    ) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = Arc::from(storage);

        if storage.exists(CONFIG_KEY)? {
            return Err(VgerError::RepoAlreadyExists("repository".into()));
        }

        let crypto = engine_for(encryption, key)?;
        let config = RepoConfig {
            version: REPO_VERSION,
            encryption,
        };
        storage.put(CONFIG_KEY, &rmp_serde::to_vec(&config)?)?;

        Ok(Self {
            storage,
            crypto,
            config,
        })
    }

    /// Open an existing repository.
    pub fn open(storage: Box<dyn StorageBackend>, key: Option<&MasterKey>) -> Result<Self> {
        let storage: Arc<dyn StorageBackend> = Arc::from(storage);

        let config_data = storage
            .get(CONFIG_KEY)?
            .ok_or_else(|| VgerError::RepoNotFound("config object missing".into()))?;
        let config: RepoConfig = rmp_serde::from_slice(&config_data)?;
        if config.version != REPO_VERSION {
            return Err(VgerError::UnsupportedVersion(config.version));
        }

        let crypto = engine_for(config.encryption, key)?;
        debug!(encryption = config.encryption.as_str(), "repository opened");

        Ok(Self {
            storage,
            crypto,
            config,
        })
    }

    /// List every pack object with its size, sorted by pack id.
    ///
    /// Keys under `packs/` that do not parse as pack ids are skipped.
    pub fn list_packs(&self) -> Result<Vec<(PackId, u64)>> {
        let mut packs = Vec::new();
        for (key, size) in self.storage.list_sized(PACKS_PREFIX)? {
            match PackId::from_storage_key(&key) {
                Ok(id) => packs.push((id, size)),
                Err(e) => warn!("skipping invalid pack key '{key}': {e}"),
            }
        }
        packs.sort_unstable_by_key(|(id, _)| *id);
        Ok(packs)
    }

    /// List the ids of all index objects currently stored, sorted.
    pub fn list_index_ids(&self) -> Result<Vec<IndexId>> {
        let mut ids = Vec::new();
        for key in self.storage.list(INDEX_PREFIX)? {
            match IndexId::from_storage_key(&key) {
                Ok(id) => ids.push(id),
                Err(e) => warn!("skipping invalid index key '{key}': {e}"),
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Fetch the encrypted trailer of a pack. See [`pack::read_pack_trailer`].
    pub fn read_pack_trailer(&self, pack_id: &PackId, size: u64) -> Result<Vec<u8>> {
        pack::read_pack_trailer(self.storage.as_ref(), pack_id, size)
    }

    /// Seal an encoded index and store it under its content-derived id.
    pub fn save_index(&self, plaintext: &[u8]) -> Result<IndexId> {
        let sealed = pack_object_with_context(
            ObjectType::Index,
            INDEX_OBJECT_CONTEXT,
            plaintext,
            self.crypto.as_ref(),
        )?;
        let id = IndexId::compute(&sealed);
        self.storage.put(&id.storage_key(), &sealed)?;
        Ok(id)
    }

    /// Load and decrypt an index object, returning its encoded payload.
    pub fn load_index(&self, id: &IndexId) -> Result<Vec<u8>> {
        let sealed = self
            .storage
            .get(&id.storage_key())?
            .ok_or_else(|| VgerError::Other(format!("index not found: {id}")))?;
        unpack_object_expect_with_context(
            &sealed,
            ObjectType::Index,
            INDEX_OBJECT_CONTEXT,
            self.crypto.as_ref(),
        )
    }

    pub fn remove_index(&self, id: &IndexId) -> Result<()> {
        self.storage.delete(&id.storage_key())
    }
}
