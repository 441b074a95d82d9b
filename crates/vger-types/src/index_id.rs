use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Storage prefix under which all index objects live.
pub const INDEX_PREFIX: &str = "index/";

/// Content-derived identifier of a stored index object: unkeyed BLAKE2b-256
/// of the exact bytes written to the backend.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub [u8; 32]);

impl IndexId {
    pub fn compute(stored_bytes: &[u8]) -> Self {
        let mut hasher = Blake2bVar::new(32).expect("valid output size");
        hasher.update(stored_bytes);
        let mut out = [0u8; 32];
        hasher.finalize_variable(&mut out).expect("correct length");
        IndexId(out)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Storage key path: `index/<full_hex>`.
    pub fn storage_key(&self) -> String {
        format!("{INDEX_PREFIX}{}", self.to_hex())
    }

    pub fn from_hex(hex_str: &str) -> std::result::Result<Self, String> {
        let bytes = hex::decode(hex_str).map_err(|e| format!("invalid hex: {e}"))?;
        if bytes.len() != 32 {
            return Err(format!("expected 32 bytes, got {}", bytes.len()));
        }
        let mut id = [0u8; 32];
        id.copy_from_slice(&bytes);
        Ok(IndexId(id))
    }

    pub fn from_storage_key(key: &str) -> std::result::Result<Self, String> {
        let hex_part = key
            .strip_prefix(INDEX_PREFIX)
            .ok_or_else(|| format!("not an index key: '{key}'"))?;
        Self::from_hex(hex_part)
    }
}

impl fmt::Debug for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
