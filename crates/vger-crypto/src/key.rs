use std::path::Path;

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use vger_types::error::{Result, VgerError};

/// Repository encryption key, loaded from a hex key file.
/// Automatically zeroized on drop to prevent key material from lingering in memory.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    pub encryption_key: [u8; 32],
}

impl MasterKey {
    /// Generate a new random key using OS entropy.
    pub fn generate() -> Self {
        let mut encryption_key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut encryption_key);
        Self { encryption_key }
    }

    /// Parse a key from 64 hex characters; surrounding whitespace is ignored.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(text.trim())
                .map_err(|e| VgerError::Config(format!("invalid key encoding: {e}")))?,
        );
        if bytes.len() != 32 {
            return Err(VgerError::Config(format!(
                "key must be 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut encryption_key = [0u8; 32];
        encryption_key.copy_from_slice(&bytes);
        Ok(Self { encryption_key })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = Zeroizing::new(std::fs::read_to_string(path).map_err(|e| {
            VgerError::Config(format!("cannot read key file '{}': {e}", path.display()))
        })?);
        Self::from_hex(&text)
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.encryption_key))
    }
}
