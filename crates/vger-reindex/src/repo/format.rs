use vger_crypto::CryptoEngine;
use vger_types::error::{Result, VgerError};

/// Domain-separation marker for object identity binding in AEAD AAD.
const OBJECT_CONTEXT_AAD_PREFIX: &[u8] = b"vger:object-context:v1\0";

/// Object type tags for the repo envelope format.
///
/// Tag values are shared with the pack writer and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectType {
    Config = 0,
    Index = 4,
    PackHeader = 5,
}

impl ObjectType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(Self::Config),
            4 => Ok(Self::Index),
            5 => Ok(Self::PackHeader),
            _ => Err(VgerError::UnknownObjectType(v)),
        }
    }
}

fn legacy_aad(tag: u8) -> [u8; 1] {
    [tag]
}

fn contextual_aad(tag: u8, context: &[u8]) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + OBJECT_CONTEXT_AAD_PREFIX.len() + context.len());
    aad.push(tag);
    aad.extend_from_slice(OBJECT_CONTEXT_AAD_PREFIX);
    aad.extend_from_slice(context);
    aad
}

fn parse_object_envelope(data: &[u8]) -> Result<(u8, ObjectType, &[u8])> {
    let Some((&tag, body)) = data.split_first() else {
        return Err(VgerError::InvalidFormat("empty object".into()));
    };
    let obj_type = ObjectType::from_u8(tag)?;
    Ok((tag, obj_type, body))
}

fn seal(tag: u8, aad: &[u8], plaintext: &[u8], crypto: &dyn CryptoEngine) -> Result<Vec<u8>> {
    let encrypted = crypto.encrypt(plaintext, aad)?;
    let mut out = Vec::with_capacity(1 + encrypted.len());
    out.push(tag);
    out.extend_from_slice(&encrypted);
    Ok(out)
}

fn expect_type(obj_type: ObjectType, expected_type: ObjectType) -> Result<()> {
    if obj_type != expected_type {
        return Err(VgerError::InvalidFormat(format!(
            "unexpected object type: expected {expected_type:?}, got {obj_type:?}"
        )));
    }
    Ok(())
}

/// Serialize a typed payload into an encrypted repo object.
///
/// Wire format (encrypted): `[1-byte type_tag][encrypted_blob]`
///   where encrypted_blob = `[12-byte nonce][ciphertext + 16-byte GCM tag]`
///
/// Wire format (plaintext): `[1-byte type_tag][plaintext]`
pub fn pack_object(
    obj_type: ObjectType,
    plaintext: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let tag = obj_type as u8;
    seal(tag, &legacy_aad(tag), plaintext, crypto)
}

/// Serialize a typed payload into an encrypted repo object and bind it to an
/// object identity context.
pub fn pack_object_with_context(
    obj_type: ObjectType,
    context: &[u8],
    plaintext: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let tag = obj_type as u8;
    seal(tag, &contextual_aad(tag, context), plaintext, crypto)
}

/// Deserialize and decrypt a repo object, ensuring its type tag matches.
///
/// The AEAD check runs before the type comparison, so a tampered object
/// always reports `DecryptionFailed`.
pub fn unpack_object_expect(
    data: &[u8],
    expected_type: ObjectType,
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let (tag, obj_type, encrypted) = parse_object_envelope(data)?;
    let plaintext = crypto.decrypt(encrypted, &legacy_aad(tag))?;
    expect_type(obj_type, expected_type)?;
    Ok(plaintext)
}

/// Context-bound variant of `unpack_object_expect`.
pub fn unpack_object_expect_with_context(
    data: &[u8],
    expected_type: ObjectType,
    context: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let (tag, obj_type, encrypted) = parse_object_envelope(data)?;
    let plaintext = crypto.decrypt(encrypted, &contextual_aad(tag, context))?;
    expect_type(obj_type, expected_type)?;
    Ok(plaintext)
}
