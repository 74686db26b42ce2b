//! Placeholder identity encoding.
//!
//! The provider id's first byte versions what is stored in the content id.
//! For version 1 the content id is the 40-character hex hash encoded as
//! UTF-16LE code units.

use crate::types::{ObjectHash, HASH_HEX_LEN};

pub const PLACEHOLDER_VERSION: u8 = 1;

pub fn placeholder_version_id() -> [u8; 1] {
    [PLACEHOLDER_VERSION]
}

pub fn placeholder_version_from_provider_id(provider_id: &[u8]) -> Option<u8> {
    provider_id.first().copied()
}

pub fn content_id_from_hash(hash: &ObjectHash) -> Vec<u8> {
    hash.to_hex()
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect()
}

/// Decode the hash from a content id. Trailing bytes past the hex string
/// are ignored.
pub fn hash_from_content_id(content_id: &[u8]) -> Option<ObjectHash> {
    let needed = HASH_HEX_LEN * 2;
    if content_id.len() < needed {
        return None;
    }
    let units: Vec<u16> = content_id[..needed]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let hex = String::from_utf16(&units).ok()?;
    ObjectHash::from_hex(&hex)
}
