use hammer_core::errors::{ErrorInfo, HammerError};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Encodes a payload as canonical JSON bytes (object keys sorted, no whitespace).
pub fn to_canonical_json_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, HammerError> {
    // Round-tripping through `Value` sorts object keys (serde_json's default map is ordered).
    let value = serde_json::to_value(value).map_err(|err| {
        HammerError::Serde(ErrorInfo::new("canonical-json-encode", err.to_string()))
    })?;
    serde_json::to_vec(&value)
        .map_err(|err| HammerError::Serde(ErrorInfo::new("canonical-json-write", err.to_string())))
}

/// Computes a stable hexadecimal hash for the provided serializable payload.
pub fn stable_hash_string<T: Serialize>(value: &T) -> Result<String, HammerError> {
    let bytes = to_canonical_json_bytes(value)?;
    let digest = Sha256::digest(bytes);
    Ok(format!("{:x}", digest))
}
