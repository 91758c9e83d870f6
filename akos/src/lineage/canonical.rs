//! Canonical serialization and signing for lineage records.
//!
//! The signature is SHA-256 over the canonical JSON form of the record with
//! the `signature` field zeroed. Canonical means: object keys sorted at
//! every level, datetimes as ISO-8601 strings, unset optional fields
//! omitted. Routing serialization through `serde_json::Value` gives sorted
//! keys (its object map is ordered by key), so any two serializations of
//! the same record agree byte for byte; without that, chain verification
//! would be meaningless.

use sha2::{Digest, Sha256};

use crate::errors::KernelResult;
use crate::types::LineageRecord;

/// Canonical JSON with the signature field zeroed: the byte string that is
/// hashed to produce the record signature.
pub fn canonical_unsigned_json(record: &LineageRecord) -> KernelResult<String> {
    let mut value = serde_json::to_value(record)?;
    if let Some(object) = value.as_object_mut() {
        object.insert(
            "signature".to_string(),
            serde_json::Value::String(String::new()),
        );
    }
    Ok(serde_json::to_string(&value)?)
}

/// Canonical JSON of the record as stored, signature included.
pub fn canonical_json(record: &LineageRecord) -> KernelResult<String> {
    let value = serde_json::to_value(record)?;
    Ok(serde_json::to_string(&value)?)
}

/// SHA-256 hex signature over the canonical unsigned form.
pub fn compute_signature(record: &LineageRecord) -> KernelResult<String> {
    let canonical = canonical_unsigned_json(record)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}
