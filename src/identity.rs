/*!
 * Deterministic content-derived identities for records and filenames
 *
 * Every record that survives filtering gets a fixed-width integer
 * identity derived purely from its content, used downstream as a dedup
 * key and as the join key between relational output tables. The
 * contract is deliberately rigid: serialize with field names sorted
 * lexicographically at every nesting level, SHA-256 the canonical
 * bytes, and read the first `width_bytes` digest bytes as an unsigned
 * little-endian integer. Identical logical content yields the same
 * identity in any field order, in any run, on any machine; changing any
 * part of the convention would orphan previously issued identities.
 */

use std::path::Path;

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::constants::{DEFAULT_IDENTITY_WIDTH, MAX_IDENTITY_WIDTH};
use crate::{MrfError, Result};

/// Compute the identity of a record at the default 8-byte width.
///
/// ```
/// use serde_json::{Map, Value};
///
/// let mut record = Map::new();
/// record.insert("npi".to_string(), Value::from(1234567890u64));
/// record.insert("billing_code".to_string(), Value::from("99213"));
///
/// let id = mrf::identity::record_identity(&record).unwrap();
/// assert_eq!(id, mrf::identity::record_identity(&record).unwrap());
/// ```
pub fn record_identity(record: &Map<String, Value>) -> Result<u64> {
    record_identity_with_width(record, DEFAULT_IDENTITY_WIDTH)
}

/// Compute the identity of a record from the first `width_bytes` digest
/// bytes.
///
/// Collision probability is birthday-bounded at roughly
/// 2^(-8 * width_bytes); callers needing stronger guarantees choose a
/// larger width. Fails with [`MrfError::EmptyRecord`] for a record with
/// no fields — an empty record must never silently hash to a default —
/// and with a configuration error for widths outside `1..=8`.
pub fn record_identity_with_width(record: &Map<String, Value>, width_bytes: usize) -> Result<u64> {
    if record.is_empty() {
        return Err(MrfError::EmptyRecord);
    }
    if width_bytes == 0 || width_bytes > MAX_IDENTITY_WIDTH {
        return Err(MrfError::identity_width(width_bytes));
    }

    // serde_json maps are BTreeMap-backed in this crate (preserve_order
    // is not enabled), so objects serialize with keys in lexicographic
    // order at every nesting level. That ordering is the canonical form
    // the identity is defined over.
    let canonical = serde_json::to_vec(record)?;
    let digest = Sha256::digest(&canonical);

    let mut bytes = [0u8; MAX_IDENTITY_WIDTH];
    bytes[..width_bytes].copy_from_slice(&digest[..width_bytes]);
    Ok(u64::from_le_bytes(bytes))
}

/// Compute a record's identity and attach it under `field_name`.
///
/// All original fields are preserved, so a higher-level record can later
/// be hashed over its children's identities (rates join their file, for
/// example).
pub fn append_identity(record: &mut Map<String, Value>, field_name: &str) -> Result<u64> {
    let id = record_identity(record)?;
    record.insert(field_name.to_string(), Value::from(id));
    Ok(id)
}

/// Compute the identity of a source file name.
///
/// The name is reduced to its first dot-delimited segment — directories
/// and multi-part extensions stripped — before hashing the single-field
/// record `{"filename": stem}`. Files sharing a base name collide on
/// purpose: records re-derived from the same logical source carry the
/// same source-file id whether the payload was local, remote, or
/// compressed.
pub fn filename_identity(filename: &str) -> Result<u64> {
    let mut record = Map::new();
    record.insert(
        "filename".to_string(),
        Value::String(file_stem(filename).to_string()),
    );
    record_identity(&record)
}

/// First dot-delimited segment of the file name
fn file_stem(filename: &str) -> &str {
    Path::new(filename)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(filename)
        .split('.')
        .next()
        .unwrap_or("")
}
