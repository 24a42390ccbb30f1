//! Trace payload hashing.
//!
//! One claim surface: `sha256(BYTETRACE || magic || header_len || header  || 
//! body || footer_len || footer)`. The envelope never participates.

use crate::carrier::bytetrace::{ByteTraceV1, TraceError};
use crate::carrier::trace_writer::extract_payload_bytes;
use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Payload hash of an assembled trace.
///
/// # Errors
///
/// Returns [`TraceError`] if the trace fails structural validation during
/// payload extraction.
pub fn payload_hash(trace: &ByteTraceV1) -> Result<ContentHash, TraceError> {
    Ok(payload_hash_of_bytes(&extract_payload_bytes(trace)?))
}

/// Payload hash of already-extracted payload bytes.
#[must_use]
pub fn payload_hash_of_bytes(payload: &[u8]) -> ContentHash {
    canonical_hash(HashDomain::ByteTrace, payload)
}
