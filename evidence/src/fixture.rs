//! Episode fixture: the content commitment to the domain payload.

use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;

/// Canonical fixture bytes: world id + the payload that was compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureV1 {
    pub bytes: Vec<u8>,
}

/// Typed fixture failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    /// Payload bytes are not valid JSON.
    PayloadInvalid { detail: String },
    /// Canonical serialization failed (floats in the payload).
    Canonicalization { detail: String },
}

impl std::fmt::Display for FixtureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PayloadInvalid { detail } => write!(f, "invalid fixture payload: {detail}"),
            Self::Canonicalization { detail } => write!(f, "canonicalization: {detail}"),
        }
    }
}

impl std::error::Error for FixtureError {}

impl FixtureV1 {
    /// Build a fixture from a world id and its JSON payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`FixtureError`] for non-JSON payloads or float content.
    pub fn build(world_id: &str, payload: &[u8]) -> Result<Self, FixtureError> {
        let payload_value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| FixtureError::PayloadInvalid {
                detail: format!("JSON parse: {e}"),
            })?;
        let value = serde_json::json!({
            "payload": payload_value,
            "schema_version": "fixture.v1",
            "world_id": world_id,
        });
        let bytes = canonical_json_bytes(&value).map_err(|e| FixtureError::Canonicalization {
            detail: e.to_string(),
        })?;
        Ok(Self { bytes })
    }

    /// Content digest under the fixture domain.
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        canonical_hash(HashDomain::Fixture, &self.bytes)
    }
}
