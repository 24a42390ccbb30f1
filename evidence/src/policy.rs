//! Policy snapshot: the auditable declaration of an episode's budgets and
//! determinism contract.
//!
//! The snapshot is a normative bundle artifact; its digest is bound into the
//! trace header and the tape header, committing every downstream digest to
//! the budgets in force.

use sterling_kernel::profile::ExecutionProfile;
use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_search::policy::SearchBudgets;

/// Canonical policy snapshot bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySnapshotV1 {
    pub bytes: Vec<u8>,
}

/// Typed policy-snapshot failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    Canonicalization { detail: String },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Canonicalization { detail } => write!(f, "canonicalization: {detail}"),
        }
    }
}

impl std::error::Error for PolicyError {}

impl PolicySnapshotV1 {
    /// Derive a snapshot from budgets and the execution profile.
    ///
    /// The cancel flag is runtime state, not policy; it never serializes.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Canonicalization`] on serialization failure.
    pub fn build(budgets: &SearchBudgets, profile: ExecutionProfile) -> Result<Self, PolicyError> {
        let value = serde_json::json!({
            "budgets": {
                "max_expansions": budgets.max_expansions,
                "max_steps": budgets.max_steps,
            },
            "determinism_contract": {
                "fixed_epoch": true,
                "no_env_reads": true,
                "no_wall_time": true,
            },
            "profile": profile.as_str(),
            "schema_version": "policy.v1",
        });
        let bytes = canonical_json_bytes(&value).map_err(|e| PolicyError::Canonicalization {
            detail: e.to_string(),
        })?;
        Ok(Self { bytes })
    }

    /// Content digest under the policy-snapshot domain.
    #[must_use]
    pub fn digest(&self) -> ContentHash {
        canonical_hash(HashDomain::PolicySnapshot, &self.bytes)
    }
}
