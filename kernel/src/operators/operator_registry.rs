//! `OperatorSetV1`: the governed operator catalog for one contract epoch.
//!
//! The set is the contract surface: every operator's masks, argument layout,
//! and relational region live here, and the canonical artifact
//! (`operator_registry.json`, schema `operator_registry.v1`) is
//! content-addressed so the `operator_set_digest` in every trace and tape
//! header commits to the exact contracts in force.
//!
//! Dispatch is `op_id` table lookup. New operator kinds are a registry
//! version bump, never a subclass.

use std::collections::BTreeMap;

use crate::carrier::code32::Code32;
use crate::operators::signature::{
    ArgBinding, OperatorCategory, PlaneMaskU32, PlaneMaskU8, RelationalBinding,
};
use crate::proof::canon::canonical_json_bytes;
use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Cost model for an operator. v1 defines unit cost only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CostModel {
    Unit,
}

impl CostModel {
    /// Canonical string for the registry artifact.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unit => "unit",
        }
    }

    /// Integer step cost.
    #[must_use]
    pub const fn step_cost(self) -> i64 {
        match self {
            Self::Unit => 1,
        }
    }
}

/// One operator's declared contract.
#[derive(Debug, Clone)]
pub struct OperatorDefV1 {
    pub op_id: Code32,
    /// Diagnostic name; never used for routing.
    pub name: String,
    pub category: OperatorCategory,
    /// Exact number of `Code32` args `apply()` expects.
    pub arg_slot_count: usize,
    pub precondition: PlaneMaskU32,
    pub effect: PlaneMaskU32,
    pub status_effect: Option<PlaneMaskU8>,
    pub arg_bindings: Vec<ArgBinding>,
    pub relational: Option<RelationalBinding>,
    pub cost_model: CostModel,
    pub contract_epoch: String,
}

/// Typed operator-set failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorSetError {
    /// Two entries share one `op_id`.
    DuplicateOpId { op_id: Code32 },
    /// An entry's `op_id` sits in the reserved sentinel domain.
    ReservedOpId { op_id: Code32 },
    /// An entry's mask planes disagree on lane count.
    MaskShapeMismatch { op_id: Code32, detail: String },
    /// An arg binding references a lane or arg index out of range.
    BindingOutOfRange { op_id: Code32, detail: String },
    /// Canonical JSON serialization failed.
    Canonicalization { detail: String },
}

impl std::fmt::Display for OperatorSetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateOpId { op_id } => write!(f, "duplicate op_id {op_id}"),
            Self::ReservedOpId { op_id } => {
                write!(f, "op_id {op_id} sits in the reserved sentinel domain")
            }
            Self::MaskShapeMismatch { op_id, detail } => {
                write!(f, "{op_id}: mask shape mismatch: {detail}")
            }
            Self::BindingOutOfRange { op_id, detail } => {
                write!(f, "{op_id}: arg binding out of range: {detail}")
            }
            Self::Canonicalization { detail } => write!(f, "canonicalization: {detail}"),
        }
    }
}

impl std::error::Error for OperatorSetError {}

/// The operator catalog: `Code32` -> contract, content-addressed.
#[derive(Debug, Clone)]
pub struct OperatorSetV1 {
    schema_version: String,
    entries: BTreeMap<Code32, OperatorDefV1>,
}

impl OperatorSetV1 {
    /// Build a set from entries, validating shapes and uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorSetError`] for duplicate or sentinel-domain ids,
    /// mismatched mask shapes, or out-of-range bindings.
    pub fn new(
        schema_version: impl Into<String>,
        defs: Vec<OperatorDefV1>,
    ) -> Result<Self, OperatorSetError> {
        let mut entries = BTreeMap::new();
        for def in defs {
            validate_def(&def)?;
            let op_id = def.op_id;
            if entries.insert(op_id, def).is_some() {
                return Err(OperatorSetError::DuplicateOpId { op_id });
            }
        }
        Ok(Self {
            schema_version: schema_version.into(),
            entries,
        })
    }

    /// Look up a contract by op id.
    #[must_use]
    pub fn get(&self, op_id: &Code32) -> Option<&OperatorDefV1> {
        self.entries.get(op_id)
    }

    /// Whether `op_id` is registered.
    #[must_use]
    pub fn contains(&self, op_id: &Code32) -> bool {
        self.entries.contains_key(op_id)
    }

    /// Number of operators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in canonical (op-id byte) order.
    pub fn iter(&self) -> impl Iterator<Item = (&Code32, &OperatorDefV1)> {
        self.entries.iter()
    }

    /// The artifact schema version string.
    #[must_use]
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Canonical `operator_registry.json` bytes.
    ///
    /// Entries are ordered by op-id bytes; every entry serializes its masks
    /// as `{"mask":[…],"value":[…]}` lane arrays. Relational operators carry
    /// `{"index_digest":…,"identity_region":…,"status_region":…}` so the set
    /// digest commits to their index identity and write regions.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorSetError::Canonicalization`] on serialization failure.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, OperatorSetError> {
        let entries: Vec<serde_json::Value> = self.entries.values().map(def_to_json).collect();
        let value = serde_json::json!({
            "entries": entries,
            "schema_version": self.schema_version,
        });
        canonical_json_bytes(&value).map_err(|e| OperatorSetError::Canonicalization {
            detail: e.to_string(),
        })
    }

    /// Content digest: `sha256(OPERATOR_REGISTRY || canonical_bytes)`.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorSetError::Canonicalization`] on serialization failure.
    pub fn digest(&self) -> Result<ContentHash, OperatorSetError> {
        Ok(canonical_hash(
            HashDomain::OperatorRegistry,
            &self.canonical_bytes()?,
        ))
    }

    /// Combined relational-index digest, if any operator is relational.
    ///
    /// Digest of the canonical `[[op_id_hex, index_digest], …]` list, sorted
    /// by op id. Trace headers bind this as `index_digest`; Cert verification
    /// rejects a header whose value differs.
    ///
    /// # Errors
    ///
    /// Returns [`OperatorSetError::Canonicalization`] on serialization failure.
    pub fn relational_index_digest(&self) -> Result<Option<ContentHash>, OperatorSetError> {
        let pairs: Vec<serde_json::Value> = self
            .entries
            .values()
            .filter_map(|def| {
                def.relational.as_ref().map(|rel| {
                    serde_json::json!([
                        hex::encode(def.op_id.to_le_bytes()),
                        rel.effect.index_digest().as_str(),
                    ])
                })
            })
            .collect();
        if pairs.is_empty() {
            return Ok(None);
        }
        let bytes = canonical_json_bytes(&serde_json::Value::Array(pairs)).map_err(|e| {
            OperatorSetError::Canonicalization {
                detail: e.to_string(),
            }
        })?;
        Ok(Some(canonical_hash(HashDomain::OperatorRegistry, &bytes)))
    }
}

fn validate_def(def: &OperatorDefV1) -> Result<(), OperatorSetError> {
    if def.op_id.is_sentinel() {
        return Err(OperatorSetError::ReservedOpId { op_id: def.op_id });
    }
    let lanes = def.precondition.lanes();
    if def.effect.lanes() != lanes {
        return Err(OperatorSetError::MaskShapeMismatch {
            op_id: def.op_id,
            detail: format!(
                "effect has {} lanes, precondition has {lanes}",
                def.effect.lanes()
            ),
        });
    }
    if let Some(status) = &def.status_effect {
        if status.lanes() != lanes {
            return Err(OperatorSetError::MaskShapeMismatch {
                op_id: def.op_id,
                detail: format!("status_effect has {} lanes, expected {lanes}", status.lanes()),
            });
        }
    }
    if let Some(rel) = &def.relational {
        if rel.identity_region.len() != lanes || rel.status_region.len() != lanes {
            return Err(OperatorSetError::MaskShapeMismatch {
                op_id: def.op_id,
                detail: "relational write region shape differs from masks".into(),
            });
        }
    }
    for binding in &def.arg_bindings {
        if binding.arg_index >= def.arg_slot_count {
            return Err(OperatorSetError::BindingOutOfRange {
                op_id: def.op_id,
                detail: format!(
                    "arg_index {} >= arg_slot_count {}",
                    binding.arg_index, def.arg_slot_count
                ),
            });
        }
        if binding.lane >= lanes {
            return Err(OperatorSetError::BindingOutOfRange {
                op_id: def.op_id,
                detail: format!("lane {} >= lane count {lanes}", binding.lane),
            });
        }
    }
    Ok(())
}

fn def_to_json(def: &OperatorDefV1) -> serde_json::Value {
    let op = def.op_id.to_le_bytes();
    let mut entry = serde_json::json!({
        "arg_byte_count": (def.arg_slot_count * 4) as u64,
        "arg_bindings": def.arg_bindings.iter().map(|b| serde_json::json!({
            "arg_index": b.arg_index as u64,
            "lane": b.lane as u64,
            "site": b.site.as_str(),
        })).collect::<Vec<_>>(),
        "category": def.category.code().to_string(),
        "contract_epoch": def.contract_epoch,
        "cost_model": def.cost_model.as_str(),
        "effect_mask": u32_mask_to_json(&def.effect),
        "name": def.name,
        "op_id": [u64::from(op[0]), u64::from(op[1]), u64::from(op[2]), u64::from(op[3])],
        "precondition_mask": u32_mask_to_json(&def.precondition),
    });
    if let Some(status) = &def.status_effect {
        entry["status_effect_mask"] = u8_mask_to_json(status);
    }
    if let Some(rel) = &def.relational {
        entry["relational"] = serde_json::json!({
            "identity_region": rel.identity_region.iter().map(|&m| u64::from(m)).collect::<Vec<_>>(),
            "index_digest": rel.effect.index_digest().as_str(),
            "status_region": rel.status_region.iter().map(|&m| u64::from(m)).collect::<Vec<_>>(),
        });
    }
    entry
}

fn u32_mask_to_json(plane: &PlaneMaskU32) -> serde_json::Value {
    serde_json::json!({
        "mask": plane.mask().iter().map(|&m| u64::from(m)).collect::<Vec<_>>(),
        "value": plane.value().iter().map(|&v| u64::from(v)).collect::<Vec<_>>(),
    })
}

fn u8_mask_to_json(plane: &PlaneMaskU8) -> serde_json::Value {
    serde_json::json!({
        "mask": plane.mask().iter().map(|&m| u64::from(m)).collect::<Vec<_>>(),
        "value": plane.value().iter().map(|&v| u64::from(v)).collect::<Vec<_>>(),
    })
}
