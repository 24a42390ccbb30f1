//! `ByteStateSchema`: the fixed per-domain layout of a `ByteState`.
//!
//! Schemas are frozen per epoch. There is no mutation API; evolving a layout
//! means minting a new schema value with a bumped version between episodes.

use crate::carrier::code32::Code32;
use crate::proof::canon::canonical_json_bytes;
use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Slot ordering rule. v1 defines row-major only; the enum exists so a new
/// rule is a schema version bump, not a silent reinterpretation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderingRule {
    /// Lane index = `layer * slot_count + slot`.
    RowMajor,
}

impl OrderingRule {
    /// Canonical string for serialization.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RowMajor => "row_major",
        }
    }

    /// Parse from canonical string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "row_major" => Some(Self::RowMajor),
            _ => None,
        }
    }
}

/// Plane byte order. v1 is little-endian everywhere; the field exists so the
/// schema digest commits to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
}

impl ByteOrder {
    /// Canonical string for serialization.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Little => "little",
        }
    }
}

/// Typed schema validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Zero layers or zero slots.
    EmptyDimensions,
    /// `layer_semantics` length does not equal `layer_count`.
    LayerSemanticsMismatch { expected: usize, actual: usize },
    /// The padding code must be a system sentinel.
    NonSentinelPadding { code: Code32 },
    /// Canonical JSON serialization failed.
    Canonicalization { detail: String },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDimensions => write!(f, "schema dimensions must be nonzero"),
            Self::LayerSemanticsMismatch { expected, actual } => {
                write!(f, "layer_semantics has {actual} entries, expected {expected}")
            }
            Self::NonSentinelPadding { code } => {
                write!(f, "padding code {code} is not a sentinel")
            }
            Self::Canonicalization { detail } => write!(f, "canonicalization: {detail}"),
        }
    }
}

impl std::error::Error for SchemaError {}

/// Fixed layout descriptor for one domain's `ByteState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteStateSchema {
    pub schema_version: String,
    pub domain_id: String,
    pub layer_count: usize,
    pub slot_count: usize,
    /// One human-readable tag per layer (e.g. `"current"`, `"visited"`).
    pub layer_semantics: Vec<String>,
    pub padding_code: Code32,
    pub ordering_rule: OrderingRule,
    pub byte_order: ByteOrder,
}

impl ByteStateSchema {
    /// Construct a v1 row-major little-endian schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] for zero dimensions, a semantics list that does
    /// not match `layer_count`, or a non-sentinel padding code.
    pub fn new(
        schema_version: impl Into<String>,
        domain_id: impl Into<String>,
        layer_count: usize,
        slot_count: usize,
        layer_semantics: Vec<String>,
    ) -> Result<Self, SchemaError> {
        let schema = Self {
            schema_version: schema_version.into(),
            domain_id: domain_id.into(),
            layer_count,
            slot_count,
            layer_semantics,
            padding_code: Code32::PADDING,
            ordering_rule: OrderingRule::RowMajor,
            byte_order: ByteOrder::Little,
        };
        schema.validate()?;
        Ok(schema)
    }

    /// Re-check the structural invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated [`SchemaError`].
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.layer_count == 0 || self.slot_count == 0 {
            return Err(SchemaError::EmptyDimensions);
        }
        if self.layer_semantics.len() != self.layer_count {
            return Err(SchemaError::LayerSemanticsMismatch {
                expected: self.layer_count,
                actual: self.layer_semantics.len(),
            });
        }
        if !self.padding_code.is_sentinel() {
            return Err(SchemaError::NonSentinelPadding {
                code: self.padding_code,
            });
        }
        Ok(())
    }

    /// Total lane count (`layer_count * slot_count`).
    #[must_use]
    pub const fn lane_count(&self) -> usize {
        self.layer_count * self.slot_count
    }

    /// Flat lane index for `(layer, slot)` under the ordering rule.
    #[must_use]
    pub const fn lane(&self, layer: usize, slot: usize) -> usize {
        match self.ordering_rule {
            OrderingRule::RowMajor => layer * self.slot_count + slot,
        }
    }

    /// Inverse of [`Self::lane`].
    #[must_use]
    pub const fn lane_position(&self, lane: usize) -> (usize, usize) {
        match self.ordering_rule {
            OrderingRule::RowMajor => (lane / self.slot_count, lane % self.slot_count),
        }
    }

    /// Canonical JSON bytes of the schema bundle.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Canonicalization`] on serialization failure.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, SchemaError> {
        let pad = self.padding_code.to_le_bytes();
        let value = serde_json::json!({
            "byte_order": self.byte_order.as_str(),
            "domain_id": self.domain_id,
            "layer_count": self.layer_count as u64,
            "layer_semantics": self.layer_semantics,
            "ordering_rule": self.ordering_rule.as_str(),
            "padding_code": [u64::from(pad[0]), u64::from(pad[1]), u64::from(pad[2]), u64::from(pad[3])],
            "schema_version": self.schema_version,
            "slot_count": self.slot_count as u64,
        });
        canonical_json_bytes(&value).map_err(|e| SchemaError::Canonicalization {
            detail: e.to_string(),
        })
    }

    /// Content digest under the schema-bundle domain.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Canonicalization`] on serialization failure.
    pub fn digest(&self) -> Result<ContentHash, SchemaError> {
        Ok(canonical_hash(
            HashDomain::BytestateSchemaBundle,
            &self.canonical_bytes()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rome_schema() -> ByteStateSchema {
        ByteStateSchema::new(
            "bytestate.v1",
            "rome",
            4,
            32,
            vec![
                "current".into(),
                "goal".into(),
                "visited".into(),
                "path".into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn lane_arithmetic_row_major() {
        let schema = rome_schema();
        assert_eq!(schema.lane_count(), 128);
        assert_eq!(schema.lane(0, 0), 0);
        assert_eq!(schema.lane(1, 0), 32);
        assert_eq!(schema.lane(2, 5), 69);
        assert_eq!(schema.lane_position(69), (2, 5));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let err = ByteStateSchema::new("v1", "d", 0, 8, vec![]).unwrap_err();
        assert!(matches!(err, SchemaError::EmptyDimensions));
    }

    #[test]
    fn rejects_semantics_mismatch() {
        let err =
            ByteStateSchema::new("v1", "d", 2, 8, vec!["only_one".into()]).unwrap_err();
        assert!(matches!(err, SchemaError::LayerSemanticsMismatch { .. }));
    }

    #[test]
    fn rejects_non_sentinel_padding() {
        let mut schema = rome_schema();
        schema.padding_code = Code32::new(3, 3, 3);
        let err = schema.validate().unwrap_err();
        assert!(matches!(err, SchemaError::NonSentinelPadding { .. }));
    }

    #[test]
    fn canonical_bytes_sorted_keys() {
        let bytes = rome_schema().canonical_bytes().unwrap();
        let s = std::str::from_utf8(&bytes).unwrap();
        assert!(s.starts_with("{\"byte_order\":\"little\""));
        assert!(s.contains("\"ordering_rule\":\"row_major\""));
        assert!(!s.contains(' '));
    }

    #[test]
    fn digest_deterministic_n10() {
        let schema = rome_schema();
        let first = schema.digest().unwrap();
        for _ in 0..10 {
            assert_eq!(schema.digest().unwrap(), first);
        }
    }

    #[test]
    fn digest_changes_with_dimensions() {
        let a = rome_schema();
        let b = ByteStateSchema::new(
            "bytestate.v1",
            "rome",
            2,
            32,
            vec!["current".into(), "goal".into()],
        )
        .unwrap();
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn ordering_rule_round_trip() {
        assert_eq!(
            OrderingRule::parse(OrderingRule::RowMajor.as_str()),
            Some(OrderingRule::RowMajor)
        );
        assert_eq!(OrderingRule::parse("column_major"), None);
    }
}
