//! `RegistryV1`: the bijective `Code32` <-> `ConceptID` mapping for one epoch.
//!
//! The registry proves the bijection. Within an epoch it is append-only:
//! [`RegistryV1::allocate`] can add codes, nothing can remove or remap one.
//! Remapping requires constructing a new registry under a bumped epoch and
//! replaying against the prior epoch.
//!
//! # Capacity policy
//!
//! Each `(domain, kind)` bucket holds at most [`LOCAL_ID_CEILING`] local ids
//! (the full u16 space). [`RegistryV1::capacity_check`] reports a warning once
//! a bucket reaches 90% occupancy; allocation past the ceiling fails closed
//! with [`RegistryError::CapacityExceeded`]; the remedy is a kind split and a
//! registry epoch bump, decided by the domain, not the core.

use std::collections::BTreeMap;

use crate::carrier::code32::Code32;
use crate::proof::canon::canonical_json_bytes;
use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Maximum local ids per `(domain, kind)` bucket.
pub const LOCAL_ID_CEILING: usize = 65_536;

/// Occupancy report for one `(domain, kind)` bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityReport {
    /// Allocated local ids in the bucket.
    pub used: usize,
    /// Always [`LOCAL_ID_CEILING`] in v1.
    pub ceiling: usize,
    /// True once `used >= 90%` of the ceiling.
    pub warning: bool,
}

/// Result of a successful [`RegistryV1::allocate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    /// The newly allocated code.
    pub code: Code32,
    /// Bucket occupancy after the allocation (carries the 90% warning flag).
    pub capacity: CapacityReport,
}

/// Compact descriptor binding an epoch to its content digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegistrySnapshotV1 {
    pub epoch: String,
    pub hash: String,
}

/// Typed registry failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A `Code32` was allocated twice.
    DuplicateCode { code: Code32, existing_concept: String },
    /// A `ConceptID` was mapped to two codes.
    DuplicateConcept {
        concept_id: String,
        existing_code: Code32,
        new_code: Code32,
    },
    /// Domain byte 0 is reserved for system sentinels.
    ReservedDomain { code: Code32 },
    /// A `(domain, kind)` bucket is full (65 536 local ids).
    CapacityExceeded { domain: u8, kind: u8 },
    /// A lookup failed for a code the caller required to exist.
    UnknownIdentity { code: Code32 },
    /// Canonical JSON serialization failed.
    Canonicalization { detail: String },
    /// `from_canonical_bytes` could not parse its input.
    Parse { detail: String },
    /// Input was valid JSON but not in canonical form.
    NotCanonical,
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateCode {
                code,
                existing_concept,
            } => write!(f, "{code} already allocated to '{existing_concept}'"),
            Self::DuplicateConcept {
                concept_id,
                existing_code,
                new_code,
            } => write!(
                f,
                "'{concept_id}' already mapped to {existing_code}, refusing {new_code}"
            ),
            Self::ReservedDomain { code } => {
                write!(f, "{code}: domain 0 is reserved for sentinels")
            }
            Self::CapacityExceeded { domain, kind } => {
                write!(f, "bucket ({domain},{kind}) is at the 65536 local-id ceiling")
            }
            Self::UnknownIdentity { code } => write!(f, "unknown identity: {code}"),
            Self::Canonicalization { detail } => write!(f, "canonicalization: {detail}"),
            Self::Parse { detail } => write!(f, "registry parse: {detail}"),
            Self::NotCanonical => write!(f, "registry bytes are not canonical JSON"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// A `Code32` registry for one epoch.
///
/// `BTreeMap`-backed so iteration order is the canonical code-byte order.
#[derive(Debug, Clone)]
pub struct RegistryV1 {
    epoch: String,
    forward: BTreeMap<Code32, String>,
    reverse: BTreeMap<String, Code32>,
    /// Next local id to hand out per `(domain, kind)` bucket.
    next_local: BTreeMap<(u8, u8), u32>,
}

impl RegistryV1 {
    /// Build a registry from an epoch and allocation pairs.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the bijection is violated or any code
    /// sits in the reserved sentinel domain.
    pub fn new(
        epoch: impl Into<String>,
        allocations: Vec<(Code32, String)>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self {
            epoch: epoch.into(),
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
            next_local: BTreeMap::new(),
        };
        for (code, concept_id) in allocations {
            registry.insert(code, concept_id)?;
        }
        Ok(registry)
    }

    fn insert(&mut self, code: Code32, concept_id: String) -> Result<(), RegistryError> {
        if code.domain() == 0 {
            return Err(RegistryError::ReservedDomain { code });
        }
        if let Some(existing) = self.forward.get(&code) {
            return Err(RegistryError::DuplicateCode {
                code,
                existing_concept: existing.clone(),
            });
        }
        if let Some(&existing_code) = self.reverse.get(&concept_id) {
            return Err(RegistryError::DuplicateConcept {
                concept_id,
                existing_code,
                new_code: code,
            });
        }
        let bucket = (code.domain(), code.kind());
        let next = self.next_local.entry(bucket).or_insert(0);
        *next = (*next).max(u32::from(code.local_id()) + 1);
        self.forward.insert(code, concept_id.clone());
        self.reverse.insert(concept_id, code);
        Ok(())
    }

    /// Allocate the next free local id in `(domain, kind)` for `concept_id`.
    ///
    /// Append-only: this is the only mutation the registry supports within an
    /// epoch.
    ///
    /// # Errors
    ///
    /// Fails closed with [`RegistryError::CapacityExceeded`] once the bucket
    /// holds 65 536 ids; also rejects the reserved domain and duplicate
    /// concept ids.
    pub fn allocate(
        &mut self,
        domain: u8,
        kind: u8,
        concept_id: impl Into<String>,
    ) -> Result<Allocation, RegistryError> {
        let next = self.next_local.get(&(domain, kind)).copied().unwrap_or(0);
        if next as usize >= LOCAL_ID_CEILING {
            return Err(RegistryError::CapacityExceeded { domain, kind });
        }
        #[allow(clippy::cast_possible_truncation)]
        let code = Code32::new(domain, kind, next as u16);
        self.insert(code, concept_id.into())?;
        Ok(Allocation {
            code,
            capacity: self.capacity_check(domain, kind),
        })
    }

    /// Occupancy of a `(domain, kind)` bucket, with the 90% warning flag.
    #[must_use]
    pub fn capacity_check(&self, domain: u8, kind: u8) -> CapacityReport {
        let used = self.next_local.get(&(domain, kind)).map_or(0, |&n| n as usize);
        CapacityReport {
            used,
            ceiling: LOCAL_ID_CEILING,
            warning: used * 10 >= LOCAL_ID_CEILING * 9,
        }
    }

    /// The epoch identifier.
    #[must_use]
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    /// Whether `code` is allocated.
    #[must_use]
    pub fn contains(&self, code: &Code32) -> bool {
        self.forward.contains_key(code)
    }

    /// Look up the code for a concept id.
    #[must_use]
    pub fn code_for(&self, concept_id: &str) -> Option<Code32> {
        self.reverse.get(concept_id).copied()
    }

    /// Look up the concept id for a code.
    #[must_use]
    pub fn concept_for(&self, code: &Code32) -> Option<&str> {
        self.forward.get(code).map(String::as_str)
    }

    /// Look up a concept id, failing with a typed [`RegistryError::UnknownIdentity`].
    ///
    /// Cert-profile callers propagate the error; Dev-profile callers record it
    /// to the tape as an identity fault and continue.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownIdentity`] for unallocated codes.
    pub fn require_concept(&self, code: &Code32) -> Result<&str, RegistryError> {
        self.concept_for(code)
            .ok_or(RegistryError::UnknownIdentity { code: *code })
    }

    /// Number of allocations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Canonical JSON bytes for this registry.
    ///
    /// Format: `{"entries":[{"code":[b0,b1,b2,b3],"concept_id":"…"},…],"epoch":"…"}`
    /// with entries sorted by code bytes.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Canonicalization`] on serialization failure.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, RegistryError> {
        let entries: Vec<serde_json::Value> = self
            .forward
            .iter()
            .map(|(code, concept_id)| {
                let b = code.to_le_bytes();
                serde_json::json!({
                    "code": [u64::from(b[0]), u64::from(b[1]), u64::from(b[2]), u64::from(b[3])],
                    "concept_id": concept_id,
                })
            })
            .collect();
        let value = serde_json::json!({
            "entries": entries,
            "epoch": self.epoch,
        });
        canonical_json_bytes(&value).map_err(|e| RegistryError::Canonicalization {
            detail: e.to_string(),
        })
    }

    /// Strict inverse of [`Self::canonical_bytes`].
    ///
    /// Re-canonicalizes the reconstructed registry and rejects input that does
    /// not match byte-for-byte.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Parse`] for structural problems,
    /// [`RegistryError::NotCanonical`] for non-canonical input, and bijection
    /// errors propagated from [`Self::new`].
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<Self, RegistryError> {
        let value: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|e| RegistryError::Parse {
                detail: format!("JSON parse: {e}"),
            })?;
        let obj = value.as_object().ok_or_else(|| RegistryError::Parse {
            detail: "expected JSON object".into(),
        })?;

        let epoch = obj
            .get("epoch")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| RegistryError::Parse {
                detail: "missing or non-string 'epoch'".into(),
            })?
            .to_string();

        let entries = obj
            .get("entries")
            .and_then(serde_json::Value::as_array)
            .ok_or_else(|| RegistryError::Parse {
                detail: "missing or non-array 'entries'".into(),
            })?;

        let mut allocations = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let entry = entry.as_object().ok_or_else(|| RegistryError::Parse {
                detail: format!("entries[{i}]: expected object"),
            })?;
            let concept_id = entry
                .get("concept_id")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| RegistryError::Parse {
                    detail: format!("entries[{i}]: missing 'concept_id'"),
                })?;
            let code_arr = entry
                .get("code")
                .and_then(serde_json::Value::as_array)
                .ok_or_else(|| RegistryError::Parse {
                    detail: format!("entries[{i}]: missing 'code' array"),
                })?;
            if code_arr.len() != 4 {
                return Err(RegistryError::Parse {
                    detail: format!("entries[{i}]: code must have 4 bytes"),
                });
            }
            let mut code_bytes = [0u8; 4];
            for (j, v) in code_arr.iter().enumerate() {
                let n = v.as_u64().ok_or_else(|| RegistryError::Parse {
                    detail: format!("entries[{i}].code[{j}]: expected integer"),
                })?;
                code_bytes[j] = u8::try_from(n).map_err(|_| RegistryError::Parse {
                    detail: format!("entries[{i}].code[{j}]: {n} > 255"),
                })?;
            }
            allocations.push((Code32::from_le_bytes(code_bytes), concept_id.to_string()));
        }

        let registry = Self::new(epoch, allocations)?;
        if registry.canonical_bytes()? != bytes {
            return Err(RegistryError::NotCanonical);
        }
        Ok(registry)
    }

    /// Content digest: `sha256(REGISTRY_SNAPSHOT || canonical_bytes)`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Canonicalization`] on serialization failure.
    pub fn digest(&self) -> Result<ContentHash, RegistryError> {
        Ok(canonical_hash(
            HashDomain::RegistrySnapshot,
            &self.canonical_bytes()?,
        ))
    }

    /// Compact snapshot descriptor for headers and manifests.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Canonicalization`] if the digest cannot be
    /// computed.
    pub fn snapshot(&self) -> Result<RegistrySnapshotV1, RegistryError> {
        Ok(RegistrySnapshotV1 {
            epoch: self.epoch.clone(),
            hash: self.digest()?.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegistryV1 {
        RegistryV1::new(
            "epoch-0",
            vec![
                (Code32::new(2, 1, 0), "rome:node:capitolium".into()),
                (Code32::new(2, 1, 3), "rome:node:forum".into()),
                (Code32::new(2, 1, 5), "rome:node:colosseum".into()),
                (Code32::new(2, 64, 1), "rome:op:move_to_neighbor".into()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn membership_and_bijection() {
        let reg = sample();
        assert!(reg.contains(&Code32::new(2, 1, 3)));
        assert!(!reg.contains(&Code32::new(2, 1, 4)));
        assert_eq!(
            reg.code_for("rome:node:forum"),
            Some(Code32::new(2, 1, 3))
        );
        assert_eq!(
            reg.concept_for(&Code32::new(2, 64, 1)),
            Some("rome:op:move_to_neighbor")
        );
        assert_eq!(reg.code_for("absent"), None);
    }

    #[test]
    fn require_concept_typed_fault() {
        let reg = sample();
        assert!(reg.require_concept(&Code32::new(2, 1, 0)).is_ok());
        let err = reg.require_concept(&Code32::new(9, 9, 9)).unwrap_err();
        assert!(matches!(err, RegistryError::UnknownIdentity { .. }));
    }

    #[test]
    fn rejects_duplicate_code() {
        let result = RegistryV1::new(
            "e",
            vec![
                (Code32::new(1, 0, 0), "a".into()),
                (Code32::new(1, 0, 0), "b".into()),
            ],
        );
        assert!(matches!(result, Err(RegistryError::DuplicateCode { .. })));
    }

    #[test]
    fn rejects_duplicate_concept() {
        let result = RegistryV1::new(
            "e",
            vec![
                (Code32::new(1, 0, 0), "same".into()),
                (Code32::new(1, 0, 1), "same".into()),
            ],
        );
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateConcept { .. })
        ));
    }

    #[test]
    fn rejects_sentinel_domain() {
        let result = RegistryV1::new("e", vec![(Code32::new(0, 3, 1), "x".into())]);
        assert!(matches!(result, Err(RegistryError::ReservedDomain { .. })));
    }

    #[test]
    fn allocate_assigns_sequential_ids() {
        let mut reg = RegistryV1::new("e", vec![]).unwrap();
        let a = reg.allocate(3, 1, "first").unwrap();
        let b = reg.allocate(3, 1, "second").unwrap();
        assert_eq!(a.code, Code32::new(3, 1, 0));
        assert_eq!(b.code, Code32::new(3, 1, 1));
        assert_eq!(reg.capacity_check(3, 1).used, 2);
    }

    #[test]
    fn allocate_continues_past_seeded_ids() {
        let mut reg =
            RegistryV1::new("e", vec![(Code32::new(3, 1, 7), "seed".into())]).unwrap();
        let next = reg.allocate(3, 1, "next").unwrap();
        assert_eq!(next.code, Code32::new(3, 1, 8));
    }

    #[test]
    fn capacity_warning_at_ninety_percent() {
        let report = CapacityReport {
            used: 58_982, // ceil(0.9 * 65536)
            ceiling: LOCAL_ID_CEILING,
            warning: 58_982 * 10 >= LOCAL_ID_CEILING * 9,
        };
        assert!(report.warning);
        let mut reg = RegistryV1::new("e", vec![]).unwrap();
        reg.allocate(4, 1, "only").unwrap();
        assert!(!reg.capacity_check(4, 1).warning);
    }

    #[test]
    fn capacity_fails_closed_at_ceiling() {
        // Seed the bucket at the last valid local id rather than allocating
        // 65 536 times; allocate() continues from max + 1.
        let mut reg =
            RegistryV1::new("e", vec![(Code32::new(5, 2, u16::MAX), "last".into())]).unwrap();
        let err = reg.allocate(5, 2, "overflow").unwrap_err();
        assert!(matches!(
            err,
            RegistryError::CapacityExceeded { domain: 5, kind: 2 }
        ));
    }

    #[test]
    fn canonical_bytes_sorted_and_stable() {
        let reg = sample();
        let bytes = reg.canonical_bytes().unwrap();
        let s = std::str::from_utf8(&bytes).unwrap();
        assert!(s.starts_with("{\"entries\":"));
        assert!(s.contains("\"epoch\":\"epoch-0\""));
        for _ in 0..10 {
            assert_eq!(reg.canonical_bytes().unwrap(), bytes);
        }
    }

    #[test]
    fn canonical_bytes_insertion_order_independent() {
        let forward = RegistryV1::new(
            "e",
            vec![
                (Code32::new(1, 0, 0), "a".into()),
                (Code32::new(1, 0, 1), "b".into()),
            ],
        )
        .unwrap();
        let reversed = RegistryV1::new(
            "e",
            vec![
                (Code32::new(1, 0, 1), "b".into()),
                (Code32::new(1, 0, 0), "a".into()),
            ],
        )
        .unwrap();
        assert_eq!(
            forward.canonical_bytes().unwrap(),
            reversed.canonical_bytes().unwrap()
        );
        assert_eq!(forward.digest().unwrap(), reversed.digest().unwrap());
    }

    #[test]
    fn round_trip_from_canonical_bytes() {
        let reg = sample();
        let bytes = reg.canonical_bytes().unwrap();
        let restored = RegistryV1::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(restored.epoch(), reg.epoch());
        assert_eq!(restored.len(), reg.len());
        assert_eq!(restored.digest().unwrap(), reg.digest().unwrap());
    }

    #[test]
    fn from_canonical_bytes_rejects_pretty_printed() {
        let reg = sample();
        let value: serde_json::Value =
            serde_json::from_slice(&reg.canonical_bytes().unwrap()).unwrap();
        let pretty = serde_json::to_vec_pretty(&value).unwrap();
        let err = RegistryV1::from_canonical_bytes(&pretty).unwrap_err();
        assert!(matches!(err, RegistryError::NotCanonical));
    }

    #[test]
    fn from_canonical_bytes_rejects_garbage_and_bad_shapes() {
        for bad in [
            b"not json".as_slice(),
            br#"[1,2,3]"#.as_slice(),
            br#"{"entries":[]}"#.as_slice(),
            br#"{"epoch":"e"}"#.as_slice(),
            br#"{"entries":[{"code":[1,0,0],"concept_id":"x"}],"epoch":"e"}"#.as_slice(),
            br#"{"entries":[{"code":[256,0,0,0],"concept_id":"x"}],"epoch":"e"}"#.as_slice(),
            br#"{"entries":[{"code":[1,0,0,0]}],"epoch":"e"}"#.as_slice(),
        ] {
            let err = RegistryV1::from_canonical_bytes(bad).unwrap_err();
            assert!(
                matches!(err, RegistryError::Parse { .. }),
                "expected Parse for {:?}, got {err:?}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn digest_shape_and_determinism() {
        let reg = sample();
        let digest = reg.digest().unwrap();
        assert_eq!(digest.algorithm(), "sha256");
        assert_eq!(digest.hex_digest().len(), 64);
        for _ in 0..10 {
            assert_eq!(reg.digest().unwrap(), digest);
        }
    }

    #[test]
    fn snapshot_binds_epoch_and_digest() {
        let reg = sample();
        let snap = reg.snapshot().unwrap();
        assert_eq!(snap.epoch, "epoch-0");
        assert_eq!(snap.hash, reg.digest().unwrap().as_str());
    }

    #[test]
    fn empty_registry_still_digests() {
        let reg = RegistryV1::new("empty", vec![]).unwrap();
        assert!(reg.is_empty());
        assert_eq!(reg.len(), 0);
        assert_eq!(reg.digest().unwrap().algorithm(), "sha256");
    }
}
