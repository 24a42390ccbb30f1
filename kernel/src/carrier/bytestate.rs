//! `ByteStateV1`: the two-plane packed state tensor.
//!
//! # Layout
//!
//! - Identity plane: `layer_count * slot_count` u32 lanes, each a `Code32` in
//!   little-endian integer view. Serialized as `4 * L * S` bytes.
//! - Status plane: `layer_count * slot_count` bytes of [`SlotStatus`].
//!
//! # Equality semantics
//!
//! The type deliberately does **not** derive `Eq` or `Hash`.
//!
//! - Search/dedup equality: identity plane only, [`ByteStateV1::identity_eq`].
//! - Replay evidence equality: both planes, [`ByteStateV1::bitwise_eq`].
//!
//! Status never participates in identity; promoting a slot's governance
//! status must not perturb search frontiers or cycle detection.
//!
//! # Mutation discipline
//!
//! The public surface has no setter. States are born from a schema (all
//! padding), from the compile boundary via [`ByteStateBuilder`], or from
//! `operators::apply` (crate-internal plane constructor). After construction a
//! state is a value; effects produce new values.

use crate::carrier::code32::Code32;
use crate::carrier::schema::ByteStateSchema;
use crate::proof::hash::{canonical_hash, ContentHash};
use crate::proof::hash_domain::HashDomain;

/// Slot governance status, ordered by promotion level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SlotStatus {
    /// Empty / unresolved semantics.
    Hole = 0,
    /// Exploratory only, lowest confidence.
    Shadow = 64,
    /// Under evaluation, tentatively placed.
    Provisional = 128,
    /// Passed the evaluation gate, awaiting certification.
    Promoted = 192,
    /// Fully certified and grounded.
    Certified = 255,
}

impl SlotStatus {
    /// Strict conversion from a raw byte.
    #[must_use]
    pub const fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Hole),
            64 => Some(Self::Shadow),
            128 => Some(Self::Provisional),
            192 => Some(Self::Promoted),
            255 => Some(Self::Certified),
            _ => None,
        }
    }

    /// The raw byte value.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Two-plane packed state tensor.
#[derive(Debug, Clone)]
pub struct ByteStateV1 {
    layer_count: usize,
    slot_count: usize,
    /// Identity plane as u32 lanes (LE integer view of `Code32`).
    identity: Vec<u32>,
    /// Status plane, one byte per lane.
    status: Vec<u8>,
}

impl ByteStateV1 {
    /// All-padding state for a schema: identity = padding code, status = Hole.
    #[must_use]
    pub fn from_schema(schema: &ByteStateSchema) -> Self {
        let lanes = schema.lane_count();
        Self {
            layer_count: schema.layer_count,
            slot_count: schema.slot_count,
            identity: vec![schema.padding_code.to_u32_le(); lanes],
            status: vec![SlotStatus::Hole.to_byte(); lanes],
        }
    }

    /// Crate-internal plane constructor for `apply` and replay.
    ///
    /// Callers guarantee plane lengths equal `layer_count * slot_count` and
    /// every status byte is a valid discriminant.
    pub(crate) fn from_planes(
        layer_count: usize,
        slot_count: usize,
        identity: Vec<u32>,
        status: Vec<u8>,
    ) -> Self {
        debug_assert_eq!(identity.len(), layer_count * slot_count);
        debug_assert_eq!(status.len(), layer_count * slot_count);
        Self {
            layer_count,
            slot_count,
            identity,
            status,
        }
    }

    /// Number of layers.
    #[must_use]
    pub const fn layer_count(&self) -> usize {
        self.layer_count
    }

    /// Number of slots per layer.
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Identity plane byte length (`4 * L * S`).
    #[must_use]
    pub const fn identity_byte_len(&self) -> usize {
        self.layer_count * self.slot_count * 4
    }

    /// Status plane byte length (`L * S`).
    #[must_use]
    pub const fn status_byte_len(&self) -> usize {
        self.layer_count * self.slot_count
    }

    /// Zero-copy view of the identity plane as u32 lanes.
    #[must_use]
    pub fn view_identity_u32(&self) -> &[u32] {
        &self.identity
    }

    /// Zero-copy view of the status plane.
    #[must_use]
    pub fn view_status_u8(&self) -> &[u8] {
        &self.status
    }

    /// Identity plane serialized little-endian (the hashing byte order).
    #[must_use]
    pub fn identity_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.identity_byte_len());
        for lane in &self.identity {
            buf.extend_from_slice(&lane.to_le_bytes());
        }
        buf
    }

    /// Status plane bytes.
    #[must_use]
    pub fn status_bytes(&self) -> Vec<u8> {
        self.status.clone()
    }

    /// Evidence bytes: identity plane followed by status plane.
    #[must_use]
    pub fn evidence_bytes(&self) -> Vec<u8> {
        let mut buf = self.identity_bytes();
        buf.extend_from_slice(&self.status);
        buf
    }

    /// Identity digest: `sha256(BYTESTATE_IDENTITY || identity_bytes)`.
    #[must_use]
    pub fn identity_hash(&self) -> ContentHash {
        canonical_hash(HashDomain::BytestateIdentity, &self.identity_bytes())
    }

    /// Evidence digest: `sha256(BYTESTATE_EVIDENCE || identity || status)`.
    #[must_use]
    pub fn evidence_hash(&self) -> ContentHash {
        canonical_hash(HashDomain::BytestateEvidence, &self.evidence_bytes())
    }

    /// Identity-plane equality (search/dedup semantics).
    #[must_use]
    pub fn identity_eq(&self, other: &Self) -> bool {
        self.layer_count == other.layer_count
            && self.slot_count == other.slot_count
            && self.identity == other.identity
    }

    /// Both-plane equality (replay evidence semantics).
    #[must_use]
    pub fn bitwise_eq(&self, other: &Self) -> bool {
        self.identity_eq(other) && self.status == other.status
    }

    /// `Code32` at `(layer, slot)`. Panics if out of bounds.
    #[must_use]
    pub fn identity_at(&self, layer: usize, slot: usize) -> Code32 {
        Code32::from_u32_le(self.identity[layer * self.slot_count + slot])
    }

    /// `SlotStatus` at `(layer, slot)`. Panics if out of bounds. States built
    /// through kernel constructors only hold valid discriminants; an invalid
    /// byte reads as `Hole` rather than panicking in the hot path.
    #[must_use]
    pub fn status_at(&self, layer: usize, slot: usize) -> SlotStatus {
        let byte = self.status[layer * self.slot_count + slot];
        SlotStatus::from_byte(byte).unwrap_or(SlotStatus::Hole)
    }
}

/// Builder used at the compile boundary.
///
/// Compilers stage identity/status writes and then seal the state with
/// [`ByteStateBuilder::finish`]; the sealed value has no setters.
#[derive(Debug)]
pub struct ByteStateBuilder {
    layer_count: usize,
    slot_count: usize,
    identity: Vec<u32>,
    status: Vec<u8>,
}

impl ByteStateBuilder {
    /// Start from a schema's all-padding state.
    #[must_use]
    pub fn from_schema(schema: &ByteStateSchema) -> Self {
        let lanes = schema.lane_count();
        Self {
            layer_count: schema.layer_count,
            slot_count: schema.slot_count,
            identity: vec![schema.padding_code.to_u32_le(); lanes],
            status: vec![SlotStatus::Hole.to_byte(); lanes],
        }
    }

    /// Stage an identity write. Panics if out of bounds.
    pub fn set_identity(&mut self, layer: usize, slot: usize, code: Code32) -> &mut Self {
        self.identity[layer * self.slot_count + slot] = code.to_u32_le();
        self
    }

    /// Stage a status write. Panics if out of bounds.
    pub fn set_status(&mut self, layer: usize, slot: usize, status: SlotStatus) -> &mut Self {
        self.status[layer * self.slot_count + slot] = status.to_byte();
        self
    }

    /// Seal the staged planes into an immutable state.
    #[must_use]
    pub fn finish(self) -> ByteStateV1 {
        ByteStateV1 {
            layer_count: self.layer_count,
            slot_count: self.slot_count,
            identity: self.identity,
            status: self.status,
        }
    }
}
