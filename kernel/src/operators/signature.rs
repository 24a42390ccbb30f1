//! Operator contract types: categories, plane masks, argument bindings, and
//! the relational-effect callback surface.
//!
//! # Taxonomy (S/M/P/K/C)
//!
//! - **S** (Seek): explore/navigate state space
//! - **M** (Memorize): commit/consolidate meaning
//! - **P** (Perceive): interpret context, update beliefs
//! - **K** (Knowledge): query/extend world knowledge
//! - **C** (Control): manage search flow
//!
//! # Mask model
//!
//! Preconditions and effects are full-plane `(mask, value)` pairs, one u32
//! per identity lane and one u8 per status lane:
//!
//! ```text
//! sat    = AND_i ((id_i & pre_mask_i) == (pre_val_i & pre_mask_i))
//! new_id = (id & !eff_mask) | (eff_val & eff_mask)
//! new_st = (st & !st_mask)  | (st_val & st_mask)
//! ```
//!
//! Argument bindings patch value lanes with `Code32` args at instantiation
//! time, so "write the code named by arg 0 into lane 12" stays a pure mask
//! operation. Effects whose target lanes depend on the current identity plane
//! (relational lookups) go through [`RelationalEffect`]: a pure callback that
//! may read the identity lanes and the args, and must stay inside a declared
//! write region.

use std::sync::Arc;

use crate::carrier::code32::Code32;
use crate::proof::hash::ContentHash;

/// Operator category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorCategory {
    Seek,
    Memorize,
    Perceive,
    Knowledge,
    Control,
}

impl OperatorCategory {
    /// Single-letter category code.
    #[must_use]
    pub const fn code(self) -> char {
        match self {
            Self::Seek => 'S',
            Self::Memorize => 'M',
            Self::Perceive => 'P',
            Self::Knowledge => 'K',
            Self::Control => 'C',
        }
    }

    /// Parse from the single-letter code.
    #[must_use]
    pub const fn parse(c: char) -> Option<Self> {
        match c {
            'S' => Some(Self::Seek),
            'M' => Some(Self::Memorize),
            'P' => Some(Self::Perceive),
            'K' => Some(Self::Knowledge),
            'C' => Some(Self::Control),
            _ => None,
        }
    }
}

/// Full-plane `(mask, value)` pair over u32 identity lanes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneMaskU32 {
    mask: Vec<u32>,
    value: Vec<u32>,
}

impl PlaneMaskU32 {
    /// All-zero mask over `lanes` lanes (matches everything, writes nothing).
    #[must_use]
    pub fn new(lanes: usize) -> Self {
        Self {
            mask: vec![0; lanes],
            value: vec![0; lanes],
        }
    }

    /// Set one lane's mask and value. Panics if out of bounds.
    pub fn set(&mut self, lane: usize, mask: u32, value: u32) -> &mut Self {
        self.mask[lane] = mask;
        self.value[lane] = value;
        self
    }

    /// Require a full-lane match of `code` at `lane`.
    pub fn require_code(&mut self, lane: usize, code: Code32) -> &mut Self {
        self.set(lane, u32::MAX, code.to_u32_le())
    }

    /// Write `code` into the whole lane at `lane`.
    pub fn write_code(&mut self, lane: usize, code: Code32) -> &mut Self {
        self.set(lane, u32::MAX, code.to_u32_le())
    }

    /// Number of lanes.
    #[must_use]
    pub fn lanes(&self) -> usize {
        self.mask.len()
    }

    /// The mask plane.
    #[must_use]
    pub fn mask(&self) -> &[u32] {
        &self.mask
    }

    /// The value plane.
    #[must_use]
    pub fn value(&self) -> &[u32] {
        &self.value
    }
}

/// Full-plane `(mask, value)` pair over u8 status lanes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaneMaskU8 {
    mask: Vec<u8>,
    value: Vec<u8>,
}

impl PlaneMaskU8 {
    /// All-zero mask over `lanes` lanes.
    #[must_use]
    pub fn new(lanes: usize) -> Self {
        Self {
            mask: vec![0; lanes],
            value: vec![0; lanes],
        }
    }

    /// Set one lane's mask and value. Panics if out of bounds.
    pub fn set(&mut self, lane: usize, mask: u8, value: u8) -> &mut Self {
        self.mask[lane] = mask;
        self.value[lane] = value;
        self
    }

    /// Write a full status byte at `lane`.
    pub fn write_status(&mut self, lane: usize, value: u8) -> &mut Self {
        self.set(lane, u8::MAX, value)
    }

    /// Number of lanes.
    #[must_use]
    pub fn lanes(&self) -> usize {
        self.mask.len()
    }

    /// The mask plane.
    #[must_use]
    pub fn mask(&self) -> &[u8] {
        &self.mask
    }

    /// The value plane.
    #[must_use]
    pub fn value(&self) -> &[u8] {
        &self.value
    }
}

/// Which value plane an argument patches at instantiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindSite {
    /// Patch `precondition.value[lane]` with the arg's u32 view.
    PreconditionValue,
    /// Patch `effect.value[lane]` with the arg's u32 view.
    EffectValue,
}

impl BindSite {
    /// Canonical string for the registry artifact.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreconditionValue => "precondition_value",
            Self::EffectValue => "effect_value",
        }
    }
}

/// One argument-to-lane binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgBinding {
    pub arg_index: usize,
    pub lane: usize,
    pub site: BindSite,
}

/// A single masked identity write produced by a relational callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneWrite {
    pub lane: usize,
    pub mask: u32,
    pub value: u32,
}

/// A single masked status write produced by a relational callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWrite {
    pub lane: usize,
    pub mask: u8,
    pub value: u8,
}

/// The write set a relational callback resolved from `(identity, args)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedWrites {
    pub identity: Vec<LaneWrite>,
    pub status: Vec<StatusWrite>,
}

/// Typed failure from a relational callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationalFault {
    pub detail: String,
}

/// Pure index callback for effects whose target lanes depend on identity.
///
/// The callback receives only the identity lanes and the args. It must be a
/// pure function of them: no state mutation, no clocks, no RNG, no
/// environment. Its index is content-addressed by [`Self::index_digest`],
/// which is committed into the operator-set artifact and the trace header.
pub trait RelationalEffect: Send + Sync {
    /// Content digest of the index this callback consults.
    fn index_digest(&self) -> &ContentHash;

    /// Resolve the concrete write set for `(identity, args)`.
    ///
    /// # Errors
    ///
    /// Returns [`RelationalFault`] when the index cannot resolve the args
    /// (e.g. an arg names an entity absent from the index).
    fn resolve(
        &self,
        identity: &[u32],
        args: &[Code32],
    ) -> Result<ResolvedWrites, RelationalFault>;
}

/// A relational callback plus its declared write region.
///
/// Resolved writes outside the region are an [`EffectMaskViolation`]
/// (`operators::apply`), so a buggy index cannot widen an operator's
/// footprint.
///
/// [`EffectMaskViolation`]: crate::operators::apply::ApplyError::EffectMaskViolation
#[derive(Clone)]
pub struct RelationalBinding {
    pub effect: Arc<dyn RelationalEffect>,
    /// Per-lane identity bits the callback may write.
    pub identity_region: Vec<u32>,
    /// Per-lane status bits the callback may write.
    pub status_region: Vec<u8>,
}

impl std::fmt::Debug for RelationalBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationalBinding")
            .field("index_digest", &self.effect.index_digest().as_str())
            .field("identity_region_lanes", &self.identity_region.len())
            .field("status_region_lanes", &self.status_region.len())
            .finish()
    }
}
