//! Mastermind: a 2x16 probe world for identity/evidence independence.
//!
//! Layers: `belief` (color codes, initially all Provisional) and `feedback`.
//! Two operators:
//!
//! - `PROBE (5,64,1)` writes a feedback code into the feedback layer at the
//!   slot named by arg 0 and certifies that feedback slot.
//! - `MARK (5,64,2)` is status-only: certifies the belief slot named by arg 0.
//!   Its identity footprint is empty, which is exactly what the
//!   identity-vs-evidence hash tests lean on.

use std::sync::Arc;

use sterling_kernel::carrier::bytestate::{ByteStateV1, SlotStatus};
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::carrier::compile::JsonPayloadCompiler;
use sterling_kernel::carrier::registry::RegistryV1;
use sterling_kernel::carrier::schema::ByteStateSchema;
use sterling_kernel::operators::operator_registry::{CostModel, OperatorDefV1, OperatorSetV1};
use sterling_kernel::operators::signature::{
    LaneWrite, OperatorCategory, PlaneMaskU32, RelationalBinding, RelationalEffect,
    RelationalFault, ResolvedWrites, StatusWrite,
};
use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_search::node::CandidateOp;
use sterling_search::source::CandidateSource;

use crate::runner::EpisodeWorld;

/// Domain byte for the probe world.
pub const DOMAIN_BYTE: u8 = 5;
/// Color codes: `(5, 1, k)`.
pub const KIND_COLOR: u8 = 1;
/// Feedback codes: `(5, 2, k)`.
pub const KIND_FEEDBACK: u8 = 2;
/// Slot selectors: `(5, 3, k)`.
pub const KIND_SLOT: u8 = 3;

/// `PROBE` operator id.
pub const OP_PROBE: Code32 = Code32::new(DOMAIN_BYTE, 64, 1);
/// `MARK` operator id.
pub const OP_MARK: Code32 = Code32::new(DOMAIN_BYTE, 64, 2);

const SLOT_COUNT: usize = 16;
const LAYER_BELIEF: usize = 0;
const LAYER_FEEDBACK: usize = 1;
const COLOR_COUNT: u16 = 6;

/// Color code for a local id.
#[must_use]
pub fn color(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, KIND_COLOR, local_id)
}

/// Feedback code: 0 = miss, 1 = blow, 2 = hit.
#[must_use]
pub fn feedback(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, KIND_FEEDBACK, local_id)
}

/// Slot selector for a belief slot.
#[must_use]
pub fn slot(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, KIND_SLOT, local_id)
}

/// Slot-addressing index: maps the arg-0 selector to concrete lanes.
struct SlotIndex {
    digest: ContentHash,
    /// True: write arg 1 into the feedback lane and certify it.
    /// False: certify the belief lane only (no identity writes).
    writes_feedback: bool,
}

impl SlotIndex {
    fn new(writes_feedback: bool) -> Self {
        let bytes = canonical_json_bytes(&serde_json::json!({
            "index": "mastermind_slots.v1",
            "slot_count": SLOT_COUNT,
        }))
        .unwrap_or_default();
        Self {
            digest: canonical_hash(HashDomain::OperatorRegistry, &bytes),
            writes_feedback,
        }
    }
}

impl RelationalEffect for SlotIndex {
    fn index_digest(&self) -> &ContentHash {
        &self.digest
    }

    fn resolve(
        &self,
        _identity: &[u32],
        args: &[Code32],
    ) -> Result<ResolvedWrites, RelationalFault> {
        let selector = args[0];
        if selector.kind() != KIND_SLOT || (selector.local_id() as usize) >= SLOT_COUNT {
            return Err(RelationalFault {
                detail: format!("{selector} does not select a belief slot"),
            });
        }
        let slot_index = selector.local_id() as usize;

        if self.writes_feedback {
            let feedback_lane = LAYER_FEEDBACK * SLOT_COUNT + slot_index;
            Ok(ResolvedWrites {
                identity: vec![LaneWrite {
                    lane: feedback_lane,
                    mask: u32::MAX,
                    value: args[1].to_u32_le(),
                }],
                status: vec![StatusWrite {
                    lane: feedback_lane,
                    mask: u8::MAX,
                    value: SlotStatus::Certified.to_byte(),
                }],
            })
        } else {
            let belief_lane = LAYER_BELIEF * SLOT_COUNT + slot_index;
            Ok(ResolvedWrites {
                identity: Vec::new(),
                status: vec![StatusWrite {
                    lane: belief_lane,
                    mask: u8::MAX,
                    value: SlotStatus::Certified.to_byte(),
                }],
            })
        }
    }
}

/// The Mastermind world.
pub struct MastermindWorld {
    schema: ByteStateSchema,
    registry: RegistryV1,
    operator_set: OperatorSetV1,
    compiler: JsonPayloadCompiler,
    /// Initial belief codes, one per active slot.
    belief: Vec<u16>,
}

impl MastermindWorld {
    /// A four-peg board with a fixed initial belief.
    ///
    /// # Panics
    ///
    /// Panics only if the static world definition is internally inconsistent.
    #[must_use]
    pub fn new() -> Self {
        let schema = ByteStateSchema::new(
            "bytestate.v1",
            "mastermind",
            2,
            SLOT_COUNT,
            vec!["belief".into(), "feedback".into()],
        )
        .expect("mastermind schema is statically valid");

        let mut allocations: Vec<(Code32, String)> = Vec::new();
        for k in 0..COLOR_COUNT {
            allocations.push((color(k), format!("mm:color:{k}")));
        }
        for (k, name) in [(0u16, "miss"), (1, "blow"), (2, "hit")] {
            allocations.push((feedback(k), format!("mm:feedback:{name}")));
        }
        for k in 0..SLOT_COUNT {
            #[allow(clippy::cast_possible_truncation)]
            let id = k as u16;
            allocations.push((slot(id), format!("mm:slot:{k}")));
        }
        allocations.push((OP_PROBE, "mm:op:probe".into()));
        allocations.push((OP_MARK, "mm:op:mark".into()));
        let registry =
            RegistryV1::new("mm-epoch-0", allocations).expect("mastermind registry is static");

        let lanes = schema.lane_count();
        let feedback_region_identity = {
            let mut region = vec![0u32; lanes];
            for s in 0..SLOT_COUNT {
                region[LAYER_FEEDBACK * SLOT_COUNT + s] = u32::MAX;
            }
            region
        };
        let feedback_region_status = {
            let mut region = vec![0u8; lanes];
            for s in 0..SLOT_COUNT {
                region[LAYER_FEEDBACK * SLOT_COUNT + s] = u8::MAX;
            }
            region
        };
        let belief_status_region = {
            let mut region = vec![0u8; lanes];
            for s in 0..SLOT_COUNT {
                region[LAYER_BELIEF * SLOT_COUNT + s] = u8::MAX;
            }
            region
        };

        let probe = OperatorDefV1 {
            op_id: OP_PROBE,
            name: "PROBE".into(),
            category: OperatorCategory::Perceive,
            arg_slot_count: 2,
            precondition: PlaneMaskU32::new(lanes),
            effect: PlaneMaskU32::new(lanes),
            status_effect: None,
            arg_bindings: Vec::new(),
            relational: Some(RelationalBinding {
                effect: Arc::new(SlotIndex::new(true)),
                identity_region: feedback_region_identity,
                status_region: feedback_region_status,
            }),
            cost_model: CostModel::Unit,
            contract_epoch: "v1".into(),
        };
        let mark = OperatorDefV1 {
            op_id: OP_MARK,
            name: "MARK".into(),
            category: OperatorCategory::Memorize,
            arg_slot_count: 1,
            precondition: PlaneMaskU32::new(lanes),
            effect: PlaneMaskU32::new(lanes),
            status_effect: None,
            arg_bindings: Vec::new(),
            relational: Some(RelationalBinding {
                effect: Arc::new(SlotIndex::new(false)),
                identity_region: vec![0u32; lanes],
                status_region: belief_status_region,
            }),
            cost_model: CostModel::Unit,
            contract_epoch: "v1".into(),
        };
        let operator_set = OperatorSetV1::new("operator_registry.v1", vec![probe, mark])
            .expect("mastermind operator set is static");

        Self {
            schema,
            registry,
            operator_set,
            compiler: JsonPayloadCompiler,
            belief: vec![2, 0, 5, 3],
        }
    }

    fn payload_value(&self) -> serde_json::Value {
        let lanes = self.schema.lane_count();
        let mut identity = vec![serde_json::json!([0, 0, 0, 0]); lanes];
        let mut status = vec![serde_json::json!(0); lanes];
        for (s, &c) in self.belief.iter().enumerate() {
            let b = color(c).to_le_bytes();
            identity[LAYER_BELIEF * SLOT_COUNT + s] =
                serde_json::json!([b[0], b[1], b[2], b[3]]);
            status[LAYER_BELIEF * SLOT_COUNT + s] =
                serde_json::json!(SlotStatus::Provisional.to_byte());
        }
        serde_json::json!({
            "domain_id": "mastermind",
            "identity": identity,
            "status": status,
        })
    }
}

impl Default for MastermindWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateSource for MastermindWorld {
    fn domain_id(&self) -> &str {
        "mastermind"
    }

    fn candidates(&self, _state: &ByteStateV1, _registry: &RegistryV1) -> Vec<CandidateOp> {
        // Probe episodes are linear programs; search has nothing to explore.
        Vec::new()
    }

    fn is_goal(&self, state: &ByteStateV1) -> bool {
        // Solved when every active belief slot is certified.
        (0..self.belief.len()).all(|s| state.status_at(LAYER_BELIEF, s) == SlotStatus::Certified)
    }
}

impl EpisodeWorld for MastermindWorld {
    fn schema(&self) -> &ByteStateSchema {
        &self.schema
    }

    fn registry(&self) -> &RegistryV1 {
        &self.registry
    }

    fn operator_set(&self) -> &OperatorSetV1 {
        &self.operator_set
    }

    fn compiler(&self) -> &dyn sterling_kernel::carrier::compile::DomainCompiler {
        &self.compiler
    }

    fn fixture_payload(&self) -> Vec<u8> {
        canonical_json_bytes(&self.payload_value()).unwrap_or_default()
    }
}
