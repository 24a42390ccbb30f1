//! Escape room occupancy: a 2x36 transactional world.
//!
//! Layers: `committed` and `staged`. `STAGE (6,64,1)` writes an occupant into
//! a staged cell; `COMMIT (6,64,2)` copies every staged cell into the
//! committed layer and clears the staging layer; `ROLLBACK (6,64,3)` clears
//! the staging layer, restoring the pre-stage identity plane byte-for-byte.

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

/// Domain byte for the escape world.
pub const DOMAIN_BYTE: u8 = 6;
/// Occupant codes: `(6, 1, k)`.
pub const KIND_OCCUPANT: u8 = 1;
/// Cell selectors: `(6, 3, k)`.
pub const KIND_CELL: u8 = 3;

/// `STAGE` operator id.
pub const OP_STAGE: Code32 = Code32::new(DOMAIN_BYTE, 64, 1);
/// `COMMIT` operator id.
pub const OP_COMMIT: Code32 = Code32::new(DOMAIN_BYTE, 64, 2);
/// `ROLLBACK` operator id.
pub const OP_ROLLBACK: Code32 = Code32::new(DOMAIN_BYTE, 64, 3);

const SLOT_COUNT: usize = 36;
const LAYER_COMMITTED: usize = 0;
const LAYER_STAGED: usize = 1;
const OCCUPANT_COUNT: u16 = 6;

/// Occupant code for a local id.
#[must_use]
pub fn occupant(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, KIND_OCCUPANT, local_id)
}

/// Cell selector for a board cell.
#[must_use]
pub fn cell(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, KIND_CELL, local_id)
}

/// Which transactional action an index instance performs.
#[derive(Clone, Copy)]
enum TxnAction {
    Stage,
    Commit,
    Rollback,
}

/// Staging index: resolves cell selectors and the staged-lane sweep.
struct TxnIndex {
    digest: ContentHash,
    action: TxnAction,
}

impl TxnIndex {
    fn new(action: TxnAction) -> Self {
        let bytes = canonical_json_bytes(&serde_json::json!({
            "index": "escape_board.v1",
            "slot_count": SLOT_COUNT,
        }))
        .unwrap_or_default();
        Self {
            digest: canonical_hash(HashDomain::OperatorRegistry, &bytes),
            action,
        }
    }
}

impl RelationalEffect for TxnIndex {
    fn index_digest(&self) -> &ContentHash {
        &self.digest
    }

    fn resolve(
        &self,
        identity: &[u32],
        args: &[Code32],
    ) -> Result<ResolvedWrites, RelationalFault> {
        match self.action {
            TxnAction::Stage => {
                let selector = args[0];
                if selector.kind() != KIND_CELL
                    || (selector.local_id() as usize) >= SLOT_COUNT
                {
                    return Err(RelationalFault {
                        detail: format!("{selector} does not select a cell"),
                    });
                }
                let lane = LAYER_STAGED * SLOT_COUNT + selector.local_id() as usize;
                Ok(ResolvedWrites {
                    identity: vec![LaneWrite {
                        lane,
                        mask: u32::MAX,
                        value: args[1].to_u32_le(),
                    }],
                    status: vec![StatusWrite {
                        lane,
                        mask: u8::MAX,
                        value: SlotStatus::Provisional.to_byte(),
                    }],
                })
            }
            TxnAction::Commit => {
                let mut writes = ResolvedWrites::default();
                for s in 0..SLOT_COUNT {
                    let staged_lane = LAYER_STAGED * SLOT_COUNT + s;
                    let staged = identity[staged_lane];
                    if staged == Code32::PADDING.to_u32_le() {
                        continue;
                    }
                    writes.identity.push(LaneWrite {
                        lane: LAYER_COMMITTED * SLOT_COUNT + s,
                        mask: u32::MAX,
                        value: staged,
                    });
                    writes.status.push(StatusWrite {
                        lane: LAYER_COMMITTED * SLOT_COUNT + s,
                        mask: u8::MAX,
                        value: SlotStatus::Promoted.to_byte(),
                    });
                    writes.identity.push(LaneWrite {
                        lane: staged_lane,
                        mask: u32::MAX,
                        value: Code32::PADDING.to_u32_le(),
                    });
                    writes.status.push(StatusWrite {
                        lane: staged_lane,
                        mask: u8::MAX,
                        value: SlotStatus::Hole.to_byte(),
                    });
                }
                Ok(writes)
            }
            TxnAction::Rollback => {
                let mut writes = ResolvedWrites::default();
                for s in 0..SLOT_COUNT {
                    let staged_lane = LAYER_STAGED * SLOT_COUNT + s;
                    if identity[staged_lane] == Code32::PADDING.to_u32_le() {
                        continue;
                    }
                    writes.identity.push(LaneWrite {
                        lane: staged_lane,
                        mask: u32::MAX,
                        value: Code32::PADDING.to_u32_le(),
                    });
                    writes.status.push(StatusWrite {
                        lane: staged_lane,
                        mask: u8::MAX,
                        value: SlotStatus::Hole.to_byte(),
                    });
                }
                Ok(writes)
            }
        }
    }
}

/// The escape-room occupancy world.
pub struct EscapeWorld {
    schema: ByteStateSchema,
    registry: RegistryV1,
    operator_set: OperatorSetV1,
    compiler: JsonPayloadCompiler,
}

impl EscapeWorld {
    /// The standard 6x6 board with two committed occupants.
    ///
    /// # Panics
    ///
    /// Panics only if the static world definition is internally inconsistent.
    #[must_use]
    pub fn new() -> Self {
        let schema = ByteStateSchema::new(
            "bytestate.v1",
            "escape",
            2,
            SLOT_COUNT,
            vec!["committed".into(), "staged".into()],
        )
        .expect("escape schema is statically valid");

        let mut allocations: Vec<(Code32, String)> = Vec::new();
        for k in 0..OCCUPANT_COUNT {
            allocations.push((occupant(k), format!("escape:occupant:{k}")));
        }
        for k in 0..SLOT_COUNT {
            #[allow(clippy::cast_possible_truncation)]
            let id = k as u16;
            allocations.push((cell(id), format!("escape:cell:{k}")));
        }
        allocations.push((OP_STAGE, "escape:op:stage".into()));
        allocations.push((OP_COMMIT, "escape:op:commit".into()));
        allocations.push((OP_ROLLBACK, "escape:op:rollback".into()));
        let registry =
            RegistryV1::new("escape-epoch-0", allocations).expect("escape registry is static");

        let lanes = schema.lane_count();
        let staged_identity_region = {
            let mut region = vec![0u32; lanes];
            for s in 0..SLOT_COUNT {
                region[LAYER_STAGED * SLOT_COUNT + s] = u32::MAX;
            }
            region
        };
        let staged_status_region = {
            let mut region = vec![0u8; lanes];
            for s in 0..SLOT_COUNT {
                region[LAYER_STAGED * SLOT_COUNT + s] = u8::MAX;
            }
            region
        };
        let both_identity_region = vec![u32::MAX; lanes];
        let both_status_region = vec![u8::MAX; lanes];

        let stage = OperatorDefV1 {
            op_id: OP_STAGE,
            name: "STAGE".into(),
            category: OperatorCategory::Memorize,
            arg_slot_count: 2,
            precondition: PlaneMaskU32::new(lanes),
            effect: PlaneMaskU32::new(lanes),
            status_effect: None,
            arg_bindings: Vec::new(),
            relational: Some(RelationalBinding {
                effect: Arc::new(TxnIndex::new(TxnAction::Stage)),
                identity_region: staged_identity_region.clone(),
                status_region: staged_status_region.clone(),
            }),
            cost_model: CostModel::Unit,
            contract_epoch: "v1".into(),
        };
        let commit = OperatorDefV1 {
            op_id: OP_COMMIT,
            name: "COMMIT".into(),
            category: OperatorCategory::Control,
            arg_slot_count: 0,
            precondition: PlaneMaskU32::new(lanes),
            effect: PlaneMaskU32::new(lanes),
            status_effect: None,
            arg_bindings: Vec::new(),
            relational: Some(RelationalBinding {
                effect: Arc::new(TxnIndex::new(TxnAction::Commit)),
                identity_region: both_identity_region,
                status_region: both_status_region,
            }),
            cost_model: CostModel::Unit,
            contract_epoch: "v1".into(),
        };
        let rollback = OperatorDefV1 {
            op_id: OP_ROLLBACK,
            name: "ROLLBACK".into(),
            category: OperatorCategory::Control,
            arg_slot_count: 0,
            precondition: PlaneMaskU32::new(lanes),
            effect: PlaneMaskU32::new(lanes),
            status_effect: None,
            arg_bindings: Vec::new(),
            relational: Some(RelationalBinding {
                effect: Arc::new(TxnIndex::new(TxnAction::Rollback)),
                identity_region: staged_identity_region,
                status_region: staged_status_region,
            }),
            cost_model: CostModel::Unit,
            contract_epoch: "v1".into(),
        };
        let operator_set =
            OperatorSetV1::new("operator_registry.v1", vec![stage, commit, rollback])
                .expect("escape operator set is static");

        Self {
            schema,
            registry,
            operator_set,
            compiler: JsonPayloadCompiler,
        }
    }

    fn payload_value(&self) -> serde_json::Value {
        let lanes = self.schema.lane_count();
        let mut identity = vec![serde_json::json!([0, 0, 0, 0]); lanes];
        let mut status = vec![serde_json::json!(0); lanes];
        // Two committed occupants: cell 0 and cell 7.
        for (cell_index, occ) in [(0usize, 1u16), (7, 2)] {
            let b = occupant(occ).to_le_bytes();
            identity[LAYER_COMMITTED * SLOT_COUNT + cell_index] =
                serde_json::json!([b[0], b[1], b[2], b[3]]);
            status[LAYER_COMMITTED * SLOT_COUNT + cell_index] =
                serde_json::json!(SlotStatus::Promoted.to_byte());
        }
        serde_json::json!({
            "domain_id": "escape",
            "identity": identity,
            "status": status,
        })
    }
}

impl Default for EscapeWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateSource for EscapeWorld {
    fn domain_id(&self) -> &str {
        "escape"
    }

    fn candidates(&self, _state: &ByteStateV1, _registry: &RegistryV1) -> Vec<CandidateOp> {
        // Transactional episodes are linear programs.
        Vec::new()
    }

    fn is_goal(&self, _state: &ByteStateV1) -> bool {
        false
    }
}

impl EpisodeWorld for EscapeWorld {
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
