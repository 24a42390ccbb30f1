//! Shared fixtures for the lock tests.
//!
//! `LinearWorld` is a minimal chain domain: node k links only to node k+1.
//! It exists so budget and divergence tests can dial in an exact number of
//! required transitions.

#![forbid(unsafe_code)]

use sterling_kernel::carrier::bytestate::ByteStateV1;
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::carrier::compile::JsonPayloadCompiler;
use sterling_kernel::carrier::registry::RegistryV1;
use sterling_kernel::carrier::schema::ByteStateSchema;
use sterling_kernel::operators::operator_registry::{CostModel, OperatorDefV1, OperatorSetV1};
use sterling_kernel::operators::signature::{
    ArgBinding, BindSite, OperatorCategory, PlaneMaskU32,
};
use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_evidence::runner::EpisodeWorld;
use sterling_search::node::CandidateOp;
use sterling_search::source::CandidateSource;

/// Domain byte for the chain world.
pub const DOMAIN_BYTE: u8 = 11;
/// `ADVANCE` operator id.
pub const OP_ADVANCE: Code32 = Code32::new(DOMAIN_BYTE, 64, 1);

/// Node code for a chain position.
#[must_use]
pub fn chain_node(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, 1, local_id)
}

/// A linear chain of `length + 1` nodes; the goal sits at position `length`.
pub struct LinearWorld {
    schema: ByteStateSchema,
    registry: RegistryV1,
    operator_set: OperatorSetV1,
    compiler: JsonPayloadCompiler,
    length: u16,
}

impl LinearWorld {
    /// Build a chain requiring exactly `length` transitions.
    ///
    /// # Panics
    ///
    /// Panics only if the static definition is inconsistent.
    #[must_use]
    pub fn new(length: u16) -> Self {
        let schema = ByteStateSchema::new(
            "bytestate.v1",
            "chain",
            1,
            4,
            vec!["current".into()],
        )
        .expect("chain schema is static");

        let mut allocations: Vec<(Code32, String)> = (0..=length)
            .map(|k| (chain_node(k), format!("chain:node:{k}")))
            .collect();
        allocations.push((OP_ADVANCE, "chain:op:advance".into()));
        let registry = RegistryV1::new("chain-epoch-0", allocations)
            .expect("chain registry is static");

        let lanes = schema.lane_count();
        let mut effect = PlaneMaskU32::new(lanes);
        effect.set(0, u32::MAX, 0);
        let operator_set = OperatorSetV1::new(
            "operator_registry.v1",
            vec![OperatorDefV1 {
                op_id: OP_ADVANCE,
                name: "ADVANCE".into(),
                category: OperatorCategory::Seek,
                arg_slot_count: 1,
                precondition: PlaneMaskU32::new(lanes),
                effect,
                status_effect: None,
                arg_bindings: vec![ArgBinding {
                    arg_index: 0,
                    lane: 0,
                    site: BindSite::EffectValue,
                }],
                relational: None,
                cost_model: CostModel::Unit,
                contract_epoch: "v1".into(),
            }],
        )
        .expect("chain operator set is static");

        Self {
            schema,
            registry,
            operator_set,
            compiler: JsonPayloadCompiler,
            length,
        }
    }

    fn payload_value(&self) -> serde_json::Value {
        let lanes = self.schema.lane_count();
        let mut identity = vec![serde_json::json!([0, 0, 0, 0]); lanes];
        let b = chain_node(0).to_le_bytes();
        identity[0] = serde_json::json!([b[0], b[1], b[2], b[3]]);
        serde_json::json!({
            "domain_id": "chain",
            "identity": identity,
            "status": vec![serde_json::json!(0); lanes],
        })
    }
}

impl CandidateSource for LinearWorld {
    fn domain_id(&self) -> &str {
        "chain"
    }

    fn candidates(&self, state: &ByteStateV1, _registry: &RegistryV1) -> Vec<CandidateOp> {
        let current = state.identity_at(0, 0);
        let next = current.local_id() + 1;
        if next > self.length {
            return Vec::new();
        }
        vec![CandidateOp::new(OP_ADVANCE, vec![chain_node(next)])]
    }

    fn is_goal(&self, state: &ByteStateV1) -> bool {
        state.identity_at(0, 0) == chain_node(self.length)
    }
}

impl EpisodeWorld for LinearWorld {
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
