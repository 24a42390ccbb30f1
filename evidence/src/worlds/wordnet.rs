//! WordNet: hypernym-lattice navigation for frontier-scale search.
//!
//! Schema 4x64. Layers: `current`, `target`, `annotations`, `reserved`.
//! `HOP (7,64,1)` moves along lattice edges (both directions); the lattice
//! index gates legality and writes nothing, so a state's identity is its
//! position alone and route choice never forks equivalent states. The
//! lattice has enough branching that scorer bias genuinely reorders
//! expansions without changing reachability.

use std::collections::BTreeMap;
use std::sync::Arc;

use sterling_kernel::carrier::bytestate::{ByteStateV1, SlotStatus};
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::carrier::compile::JsonPayloadCompiler;
use sterling_kernel::carrier::registry::RegistryV1;
use sterling_kernel::carrier::schema::ByteStateSchema;
use sterling_kernel::operators::operator_registry::{CostModel, OperatorDefV1, OperatorSetV1};
use sterling_kernel::operators::signature::{
    ArgBinding, BindSite, OperatorCategory, PlaneMaskU32, RelationalBinding, RelationalEffect,
    RelationalFault, ResolvedWrites,
};
use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_search::node::CandidateOp;
use sterling_search::source::CandidateSource;

use crate::runner::EpisodeWorld;

/// Domain byte for the lattice world.
pub const DOMAIN_BYTE: u8 = 7;
/// Synset kind byte.
pub const KIND_SYNSET: u8 = 1;

/// `HOP` operator id.
pub const OP_HOP: Code32 = Code32::new(DOMAIN_BYTE, 64, 1);

const SLOT_COUNT: usize = 64;
const LAYER_CURRENT: usize = 0;
const LAYER_TARGET: usize = 1;

const SYNSET_COUNT: u16 = 24;

/// Directed hypernym edges (`hyponym -> hypernym`); traversal is symmetric.
const EDGES: [(u16, u16); 28] = [
    (1, 0),
    (2, 0),
    (3, 1),
    (4, 1),
    (5, 2),
    (6, 2),
    (7, 3),
    (8, 3),
    (9, 4),
    (10, 4),
    (11, 5),
    (12, 5),
    (13, 6),
    (14, 6),
    (15, 7),
    (16, 8),
    (17, 9),
    (18, 10),
    (19, 11),
    (20, 12),
    (21, 13),
    (22, 14),
    (23, 15),
    (16, 9),
    (18, 11),
    (20, 13),
    (22, 16),
    (23, 17),
];

/// Synset code for a local id.
#[must_use]
pub fn synset(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, KIND_SYNSET, local_id)
}

struct LatticeIndex {
    neighbors: BTreeMap<u16, Vec<u16>>,
    digest: ContentHash,
}

impl LatticeIndex {
    fn build() -> Self {
        let mut neighbors: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
        for (a, b) in EDGES {
            neighbors.entry(a).or_default().push(b);
            neighbors.entry(b).or_default().push(a);
        }
        for list in neighbors.values_mut() {
            list.sort_unstable();
            list.dedup();
        }
        let edges_json: Vec<serde_json::Value> = EDGES
            .iter()
            .map(|(a, b)| serde_json::json!([u64::from(*a), u64::from(*b)]))
            .collect();
        let bytes = canonical_json_bytes(&serde_json::json!({
            "edges": edges_json,
            "index": "wordnet_lattice.v1",
        }))
        .unwrap_or_default();
        Self {
            digest: canonical_hash(HashDomain::OperatorRegistry, &bytes),
            neighbors,
        }
    }
}

impl RelationalEffect for LatticeIndex {
    fn index_digest(&self) -> &ContentHash {
        &self.digest
    }

    fn resolve(
        &self,
        identity: &[u32],
        args: &[Code32],
    ) -> Result<ResolvedWrites, RelationalFault> {
        let current = Code32::from_u32_le(identity[LAYER_CURRENT * SLOT_COUNT]);
        let target = args[0];
        let adjacent = self
            .neighbors
            .get(&current.local_id())
            .is_some_and(|list| list.binary_search(&target.local_id()).is_ok());
        if !adjacent {
            return Err(RelationalFault {
                detail: format!("no lattice edge between {current} and {target}"),
            });
        }
        Ok(ResolvedWrites::default())
    }
}

/// The WordNet lattice world.
pub struct WordnetWorld {
    schema: ByteStateSchema,
    registry: RegistryV1,
    operator_set: OperatorSetV1,
    compiler: JsonPayloadCompiler,
    neighbors: BTreeMap<u16, Vec<u16>>,
    start: u16,
    target: u16,
}

impl WordnetWorld {
    /// The standard episode: leaf 23 up and across to leaf 19.
    ///
    /// # Panics
    ///
    /// Panics only if the static world definition is internally inconsistent.
    #[must_use]
    pub fn new() -> Self {
        Self::with_route(23, 19)
    }

    /// A lattice world with a chosen start/target pair.
    ///
    /// # Panics
    ///
    /// Panics only if the static world definition is internally inconsistent.
    #[must_use]
    pub fn with_route(start: u16, target: u16) -> Self {
        let schema = ByteStateSchema::new(
            "bytestate.v1",
            "wordnet",
            4,
            SLOT_COUNT,
            vec![
                "current".into(),
                "target".into(),
                "annotations".into(),
                "reserved".into(),
            ],
        )
        .expect("wordnet schema is statically valid");

        let mut allocations: Vec<(Code32, String)> = (0..SYNSET_COUNT)
            .map(|k| (synset(k), format!("wn:synset:n{k:02}")))
            .collect();
        allocations.push((OP_HOP, "wn:op:hop".into()));
        let registry =
            RegistryV1::new("wn-epoch-0", allocations).expect("wordnet registry is static");

        let index = LatticeIndex::build();
        let neighbors = index.neighbors.clone();
        let lanes = schema.lane_count();

        let mut effect = PlaneMaskU32::new(lanes);
        effect.set(schema.lane(LAYER_CURRENT, 0), u32::MAX, 0);
        // The index is a pure legality gate: its write region is empty.
        let identity_region = vec![0u32; lanes];
        let status_region = vec![0u8; lanes];

        let hop = OperatorDefV1 {
            op_id: OP_HOP,
            name: "HOP".into(),
            category: OperatorCategory::Knowledge,
            arg_slot_count: 1,
            precondition: PlaneMaskU32::new(lanes),
            effect,
            status_effect: None,
            arg_bindings: vec![ArgBinding {
                arg_index: 0,
                lane: schema.lane(LAYER_CURRENT, 0),
                site: BindSite::EffectValue,
            }],
            relational: Some(RelationalBinding {
                effect: Arc::new(index),
                identity_region,
                status_region,
            }),
            cost_model: CostModel::Unit,
            contract_epoch: "v1".into(),
        };
        let operator_set = OperatorSetV1::new("operator_registry.v1", vec![hop])
            .expect("wordnet operator set is static");

        Self {
            schema,
            registry,
            operator_set,
            compiler: JsonPayloadCompiler,
            neighbors,
            start,
            target,
        }
    }

    fn payload_value(&self) -> serde_json::Value {
        let lanes = self.schema.lane_count();
        let mut identity = vec![serde_json::json!([0, 0, 0, 0]); lanes];
        let mut status = vec![serde_json::json!(0); lanes];
        let mut place = |lane: usize, code: Code32| {
            let b = code.to_le_bytes();
            identity[lane] = serde_json::json!([b[0], b[1], b[2], b[3]]);
            status[lane] = serde_json::json!(SlotStatus::Shadow.to_byte());
        };
        place(self.schema.lane(LAYER_CURRENT, 0), synset(self.start));
        place(self.schema.lane(LAYER_TARGET, 0), synset(self.target));
        serde_json::json!({
            "domain_id": "wordnet",
            "identity": identity,
            "status": status,
        })
    }
}

impl Default for WordnetWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateSource for WordnetWorld {
    fn domain_id(&self) -> &str {
        "wordnet"
    }

    fn candidates(&self, state: &ByteStateV1, _registry: &RegistryV1) -> Vec<CandidateOp> {
        let current = state.identity_at(LAYER_CURRENT, 0);
        self.neighbors
            .get(&current.local_id())
            .map(|list| {
                list.iter()
                    .map(|&id| CandidateOp::new(OP_HOP, vec![synset(id)]))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_goal(&self, state: &ByteStateV1) -> bool {
        state.identity_at(LAYER_CURRENT, 0) == state.identity_at(LAYER_TARGET, 0)
    }
}

impl EpisodeWorld for WordnetWorld {
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
