//! Rome: landmark navigation over a fixed city graph.
//!
//! Schema 4x32. Layers: `current`, `goal`, `visited`, `path`.
//! One operator, `MOVE_TO_NEIGHBOR (2,64,1)`, takes the target landmark as
//! its single arg, writes it into the current slot, and (through a
//! relational index over the adjacency graph) marks it visited and appends
//! it to the path. A move to a non-neighbor fails in the index resolve, so
//! illegal moves never reach the planes.

use std::collections::BTreeMap;
use std::sync::Arc;

use sterling_kernel::carrier::bytestate::{ByteStateV1, SlotStatus};
use sterling_kernel::carrier::code32::Code32;
use sterling_kernel::carrier::compile::JsonPayloadCompiler;
use sterling_kernel::carrier::registry::RegistryV1;
use sterling_kernel::carrier::schema::ByteStateSchema;
use sterling_kernel::operators::operator_registry::{CostModel, OperatorDefV1, OperatorSetV1};
use sterling_kernel::operators::signature::{
    ArgBinding, BindSite, LaneWrite, OperatorCategory, PlaneMaskU32, PlaneMaskU8,
    RelationalBinding, RelationalEffect, RelationalFault, ResolvedWrites, StatusWrite,
};
use sterling_kernel::proof::canon::canonical_json_bytes;
use sterling_kernel::proof::hash::{canonical_hash, ContentHash};
use sterling_kernel::proof::hash_domain::HashDomain;
use sterling_search::node::CandidateOp;
use sterling_search::source::CandidateSource;

use crate::runner::EpisodeWorld;

/// Landmark domain byte.
pub const DOMAIN_BYTE: u8 = 2;
/// Landmark kind byte.
pub const KIND_NODE: u8 = 1;
/// Operator kind byte.
pub const KIND_OP: u8 = 64;

/// `MOVE_TO_NEIGHBOR` operator id.
pub const OP_MOVE: Code32 = Code32::new(DOMAIN_BYTE, KIND_OP, 1);

const SLOT_COUNT: usize = 32;
const LAYER_CURRENT: usize = 0;
const LAYER_GOAL: usize = 1;
const LAYER_VISITED: usize = 2;
const LAYER_PATH: usize = 3;

const LANDMARKS: [&str; 8] = [
    "capitolium",
    "palatine",
    "aventine",
    "forum",
    "pantheon",
    "colosseum",
    "circus_maximus",
    "baths_of_caracalla",
];

/// Undirected city edges over landmark local ids.
const EDGES: [(u16, u16); 10] = [
    (0, 1),
    (0, 3),
    (1, 2),
    (1, 6),
    (2, 6),
    (3, 4),
    (3, 5),
    (4, 7),
    (5, 6),
    (5, 7),
];

/// Landmark code for a local id.
#[must_use]
pub fn node(local_id: u16) -> Code32 {
    Code32::new(DOMAIN_BYTE, KIND_NODE, local_id)
}

/// The adjacency index backing `MOVE_TO_NEIGHBOR`'s relational effect.
struct CityIndex {
    neighbors: BTreeMap<u16, Vec<u16>>,
    digest: ContentHash,
}

impl CityIndex {
    fn build() -> Self {
        let mut neighbors: BTreeMap<u16, Vec<u16>> = BTreeMap::new();
        for (a, b) in EDGES {
            neighbors.entry(a).or_default().push(b);
            neighbors.entry(b).or_default().push(a);
        }
        for list in neighbors.values_mut() {
            list.sort_unstable();
        }
        let edges_json: Vec<serde_json::Value> = EDGES
            .iter()
            .map(|(a, b)| serde_json::json!([u64::from(*a), u64::from(*b)]))
            .collect();
        let bytes = canonical_json_bytes(&serde_json::json!({
            "edges": edges_json,
            "index": "rome_city.v1",
        }))
        .unwrap_or_default();
        Self {
            digest: canonical_hash(HashDomain::OperatorRegistry, &bytes),
            neighbors,
        }
    }
}

impl RelationalEffect for CityIndex {
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
                detail: format!("{target} is not adjacent to {current}"),
            });
        }

        let visited_lane = LAYER_VISITED * SLOT_COUNT + target.local_id() as usize;
        let path_base = LAYER_PATH * SLOT_COUNT;
        let path_lane = (path_base..path_base + SLOT_COUNT)
            .find(|&lane| identity[lane] == Code32::PADDING.to_u32_le())
            .ok_or_else(|| RelationalFault {
                detail: "path layer is full".into(),
            })?;

        Ok(ResolvedWrites {
            identity: vec![
                LaneWrite {
                    lane: visited_lane,
                    mask: u32::MAX,
                    value: target.to_u32_le(),
                },
                LaneWrite {
                    lane: path_lane,
                    mask: u32::MAX,
                    value: target.to_u32_le(),
                },
            ],
            status: vec![
                StatusWrite {
                    lane: visited_lane,
                    mask: u8::MAX,
                    value: SlotStatus::Provisional.to_byte(),
                },
                StatusWrite {
                    lane: path_lane,
                    mask: u8::MAX,
                    value: SlotStatus::Provisional.to_byte(),
                },
            ],
        })
    }
}

/// The Rome world: schema, registry epoch, operators, fixture.
pub struct RomeWorld {
    schema: ByteStateSchema,
    registry: RegistryV1,
    operator_set: OperatorSetV1,
    compiler: JsonPayloadCompiler,
    neighbors: BTreeMap<u16, Vec<u16>>,
    start: u16,
    goal: u16,
}

impl RomeWorld {
    /// The standard episode: capitolium to colosseum.
    ///
    /// # Panics
    ///
    /// Panics only if the static world definition is internally inconsistent.
    #[must_use]
    pub fn new() -> Self {
        Self::with_route(0, 5)
    }

    /// A Rome world with a chosen start/goal pair.
    ///
    /// # Panics
    ///
    /// Panics only if the static world definition is internally inconsistent.
    #[must_use]
    pub fn with_route(start: u16, goal: u16) -> Self {
        let schema = ByteStateSchema::new(
            "bytestate.v1",
            "rome",
            4,
            SLOT_COUNT,
            vec![
                "current".into(),
                "goal".into(),
                "visited".into(),
                "path".into(),
            ],
        )
        .expect("rome schema is statically valid");

        let mut allocations: Vec<(Code32, String)> = LANDMARKS
            .iter()
            .enumerate()
            .map(|(i, name)| {
                #[allow(clippy::cast_possible_truncation)]
                let id = i as u16;
                (node(id), format!("rome:node:{name}"))
            })
            .collect();
        allocations.push((OP_MOVE, "rome:op:move_to_neighbor".into()));
        let registry =
            RegistryV1::new("rome-epoch-0", allocations).expect("rome registry is static");

        let index = CityIndex::build();
        let neighbors = index.neighbors.clone();
        let lanes = schema.lane_count();

        let mut effect = PlaneMaskU32::new(lanes);
        effect.set(schema.lane(LAYER_CURRENT, 0), u32::MAX, 0);
        let mut status_effect = PlaneMaskU8::new(lanes);
        status_effect.write_status(
            schema.lane(LAYER_CURRENT, 0),
            SlotStatus::Provisional.to_byte(),
        );

        let mut identity_region = vec![0u32; lanes];
        let mut status_region = vec![0u8; lanes];
        for slot in 0..SLOT_COUNT {
            identity_region[schema.lane(LAYER_VISITED, slot)] = u32::MAX;
            identity_region[schema.lane(LAYER_PATH, slot)] = u32::MAX;
            status_region[schema.lane(LAYER_VISITED, slot)] = u8::MAX;
            status_region[schema.lane(LAYER_PATH, slot)] = u8::MAX;
        }

        let move_def = OperatorDefV1 {
            op_id: OP_MOVE,
            name: "MOVE_TO_NEIGHBOR".into(),
            category: OperatorCategory::Seek,
            arg_slot_count: 1,
            precondition: PlaneMaskU32::new(lanes),
            effect,
            status_effect: Some(status_effect),
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
        let operator_set = OperatorSetV1::new("operator_registry.v1", vec![move_def])
            .expect("rome operator set is static");

        Self {
            schema,
            registry,
            operator_set,
            compiler: JsonPayloadCompiler,
            neighbors,
            start,
            goal,
        }
    }

    fn payload_value(&self) -> serde_json::Value {
        let lanes = self.schema.lane_count();
        let mut identity = vec![serde_json::json!([0, 0, 0, 0]); lanes];
        let mut status = vec![serde_json::json!(0); lanes];
        let mut place = |lane: usize, code: Code32| {
            let b = code.to_le_bytes();
            identity[lane] = serde_json::json!([b[0], b[1], b[2], b[3]]);
            status[lane] = serde_json::json!(SlotStatus::Provisional.to_byte());
        };
        place(self.schema.lane(LAYER_CURRENT, 0), node(self.start));
        place(self.schema.lane(LAYER_GOAL, 0), node(self.goal));
        place(
            self.schema.lane(LAYER_VISITED, self.start as usize),
            node(self.start),
        );
        place(self.schema.lane(LAYER_PATH, 0), node(self.start));
        serde_json::json!({
            "domain_id": "rome",
            "identity": identity,
            "status": status,
        })
    }
}

impl Default for RomeWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl CandidateSource for RomeWorld {
    fn domain_id(&self) -> &str {
        "rome"
    }

    fn candidates(&self, state: &ByteStateV1, _registry: &RegistryV1) -> Vec<CandidateOp> {
        let current = state.identity_at(LAYER_CURRENT, 0);
        self.neighbors
            .get(&current.local_id())
            .map(|list| {
                list.iter()
                    .map(|&id| CandidateOp::new(OP_MOVE, vec![node(id)]))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_goal(&self, state: &ByteStateV1) -> bool {
        state.identity_at(LAYER_CURRENT, 0) == state.identity_at(LAYER_GOAL, 0)
    }
}

impl EpisodeWorld for RomeWorld {
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
